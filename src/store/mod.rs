mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    /// Case-insensitive lookup.
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>>;
    fn list_active_usernames(&self, prefix: &str, limit: i32) -> Result<Vec<String>>;

    // Profile operations
    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;
    fn upsert_profile(&self, profile: &UserProfile) -> Result<()>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    // Form operations
    fn get_form(&self, id: &str) -> Result<Option<Form>>;
    fn get_form_by_id_string(&self, user_id: &str, id_string: &str) -> Result<Option<Form>>;
    fn get_form_by_uuid(&self, uuid: &str) -> Result<Option<Form>>;
    fn list_user_forms(&self, user_id: &str) -> Result<Vec<Form>>;
    fn list_shared_forms(&self) -> Result<Vec<Form>>;
    /// Forms on which `user_id` holds any grant, owned forms excluded.
    fn list_forms_granted_to(&self, user_id: &str) -> Result<Vec<Form>>;
    /// Updates settings columns and appends `audit` in the same transaction.
    /// A uniqueness conflict yields `Error::AlreadyExists`.
    fn update_form(&self, form: &Form, audit: &[AuditEntry]) -> Result<()>;
    /// Inserts (or, with `replace`, overwrites the schema of) a form and
    /// appends `audit` in the same transaction.
    fn publish_form(&self, form: &Form, replace: bool, audit: &AuditEntry) -> Result<()>;

    // Metadata operations
    /// Stores a metadata record, appending `audit` in the same transaction.
    /// Singleton kinds replace any previous record.
    fn set_metadata(&self, meta: &Metadata, audit: Option<&AuditEntry>) -> Result<Metadata>;
    fn get_metadata(&self, id: i64) -> Result<Option<Metadata>>;
    fn list_metadata(&self, form_id: &str, kind: MetadataKind) -> Result<Vec<Metadata>>;
    fn delete_metadata(&self, id: i64, audit: Option<&AuditEntry>) -> Result<bool>;

    // Grant operations
    fn get_form_grant(&self, user_id: &str, form_id: &str) -> Result<Option<FormGrant>>;
    fn list_form_grants(&self, form_id: &str) -> Result<Vec<FormGrant>>;
    /// Adds capability bits and appends `audit` atomically.
    fn grant_capabilities(
        &self,
        user_id: &str,
        form_id: &str,
        caps: Capability,
        audit: &AuditEntry,
    ) -> Result<()>;
    /// Clears capability bits (dropping empty grants) and appends `audit` atomically.
    fn revoke_capabilities(
        &self,
        user_id: &str,
        form_id: &str,
        caps: Capability,
        audit: &AuditEntry,
    ) -> Result<()>;

    // Submission operations
    fn create_submission(&self, submission: &Submission) -> Result<i64>;
    /// Live (not soft-deleted) submissions in insertion order.
    fn list_submissions(&self, form_id: &str) -> Result<Vec<Submission>>;
    fn count_submissions(&self, form_id: &str) -> Result<i64>;
    fn soft_delete_submission(&self, form_id: &str, id: i64) -> Result<bool>;

    // Audit operations (append-only)
    fn append_audit(&self, entry: &AuditEntry) -> Result<()>;
    fn list_audit_for_account(&self, account: &str) -> Result<Vec<AuditEntry>>;
}
