use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const FORM_COLUMNS: &str = "id, user_id, id_string, uuid, title, description, shared, shared_data, \
     downloadable, allows_sms, sms_id_string, json, definition_path, created_at, updated_at";

const METADATA_COLUMNS: &str =
    "id, form_id, kind, data_value, data_file, data_file_type, file_hash, created_at";

const TOKEN_COLUMNS: &str =
    "id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        is_staff: row.get(3)?,
        is_active: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        is_admin: row.get(3)?,
        user_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
    })
}

fn form_from_row(row: &Row<'_>) -> rusqlite::Result<Form> {
    Ok(Form {
        id: row.get(0)?,
        user_id: row.get(1)?,
        id_string: row.get(2)?,
        uuid: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        shared: row.get(6)?,
        shared_data: row.get(7)?,
        downloadable: row.get(8)?,
        allows_sms: row.get(9)?,
        sms_id_string: row.get(10)?,
        json: row.get(11)?,
        definition_path: row.get(12)?,
        created_at: parse_datetime(&row.get::<_, String>(13)?),
        updated_at: parse_datetime(&row.get::<_, String>(14)?),
    })
}

fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<Metadata> {
    let kind: String = row.get(2)?;
    let kind = MetadataKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown metadata kind '{kind}'").into(),
        )
    })?;
    Ok(Metadata {
        id: row.get(0)?,
        form_id: row.get(1)?,
        kind,
        data_value: row.get(3)?,
        data_file: row.get(4)?,
        data_file_type: row.get(5)?,
        file_hash: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<FormGrant> {
    Ok(FormGrant {
        user_id: row.get(0)?,
        form_id: row.get(1)?,
        capabilities: Capability::from(row.get::<_, i64>(2)?),
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: row.get(0)?,
        form_id: row.get(1)?,
        uuid: row.get(2)?,
        data: json_column(row, 3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        deleted_at: row.get::<_, Option<String>>(5)?.map(|s| parse_datetime(&s)),
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let action: String = row.get(1)?;
    let action = AuditAction::parse(&action).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown audit action '{action}'").into(),
        )
    })?;
    Ok(AuditEntry {
        id: row.get(0)?,
        action,
        actor: row.get(2)?,
        account: row.get(3)?,
        message: row.get(4)?,
        context: json_column(row, 5)?,
        client_ip: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn insert_audit(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (id, action, actor, account, message, context, client_ip, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            entry.action.as_str(),
            entry.actor,
            entry.account,
            entry.message,
            serde_json::to_string(&entry.context)?,
            entry.client_ip,
            format_datetime(&entry.created_at),
        ],
    )?;
    Ok(())
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, username, email, is_staff, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.username,
                user.email,
                user.is_staff,
                user.is_active,
                format_datetime(&user.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, email, is_staff, is_active, created_at FROM users WHERE id = ?1",
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, email, is_staff, is_active, created_at
             FROM users WHERE username = ?1 COLLATE NOCASE",
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, username, email, is_staff, is_active, created_at
             FROM users WHERE username > ?1 ORDER BY username LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], user_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_active_usernames(&self, prefix: &str, limit: i32) -> Result<Vec<String>> {
        let conn = self.conn();
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let mut stmt = conn.prepare(
            "SELECT username FROM users
             WHERE is_active = 1 AND username LIKE ?1 ESCAPE '\\'
             ORDER BY username LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![format!("{escaped}%"), limit], |row| row.get(0))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Profile operations

    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, name, city, country, organization, home_page, twitter, description, require_auth
             FROM user_profiles WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserProfile {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    city: row.get(2)?,
                    country: row.get(3)?,
                    organization: row.get(4)?,
                    home_page: row.get(5)?,
                    twitter: row.get(6)?,
                    description: row.get(7)?,
                    require_auth: row.get(8)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO user_profiles
                (user_id, name, city, country, organization, home_page, twitter, description, require_auth)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (user_id) DO UPDATE SET
                name = excluded.name,
                city = excluded.city,
                country = excluded.country,
                organization = excluded.organization,
                home_page = excluded.home_page,
                twitter = excluded.twitter,
                description = excluded.description,
                require_auth = excluded.require_auth",
            params![
                profile.user_id,
                profile.name,
                profile.city,
                profile.country,
                profile.organization,
                profile.home_page,
                profile.twitter,
                profile.description,
                profile.require_auth,
            ],
        )?;
        Ok(())
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_admin,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE id = ?1"),
            params![id],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_lookup = ?1"),
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(params![user_id], token_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Form operations

    fn get_form(&self, id: &str) -> Result<Option<Form>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = ?1"),
            params![id],
            form_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_form_by_id_string(&self, user_id: &str, id_string: &str) -> Result<Option<Form>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {FORM_COLUMNS} FROM forms WHERE user_id = ?1 AND id_string = ?2"),
            params![user_id, id_string],
            form_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_form_by_uuid(&self, uuid: &str) -> Result<Option<Form>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {FORM_COLUMNS} FROM forms WHERE uuid = ?1"),
            params![uuid],
            form_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_user_forms(&self, user_id: &str) -> Result<Vec<Form>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FORM_COLUMNS} FROM forms WHERE user_id = ?1 ORDER BY id_string"
        ))?;

        let rows = stmt.query_map(params![user_id], form_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_shared_forms(&self) -> Result<Vec<Form>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FORM_COLUMNS} FROM forms WHERE shared = 1 ORDER BY id_string"
        ))?;

        let rows = stmt.query_map([], form_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_forms_granted_to(&self, user_id: &str) -> Result<Vec<Form>> {
        let conn = self.conn();
        let columns = FORM_COLUMNS
            .split(", ")
            .map(|c| format!("f.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {columns} FROM forms f
             JOIN form_grants g ON g.form_id = f.id
             WHERE g.user_id = ?1 AND g.capabilities != 0 AND f.user_id != ?1
             ORDER BY f.id_string"
        ))?;

        let rows = stmt.query_map(params![user_id], form_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_form(&self, form: &Form, audit: &[AuditEntry]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let result = tx.execute(
            "UPDATE forms SET title = ?1, description = ?2, shared = ?3, shared_data = ?4,
                downloadable = ?5, allows_sms = ?6, sms_id_string = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                form.title,
                form.description,
                form.shared,
                form.shared_data,
                form.downloadable,
                form.allows_sms,
                form.sms_id_string,
                format_datetime(&form.updated_at),
                form.id,
            ],
        );

        match result {
            Ok(0) => return Err(Error::NotFound),
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => return Err(Error::AlreadyExists),
            Err(e) => return Err(Error::from(e)),
        }

        for entry in audit {
            insert_audit(&tx, entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn publish_form(&self, form: &Form, replace: bool, audit: &AuditEntry) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if replace {
            let rows = tx.execute(
                "UPDATE forms SET title = ?1, description = ?2, json = ?3, definition_path = ?4,
                    updated_at = ?5
                 WHERE id = ?6",
                params![
                    form.title,
                    form.description,
                    form.json,
                    form.definition_path,
                    format_datetime(&form.updated_at),
                    form.id,
                ],
            )?;
            if rows == 0 {
                return Err(Error::NotFound);
            }
        } else {
            let result = tx.execute(
                &format!(
                    "INSERT INTO forms ({FORM_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    form.id,
                    form.user_id,
                    form.id_string,
                    form.uuid,
                    form.title,
                    form.description,
                    form.shared,
                    form.shared_data,
                    form.downloadable,
                    form.allows_sms,
                    form.sms_id_string,
                    form.json,
                    form.definition_path,
                    format_datetime(&form.created_at),
                    format_datetime(&form.updated_at),
                ],
            );
            match result {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => return Err(Error::AlreadyExists),
                Err(e) => return Err(Error::from(e)),
            }
        }

        insert_audit(&tx, audit)?;
        tx.commit()?;
        Ok(())
    }

    // Metadata operations

    fn set_metadata(&self, meta: &Metadata, audit: Option<&AuditEntry>) -> Result<Metadata> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if meta.kind.is_singleton() {
            tx.execute(
                "DELETE FROM form_metadata WHERE form_id = ?1 AND kind = ?2",
                params![meta.form_id, meta.kind.as_str()],
            )?;
        }

        tx.execute(
            "INSERT INTO form_metadata (form_id, kind, data_value, data_file, data_file_type, file_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                meta.form_id,
                meta.kind.as_str(),
                meta.data_value,
                meta.data_file,
                meta.data_file_type,
                meta.file_hash,
                format_datetime(&meta.created_at),
            ],
        )?;
        let id = tx.last_insert_rowid();
        if let Some(entry) = audit {
            insert_audit(&tx, entry)?;
        }
        tx.commit()?;

        Ok(Metadata {
            id,
            ..meta.clone()
        })
    }

    fn get_metadata(&self, id: i64) -> Result<Option<Metadata>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {METADATA_COLUMNS} FROM form_metadata WHERE id = ?1"),
            params![id],
            metadata_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_metadata(&self, form_id: &str, kind: MetadataKind) -> Result<Vec<Metadata>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM form_metadata
             WHERE form_id = ?1 AND kind = ?2 ORDER BY id"
        ))?;

        let rows = stmt.query_map(params![form_id, kind.as_str()], metadata_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_metadata(&self, id: i64, audit: Option<&AuditEntry>) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute("DELETE FROM form_metadata WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Ok(false);
        }
        if let Some(entry) = audit {
            insert_audit(&tx, entry)?;
        }
        tx.commit()?;
        Ok(true)
    }

    // Grant operations

    fn get_form_grant(&self, user_id: &str, form_id: &str) -> Result<Option<FormGrant>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, form_id, capabilities, created_at, updated_at
             FROM form_grants WHERE user_id = ?1 AND form_id = ?2",
            params![user_id, form_id],
            grant_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_form_grants(&self, form_id: &str) -> Result<Vec<FormGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT g.user_id, g.form_id, g.capabilities, g.created_at, g.updated_at
             FROM form_grants g JOIN users u ON u.id = g.user_id
             WHERE g.form_id = ?1 AND g.capabilities != 0
             ORDER BY u.username",
        )?;

        let rows = stmt.query_map(params![form_id], grant_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn grant_capabilities(
        &self,
        user_id: &str,
        form_id: &str,
        caps: Capability,
        audit: &AuditEntry,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());

        tx.execute(
            "INSERT INTO form_grants (user_id, form_id, capabilities, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (user_id, form_id) DO UPDATE SET
                capabilities = capabilities | excluded.capabilities,
                updated_at = excluded.updated_at",
            params![user_id, form_id, i64::from(caps), now],
        )?;
        insert_audit(&tx, audit)?;

        tx.commit()?;
        Ok(())
    }

    fn revoke_capabilities(
        &self,
        user_id: &str,
        form_id: &str,
        caps: Capability,
        audit: &AuditEntry,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE form_grants SET capabilities = capabilities & ~?3, updated_at = ?4
             WHERE user_id = ?1 AND form_id = ?2",
            params![
                user_id,
                form_id,
                i64::from(caps),
                format_datetime(&Utc::now())
            ],
        )?;
        tx.execute(
            "DELETE FROM form_grants WHERE user_id = ?1 AND form_id = ?2 AND capabilities = 0",
            params![user_id, form_id],
        )?;
        insert_audit(&tx, audit)?;

        tx.commit()?;
        Ok(())
    }

    // Submission operations

    fn create_submission(&self, submission: &Submission) -> Result<i64> {
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO submissions (form_id, uuid, data, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                submission.form_id,
                submission.uuid,
                serde_json::to_string(&submission.data)?,
                format_datetime(&submission.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn list_submissions(&self, form_id: &str) -> Result<Vec<Submission>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, form_id, uuid, data, created_at, deleted_at FROM submissions
             WHERE form_id = ?1 AND deleted_at IS NULL ORDER BY id",
        )?;

        let rows = stmt.query_map(params![form_id], submission_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_submissions(&self, form_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE form_id = ?1 AND deleted_at IS NULL",
            params![form_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn soft_delete_submission(&self, form_id: &str, id: i64) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE submissions SET deleted_at = ?1
             WHERE form_id = ?2 AND id = ?3 AND deleted_at IS NULL",
            params![format_datetime(&Utc::now()), form_id, id],
        )?;
        Ok(rows > 0)
    }

    // Audit operations

    fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        insert_audit(&self.conn(), entry)
    }

    fn list_audit_for_account(&self, account: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, actor, account, message, context, client_ip, created_at
             FROM audit_log WHERE account = ?1 COLLATE NOCASE ORDER BY created_at, rowid",
        )?;

        let rows = stmt.query_map(params![account], audit_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}
