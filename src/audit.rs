//! Audit trail for mutating actions.
//!
//! Entries are built with [`AuditBuilder`], then either handed to a store
//! operation that writes them in its own transaction or persisted directly
//! with [`record`]. Every persisted entry is also emitted as a tracing event.

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::Result;
use crate::store::Store;
use crate::types::{AuditAction, AuditEntry};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct AuditBuilder {
    entry: AuditEntry,
}

impl AuditBuilder {
    pub fn new(
        action: AuditAction,
        actor: impl Into<String>,
        account: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entry: AuditEntry {
                id: Uuid::new_v4().to_string(),
                action,
                actor: actor.into(),
                account: account.into(),
                message: message.into(),
                context: json!({}),
                client_ip: None,
                created_at: Utc::now(),
            },
        }
    }

    /// Attaches the form id_string the action concerns.
    #[must_use]
    pub fn xform(self, id_string: &str) -> Self {
        self.context("xform", Value::String(id_string.to_string()))
    }

    #[must_use]
    pub fn context(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.entry.context {
            map.insert(key.to_string(), value);
        }
        self
    }

    #[must_use]
    pub fn client_ip(mut self, ip: Option<String>) -> Self {
        self.entry.client_ip = ip;
        self
    }

    #[must_use]
    pub fn build(self) -> AuditEntry {
        self.entry
    }
}

/// Emits the tracing event for an entry that has been persisted.
pub fn trace(entry: &AuditEntry) {
    tracing::info!(
        action = entry.action.as_str(),
        actor = %entry.actor,
        account = %entry.account,
        client_ip = entry.client_ip.as_deref().unwrap_or("-"),
        "{}",
        entry.message
    );
}

/// Persists an entry on its own and traces it.
pub fn record(store: &dyn Store, entry: &AuditEntry) -> Result<()> {
    store.append_audit(entry)?;
    trace(entry);
    Ok(())
}

/// Document shape served by the activity API.
#[must_use]
pub fn to_document(entry: &AuditEntry) -> Value {
    json!({
        "_id": entry.id,
        "action": entry.action.as_str(),
        "user": entry.actor,
        "account": entry.account,
        "msg": entry.message,
        "xform": entry.context.get("xform").cloned().unwrap_or(Value::Null),
        "ip": entry.client_ip,
        "created_on": entry.created_at.format(DATETIME_FORMAT).to_string(),
    })
}

/// Column descriptors for the activity table, with every action as an
/// option in sorted order.
#[must_use]
pub fn activity_fields() -> Value {
    let mut actions: Vec<&str> = AuditAction::ALL.iter().map(|a| a.as_str()).collect();
    actions.sort_unstable();

    let options: Vec<Value> = actions
        .into_iter()
        .map(|a| json!({ "text": a, "value": a }))
        .collect();

    json!([
        { "id": "created_on", "label": "Performed On", "type": "datetime", "searchable": false },
        { "id": "action", "label": "Action", "type": "string", "searchable": true, "options": options },
        { "id": "user", "label": "Performed By", "type": "string", "searchable": true },
        { "id": "msg", "label": "Description", "type": "string", "searchable": true },
    ])
}
