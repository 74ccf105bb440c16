use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::definition::{FormDefinition, normalize_id_string};
use crate::audit::{self, AuditBuilder};
use crate::error::{Error, Result};
use crate::media::{DEFINITIONS_AREA, MediaStorage};
use crate::store::Store;
use crate::types::{AuditAction, Form, User};

pub const DUPLICATE_FORM: &str = "Form with this id or SMS-keyword already exists.";
pub const CLONE_SUFFIX: &str = "_cloned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertKind {
    #[serde(rename = "alert-success")]
    Success,
    #[serde(rename = "alert-error")]
    Error,
}

/// Result of a publish, update or clone.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<Form>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

impl PublishOutcome {
    fn success(text: String, form: Form) -> Self {
        Self {
            kind: AlertKind::Success,
            text,
            form: Some(form),
            preview_url: None,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Error,
            text: text.into(),
            form: None,
            preview_url: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.kind == AlertKind::Success
    }
}

/// An uploaded definition file.
pub struct Upload<'a> {
    pub file_name: &'a str,
    pub data: &'a [u8],
}

pub struct Publisher<'a> {
    pub store: &'a dyn Store,
    pub media: &'a MediaStorage,
    pub client_ip: Option<String>,
}

impl Publisher<'_> {
    /// Publishes a new form for `owner`. Validation problems and id clashes
    /// come back as an `alert-error` outcome with nothing committed.
    pub async fn publish(&self, owner: &User, actor: &str, upload: Upload<'_>) -> Result<PublishOutcome> {
        let definition = match FormDefinition::parse(upload.file_name, upload.data) {
            Ok(def) => def,
            Err(Error::InvalidDefinition(msg)) => return Ok(PublishOutcome::error(msg)),
            Err(e) => return Err(e),
        };

        let stored = self.store_definition(owner, upload).await?;
        let now = Utc::now();
        let form = Form {
            id: Uuid::new_v4().to_string(),
            user_id: owner.id.clone(),
            id_string: definition.id_string.clone(),
            uuid: Uuid::new_v4().simple().to_string(),
            title: definition.title.clone(),
            description: definition.description.clone(),
            shared: false,
            shared_data: false,
            downloadable: true,
            allows_sms: false,
            sms_id_string: definition
                .sms_keyword
                .clone()
                .unwrap_or_else(|| definition.id_string.clone()),
            json: definition.to_schema_json()?,
            definition_path: stored.clone(),
            created_at: now,
            updated_at: now,
        };

        let entry = AuditBuilder::new(
            AuditAction::FormPublished,
            actor,
            &owner.username,
            format!("Published form '{}'.", form.id_string),
        )
        .xform(&form.id_string)
        .client_ip(self.client_ip.clone())
        .build();

        match self.store.publish_form(&form, false, &entry) {
            Ok(()) => {
                audit::trace(&entry);
                let text = format!("Successfully published {}.", form.id_string);
                Ok(PublishOutcome::success(text, form))
            }
            Err(Error::AlreadyExists) => {
                self.discard(stored).await;
                Ok(PublishOutcome::error(DUPLICATE_FORM))
            }
            Err(e) => {
                self.discard(stored).await;
                Err(e)
            }
        }
    }

    /// Replaces the schema of `existing` with a new upload. The upload must
    /// keep the same id_string.
    pub async fn update(
        &self,
        owner: &User,
        actor: &str,
        existing: &Form,
        upload: Upload<'_>,
    ) -> Result<PublishOutcome> {
        let definition = match FormDefinition::parse(upload.file_name, upload.data) {
            Ok(def) => def,
            Err(Error::InvalidDefinition(msg)) => return Ok(PublishOutcome::error(msg)),
            Err(e) => return Err(e),
        };

        if definition.id_string != existing.id_string {
            return Ok(PublishOutcome::error(format!(
                "Your updated form's id_string '{}' must match the existing forms' id_string '{}'.",
                definition.id_string, existing.id_string
            )));
        }

        let stored = self.store_definition(owner, upload).await?;
        let form = Form {
            title: definition.title.clone(),
            description: definition.description.clone().or_else(|| existing.description.clone()),
            json: definition.to_schema_json()?,
            definition_path: stored.clone(),
            updated_at: Utc::now(),
            ..existing.clone()
        };

        let entry = AuditBuilder::new(
            AuditAction::FormXlsUpdated,
            actor,
            &owner.username,
            format!("XLS for '{}' updated.", form.id_string),
        )
        .xform(&form.id_string)
        .client_ip(self.client_ip.clone())
        .build();

        if let Err(e) = self.store.publish_form(&form, true, &entry) {
            self.discard(stored).await;
            return Err(e);
        }
        audit::trace(&entry);

        if let Some(previous) = &existing.definition_path {
            if let Err(e) = self.media.delete(previous).await {
                tracing::warn!("Failed to remove replaced definition {previous}: {e}");
            }
        }

        let text = format!("Successfully updated {}.", form.id_string);
        Ok(PublishOutcome::success(text, form))
    }

    /// Copies `source` into `target`'s account as `<id_string>_cloned`.
    pub async fn clone_form(&self, target: &User, source: &Form) -> Result<PublishOutcome> {
        let id_string = match normalize_id_string(&format!("{}{CLONE_SUFFIX}", source.id_string)) {
            Ok(id) => id,
            Err(Error::InvalidDefinition(msg)) => return Ok(PublishOutcome::error(msg)),
            Err(e) => return Err(e),
        };
        let now = Utc::now();

        let form = Form {
            id: Uuid::new_v4().to_string(),
            user_id: target.id.clone(),
            id_string: id_string.clone(),
            uuid: Uuid::new_v4().simple().to_string(),
            shared: false,
            shared_data: false,
            downloadable: true,
            allows_sms: false,
            sms_id_string: id_string.clone(),
            json: source.json.clone(),
            definition_path: None,
            created_at: now,
            updated_at: now,
            ..source.clone()
        };

        let entry = AuditBuilder::new(
            AuditAction::FormCloned,
            &target.username,
            &target.username,
            format!("Cloned form '{}'.", source.id_string),
        )
        .xform(&form.id_string)
        .client_ip(self.client_ip.clone())
        .build();

        match self.store.publish_form(&form, false, &entry) {
            Ok(()) => {
                audit::trace(&entry);
                let text = format!(
                    "Successfully cloned {} into {}.",
                    source.id_string, form.id_string
                );
                Ok(PublishOutcome::success(text, form))
            }
            Err(Error::AlreadyExists) => Ok(PublishOutcome::error(DUPLICATE_FORM)),
            Err(e) => Err(e),
        }
    }

    async fn store_definition(&self, owner: &User, upload: Upload<'_>) -> Result<Option<String>> {
        match self
            .media
            .put(&owner.username, DEFINITIONS_AREA, upload.file_name, upload.data)
            .await
        {
            Ok(stored) => Ok(Some(stored.path)),
            Err(crate::media::MediaStorageError::InvalidPath) => Ok(None),
            Err(e) => Err(Error::Io(std::io::Error::other(e.to_string()))),
        }
    }

    async fn discard(&self, stored: Option<String>) {
        if let Some(path) = stored {
            if let Err(e) = self.media.delete(&path).await {
                tracing::warn!("Failed to remove unused definition {path}: {e}");
            }
        }
    }
}
