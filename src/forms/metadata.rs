use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;

use crate::error::Error;
use crate::media::{DOCS_AREA, MediaStorage, MediaStorageError};
use crate::store::Store;
use crate::audit;
use crate::types::{AuditEntry, Form, Metadata, MetadataKind};
use crate::url_guard::is_allowed_media_url;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("URL {0} is forbidden.")]
    ForbiddenUrl(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("storage error: {0}")]
    Storage(#[from] MediaStorageError),
    #[error(transparent)]
    Store(#[from] Error),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// A file received in a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Typed access to the auxiliary records attached to one form.
pub struct FormMetadata<'a> {
    store: &'a dyn Store,
    media: &'a MediaStorage,
    form: &'a Form,
    owner: &'a str,
    audit: Option<&'a AuditEntry>,
}

impl<'a> FormMetadata<'a> {
    pub fn new(store: &'a dyn Store, media: &'a MediaStorage, form: &'a Form, owner: &'a str) -> Self {
        Self {
            store,
            media,
            form,
            owner,
            audit: None,
        }
    }

    /// Writes `entry` in the same transaction as the next record change.
    #[must_use]
    pub fn audited(self, entry: &'a AuditEntry) -> Self {
        Self {
            audit: Some(entry),
            ..self
        }
    }

    fn save(&self, meta: &Metadata) -> Result<Metadata> {
        let stored = self.store.set_metadata(meta, self.audit)?;
        if let Some(entry) = self.audit {
            audit::trace(entry);
        }
        Ok(stored)
    }

    fn record(&self, kind: MetadataKind) -> Metadata {
        Metadata {
            id: 0,
            form_id: self.form.id.clone(),
            kind,
            data_value: None,
            data_file: None,
            data_file_type: None,
            file_hash: None,
            created_at: Utc::now(),
        }
    }

    pub fn list(&self, kind: MetadataKind) -> Result<Vec<Metadata>> {
        Ok(self.store.list_metadata(&self.form.id, kind)?)
    }

    pub fn single(&self, kind: MetadataKind) -> Result<Option<Metadata>> {
        Ok(self.list(kind)?.into_iter().next_back())
    }

    pub fn public_link(&self) -> Result<bool> {
        Ok(self
            .single(MetadataKind::PublicLink)?
            .and_then(|m| m.data_value)
            .is_some_and(|v| v.eq_ignore_ascii_case("true")))
    }

    pub fn set_public_link(&self, enabled: bool) -> Result<Metadata> {
        let mut meta = self.record(MetadataKind::PublicLink);
        meta.data_value = Some(if enabled { "True" } else { "False" }.to_string());
        self.save(&meta)
    }

    /// Upserts the form or data license text.
    pub fn set_license(&self, kind: MetadataKind, value: &str) -> Result<Metadata> {
        let mut meta = self.record(kind);
        meta.data_value = Some(value.to_string());
        self.save(&meta)
    }

    /// Upserts the source record from a value, a file, or both.
    pub async fn set_source(&self, value: Option<&str>, file: Option<UploadedFile>) -> Result<Metadata> {
        let mut meta = self.record(MetadataKind::Source);
        meta.data_value = value.map(str::to_string);
        if let Some(file) = file {
            self.attach(&mut meta, file).await?;
        }

        let previous = self.single(MetadataKind::Source)?;
        let stored = self.save(&meta)?;
        if let Some(old) = previous.and_then(|p| p.data_file) {
            self.remove_file_quietly(&old).await;
        }
        Ok(stored)
    }

    pub async fn add_supporting_doc(&self, file: UploadedFile) -> Result<Metadata> {
        let mut meta = self.record(MetadataKind::SupportingDoc);
        meta.data_value = Some(file.file_name.clone());
        self.attach(&mut meta, file).await?;
        self.save(&meta)
    }

    /// Stores an uploaded media file. Its content type must be one of `allowed`.
    pub async fn add_media_file(&self, file: UploadedFile, allowed: &[String]) -> Result<Metadata> {
        let mime = file
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !allowed.iter().any(|a| a.eq_ignore_ascii_case(&mime)) {
            return Err(MetadataError::UnsupportedMediaType(mime));
        }

        let mut meta = self.record(MetadataKind::Media);
        meta.data_value = Some(file.file_name.clone());
        self.attach(&mut meta, file).await?;
        self.save(&meta)
    }

    /// Records a media item hosted elsewhere.
    pub fn add_media_url(&self, url: &str) -> Result<Metadata> {
        let url = url.trim();
        if !is_allowed_media_url(url) {
            return Err(MetadataError::ForbiddenUrl(url.to_string()));
        }
        let mut meta = self.record(MetadataKind::Media);
        meta.data_value = Some(url.to_string());
        self.save(&meta)
    }

    /// Deletes a record together with its stored file. A file that cannot be
    /// removed leaves the record in place.
    pub async fn remove(&self, meta: &Metadata) -> Result<()> {
        if let Some(path) = meta.data_file.as_deref().filter(|p| !p.is_empty()) {
            self.media.delete(path).await?;
        }
        self.delete_record(meta)
    }

    /// Deletes only the record, leaving any stored file alone.
    pub fn delete_record(&self, meta: &Metadata) -> Result<()> {
        if self.store.delete_metadata(meta.id, self.audit)? {
            if let Some(entry) = self.audit {
                audit::trace(entry);
            }
        }
        Ok(())
    }

    /// Fetches a record by id, only if it belongs to this form.
    pub fn get(&self, id: i64) -> Result<Option<Metadata>> {
        Ok(self
            .store
            .get_metadata(id)?
            .filter(|m| m.form_id == self.form.id))
    }

    async fn attach(&self, meta: &mut Metadata, file: UploadedFile) -> Result<()> {
        let stored = self
            .media
            .put(self.owner, DOCS_AREA, &file.file_name, &file.data)
            .await?;
        meta.data_file = Some(stored.path);
        meta.data_file_type = file.content_type;
        meta.file_hash = Some(format!("sha256:{}", stored.sha256));
        Ok(())
    }

    async fn remove_file_quietly(&self, path: &str) {
        if let Err(e) = self.media.delete(path).await {
            tracing::warn!("Failed to remove replaced file {path}: {e}");
        }
    }
}
