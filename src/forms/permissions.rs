use thiserror::Error;

use super::access::FormAccess;
use super::metadata::{FormMetadata, MetadataError};
use crate::audit::{self, AuditBuilder};
use crate::error::Error as StoreError;
use crate::media::MediaStorage;
use crate::store::Store;
use crate::types::{AuditAction, Capability, Form, User};

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("Permission denied.")]
    Forbidden,
    #[error("perm_type and for_user are required")]
    MissingParameter,
    #[error("Unknown permission type {0}.")]
    UnknownPermission(String),
    #[error("Wrong username {0}.")]
    UnknownUser(String),
    #[error("Unknown public link action {0}.")]
    UnknownLinkAction(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// What a permission request changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionChange {
    Granted(Capability),
    /// The target already held the capability; nothing was written.
    Unchanged,
    RemovedAll,
    PublicLink(bool),
}

pub struct PermissionManager<'a> {
    pub store: &'a dyn Store,
    pub media: &'a MediaStorage,
    pub client_ip: Option<String>,
}

impl PermissionManager<'_> {
    /// Applies one `perm_type` / `for_user` request on `form`.
    ///
    /// `perm_type` is a capability name, `remove` (revoke everything from
    /// `for_user`) or `link` (`for_user` is then `all`, `none` or `toggle`).
    pub fn apply(
        &self,
        form: &Form,
        owner: &User,
        actor: &str,
        access: FormAccess,
        perm_type: Option<&str>,
        for_user: Option<&str>,
    ) -> Result<PermissionChange, PermissionError> {
        if !access.can_edit() {
            return Err(PermissionError::Forbidden);
        }

        let (Some(perm_type), Some(for_user)) = (perm_type, for_user) else {
            return Err(PermissionError::MissingParameter);
        };

        if perm_type == "link" {
            return self.set_public_link(form, owner, actor, for_user);
        }

        let requested = match perm_type {
            "remove" => None,
            other => Some(
                Capability::parse(other)
                    .ok_or_else(|| PermissionError::UnknownPermission(other.to_string()))?,
            ),
        };

        let target = self
            .store
            .get_user_by_username(for_user)?
            .ok_or_else(|| PermissionError::UnknownUser(for_user.to_string()))?;

        let Some(capability) = requested else {
            let entry = self
                .entry(
                    actor,
                    owner,
                    form,
                    format!(
                        "All permissions on '{}' removed from '{}'.",
                        form.id_string, target.username
                    ),
                )
                .context("for_user", target.username.clone().into())
                .build();
            self.store
                .revoke_capabilities(&target.id, &form.id, Capability::ALL, &entry)?;
            audit::trace(&entry);
            return Ok(PermissionChange::RemovedAll);
        };

        let held = self
            .store
            .get_form_grant(&target.id, &form.id)?
            .map(|g| g.capabilities)
            .unwrap_or_default();
        if held.has(capability) {
            return Ok(PermissionChange::Unchanged);
        }

        let entry = self
            .entry(
                actor,
                owner,
                form,
                format!(
                    "'{}' permission on '{}' assigned to '{}'.",
                    capability.codename(),
                    form.id_string,
                    target.username
                ),
            )
            .context("for_user", target.username.clone().into())
            .build();
        self.store
            .grant_capabilities(&target.id, &form.id, capability, &entry)?;
        audit::trace(&entry);

        Ok(PermissionChange::Granted(capability))
    }

    fn set_public_link(
        &self,
        form: &Form,
        owner: &User,
        actor: &str,
        action: &str,
    ) -> Result<PermissionChange, PermissionError> {
        let metadata = FormMetadata::new(self.store, self.media, form, &owner.username);
        let current = metadata.public_link()?;
        let enabled = match action {
            "all" => true,
            "none" => false,
            "toggle" => !current,
            other => return Err(PermissionError::UnknownLinkAction(other.to_string())),
        };

        let entry = self
            .entry(
                actor,
                owner,
                form,
                format!(
                    "Public link on '{}' {}.",
                    form.id_string,
                    if enabled { "created" } else { "removed" }
                ),
            )
            .build();
        metadata.audited(&entry).set_public_link(enabled)?;

        Ok(PermissionChange::PublicLink(enabled))
    }

    fn entry(&self, actor: &str, owner: &User, form: &Form, message: String) -> AuditBuilder {
        AuditBuilder::new(
            AuditAction::FormPermissionsUpdated,
            actor,
            &owner.username,
            message,
        )
        .xform(&form.id_string)
        .client_ip(self.client_ip.clone())
    }
}
