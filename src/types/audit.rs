use std::fmt;

use serde::{Deserialize, Serialize};

/// Kinds of audited actions. The string forms are what the activity API
/// filters on, so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    PublicProfileAccessed,
    ProfileSettingsUpdated,
    ApiTokenIssued,
    FormPublished,
    FormUpdated,
    FormXlsUpdated,
    FormCloned,
    FormPermissionsUpdated,
    SmsSupportActivated,
    SmsSupportDeactivated,
    SubmissionCreated,
    SubmissionDeleted,
}

impl AuditAction {
    pub const ALL: [AuditAction; 12] = [
        Self::PublicProfileAccessed,
        Self::ProfileSettingsUpdated,
        Self::ApiTokenIssued,
        Self::FormPublished,
        Self::FormUpdated,
        Self::FormXlsUpdated,
        Self::FormCloned,
        Self::FormPermissionsUpdated,
        Self::SmsSupportActivated,
        Self::SmsSupportDeactivated,
        Self::SubmissionCreated,
        Self::SubmissionDeleted,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PublicProfileAccessed => "public-profile-accessed",
            Self::ProfileSettingsUpdated => "profile-settings-updated",
            Self::ApiTokenIssued => "api-token-issued",
            Self::FormPublished => "form-published",
            Self::FormUpdated => "form-updated",
            Self::FormXlsUpdated => "form-xls-updated",
            Self::FormCloned => "form-cloned",
            Self::FormPermissionsUpdated => "form-permissions-updated",
            Self::SmsSupportActivated => "sms-support-activated",
            Self::SmsSupportDeactivated => "sms-support-deactivated",
            Self::SubmissionCreated => "submission-created",
            Self::SubmissionDeleted => "submission-deleted",
        }
    }

    pub fn parse(s: &str) -> Option<AuditAction> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
