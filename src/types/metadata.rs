use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of an auxiliary record attached to a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    FormLicense,
    DataLicense,
    Source,
    SupportingDoc,
    Media,
    PublicLink,
}

impl MetadataKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FormLicense => "form_license",
            Self::DataLicense => "data_license",
            Self::Source => "source",
            Self::SupportingDoc => "supporting_doc",
            Self::Media => "media",
            Self::PublicLink => "public_link",
        }
    }

    pub fn parse(s: &str) -> Option<MetadataKind> {
        match s {
            "form_license" => Some(Self::FormLicense),
            "data_license" => Some(Self::DataLicense),
            "source" => Some(Self::Source),
            "supporting_doc" => Some(Self::SupportingDoc),
            "media" => Some(Self::Media),
            "public_link" => Some(Self::PublicLink),
            _ => None,
        }
    }

    /// Kinds that hold at most one record per form.
    #[must_use]
    pub const fn is_singleton(self) -> bool {
        !matches!(self, Self::SupportingDoc | Self::Media)
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
