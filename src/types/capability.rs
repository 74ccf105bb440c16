use std::fmt;

use serde::{Deserialize, Serialize};

/// Capability is a bitmask over the closed set of per-form grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(u32);

impl Capability {
    pub const EDIT: Capability = Capability(1 << 0); // 1
    pub const VIEW: Capability = Capability(1 << 1); // 2
    pub const SUBMIT: Capability = Capability(1 << 2); // 4
    pub const VALIDATE: Capability = Capability(1 << 3); // 8
    pub const DELETE_DATA: Capability = Capability(1 << 4); // 16

    pub const ALL: Capability = Capability(0b1_1111);

    /// Single-bit capabilities in display order.
    pub const EACH: [Capability; 5] = [
        Self::EDIT,
        Self::VIEW,
        Self::SUBMIT,
        Self::VALIDATE,
        Self::DELETE_DATA,
    ];

    pub const fn new(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if this bitmask contains every bit of `required`.
    #[must_use]
    pub const fn has(self, required: Capability) -> bool {
        self.0 & required.0 == required.0
    }

    #[must_use]
    pub const fn union(self, other: Capability) -> Capability {
        Capability(self.0 | other.0)
    }

    #[must_use]
    pub const fn difference(self, other: Capability) -> Capability {
        Capability(self.0 & !other.0)
    }

    /// Parses the `perm_type` names accepted by the permission endpoint.
    /// `report` is the historical name for the submit capability.
    pub fn parse(s: &str) -> Option<Capability> {
        match s {
            "edit" => Some(Self::EDIT),
            "view" => Some(Self::VIEW),
            "report" => Some(Self::SUBMIT),
            "validate" => Some(Self::VALIDATE),
            "delete_data" => Some(Self::DELETE_DATA),
            _ => None,
        }
    }

    /// Codename recorded in audit messages. Only meaningful for single bits.
    #[must_use]
    pub fn codename(self) -> &'static str {
        match self {
            Self::EDIT => "change_xform",
            Self::VIEW => "view_xform",
            Self::SUBMIT => "report_xform",
            Self::VALIDATE => "validate_xform",
            Self::DELETE_DATA => "delete_data_xform",
            _ => "mixed",
        }
    }

    /// Human labels for every bit set, in display order.
    #[must_use]
    pub fn labels(self) -> Vec<&'static str> {
        Self::EACH
            .iter()
            .filter(|c| self.has(**c))
            .map(|c| match *c {
                Self::EDIT => "Can Edit",
                Self::VIEW => "Can View",
                Self::SUBMIT => "Can submit to",
                Self::VALIDATE => "Can Validate",
                _ => "Can Delete Data",
            })
            .collect()
    }

    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        let mut caps = Vec::new();
        if self.has(Self::EDIT) {
            caps.push("edit");
        }
        if self.has(Self::VIEW) {
            caps.push("view");
        }
        if self.has(Self::SUBMIT) {
            caps.push("report");
        }
        if self.has(Self::VALIDATE) {
            caps.push("validate");
        }
        if self.has(Self::DELETE_DATA) {
            caps.push("delete_data");
        }
        caps
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(", "))
    }
}

impl From<i64> for Capability {
    fn from(bits: i64) -> Self {
        Self::new(bits as u32)
    }
}

impl From<Capability> for i64 {
    fn from(c: Capability) -> Self {
        c.0 as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_has() {
        let c = Capability::EDIT.union(Capability::VIEW);
        assert!(c.has(Capability::EDIT));
        assert!(c.has(Capability::VIEW));
        assert!(!c.has(Capability::DELETE_DATA));
    }

    #[test]
    fn test_parse_perm_types() {
        assert_eq!(Capability::parse("report"), Some(Capability::SUBMIT));
        assert_eq!(Capability::parse("delete_data"), Some(Capability::DELETE_DATA));
        assert_eq!(Capability::parse("remove"), None);
        assert_eq!(Capability::parse("link"), None);
    }

    #[test]
    fn test_labels_follow_display_order() {
        let c = Capability::DELETE_DATA.union(Capability::EDIT);
        assert_eq!(c.labels(), vec!["Can Edit", "Can Delete Data"]);
    }

    #[test]
    fn test_new_masks_unknown_bits() {
        assert_eq!(Capability::new(0xff), Capability::ALL);
        assert!(Capability::ALL.difference(Capability::ALL).is_empty());
    }
}
