use crate::error::Result;
use crate::store::Store;
use crate::types::{Capability, Form, User};

/// Effective rights of one caller on one form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormAccess {
    pub is_owner: bool,
    pub granted: Capability,
}

impl FormAccess {
    /// Resolves access for `user` (None for anonymous callers).
    pub fn resolve(store: &dyn Store, form: &Form, user: Option<&User>) -> Result<Self> {
        let Some(user) = user else {
            return Ok(Self::default());
        };
        if user.id == form.user_id {
            return Ok(Self {
                is_owner: true,
                granted: Capability::ALL,
            });
        }

        let granted = store
            .get_form_grant(&user.id, &form.id)?
            .map(|g| g.capabilities)
            .unwrap_or_default();

        Ok(Self {
            is_owner: false,
            granted,
        })
    }

    /// Read-only access handed out through the public link.
    #[must_use]
    pub fn public_link() -> Self {
        Self {
            is_owner: false,
            granted: Capability::VIEW,
        }
    }

    #[must_use]
    pub fn can_edit(&self) -> bool {
        self.is_owner || self.granted.has(Capability::EDIT)
    }

    #[must_use]
    pub fn can_view(&self) -> bool {
        self.can_edit() || self.granted.has(Capability::VIEW)
    }

    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.is_owner || self.granted.has(Capability::SUBMIT)
    }

    #[must_use]
    pub fn can_validate(&self) -> bool {
        self.is_owner || self.granted.has(Capability::VALIDATE)
    }

    #[must_use]
    pub fn can_delete_data(&self) -> bool {
        self.is_owner || self.granted.has(Capability::DELETE_DATA)
    }

    /// Access to submitted data.
    #[must_use]
    pub fn can_read_data(&self, form: &Form) -> bool {
        form.shared_data || self.can_view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_implies_view() {
        let access = FormAccess {
            is_owner: false,
            granted: Capability::EDIT,
        };
        assert!(access.can_view());
        assert!(!access.can_delete_data());
        assert!(!access.can_submit());
    }

    #[test]
    fn test_owner_has_everything() {
        let access = FormAccess {
            is_owner: true,
            granted: Capability::default(),
        };
        assert!(access.can_edit() && access.can_view() && access.can_submit());
        assert!(access.can_validate() && access.can_delete_data());
    }

    #[test]
    fn test_anonymous_has_nothing() {
        let access = FormAccess::default();
        assert!(!access.can_view());
        assert!(FormAccess::public_link().can_view());
        assert!(!FormAccess::public_link().can_edit());
    }
}
