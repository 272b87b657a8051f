//! Authorization collaborator interface.
//!
//! Permission resolution itself (sessions, collaborator roles) lives
//! outside this crate; the core only consumes the resolved level to gate
//! its entry points. Write paths require `Editor` or above, read paths
//! anything above `None`.

use crate::error::Result;

/// Resolved permission level of a user on a document.
///
/// Ordered so that gates read as `permission >= Permission::Editor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    /// No access at all.
    None,
    /// Read-only access.
    Viewer,
    /// May edit content.
    Editor,
    /// Full control, including deletion.
    Owner,
}

impl Permission {
    /// Whether this level allows applying updates.
    pub fn can_edit(&self) -> bool {
        *self >= Permission::Editor
    }

    /// Whether this level allows reading document state.
    pub fn can_read(&self) -> bool {
        *self > Permission::None
    }
}

/// Trait for the external authorization collaborator.
pub trait AccessControl: Send + Sync {
    /// Resolve the acting user's permission on a document.
    fn resolve_permission(&self, doc_id: &str, user_id: &str) -> Result<Permission>;
}

/// Access control that grants every user owner permission.
///
/// For tests and single-user deployments where no collaborator roles
/// exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn resolve_permission(&self, _doc_id: &str, _user_id: &str) -> Result<Permission> {
        Ok(Permission::Owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_ordering() {
        assert!(Permission::Owner > Permission::Editor);
        assert!(Permission::Editor > Permission::Viewer);
        assert!(Permission::Viewer > Permission::None);
    }

    #[test]
    fn test_edit_and_read_gates() {
        assert!(Permission::Owner.can_edit());
        assert!(Permission::Editor.can_edit());
        assert!(!Permission::Viewer.can_edit());
        assert!(!Permission::None.can_edit());

        assert!(Permission::Viewer.can_read());
        assert!(!Permission::None.can_read());
    }

    #[test]
    fn test_allow_all() {
        let access = AllowAll;
        let permission = access.resolve_permission("doc-1", "anyone").unwrap();
        assert_eq!(permission, Permission::Owner);
    }
}
