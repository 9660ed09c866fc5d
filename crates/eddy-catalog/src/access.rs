//! Permission checks consulted before replicas are opened or updated.

use std::collections::HashSet;

use eddy_types::DataObject;
use serde::{Deserialize, Serialize};

/// Access level on a data object. `Write` implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
}

/// Access-control collaborator.
pub trait AccessControl: Send + Sync {
    /// Whether the user may use administrative overrides.
    fn is_privileged(&self, user: &str) -> bool;

    /// Whether the user holds `permission` on an existing data object.
    fn permits(&self, user: &str, object: &DataObject, permission: Permission) -> bool;

    /// Whether the user may register a new data object at `logical_path`.
    fn may_create(&self, user: &str, logical_path: &str) -> bool;
}

/// Explicit grant of a permission on every path under a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub user: String,
    pub path_prefix: String,
    pub permission: Permission,
}

/// Access control from a fixed admin list and grant table.
///
/// Owners have full access to their objects, every user may create under
/// their own `home/<user>/` collection, and admins may do anything.
#[derive(Debug, Clone, Default)]
pub struct StaticAccessControl {
    admins: HashSet<String>,
    grants: Vec<Grant>,
}

impl StaticAccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admin(mut self, user: &str) -> Self {
        self.admins.insert(user.to_string());
        self
    }

    pub fn with_grant(mut self, user: &str, path_prefix: &str, permission: Permission) -> Self {
        self.grants.push(Grant {
            user: user.to_string(),
            path_prefix: path_prefix.to_string(),
            permission,
        });
        self
    }

    /// Build from configuration lists.
    pub fn from_parts(admins: impl IntoIterator<Item = String>, grants: Vec<Grant>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
            grants,
        }
    }

    fn granted(&self, user: &str, path: &str, permission: Permission) -> bool {
        self.grants.iter().any(|g| {
            g.user == user && g.permission >= permission && path.starts_with(&g.path_prefix)
        })
    }
}

impl AccessControl for StaticAccessControl {
    fn is_privileged(&self, user: &str) -> bool {
        self.admins.contains(user)
    }

    fn permits(&self, user: &str, object: &DataObject, permission: Permission) -> bool {
        self.is_privileged(user)
            || object.owner == user
            || self.granted(user, &object.logical_path, permission)
    }

    fn may_create(&self, user: &str, logical_path: &str) -> bool {
        self.is_privileged(user)
            || logical_path.contains(&format!("/home/{user}/"))
            || self.granted(user, logical_path, Permission::Write)
    }
}
