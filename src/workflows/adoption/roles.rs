//! Capability-set role checks.
//!
//! A user id maps to a set of roles rather than to a user subtype; the
//! workflow asks "does this id hold the Adopter capability" instead of
//! downcasting an account record.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Adopter,
    Coordinator,
    Admin,
}

/// The set of capabilities a user id resolves to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    roles: BTreeSet<Role>,
}

impl RoleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, role: Role) {
        self.roles.insert(role);
    }

    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Lookup against the external user directory. An empty set means the id
/// is unknown or holds no workflow role.
pub trait RoleDirectory: Send + Sync {
    fn roles_of(&self, user: UserId) -> RoleSet;
}

/// Per-session memoization of directory lookups, invalidated explicitly on
/// logout. Never process-global: one cache per presentation session.
pub struct RoleCache<'d> {
    directory: &'d dyn RoleDirectory,
    resolved: Mutex<HashMap<UserId, RoleSet>>,
}

impl<'d> RoleCache<'d> {
    pub fn new(directory: &'d dyn RoleDirectory) -> Self {
        Self {
            directory,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn roles_of(&self, user: UserId) -> RoleSet {
        let mut resolved = self.resolved.lock().expect("role cache mutex poisoned");
        resolved
            .entry(user)
            .or_insert_with(|| self.directory.roles_of(user))
            .clone()
    }

    pub fn has_role(&self, user: UserId, role: Role) -> bool {
        self.roles_of(user).contains(role)
    }

    /// Drop the cached entry for a user, e.g. on logout.
    pub fn invalidate(&self, user: UserId) {
        self.resolved
            .lock()
            .expect("role cache mutex poisoned")
            .remove(&user);
    }

    pub fn clear(&self) {
        self.resolved
            .lock()
            .expect("role cache mutex poisoned")
            .clear();
    }
}
