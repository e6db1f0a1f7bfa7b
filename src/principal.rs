//! Principals and the attribute authority directory.
//!
//! The directory is the single place attribute sets are issued and
//! principals are deactivated. Authentication is the caller's concern: the
//! vault only ever sees an already-resolved `Principal`.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::policy::AttributeSet;

/// A unique identifier for a principal.
pub type PrincipalId = String;

/// The kind of principal. Only `Authority` carries extra privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalRole {
    /// Issues and revokes attributes; may update any file's policy.
    Authority,
    /// Uploads files and manages their policies.
    DataOwner,
    DataUser,
}

/// An authenticated requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    pub role: PrincipalRole,
    pub attributes: AttributeSet,
    pub active: bool,
}

impl Principal {
    pub fn new(name: impl Into<String>, role: PrincipalRole, attributes: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            role,
            attributes: AttributeSet::parse(attributes),
            active: true,
        }
    }

    pub fn is_authority(&self) -> bool {
        self.role == PrincipalRole::Authority
    }
}

/// In-memory registry of principals.
#[derive(Debug, Default)]
pub struct PrincipalDirectory {
    principals: RwLock<HashMap<PrincipalId, Principal>>,
}

impl PrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory seeded with one authority (`Role:Authority`) and one data
    /// owner (`Role:Owner,Department:HR`).
    pub fn with_defaults() -> Self {
        let directory = Self::new();
        directory.seed_defaults();
        directory
    }

    /// Register the default `authority` and `owner` principals. A default
    /// whose name is already taken is skipped, so seeding twice is a no-op.
    pub fn seed_defaults(&self) {
        let defaults = [
            ("authority", PrincipalRole::Authority, "Role:Authority"),
            ("owner", PrincipalRole::DataOwner, "Role:Owner,Department:HR"),
        ];
        let mut principals = self.principals.write();
        for (name, role, attributes) in defaults {
            let taken = principals.values().any(|p| p.name.eq_ignore_ascii_case(name));
            if !taken {
                let principal = Principal::new(name, role, attributes);
                principals.insert(principal.id.clone(), principal);
            }
        }
    }

    /// Add a principal, returning its id.
    pub fn register(&self, principal: Principal) -> PrincipalId {
        let id = principal.id.clone();
        self.principals.write().insert(id.clone(), principal);
        id
    }

    /// Snapshot of a principal's current state.
    pub fn get(&self, id: &str) -> Result<Principal> {
        self.principals
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::PrincipalNotFound(id.to_string()))
    }

    /// Look a principal up by display name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<Principal> {
        let wanted = name.trim().to_lowercase();
        self.principals
            .read()
            .values()
            .find(|p| p.name.to_lowercase() == wanted)
            .cloned()
    }

    /// Replace a principal's attribute set and reactivate it.
    ///
    /// `actor_id` must name a registered, active authority. The check and
    /// the change happen under one write lock.
    pub fn issue(&self, actor_id: &str, principal_id: &str, attributes: &str) -> Result<()> {
        let mut principals = self.principals.write();
        require_authority(&principals, actor_id)?;
        let target = principals
            .get_mut(principal_id)
            .ok_or_else(|| VaultError::PrincipalNotFound(principal_id.to_string()))?;
        target.attributes = AttributeSet::parse(attributes);
        target.active = true;
        info!(principal_id, actor = actor_id, "attributes issued");
        Ok(())
    }

    /// Mark a principal inactive. Later `download_as` calls for it fail.
    pub fn revoke(&self, actor_id: &str, principal_id: &str) -> Result<()> {
        let mut principals = self.principals.write();
        require_authority(&principals, actor_id)?;
        let target = principals
            .get_mut(principal_id)
            .ok_or_else(|| VaultError::PrincipalNotFound(principal_id.to_string()))?;
        target.active = false;
        info!(principal_id, actor = actor_id, "principal revoked");
        Ok(())
    }

    /// All principals, ordered by name.
    pub fn list(&self) -> Vec<Principal> {
        let mut all: Vec<Principal> = self.principals.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

/// The directory's own entry for `actor_id` must be an active authority.
/// Unknown actors are refused the same way as unprivileged ones.
fn require_authority(principals: &HashMap<PrincipalId, Principal>, actor_id: &str) -> Result<()> {
    match principals.get(actor_id) {
        Some(actor) if actor.active && actor.is_authority() => Ok(()),
        _ => {
            warn!(actor = actor_id, "authority action refused");
            Err(VaultError::Forbidden)
        }
    }
}
