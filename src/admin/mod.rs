//! Privileged administration operations.
//!
//! Flow Overview:
//! 1) The caller's role is read from the role store; nothing the client sends
//!    about its own identity is trusted.
//! 2) Preconditions are checked before any mutation.
//! 3) Each successful operation appends an audit entry. A failed audit write is
//!    logged and does not undo the operation.

mod deactivate;
#[cfg(test)]
mod fixture;
mod purge;
mod seats;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::authz::{Role, RoleSet};
use crate::identity::{IdentityAdmin, Session, BAN_DURATION};
use crate::store::{AuditEntry, Store};
use crate::{Error, Result};

pub use deactivate::DeactivationReport;
pub use purge::{
    classify, is_protected, Classification, PurgeItem, PurgeOutcome, PurgeReport, PurgeSummary,
};
pub use seats::{capacity, SeatCapacity};

/// Account that no purge may ever delete.
pub const PROTECTED_ACCOUNT_EMAIL: &str = "owner@complira.app";

const DEFAULT_ROLLBACK_ATTEMPTS: u32 = 3;

/// Trim and lowercase an email for comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone, Debug)]
pub struct AdminConfig {
    purge_allow_list: BTreeSet<String>,
    ban_duration: Duration,
    rollback_attempts: u32,
}

impl AdminConfig {
    /// Empty purge allow-list, 876000h lockout and 3 rollback attempts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            purge_allow_list: BTreeSet::new(),
            ban_duration: BAN_DURATION,
            rollback_attempts: DEFAULT_ROLLBACK_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_purge_allow_list<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.purge_allow_list = emails
            .into_iter()
            .map(|email| normalize_email(email.as_ref()))
            .filter(|email| !email.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_ban_duration(mut self, duration: Duration) -> Self {
        self.ban_duration = duration;
        self
    }

    #[must_use]
    pub fn with_rollback_attempts(mut self, attempts: u32) -> Self {
        self.rollback_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn purge_allow_list(&self) -> &BTreeSet<String> {
        &self.purge_allow_list
    }

    #[must_use]
    pub fn ban_duration(&self) -> Duration {
        self.ban_duration
    }

    #[must_use]
    pub fn rollback_attempts(&self) -> u32 {
        self.rollback_attempts
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Administrator {
    identity: Arc<dyn IdentityAdmin>,
    store: Arc<dyn Store>,
    config: AdminConfig,
}

impl Administrator {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityAdmin>, store: Arc<dyn Store>, config: AdminConfig) -> Self {
        Self {
            identity,
            store,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    /// Read the caller's role and require it to be in `allowed`.
    async fn require_role(&self, caller: &Session, allowed: RoleSet, action: &str) -> Result<Role> {
        match self.store.role(caller.user_id()).await? {
            Some(role) if allowed.contains(role) => Ok(role),
            other => {
                warn!(
                    user_id = %caller.user_id(),
                    role = other.map_or("none", Role::as_str),
                    action,
                    "privileged action denied"
                );
                Err(Error::Forbidden(format!("not allowed to {action}")))
            }
        }
    }

    async fn record(&self, entry: AuditEntry) {
        if let Err(err) = self.store.append(&entry).await {
            warn!(
                action = entry.action.as_str(),
                actor_id = %entry.actor_id,
                "failed to write audit entry: {err}"
            );
        }
    }
}
