//! Bulk test-account purge.
//!
//! Destructive and irreversible, so it is gated twice:
//! 1) Only emails on the configured allow-list are candidates.
//! 2) [`PROTECTED_ACCOUNT_EMAIL`] is never deleted. It is checked when each
//!    account is classified and again right before the delete call.
//!
//! Every identity ends up in exactly one outcome and the full itemized report
//! is returned together with summary counts.

use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{normalize_email, Administrator, PROTECTED_ACCOUNT_EMAIL};
use crate::authz::{Role, RoleSet};
use crate::identity::{IdentityUser, Session};
use crate::store::{AuditAction, AuditEntry};
use crate::Result;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PurgeOutcome {
    Protected,
    Skipped,
    Deleted,
    Failed,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, ToSchema)]
pub struct PurgeItem {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub outcome: PurgeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, ToSchema)]
pub struct PurgeSummary {
    pub protected: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl PurgeSummary {
    fn count(&mut self, outcome: PurgeOutcome) {
        match outcome {
            PurgeOutcome::Protected => self.protected += 1,
            PurgeOutcome::Skipped => self.skipped += 1,
            PurgeOutcome::Deleted => self.deleted += 1,
            PurgeOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, ToSchema)]
pub struct PurgeReport {
    pub dry_run: bool,
    pub items: Vec<PurgeItem>,
    pub summary: PurgeSummary,
}

/// Pre-delete classification of one identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    Protected,
    Skipped,
    Candidate,
}

#[must_use]
pub fn is_protected(email: Option<&str>) -> bool {
    email.is_some_and(|email| normalize_email(email) == PROTECTED_ACCOUNT_EMAIL)
}

/// Classify an identity against the allow-list. The protected check wins over
/// everything else, including an allow-list that names the protected email.
#[must_use]
pub fn classify(email: Option<&str>, allow_list: &BTreeSet<String>) -> Classification {
    if is_protected(email) {
        return Classification::Protected;
    }
    match email {
        Some(email) if allow_list.contains(&normalize_email(email)) => Classification::Candidate,
        _ => Classification::Skipped,
    }
}

impl Administrator {
    /// Delete every allow-listed identity and its application records.
    ///
    /// With `dry_run` nothing is deleted; would-be deletions are reported as
    /// `deleted` and the report carries `dry_run: true`.
    ///
    /// # Errors
    /// - `Forbidden` unless the caller is a platform owner.
    /// - `Dependency` if the identity list cannot be read.
    pub async fn purge_test_accounts(&self, caller: &Session, dry_run: bool) -> Result<PurgeReport> {
        self.require_role(
            caller,
            RoleSet::of(&[Role::PlatformOwner]),
            "purge test accounts",
        )
        .await?;

        let users = self.identity.list_users().await?;
        let mut items = Vec::with_capacity(users.len());
        let mut summary = PurgeSummary::default();

        for user in users {
            let item = self.purge_one(user, dry_run).await;
            summary.count(item.outcome);
            items.push(item);
        }

        info!(
            actor_id = %caller.user_id(),
            dry_run,
            deleted = summary.deleted,
            failed = summary.failed,
            skipped = summary.skipped,
            protected = summary.protected,
            "test account purge finished"
        );
        self.record(AuditEntry::new(
            caller.user_id(),
            None,
            AuditAction::PurgeTestAccounts,
            "identity_users",
            None,
            json!({ "dry_run": dry_run, "summary": summary }),
        ))
        .await;

        Ok(PurgeReport {
            dry_run,
            items,
            summary,
        })
    }

    async fn purge_one(&self, user: IdentityUser, dry_run: bool) -> PurgeItem {
        let outcome = match classify(user.email.as_deref(), self.config.purge_allow_list()) {
            Classification::Protected => PurgeOutcome::Protected,
            Classification::Skipped => PurgeOutcome::Skipped,
            Classification::Candidate => {
                // Second gate, immediately before the destructive call.
                if is_protected(user.email.as_deref()) {
                    PurgeOutcome::Protected
                } else if dry_run {
                    PurgeOutcome::Deleted
                } else {
                    return self.delete(user).await;
                }
            }
        };
        PurgeItem {
            user_id: user.id,
            email: user.email,
            outcome,
            error: None,
        }
    }

    async fn delete(&self, user: IdentityUser) -> PurgeItem {
        let result = match self.identity.delete_user(user.id).await {
            Ok(()) => self
                .store
                .delete_user_records(user.id)
                .await
                .map_err(|err| format!("identity deleted but records remain: {err}")),
            Err(err) => Err(err.to_string()),
        };
        let (outcome, error) = match result {
            Ok(()) => (PurgeOutcome::Deleted, None),
            Err(message) => {
                error!(user_id = %user.id, "test account purge failed: {message}");
                (PurgeOutcome::Failed, Some(message))
            }
        };
        PurgeItem {
            user_id: user.id,
            email: user.email,
            outcome,
            error,
        }
    }
}
