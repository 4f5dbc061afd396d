//! Deactivate an organization admin.
//!
//! The profile is marked inactive first and then the identity is banned. If the
//! ban fails the previous status is written back, so a profile never reads
//! inactive while its login still works. When that compensating write cannot
//! be completed either, the caller gets `PartiallyApplied`.

use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Administrator;
use crate::authz::{Role, RoleSet};
use crate::identity::Session;
use crate::store::{AccountStatus, AuditAction, AuditEntry};
use crate::{Error, Result};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, ToSchema)]
pub struct DeactivationReport {
    pub user_id: Uuid,
    pub previous_status: AccountStatus,
    pub status: AccountStatus,
    pub ban_hours: u64,
}

impl Administrator {
    /// # Errors
    /// - `Forbidden` unless the caller is a platform owner.
    /// - `NotFound` if the target has no role or no profile.
    /// - `InvariantViolation` if the target is not an org admin.
    /// - `Dependency` if the lockout failed and the profile was restored.
    /// - `PartiallyApplied` if the lockout failed and the restore failed too.
    pub async fn deactivate_org_admin(
        &self,
        caller: &Session,
        target: Uuid,
    ) -> Result<DeactivationReport> {
        self.require_role(
            caller,
            RoleSet::of(&[Role::PlatformOwner]),
            "deactivate org admins",
        )
        .await?;

        match self.store.role(target).await? {
            Some(Role::OrgAdmin) => {}
            Some(role) => {
                return Err(Error::InvariantViolation(format!(
                    "user {target} is {}, not org_admin",
                    role.as_str()
                )));
            }
            None => return Err(Error::NotFound(format!("no role assigned to user {target}"))),
        }

        let profile = self
            .store
            .profile(target)
            .await?
            .ok_or_else(|| Error::NotFound(format!("profile {target} not found")))?;
        let previous_status = profile.status;

        if !self
            .store
            .set_profile_status(target, AccountStatus::Inactive)
            .await?
        {
            return Err(Error::NotFound(format!("profile {target} not found")));
        }

        if let Err(err) = self
            .identity
            .ban_user(target, self.config.ban_duration())
            .await
        {
            warn!(%target, "identity lockout failed, restoring profile status: {err}");
            self.restore_status(target, previous_status).await?;
            return Err(Error::Dependency(format!("identity lockout failed: {err}")));
        }

        let ban_hours = self.config.ban_duration().as_secs() / 3600;
        info!(actor_id = %caller.user_id(), %target, "org admin deactivated");
        self.record(AuditEntry::new(
            caller.user_id(),
            profile.organization_id,
            AuditAction::DeactivateOrgAdmin,
            "profile",
            Some(target.to_string()),
            json!({
                "previous_status": previous_status.as_str(),
                "ban_hours": ban_hours,
                "target_email": profile.email,
            }),
        ))
        .await;

        Ok(DeactivationReport {
            user_id: target,
            previous_status,
            status: AccountStatus::Inactive,
            ban_hours,
        })
    }

    async fn restore_status(&self, target: Uuid, previous: AccountStatus) -> Result<()> {
        let attempts = self.config.rollback_attempts();
        for attempt in 1..=attempts {
            match self.store.set_profile_status(target, previous).await {
                Ok(_) => return Ok(()),
                Err(err) => warn!(%target, attempt, "profile status restore failed: {err}"),
            }
        }
        error!(
            %target,
            attempts,
            "profile left inactive while identity remains active"
        );
        Err(Error::PartiallyApplied(format!(
            "user {target} was marked inactive but could not be locked out or restored"
        )))
    }
}
