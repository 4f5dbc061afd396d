//! Seat-limit check.
//!
//! Advisory only: the count is not locked against concurrent signups, so an
//! organization can briefly exceed its limit.

use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Administrator;
use crate::authz::{Role, RoleSet};
use crate::identity::Session;
use crate::store::models::{FALLBACK_TIER, FALLBACK_USERS_LIMIT};
use crate::store::Subscription;
use crate::{Error, Result};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, ToSchema)]
pub struct SeatCapacity {
    pub organization_id: Uuid,
    pub tier: String,
    pub current: i64,
    pub limit: i64,
    pub can_add: bool,
}

/// Seat capacity for `current` active profiles under `subscription`.
#[must_use]
pub fn capacity(
    organization_id: Uuid,
    current: i64,
    subscription: Option<Subscription>,
) -> SeatCapacity {
    let (tier, limit) = subscription.map_or_else(
        || (FALLBACK_TIER.to_string(), FALLBACK_USERS_LIMIT),
        |subscription| (subscription.tier, subscription.users_limit),
    );
    SeatCapacity {
        organization_id,
        tier,
        current,
        limit,
        can_add: current < limit,
    }
}

impl Administrator {
    /// Seat usage for the caller's organization.
    ///
    /// Platform owners may name any organization; org admins only their own.
    ///
    /// # Errors
    /// - `Forbidden` unless the caller is an org admin or platform owner, or an
    ///   org admin names another organization.
    /// - `Validation` if no organization is named and the caller has none.
    pub async fn seat_capacity(
        &self,
        caller: &Session,
        organization: Option<Uuid>,
    ) -> Result<SeatCapacity> {
        let role = self
            .require_role(
                caller,
                RoleSet::of(&[Role::OrgAdmin, Role::PlatformOwner]),
                "check seat capacity",
            )
            .await?;

        let own_organization = self
            .store
            .profile(caller.user_id())
            .await?
            .and_then(|profile| profile.organization_id);

        let organization_id = match (role, organization, own_organization) {
            (Role::PlatformOwner, Some(requested), _) => requested,
            (_, Some(requested), Some(own)) if requested == own => own,
            (_, Some(_), _) => {
                return Err(Error::Forbidden(
                    "not allowed to check another organization".to_string(),
                ));
            }
            (_, None, Some(own)) => own,
            (_, None, None) => {
                return Err(Error::Validation(
                    "caller does not belong to an organization".to_string(),
                ));
            }
        };

        let current = self.store.count_active_profiles(organization_id).await?;
        let subscription = self.store.subscription(organization_id).await?;
        let seats = capacity(organization_id, current, subscription);
        debug!(
            %organization_id,
            current = seats.current,
            limit = seats.limit,
            "seat capacity checked"
        );
        Ok(seats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::fixture::Fixture;
    use crate::store::{AccountStatus, Profile};

    #[test]
    fn fallback_limit_without_subscription() {
        let seats = capacity(Uuid::nil(), 99, None);
        assert_eq!(seats.limit, 100);
        assert_eq!(seats.tier, "basic");
        assert!(seats.can_add);
        assert!(!capacity(Uuid::nil(), 100, None).can_add);
    }

    #[tokio::test]
    async fn counts_active_profiles_against_subscription() -> Result<()> {
        let f = Fixture::new();
        let (admin, _) = f.user("admin@example.com", Role::OrgAdmin);
        f.user("a@example.com", Role::WorkforceUser);
        let (_, inactive) = f.user("b@example.com", Role::WorkforceUser);
        let mut profile = Profile::new(inactive, "b@example.com", Some(f.organization_id));
        profile.status = AccountStatus::Inactive;
        f.store.insert_profile(profile);
        f.store.insert_subscription(Subscription {
            organization_id: f.organization_id,
            tier: "starter".to_string(),
            users_limit: 2,
        });

        let seats = f.admin().seat_capacity(&admin, None).await?;
        assert_eq!(seats.current, 2);
        assert_eq!(seats.limit, 2);
        assert!(!seats.can_add);
        Ok(())
    }

    #[tokio::test]
    async fn learners_cannot_check_seats() {
        let f = Fixture::new();
        let (learner, _) = f.user("learner@example.com", Role::WorkforceUser);
        let result = f.admin().seat_capacity(&learner, None).await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn org_admin_is_scoped_to_own_organization() {
        let f = Fixture::new();
        let (admin, _) = f.user("admin@example.com", Role::OrgAdmin);
        let result = f.admin().seat_capacity(&admin, Some(Uuid::new_v4())).await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn platform_owner_without_organization() -> Result<()> {
        let f = Fixture::new();
        let (owner, owner_id) = f.user("owner@example.com", Role::PlatformOwner);
        f.store
            .insert_profile(Profile::new(owner_id, "owner@example.com", None));

        let result = f.admin().seat_capacity(&owner, None).await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let other = Uuid::new_v4();
        let seats = f.admin().seat_capacity(&owner, Some(other)).await?;
        assert_eq!(seats.organization_id, other);
        assert_eq!(seats.current, 0);
        Ok(())
    }
}
