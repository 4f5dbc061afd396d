//! Role-based route authorization.
//!
//! A user holds at most one role. A route declares the set of roles allowed on
//! it; a caller with any other role (or none) is sent to their own home route
//! rather than shown an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::identity::Session;
use crate::route::Route;
use crate::store::Store;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    PlatformOwner,
    OrgAdmin,
    WorkforceUser,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::PlatformOwner, Self::OrgAdmin, Self::WorkforceUser];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlatformOwner => "platform_owner",
            Self::OrgAdmin => "org_admin",
            Self::WorkforceUser => "workforce_user",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "platform_owner" => Some(Self::PlatformOwner),
            "org_admin" => Some(Self::OrgAdmin),
            "workforce_user" => Some(Self::WorkforceUser),
            _ => None,
        }
    }

    #[must_use]
    pub const fn home(self) -> Route {
        match self {
            Self::PlatformOwner => Route::Platform,
            Self::OrgAdmin => Route::Admin,
            Self::WorkforceUser => Route::Dashboard,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::PlatformOwner => 1,
            Self::OrgAdmin => 1 << 1,
            Self::WorkforceUser => 1 << 2,
        }
    }
}

/// Where a user with `role` lands when they cannot stay where they are.
#[must_use]
pub const fn home_route(role: Option<Role>) -> Route {
    match role {
        Some(role) => role.home(),
        None => Route::login(),
    }
}

/// Set of roles allowed on a route.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    #[must_use]
    pub fn of(roles: &[Role]) -> Self {
        Self(roles.iter().fold(0, |bits, role| bits | role.bit()))
    }

    #[must_use]
    pub const fn all() -> Self {
        Self(Role::PlatformOwner.bit() | Role::OrgAdmin.bit() | Role::WorkforceUser.bit())
    }

    #[must_use]
    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |role| self.contains(*role))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |bits, role| bits | role.bit()))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GateDecision {
    pub granted: bool,
    pub redirect_to: Option<Route>,
}

impl GateDecision {
    #[must_use]
    pub const fn granted() -> Self {
        Self {
            granted: true,
            redirect_to: None,
        }
    }

    #[must_use]
    pub const fn redirect(route: Route) -> Self {
        Self {
            granted: false,
            redirect_to: Some(route),
        }
    }
}

/// Decides whether a session's role may enter a route.
#[derive(Clone)]
pub struct RoleGate {
    store: Arc<dyn Store>,
}

impl RoleGate {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Read the caller's role from the store.
    ///
    /// # Errors
    /// Returns an error if the role store cannot be read.
    pub async fn role_of(&self, session: &Session) -> crate::Result<Option<Role>> {
        Ok(self.store.role(session.user_id()).await?)
    }

    /// Evaluate the gate. Never fails; every failure becomes a redirect.
    pub async fn authorize(
        &self,
        session: Option<&Session>,
        allowed: RoleSet,
        requested_path: &str,
    ) -> GateDecision {
        let Some(session) = session else {
            debug!(path = requested_path, "no session, sending to login");
            return GateDecision::redirect(Route::login_returning(requested_path));
        };

        let role = match self.role_of(session).await {
            Ok(role) => role,
            Err(err) => {
                warn!(user_id = %session.user_id(), "role lookup failed: {err}");
                return GateDecision::redirect(Route::login());
            }
        };

        match role {
            Some(role) if allowed.contains(role) => GateDecision::granted(),
            other => {
                debug!(
                    user_id = %session.user_id(),
                    role = other.map_or("none", Role::as_str),
                    path = requested_path,
                    "role not allowed on route"
                );
                GateDecision::redirect(home_route(other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use proptest::prelude::*;
    use secrecy::SecretString;
    use uuid::Uuid;

    fn session(user_id: Uuid) -> Session {
        Session::new(user_id, None, SecretString::from("token"))
    }

    fn role_strategy() -> impl Strategy<Value = Option<Role>> {
        prop_oneof![
            Just(None),
            Just(Some(Role::PlatformOwner)),
            Just(Some(Role::OrgAdmin)),
            Just(Some(Role::WorkforceUser)),
        ]
    }

    #[test]
    fn home_routes_are_fixed() {
        assert_eq!(home_route(Some(Role::PlatformOwner)), Route::Platform);
        assert_eq!(home_route(Some(Role::OrgAdmin)), Route::Admin);
        assert_eq!(home_route(Some(Role::WorkforceUser)), Route::Dashboard);
        assert_eq!(home_route(None), Route::login());
    }

    #[test]
    fn role_set_membership() {
        let set = RoleSet::of(&[Role::OrgAdmin, Role::PlatformOwner]);
        assert!(set.contains(Role::OrgAdmin));
        assert!(!set.contains(Role::WorkforceUser));
        assert_eq!(set.iter().count(), 2);
        assert!(RoleSet::default().is_empty());
        assert_eq!(Role::ALL.into_iter().collect::<RoleSet>(), RoleSet::all());
    }

    #[tokio::test]
    async fn no_session_keeps_requested_path() {
        let gate = RoleGate::new(Arc::new(MemoryStore::new()));
        let decision = gate.authorize(None, RoleSet::all(), "/quiz/2").await;
        assert_eq!(
            decision,
            GateDecision::redirect(Route::login_returning("/quiz/2"))
        );
    }

    #[tokio::test]
    async fn allowed_role_is_granted() {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        store.set_role(user_id, Role::WorkforceUser);
        let gate = RoleGate::new(store);

        let decision = gate
            .authorize(
                Some(&session(user_id)),
                RoleSet::of(&[Role::WorkforceUser]),
                "/dashboard",
            )
            .await;
        assert_eq!(decision, GateDecision::granted());
    }

    #[tokio::test]
    async fn wrong_role_goes_home() {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        store.set_role(user_id, Role::WorkforceUser);
        let gate = RoleGate::new(store);

        let decision = gate
            .authorize(
                Some(&session(user_id)),
                RoleSet::of(&[Role::OrgAdmin]),
                "/admin/users",
            )
            .await;
        assert_eq!(decision, GateDecision::redirect(Route::Dashboard));
    }

    #[tokio::test]
    async fn unknown_role_and_lookup_failure_go_to_login() {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        store.set_raw_role(user_id, "auditor");
        let gate = RoleGate::new(store.clone());

        let decision = gate
            .authorize(Some(&session(user_id)), RoleSet::all(), "/dashboard")
            .await;
        assert_eq!(decision, GateDecision::redirect(Route::login()));

        store.set_role(user_id, Role::OrgAdmin);
        store.fail_roles(true);
        let decision = gate
            .authorize(Some(&session(user_id)), RoleSet::all(), "/admin")
            .await;
        assert_eq!(decision, GateDecision::redirect(Route::login()));
    }

    proptest! {
        #[test]
        fn redirect_depends_only_on_role(
            role in role_strategy(),
            bits in 0_u8..8,
            first in "/[a-z]{1,12}",
            second in "/[a-z]{1,12}",
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
            let store = Arc::new(MemoryStore::new());
            let user_id = Uuid::new_v4();
            if let Some(role) = role {
                store.set_role(user_id, role);
            }
            let allowed: RoleSet = Role::ALL
                .into_iter()
                .filter(|role| bits & role.bit() != 0)
                .collect();
            let gate = RoleGate::new(store);
            let session = session(user_id);

            let a = runtime.block_on(gate.authorize(Some(&session), allowed, &first));
            let b = runtime.block_on(gate.authorize(Some(&session), allowed, &second));
            prop_assert_eq!(&a, &b);

            let expected_granted = role.is_some_and(|role| allowed.contains(role));
            prop_assert_eq!(a.granted, expected_granted);
            if !expected_granted {
                prop_assert_eq!(a.redirect_to, Some(home_route(role)));
            }
        }
    }
}
