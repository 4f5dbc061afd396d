//! In-memory identity provider for tests and local runs.
//!
//! Failure switches let callers simulate provider outages for each surface.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use super::{
    AssuranceLevel, Factor, IdentityAdmin, IdentityError, IdentityGateway, IdentityUser, Session,
};

#[derive(Debug)]
struct MemoryUser {
    email: String,
    password: String,
    assurance: AssuranceLevel,
    factors: Vec<Factor>,
    banned_for: Option<Duration>,
}

#[derive(Debug, Default)]
struct Failures {
    sessions: bool,
    assurance: bool,
    factors: bool,
    ban: bool,
    list: bool,
    delete: HashSet<Uuid>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, MemoryUser>,
    tokens: HashMap<String, Uuid>,
    deleted: Vec<Uuid>,
    failures: Failures,
}

#[derive(Debug, Default)]
pub struct MemoryIdentity {
    state: Mutex<State>,
}

fn unavailable(surface: &str) -> IdentityError {
    IdentityError::Unavailable(format!("{surface} unavailable"))
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a user with an `aal1` session level and no factors.
    pub fn add_user(&self, email: &str, password: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state().users.insert(
            id,
            MemoryUser {
                email: email.to_string(),
                password: password.to_string(),
                assurance: AssuranceLevel::Aal1,
                factors: Vec::new(),
                banned_for: None,
            },
        );
        id
    }

    /// Mint an access token that resolves to `user_id`.
    pub fn issue_token(&self, user_id: Uuid) -> String {
        let token = format!("mem_{}", Uuid::new_v4().simple());
        self.state().tokens.insert(token.clone(), user_id);
        token
    }

    pub fn set_assurance(&self, user_id: Uuid, level: AssuranceLevel) {
        if let Some(user) = self.state().users.get_mut(&user_id) {
            user.assurance = level;
        }
    }

    pub fn add_factor(&self, user_id: Uuid, factor: Factor) {
        if let Some(user) = self.state().users.get_mut(&user_id) {
            user.factors.push(factor);
        }
    }

    pub fn fail_sessions(&self, fail: bool) {
        self.state().failures.sessions = fail;
    }

    pub fn fail_assurance(&self, fail: bool) {
        self.state().failures.assurance = fail;
    }

    pub fn fail_factors(&self, fail: bool) {
        self.state().failures.factors = fail;
    }

    pub fn fail_ban(&self, fail: bool) {
        self.state().failures.ban = fail;
    }

    pub fn fail_list(&self, fail: bool) {
        self.state().failures.list = fail;
    }

    pub fn fail_delete_for(&self, user_id: Uuid) {
        self.state().failures.delete.insert(user_id);
    }

    #[must_use]
    pub fn is_banned(&self, user_id: Uuid) -> bool {
        self.state()
            .users
            .get(&user_id)
            .is_some_and(|user| user.banned_for.is_some())
    }

    #[must_use]
    pub fn contains_user(&self, user_id: Uuid) -> bool {
        self.state().users.contains_key(&user_id)
    }

    #[must_use]
    pub fn deleted_users(&self) -> Vec<Uuid> {
        self.state().deleted.clone()
    }
}

#[async_trait]
impl IdentityGateway for MemoryIdentity {
    async fn current_session(&self, access_token: &str) -> Result<Option<Session>, IdentityError> {
        let state = self.state();
        if state.failures.sessions {
            return Err(unavailable("sessions"));
        }
        let session = state.tokens.get(access_token).and_then(|user_id| {
            state.users.get(user_id).and_then(|user| {
                user.banned_for.is_none().then(|| {
                    Session::new(
                        *user_id,
                        Some(user.email.clone()),
                        SecretString::from(access_token.to_string()),
                    )
                })
            })
        });
        Ok(session)
    }

    async fn assurance_level(&self, session: &Session) -> Result<AssuranceLevel, IdentityError> {
        let state = self.state();
        if state.failures.assurance {
            return Err(unavailable("assurance"));
        }
        Ok(state
            .users
            .get(&session.user_id())
            .map_or(AssuranceLevel::Aal1, |user| user.assurance))
    }

    async fn list_factors(&self, session: &Session) -> Result<Vec<Factor>, IdentityError> {
        let state = self.state();
        if state.failures.factors {
            return Err(unavailable("factors"));
        }
        Ok(state
            .users
            .get(&session.user_id())
            .map(|user| user.factors.clone())
            .unwrap_or_default())
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, IdentityError> {
        let user_id = {
            let state = self.state();
            state
                .users
                .iter()
                .find(|(_, user)| {
                    user.email == email
                        && user.password == password.expose_secret()
                        && user.banned_for.is_none()
                })
                .map(|(id, _)| *id)
                .ok_or(IdentityError::InvalidCredentials)?
        };
        let token = self.issue_token(user_id);
        Ok(Session::new(
            user_id,
            Some(email.to_string()),
            SecretString::from(token),
        ))
    }

    async fn sign_out(&self, session: &Session) -> Result<(), IdentityError> {
        self.state().tokens.remove(session.access_token());
        Ok(())
    }
}

#[async_trait]
impl IdentityAdmin for MemoryIdentity {
    async fn ban_user(&self, user_id: Uuid, duration: Duration) -> Result<(), IdentityError> {
        let mut state = self.state();
        if state.failures.ban {
            return Err(unavailable("ban"));
        }
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(IdentityError::UserNotFound(user_id))?;
        user.banned_for = Some(duration);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<IdentityUser>, IdentityError> {
        let state = self.state();
        if state.failures.list {
            return Err(unavailable("list"));
        }
        let mut users: Vec<IdentityUser> = state
            .users
            .iter()
            .map(|(id, user)| IdentityUser {
                id: *id,
                email: Some(user.email.clone()),
            })
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), IdentityError> {
        let mut state = self.state();
        if state.failures.delete.contains(&user_id) {
            return Err(unavailable("delete"));
        }
        state
            .users
            .remove(&user_id)
            .ok_or(IdentityError::UserNotFound(user_id))?;
        state.tokens.retain(|_, owner| *owner != user_id);
        state.deleted.push(user_id);
        Ok(())
    }
}
