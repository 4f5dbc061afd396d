//! Route guard: role gate first, then the MFA resolver.
//!
//! [`RouteGuard::check`] evaluates once. [`RouteGuard::watch`] keeps a route's
//! access state current: it re-evaluates on every auth-state change and
//! publishes the result on a `watch` channel until the returned
//! [`GuardHandle`] is cancelled or dropped. Content is never reported as
//! granted before the first evaluation completes.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::authz::{RoleGate, RoleSet};
use crate::identity::{AuthEvent, Session, SessionContext};
use crate::mfa::MfaResolver;
use crate::route::Route;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AccessState {
    /// Evaluation in flight; protected content stays hidden.
    Checking,
    Granted,
    Redirect(Route),
}

#[derive(Clone)]
pub struct RouteGuard {
    roles: RoleGate,
    mfa: MfaResolver,
}

impl RouteGuard {
    #[must_use]
    pub fn new(roles: RoleGate, mfa: MfaResolver) -> Self {
        Self { roles, mfa }
    }

    pub async fn check(
        &self,
        session: Option<&Session>,
        allowed: RoleSet,
        requested_path: &str,
    ) -> AccessState {
        let decision = self.roles.authorize(session, allowed, requested_path).await;
        if !decision.granted {
            return AccessState::Redirect(decision.redirect_to.unwrap_or_else(Route::login));
        }
        let decision = self.mfa.resolve(session).await;
        if decision.authorized {
            AccessState::Granted
        } else {
            AccessState::Redirect(decision.redirect.unwrap_or_else(Route::login))
        }
    }

    /// Watch a route for as long as the returned handle lives.
    #[must_use]
    pub fn watch(
        &self,
        context: Arc<SessionContext>,
        allowed: RoleSet,
        requested_path: String,
    ) -> GuardHandle {
        let (sender, receiver) = watch::channel(AccessState::Checking);
        // Subscribe before spawning so no event between here and the first
        // evaluation is missed.
        let mut subscription = context.subscribe();
        let guard = self.clone();

        let task = tokio::spawn(async move {
            let state = guard
                .check(context.session().await.as_ref(), allowed, &requested_path)
                .await;
            if sender.send(state).is_err() {
                return;
            }

            while let Some(event) = subscription.next().await {
                if let AuthEvent::SignedOut { .. } = event {
                    debug!(path = %requested_path, "signed out, ending route watch");
                    let _ = sender.send(AccessState::Redirect(Route::login()));
                    return;
                }
                if sender.send(AccessState::Checking).is_err() {
                    return;
                }
                let state = guard
                    .check(context.session().await.as_ref(), allowed, &requested_path)
                    .await;
                if sender.send(state).is_err() {
                    return;
                }
            }
        });

        GuardHandle {
            receiver,
            task: Some(task),
        }
    }
}

/// Owner of a route watch. Dropping it stops the watch.
#[derive(Debug)]
pub struct GuardHandle {
    receiver: watch::Receiver<AccessState>,
    task: Option<JoinHandle<()>>,
}

impl GuardHandle {
    /// Latest published state.
    #[must_use]
    pub fn state(&self) -> AccessState {
        self.receiver.borrow().clone()
    }

    /// Wait for the next state change. Returns `None` once the watch has ended.
    pub async fn changed(&mut self) -> Option<AccessState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until the state is no longer `Checking`.
    pub async fn settled(&mut self) -> Option<AccessState> {
        loop {
            let state = self.receiver.borrow_and_update().clone();
            if state != AccessState::Checking {
                return Some(state);
            }
            self.receiver.changed().await.ok()?;
        }
    }

    /// Stop the watch; nothing is published afterwards.
    pub fn cancel(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for GuardHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
