//! Explicit session context.
//!
//! Holds the identity gateway, the current session and the auth-event bus for
//! one client. It is created with [`SessionContext::init`] and torn down with
//! [`SessionContext::sign_out`]; gates receive it explicitly instead of reaching
//! for a shared client.

use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{AuthEvent, AuthEvents, IdentityError, IdentityGateway, Session, Subscription};

pub struct SessionContext {
    gateway: Arc<dyn IdentityGateway>,
    events: AuthEvents,
    current: RwLock<Option<Session>>,
}

impl SessionContext {
    #[must_use]
    pub fn init(gateway: Arc<dyn IdentityGateway>) -> Self {
        Self {
            gateway,
            events: AuthEvents::new(),
            current: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn IdentityGateway> {
        &self.gateway
    }

    #[must_use]
    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub async fn session(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    /// Resume from a stored access token.
    ///
    /// # Errors
    /// Returns an error if the identity provider cannot be reached.
    pub async fn restore(&self, access_token: &str) -> Result<Option<Session>, IdentityError> {
        let session = self.gateway.current_session(access_token).await?;
        if let Some(session) = &session {
            *self.current.write().await = Some(session.clone());
            self.events.publish(AuthEvent::SignedIn {
                user_id: session.user_id(),
            });
        }
        Ok(session)
    }

    /// # Errors
    /// Returns an error if the credentials are rejected or the provider fails.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, IdentityError> {
        let session = self.gateway.sign_in(email, password).await?;
        *self.current.write().await = Some(session.clone());
        debug!(user_id = %session.user_id(), "session established");
        self.events.publish(AuthEvent::SignedIn {
            user_id: session.user_id(),
        });
        Ok(session)
    }

    /// Tear the session down.
    ///
    /// The local session is cleared and `SignedOut` is published even when the
    /// provider call fails; the provider error is still returned.
    ///
    /// # Errors
    /// Returns the provider's sign-out error, if any.
    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        let session = self.current.write().await.take();
        let user_id = session.as_ref().map(Session::user_id);
        let result = match &session {
            Some(session) => self.gateway.sign_out(session).await,
            None => Ok(()),
        };
        if let Err(err) = &result {
            warn!("identity sign-out failed: {err}");
        }
        self.events.publish(AuthEvent::SignedOut { user_id });
        result
    }
}
