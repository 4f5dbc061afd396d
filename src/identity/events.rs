//! Auth-state change events.
//!
//! Gates that need to re-run when the session changes hold a [`Subscription`].
//! Dropping the subscription (or calling [`Subscription::unsubscribe`]) detaches
//! it; no event is delivered to a detached subscriber.

use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 32;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthEvent {
    SignedIn { user_id: Uuid },
    SignedOut { user_id: Option<Uuid> },
    TokenRefreshed { user_id: Uuid },
    UserUpdated { user_id: Uuid },
}

/// Broadcast bus for [`AuthEvent`]s.
#[derive(Clone, Debug)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; returns how many subscribers received it.
    pub fn publish(&self, event: AuthEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellable handle on the event bus.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<AuthEvent>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the bus is gone.
    ///
    /// A subscriber that falls behind skips the missed events and continues
    /// with the oldest one still buffered.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Detach from the bus.
    pub fn unsubscribe(self) {}
}
