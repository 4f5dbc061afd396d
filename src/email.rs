//! Outbound email delivery.
//!
//! Email MFA codes are handed to an [`EmailSender`]. Template rendering lives
//! with the sender, not here; a message only names its template and carries a
//! JSON payload.
//!
//! The default sender for local dev is [`LogEmailSender`], which logs and
//! returns `Ok(())`. [`MemoryEmailSender`] keeps messages for inspection.

use anyhow::Result;
use std::sync::{Mutex, PoisonError};
use tracing::info;

pub const MFA_CODE_TEMPLATE: &str = "mfa_email_code";

#[derive(Clone, Debug, PartialEq)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload: serde_json::Value,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error if it could not be handed off.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload,
            "email send stub"
        );
        Ok(())
    }
}

/// Sender that records every message; can be switched to fail.
#[derive(Debug, Default)]
pub struct MemoryEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    fail: Mutex<bool>,
}

impl MemoryEmailSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    #[must_use]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<EmailMessage> {
        self.sent().pop()
    }
}

impl EmailSender for MemoryEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            anyhow::bail!("email delivery disabled");
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}
