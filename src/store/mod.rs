//! Relational store behind the gates and the administration operations.
//!
//! Flow Overview:
//! 1) Each concern (profiles, roles, organizations, progress, audit, email MFA)
//!    is a small async trait so callers depend only on what they read.
//! 2) [`Store`] bundles them; components hold an `Arc<dyn Store>`.
//! 3) [`postgres::PgStore`] is the production implementation and
//!    [`memory::MemoryStore`] backs tests and local runs.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::authz::Role;
use crate::progression::{quiz::Quiz, QUIZ_COUNT};

pub use models::{
    AccountStatus, AttemptClaim, AuditAction, AuditEntry, EmailMfaChallenge, MfaMethod, Profile, QuizAttempt,
    Subscription, WorkforceGroup,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError>;

    /// Returns `false` when no profile exists for `user_id`.
    async fn set_profile_status(
        &self,
        user_id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when no profile exists for `user_id`.
    async fn set_mfa_preference(
        &self,
        user_id: Uuid,
        method: MfaMethod,
        enabled: bool,
    ) -> Result<bool, StoreError>;

    async fn count_active_profiles(&self, organization_id: Uuid) -> Result<i64, StoreError>;

    /// Remove every application record owned by `user_id`.
    async fn delete_user_records(&self, user_id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// The user's single role; unknown stored values read as `None`.
    async fn role(&self, user_id: Uuid) -> Result<Option<Role>, StoreError>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn subscription(&self, organization_id: Uuid)
        -> Result<Option<Subscription>, StoreError>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn materials_complete(&self, user_id: Uuid) -> Result<bool, StoreError>;

    async fn mark_materials_complete(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// Score of the most recent attempt for quizzes 1..=3.
    async fn last_scores(&self, user_id: Uuid) -> Result<[Option<i32>; QUIZ_COUNT], StoreError>;

    async fn record_attempt(&self, attempt: &QuizAttempt) -> Result<(), StoreError>;

    async fn quiz(&self, sequence: u8) -> Result<Option<Quiz>, StoreError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EmailMfaStore: Send + Sync {
    /// Replace any outstanding challenge for the user.
    async fn put_challenge(&self, challenge: &EmailMfaChallenge) -> Result<(), StoreError>;

    async fn challenge(&self, user_id: Uuid) -> Result<Option<EmailMfaChallenge>, StoreError>;

    /// Count one attempt, in a single step, if the challenge exists, has not
    /// expired at `now` and has fewer than `max_attempts` attempts. The code
    /// hash is only handed out for a counted attempt.
    async fn claim_attempt(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<AttemptClaim, StoreError>;

    async fn clear_challenge(&self, user_id: Uuid) -> Result<(), StoreError>;

    async fn mark_verified(&self, user_id: Uuid, until: DateTime<Utc>) -> Result<(), StoreError>;

    async fn verified_until(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Every store concern in one object.
pub trait Store:
    ProfileStore + RoleStore + OrganizationStore + ProgressStore + AuditLog + EmailMfaStore
{
}

impl<T> Store for T where
    T: ProfileStore + RoleStore + OrganizationStore + ProgressStore + AuditLog + EmailMfaStore
{
}
