//! In-memory store for tests and local runs.
//!
//! Roles are kept as raw text and parsed on read, like the Postgres column, so
//! tests can exercise unknown role values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{
    AccountStatus, AttemptClaim, AuditEntry, AuditLog, EmailMfaChallenge, EmailMfaStore, MfaMethod,
    OrganizationStore, Profile, ProfileStore, ProgressStore, QuizAttempt, RoleStore, StoreError,
    Subscription,
};
use crate::authz::Role;
use crate::progression::{quiz::Quiz, QUIZ_COUNT};

#[derive(Debug, Default)]
struct Failures {
    profiles: bool,
    roles: bool,
    progress: bool,
    audit: bool,
    /// Remaining successful status writes; `None` means unlimited.
    status_writes: Option<usize>,
    deletes: HashSet<Uuid>,
}

#[derive(Debug, Default)]
struct State {
    profiles: HashMap<Uuid, Profile>,
    roles: HashMap<Uuid, String>,
    subscriptions: HashMap<Uuid, Subscription>,
    materials: HashSet<Uuid>,
    attempts: Vec<QuizAttempt>,
    quizzes: HashMap<u8, Quiz>,
    audit: Vec<AuditEntry>,
    challenges: HashMap<Uuid, EmailMfaChallenge>,
    verified: HashMap<Uuid, DateTime<Utc>>,
    failures: Failures,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn unavailable(table: &str) -> StoreError {
    StoreError::Unavailable(format!("{table} unavailable"))
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.state().profiles.insert(profile.user_id, profile);
    }

    pub fn set_role(&self, user_id: Uuid, role: Role) {
        self.set_raw_role(user_id, role.as_str());
    }

    /// Store an arbitrary role value, including ones no [`Role`] matches.
    pub fn set_raw_role(&self, user_id: Uuid, role: &str) {
        self.state().roles.insert(user_id, role.to_string());
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        self.state()
            .subscriptions
            .insert(subscription.organization_id, subscription);
    }

    pub fn insert_quiz(&self, quiz: Quiz) {
        self.state().quizzes.insert(quiz.sequence, quiz);
    }

    pub fn fail_profiles(&self, fail: bool) {
        self.state().failures.profiles = fail;
    }

    pub fn fail_roles(&self, fail: bool) {
        self.state().failures.roles = fail;
    }

    pub fn fail_progress(&self, fail: bool) {
        self.state().failures.progress = fail;
    }

    pub fn fail_audit(&self, fail: bool) {
        self.state().failures.audit = fail;
    }

    /// Let the next `writes` status updates succeed and fail every later one.
    pub fn limit_status_writes(&self, writes: usize) {
        self.state().failures.status_writes = Some(writes);
    }

    pub fn fail_delete_for(&self, user_id: Uuid) {
        self.state().failures.deletes.insert(user_id);
    }

    #[must_use]
    pub fn profile_status(&self, user_id: Uuid) -> Option<AccountStatus> {
        self.state()
            .profiles
            .get(&user_id)
            .map(|profile| profile.status)
    }

    #[must_use]
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state().audit.clone()
    }

    #[must_use]
    pub fn attempts(&self, user_id: Uuid) -> Vec<QuizAttempt> {
        self.state()
            .attempts
            .iter()
            .filter(|attempt| attempt.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        let state = self.state();
        if state.failures.profiles {
            return Err(unavailable("profiles"));
        }
        Ok(state.profiles.get(&user_id).cloned())
    }

    async fn set_profile_status(
        &self,
        user_id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        if state.failures.profiles {
            return Err(unavailable("profiles"));
        }
        match state.failures.status_writes {
            Some(0) => return Err(unavailable("profiles")),
            Some(remaining) => state.failures.status_writes = Some(remaining - 1),
            None => {}
        }
        Ok(state
            .profiles
            .get_mut(&user_id)
            .map(|profile| profile.status = status)
            .is_some())
    }

    async fn set_mfa_preference(
        &self,
        user_id: Uuid,
        method: MfaMethod,
        enabled: bool,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        if state.failures.profiles {
            return Err(unavailable("profiles"));
        }
        Ok(state
            .profiles
            .get_mut(&user_id)
            .map(|profile| {
                profile.mfa_method = method;
                profile.mfa_enabled = enabled;
            })
            .is_some())
    }

    async fn count_active_profiles(&self, organization_id: Uuid) -> Result<i64, StoreError> {
        let state = self.state();
        if state.failures.profiles {
            return Err(unavailable("profiles"));
        }
        let count = state
            .profiles
            .values()
            .filter(|profile| {
                profile.organization_id == Some(organization_id)
                    && profile.status == AccountStatus::Active
            })
            .count();
        i64::try_from(count).map_err(|_| StoreError::Corrupt("profile count overflow".to_string()))
    }

    async fn delete_user_records(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failures.deletes.contains(&user_id) {
            return Err(unavailable("profiles"));
        }
        state.profiles.remove(&user_id);
        state.roles.remove(&user_id);
        state.materials.remove(&user_id);
        state.attempts.retain(|attempt| attempt.user_id != user_id);
        state.challenges.remove(&user_id);
        state.verified.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn role(&self, user_id: Uuid) -> Result<Option<Role>, StoreError> {
        let state = self.state();
        if state.failures.roles {
            return Err(unavailable("user_roles"));
        }
        Ok(state.roles.get(&user_id).and_then(|role| Role::parse(role)))
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn subscription(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self.state().subscriptions.get(&organization_id).cloned())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn materials_complete(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let state = self.state();
        if state.failures.progress {
            return Err(unavailable("training_progress"));
        }
        Ok(state.materials.contains(&user_id))
    }

    async fn mark_materials_complete(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failures.progress {
            return Err(unavailable("training_progress"));
        }
        state.materials.insert(user_id);
        Ok(())
    }

    async fn last_scores(&self, user_id: Uuid) -> Result<[Option<i32>; QUIZ_COUNT], StoreError> {
        let state = self.state();
        if state.failures.progress {
            return Err(unavailable("quiz_attempts"));
        }
        let mut latest: [Option<&QuizAttempt>; QUIZ_COUNT] = [None; QUIZ_COUNT];
        for attempt in state.attempts.iter().filter(|a| a.user_id == user_id) {
            let Some(slot) = usize::from(attempt.sequence)
                .checked_sub(1)
                .and_then(|index| latest.get_mut(index))
            else {
                continue;
            };
            // Ties keep the later insert.
            if slot.map_or(true, |current| attempt.attempted_at >= current.attempted_at) {
                *slot = Some(attempt);
            }
        }
        Ok(latest.map(|attempt| attempt.map(|attempt| attempt.score)))
    }

    async fn record_attempt(&self, attempt: &QuizAttempt) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failures.progress {
            return Err(unavailable("quiz_attempts"));
        }
        state.attempts.push(attempt.clone());
        Ok(())
    }

    async fn quiz(&self, sequence: u8) -> Result<Option<Quiz>, StoreError> {
        Ok(self.state().quizzes.get(&sequence).cloned())
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failures.audit {
            return Err(unavailable("audit_logs"));
        }
        state.audit.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl EmailMfaStore for MemoryStore {
    async fn put_challenge(&self, challenge: &EmailMfaChallenge) -> Result<(), StoreError> {
        self.state()
            .challenges
            .insert(challenge.user_id, challenge.clone());
        Ok(())
    }

    async fn challenge(&self, user_id: Uuid) -> Result<Option<EmailMfaChallenge>, StoreError> {
        Ok(self.state().challenges.get(&user_id).cloned())
    }

    async fn claim_attempt(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<AttemptClaim, StoreError> {
        let mut state = self.state();
        let Some(challenge) = state.challenges.get_mut(&user_id) else {
            return Ok(AttemptClaim::Missing);
        };
        if challenge.expires_at <= now {
            return Ok(AttemptClaim::Expired);
        }
        if challenge.attempts >= max_attempts {
            return Ok(AttemptClaim::Exhausted);
        }
        challenge.attempts += 1;
        Ok(AttemptClaim::Claimed {
            code_hash: challenge.code_hash.clone(),
            attempts: challenge.attempts,
        })
    }

    async fn clear_challenge(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.state().challenges.remove(&user_id);
        Ok(())
    }

    async fn mark_verified(&self, user_id: Uuid, until: DateTime<Utc>) -> Result<(), StoreError> {
        self.state().verified.insert(user_id, until);
        Ok(())
    }

    async fn verified_until(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.state().verified.get(&user_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn unknown_role_text_reads_as_none() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store.set_raw_role(user_id, "super_admin");
        assert_eq!(store.role(user_id).await?, None);

        store.set_role(user_id, Role::OrgAdmin);
        assert_eq!(store.role(user_id).await?, Some(Role::OrgAdmin));
        Ok(())
    }

    #[tokio::test]
    async fn last_scores_use_most_recent_attempt() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        for (sequence, score, offset) in [(1, 90, 0), (1, 40, 5), (2, 85, 1), (9, 100, 0)] {
            store
                .record_attempt(&QuizAttempt {
                    user_id,
                    sequence,
                    score,
                    attempted_at: now + Duration::seconds(offset),
                })
                .await?;
        }
        assert_eq!(store.last_scores(user_id).await?, [Some(40), Some(85), None]);
        Ok(())
    }

    #[tokio::test]
    async fn attempt_claims_stop_at_the_limit() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        assert_eq!(
            store.claim_attempt(user_id, 2, now).await?,
            AttemptClaim::Missing
        );

        store
            .put_challenge(&EmailMfaChallenge {
                user_id,
                code_hash: vec![7],
                expires_at: now + Duration::minutes(10),
                attempts: 0,
            })
            .await?;
        for expected in 1..=2 {
            assert_eq!(
                store.claim_attempt(user_id, 2, now).await?,
                AttemptClaim::Claimed {
                    code_hash: vec![7],
                    attempts: expected
                }
            );
        }
        assert_eq!(
            store.claim_attempt(user_id, 2, now).await?,
            AttemptClaim::Exhausted
        );
        assert_eq!(
            store
                .claim_attempt(user_id, 5, now + Duration::minutes(11))
                .await?,
            AttemptClaim::Expired
        );
        Ok(())
    }

    #[tokio::test]
    async fn status_write_budget_fails_later_writes() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store.insert_profile(Profile::new(user_id, "a@example.com", None));
        store.limit_status_writes(1);

        assert!(
            store
                .set_profile_status(user_id, AccountStatus::Inactive)
                .await?
        );
        assert!(store
            .set_profile_status(user_id, AccountStatus::Active)
            .await
            .is_err());
        assert_eq!(store.profile_status(user_id), Some(AccountStatus::Inactive));
        Ok(())
    }

    #[tokio::test]
    async fn delete_user_records_removes_everything() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store.insert_profile(Profile::new(user_id, "a@example.com", None));
        store.set_role(user_id, Role::WorkforceUser);
        store.mark_materials_complete(user_id).await?;

        store.delete_user_records(user_id).await?;
        assert!(store.profile(user_id).await?.is_none());
        assert!(store.role(user_id).await?.is_none());
        assert!(!store.materials_complete(user_id).await?);
        Ok(())
    }
}
