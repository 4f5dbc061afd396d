//! Postgres store.
//!
//! Every statement runs inside a `db.query` span carrying the SQL text, so
//! traces show which query a slow request spent its time in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{Instrument, Span};
use uuid::Uuid;

use super::{
    AccountStatus, AttemptClaim, AuditEntry, AuditLog, EmailMfaChallenge, EmailMfaStore, MfaMethod,
    OrganizationStore, Profile, ProfileStore, ProgressStore, QuizAttempt, RoleStore, StoreError,
    Subscription, WorkforceGroup,
};
use crate::authz::Role;
use crate::progression::{
    quiz::{Question, Quiz},
    QUIZ_COUNT,
};

fn db_span(operation: &'static str, statement: &'static str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn profile_from_row(row: &PgRow) -> Result<Profile, StoreError> {
    let status: String = row.try_get("status")?;
    let status = AccountStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown profile status: {status}")))?;
    let mfa_method: Option<String> = row.try_get("mfa_method")?;
    let groups: Vec<String> = row.try_get("workforce_groups")?;
    Ok(Profile {
        user_id: row.try_get("user_id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        organization_id: row.try_get("organization_id")?,
        workforce_groups: WorkforceGroup::parse_all(&groups),
        mfa_method: mfa_method.as_deref().map_or(MfaMethod::None, MfaMethod::parse),
        mfa_enabled: row.try_get("mfa_enabled")?,
        status,
    })
}

fn question_from_row(row: &PgRow) -> Result<Question, StoreError> {
    let correct: i32 = row.try_get("correct_choice")?;
    let correct_choice = usize::try_from(correct)
        .map_err(|_| StoreError::Corrupt(format!("negative correct_choice: {correct}")))?;
    let groups: Vec<String> = row.try_get("workforce_groups")?;
    Ok(Question {
        id: row.try_get("id")?,
        prompt: row.try_get("prompt")?,
        choices: row.try_get("choices")?,
        correct_choice,
        workforce_groups: WorkforceGroup::parse_all(&groups),
    })
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        let query = r"
            SELECT user_id, full_name, email, organization_id, workforce_groups,
                   mfa_method, mfa_enabled, status
            FROM profiles
            WHERE user_id = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn set_profile_status(
        &self,
        user_id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE profiles
            SET status = $2, updated_at = NOW()
            WHERE user_id = $1
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_mfa_preference(
        &self,
        user_id: Uuid,
        method: MfaMethod,
        enabled: bool,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE profiles
            SET mfa_method = $2, mfa_enabled = $3, updated_at = NOW()
            WHERE user_id = $1
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(method.as_str())
            .bind(enabled)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_active_profiles(&self, organization_id: Uuid) -> Result<i64, StoreError> {
        let query = r"
            SELECT COUNT(*) AS count
            FROM profiles
            WHERE organization_id = $1 AND status = 'active'
        ";
        let row = sqlx::query(query)
            .bind(organization_id)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(row.try_get("count")?)
    }

    async fn delete_user_records(&self, user_id: Uuid) -> Result<(), StoreError> {
        const STATEMENTS: [&str; 6] = [
            "DELETE FROM email_mfa_sessions WHERE user_id = $1",
            "DELETE FROM email_mfa_challenges WHERE user_id = $1",
            "DELETE FROM quiz_attempts WHERE user_id = $1",
            "DELETE FROM training_progress WHERE user_id = $1",
            "DELETE FROM user_roles WHERE user_id = $1",
            "DELETE FROM profiles WHERE user_id = $1",
        ];
        let mut tx = self.pool.begin().await?;
        for statement in STATEMENTS {
            sqlx::query(statement)
                .bind(user_id)
                .execute(&mut *tx)
                .instrument(db_span("DELETE", statement))
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RoleStore for PgStore {
    async fn role(&self, user_id: Uuid) -> Result<Option<Role>, StoreError> {
        let query = "SELECT role FROM user_roles WHERE user_id = $1 LIMIT 1";
        let role: Option<String> = sqlx::query_scalar(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(role.as_deref().and_then(Role::parse))
    }
}

#[async_trait]
impl OrganizationStore for PgStore {
    async fn subscription(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        let query = r"
            SELECT tier, users_limit
            FROM subscriptions
            WHERE organization_id = $1
            ORDER BY created_at DESC
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.map(|row| -> Result<Subscription, StoreError> {
            let users_limit: i32 = row.try_get("users_limit")?;
            Ok(Subscription {
                organization_id,
                tier: row.try_get("tier")?,
                users_limit: i64::from(users_limit),
            })
        })
        .transpose()
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn materials_complete(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let query = r"
            SELECT materials_completed_at IS NOT NULL AS complete
            FROM training_progress
            WHERE user_id = $1
        ";
        let complete: Option<bool> = sqlx::query_scalar(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(complete.unwrap_or(false))
    }

    async fn mark_materials_complete(&self, user_id: Uuid) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO training_progress (user_id, materials_completed_at)
            VALUES ($1, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET materials_completed_at =
                COALESCE(training_progress.materials_completed_at, EXCLUDED.materials_completed_at)
        ";
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn last_scores(&self, user_id: Uuid) -> Result<[Option<i32>; QUIZ_COUNT], StoreError> {
        let query = r"
            SELECT DISTINCT ON (quiz_sequence) quiz_sequence, score
            FROM quiz_attempts
            WHERE user_id = $1
            ORDER BY quiz_sequence, attempted_at DESC
        ";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;

        let mut scores = [None; QUIZ_COUNT];
        for row in rows {
            let sequence: i16 = row.try_get("quiz_sequence")?;
            let slot = usize::try_from(sequence)
                .ok()
                .and_then(|sequence| sequence.checked_sub(1))
                .and_then(|index| scores.get_mut(index));
            if let Some(slot) = slot {
                *slot = Some(row.try_get("score")?);
            }
        }
        Ok(scores)
    }

    async fn record_attempt(&self, attempt: &QuizAttempt) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO quiz_attempts (id, user_id, quiz_sequence, score, attempted_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(attempt.user_id)
            .bind(i16::from(attempt.sequence))
            .bind(attempt.score)
            .bind(attempt.attempted_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn quiz(&self, sequence: u8) -> Result<Option<Quiz>, StoreError> {
        let quiz_query = r"
            SELECT sequence, title, workforce_groups
            FROM quizzes
            WHERE sequence = $1
        ";
        let Some(row) = sqlx::query(quiz_query)
            .bind(i16::from(sequence))
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", quiz_query))
            .await?
        else {
            return Ok(None);
        };
        let groups: Vec<String> = row.try_get("workforce_groups")?;

        let questions_query = r"
            SELECT id, prompt, choices, correct_choice, workforce_groups
            FROM quiz_questions
            WHERE quiz_sequence = $1
            ORDER BY position
        ";
        let rows = sqlx::query(questions_query)
            .bind(i16::from(sequence))
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", questions_query))
            .await?;
        let questions = rows
            .iter()
            .map(question_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Quiz {
            sequence,
            title: row.try_get("title")?,
            workforce_groups: WorkforceGroup::parse_all(&groups),
            questions,
        }))
    }
}

#[async_trait]
impl AuditLog for PgStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO audit_logs
                (id, actor_id, organization_id, action, target_type, target_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        sqlx::query(query)
            .bind(entry.id)
            .bind(entry.actor_id)
            .bind(entry.organization_id)
            .bind(entry.action.as_str())
            .bind(&entry.target_type)
            .bind(&entry.target_id)
            .bind(&entry.metadata)
            .bind(entry.created_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EmailMfaStore for PgStore {
    async fn put_challenge(&self, challenge: &EmailMfaChallenge) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO email_mfa_challenges (user_id, code_hash, expires_at, attempts)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET code_hash = EXCLUDED.code_hash,
                expires_at = EXCLUDED.expires_at,
                attempts = EXCLUDED.attempts,
                created_at = NOW()
        ";
        sqlx::query(query)
            .bind(challenge.user_id)
            .bind(&challenge.code_hash)
            .bind(challenge.expires_at)
            .bind(challenge.attempts)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn challenge(&self, user_id: Uuid) -> Result<Option<EmailMfaChallenge>, StoreError> {
        let query = r"
            SELECT user_id, code_hash, expires_at, attempts
            FROM email_mfa_challenges
            WHERE user_id = $1
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.map(|row| -> Result<EmailMfaChallenge, StoreError> {
            Ok(EmailMfaChallenge {
                user_id: row.try_get("user_id")?,
                code_hash: row.try_get("code_hash")?,
                expires_at: row.try_get("expires_at")?,
                attempts: row.try_get("attempts")?,
            })
        })
        .transpose()
    }

    async fn claim_attempt(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<AttemptClaim, StoreError> {
        let query = r"
            UPDATE email_mfa_challenges
            SET attempts = attempts + 1
            WHERE user_id = $1 AND attempts < $2 AND expires_at > $3
            RETURNING code_hash, attempts
        ";
        let claimed = sqlx::query(query)
            .bind(user_id)
            .bind(max_attempts)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        if let Some(row) = claimed {
            return Ok(AttemptClaim::Claimed {
                code_hash: row.try_get("code_hash")?,
                attempts: row.try_get("attempts")?,
            });
        }

        // Nothing was counted; report why.
        let query = "SELECT expires_at FROM email_mfa_challenges WHERE user_id = $1";
        let expires_at: Option<DateTime<Utc>> = sqlx::query_scalar(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(match expires_at {
            None => AttemptClaim::Missing,
            Some(expires_at) if expires_at <= now => AttemptClaim::Expired,
            Some(_) => AttemptClaim::Exhausted,
        })
    }

    async fn clear_challenge(&self, user_id: Uuid) -> Result<(), StoreError> {
        let query = "DELETE FROM email_mfa_challenges WHERE user_id = $1";
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(())
    }

    async fn mark_verified(&self, user_id: Uuid, until: DateTime<Utc>) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO email_mfa_sessions (user_id, verified_until)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET verified_until = EXCLUDED.verified_until
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(until)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn verified_until(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
        let query = "SELECT verified_until FROM email_mfa_sessions WHERE user_id = $1";
        let until: Option<DateTime<Utc>> = sqlx::query_scalar(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(until)
    }
}
