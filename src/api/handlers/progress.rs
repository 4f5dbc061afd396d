//! Learner progression endpoints.
//!
//! Flow Overview:
//! 1) Require a verified session.
//! 2) Recompute progress from the stored records.
//! 3) Serve or grade a quiz only when progress reports it available.
//!
//! The unlock rule is evaluated here as well as in the client so a learner
//! cannot skip ahead by calling the API directly.

use axum::{
    extract::{Extension, Json, Path},
    http::HeaderMap,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::require_verified;
use crate::api::AppState;
use crate::progression::quiz::{Answer, Quiz};
use crate::progression::{self, is_passing, Progress, QuizStatus, QUIZ_COUNT};
use crate::store::{QuizAttempt, WorkforceGroup};
use crate::{Error, Result};

#[derive(Debug, Serialize, ToSchema)]
pub struct QuizProgress {
    pub sequence: u8,
    pub status: QuizStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_score: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressResponse {
    pub materials_complete: bool,
    pub quizzes: Vec<QuizProgress>,
    pub certificate_eligible: bool,
}

impl ProgressResponse {
    fn new(
        materials_complete: bool,
        last_scores: [Option<i32>; QUIZ_COUNT],
        progress: &Progress,
    ) -> Self {
        let quizzes = (1..=QUIZ_COUNT)
            .zip(progress.statuses)
            .zip(last_scores)
            .map(|((sequence, status), last_score)| QuizProgress {
                sequence: u8::try_from(sequence).unwrap_or(u8::MAX),
                status,
                last_score,
            })
            .collect();
        Self {
            materials_complete,
            quizzes,
            certificate_eligible: progress.certificate_eligible,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionView {
    pub id: Uuid,
    pub prompt: String,
    pub choices: Vec<String>,
}

/// A quiz as shown to one learner; correct answers are never included.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizView {
    pub sequence: u8,
    pub title: String,
    pub status: QuizStatus,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AttemptRequest {
    pub answers: Vec<Answer>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttemptResponse {
    pub sequence: u8,
    pub score: i32,
    pub passed: bool,
    pub progress: ProgressResponse,
}

struct Snapshot {
    materials_complete: bool,
    last_scores: [Option<i32>; QUIZ_COUNT],
    progress: Progress,
}

impl Snapshot {
    fn response(&self) -> ProgressResponse {
        ProgressResponse::new(self.materials_complete, self.last_scores, &self.progress)
    }
}

async fn snapshot(state: &AppState, user_id: Uuid) -> Result<Snapshot> {
    let materials_complete = state.store().materials_complete(user_id).await?;
    let last_scores = state.store().last_scores(user_id).await?;
    Ok(Snapshot {
        materials_complete,
        last_scores,
        progress: progression::evaluate(materials_complete, last_scores),
    })
}

async fn workforce_groups(state: &AppState, user_id: Uuid) -> Result<Vec<WorkforceGroup>> {
    Ok(state
        .store()
        .profile(user_id)
        .await?
        .map(|profile| profile.workforce_groups)
        .unwrap_or_default())
}

/// Load quiz `sequence` if the learner may open it.
async fn available_quiz(state: &AppState, user_id: Uuid, sequence: u8) -> Result<(Quiz, QuizStatus)> {
    let snapshot = snapshot(state, user_id).await?;
    let status = snapshot
        .progress
        .status(sequence)
        .ok_or_else(|| Error::NotFound(format!("quiz {sequence} does not exist")))?;
    if !status.is_available() {
        warn!(%user_id, sequence, "locked quiz requested");
        return Err(Error::Forbidden(format!("quiz {sequence} is locked")));
    }
    let quiz = state
        .store()
        .quiz(sequence)
        .await?
        .ok_or_else(|| Error::NotFound(format!("quiz {sequence} has no content")))?;
    Ok((quiz, status))
}

#[utoipa::path(
    get,
    path = "/v1/progress",
    responses(
        (status = 200, description = "Quiz statuses and certificate eligibility.", body = ProgressResponse),
        (status = 401, description = "Missing or invalid bearer token.", body = crate::api::error::ErrorBody),
        (status = 403, description = "Second factor not verified.", body = crate::api::error::ErrorBody),
    ),
    tag = "progress"
)]
pub async fn progress(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProgressResponse>> {
    let session = require_verified(&headers, &state).await?;
    let snapshot = snapshot(&state, session.user_id()).await?;
    Ok(Json(snapshot.response()))
}

#[utoipa::path(
    post,
    path = "/v1/training/complete",
    responses(
        (status = 200, description = "Materials marked complete; quiz 1 unlocked.", body = ProgressResponse),
        (status = 401, description = "Missing or invalid bearer token.", body = crate::api::error::ErrorBody),
        (status = 403, description = "Second factor not verified.", body = crate::api::error::ErrorBody),
    ),
    tag = "progress"
)]
pub async fn complete_training(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProgressResponse>> {
    let session = require_verified(&headers, &state).await?;
    state
        .store()
        .mark_materials_complete(session.user_id())
        .await?;
    info!(user_id = %session.user_id(), "training materials completed");
    let snapshot = snapshot(&state, session.user_id()).await?;
    Ok(Json(snapshot.response()))
}

#[utoipa::path(
    get,
    path = "/v1/quizzes/{sequence}",
    params(("sequence" = u8, Path, description = "Quiz number, 1 to 3")),
    responses(
        (status = 200, description = "Questions that apply to the learner.", body = QuizView),
        (status = 403, description = "Quiz locked or second factor not verified.", body = crate::api::error::ErrorBody),
        (status = 404, description = "No such quiz.", body = crate::api::error::ErrorBody),
    ),
    tag = "progress"
)]
pub async fn quiz(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(sequence): Path<u8>,
) -> Result<Json<QuizView>> {
    let session = require_verified(&headers, &state).await?;
    let (quiz, status) = available_quiz(&state, session.user_id(), sequence).await?;
    let groups = workforce_groups(&state, session.user_id()).await?;

    let questions = quiz
        .questions_for(&groups)
        .into_iter()
        .map(|question| QuestionView {
            id: question.id,
            prompt: question.prompt.clone(),
            choices: question.choices.clone(),
        })
        .collect();

    Ok(Json(QuizView {
        sequence: quiz.sequence,
        title: quiz.title,
        status,
        questions,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/quizzes/{sequence}/attempts",
    params(("sequence" = u8, Path, description = "Quiz number, 1 to 3")),
    request_body = AttemptRequest,
    responses(
        (status = 200, description = "Attempt graded and recorded.", body = AttemptResponse),
        (status = 403, description = "Quiz locked or second factor not verified.", body = crate::api::error::ErrorBody),
        (status = 404, description = "No such quiz.", body = crate::api::error::ErrorBody),
    ),
    tag = "progress"
)]
pub async fn submit_attempt(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(sequence): Path<u8>,
    Json(request): Json<AttemptRequest>,
) -> Result<Json<AttemptResponse>> {
    let session = require_verified(&headers, &state).await?;
    let user_id = session.user_id();
    let (quiz, _) = available_quiz(&state, user_id, sequence).await?;
    let groups = workforce_groups(&state, user_id).await?;

    let score = quiz.score(&groups, &request.answers);
    state
        .store()
        .record_attempt(&QuizAttempt {
            user_id,
            sequence,
            score,
            attempted_at: Utc::now(),
        })
        .await?;
    let passed = is_passing(score);
    info!(%user_id, sequence, score, passed, "quiz attempt recorded");

    let snapshot = snapshot(&state, user_id).await?;
    Ok(Json(AttemptResponse {
        sequence,
        score,
        passed,
        progress: snapshot.response(),
    }))
}
