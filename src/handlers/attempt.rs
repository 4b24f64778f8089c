// src/handlers/attempt.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    engine::attempt,
    error::AppError,
    models::attempt::{SaveAnswerRequest, StartAttemptRequest},
    state::AppState,
    utils::jwt::Claims,
};

/// Starts (or resumes) the calling student's attempt at an exam.
///
/// Idempotent while an attempt is open: a second call returns the same
/// attempt instead of creating another. The response carries the question
/// list stripped of answer keys plus the deadline for the client countdown.
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let response = attempt::start(
        state.store.as_ref(),
        exam_id,
        student_id,
        payload.password.as_deref(),
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Saves one answer. Safe to retry; the last write wins while the attempt
/// is open.
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((exam_id, attempt_id)): Path<(i64, i64)>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let response = attempt::save_answer(
        state.store.as_ref(),
        exam_id,
        attempt_id,
        student_id,
        payload.question_id,
        &payload.response,
        Utc::now(),
    )
    .await?;

    Ok(Json(response))
}

/// Submits the attempt for automatic grading.
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((exam_id, attempt_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let response = attempt::submit(
        state.store.as_ref(),
        exam_id,
        attempt_id,
        student_id,
        Utc::now(),
    )
    .await?;

    Ok(Json(response))
}

/// Returns the graded (or expired) result with the per-question breakdown.
pub async fn get_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((exam_id, attempt_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let response = attempt::get_result(
        state.store.as_ref(),
        exam_id,
        attempt_id,
        student_id,
        Utc::now(),
    )
    .await?;

    Ok(Json(response))
}
