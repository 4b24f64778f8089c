// src/handlers/exam.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::{
        access,
        assemble::{CommitRequest, assemble_commit, assemble_preview},
    },
    error::AppError,
    models::exam::{
        AccessCheckRequest, CreateExamRequest, Exam, ExamStatus, PreviewExamRequest,
        UpdateExamStatusRequest,
    },
    state::AppState,
    utils::jwt::Claims,
};

/// Loads an exam and checks it belongs to the calling teacher.
async fn owned_exam(state: &AppState, claims: &Claims, exam_id: i64) -> Result<Exam, AppError> {
    let teacher_id = claims.user_id()?;
    let exam = state
        .store
        .get_exam(exam_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;
    if exam.teacher_id != teacher_id {
        return Err(AppError::Forbidden(
            "Exam belongs to another teacher".to_string(),
        ));
    }
    Ok(exam)
}

/// Assembles a concrete exam from a matrix and persists it (status: draft).
///
/// Fails with the violation list when any matrix item outstrips its supply;
/// nothing is persisted in that case.
pub async fn create_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let teacher_id = claims.user_id()?;
    let matrix = state
        .store
        .get_matrix(payload.matrix_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Matrix not found".to_string()))?;
    if matrix.teacher_id != teacher_id {
        return Err(AppError::Forbidden(
            "Matrix belongs to another teacher".to_string(),
        ));
    }

    let items = state.store.list_matrix_items(matrix.id).await?;
    let request = CommitRequest {
        teacher_id,
        title: &payload.title,
        duration_minutes: payload.duration_minutes,
        password: payload.password.as_deref(),
        requested_total_points: payload.total_points,
    };

    let exam = assemble_commit(state.store.as_ref(), &matrix, &items, &request).await?;

    Ok((StatusCode::CREATED, Json(exam)))
}

/// Non-persisting assembly preview: shows the teacher a representative
/// draw with point assignment, without creating an exam.
pub async fn preview_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PreviewExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let teacher_id = claims.user_id()?;
    let matrix = state
        .store
        .get_matrix(payload.matrix_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Matrix not found".to_string()))?;
    if matrix.teacher_id != teacher_id {
        return Err(AppError::Forbidden(
            "Matrix belongs to another teacher".to_string(),
        ));
    }

    let items = state.store.list_matrix_items(matrix.id).await?;
    let preview =
        assemble_preview(state.store.as_ref(), &matrix, &items, payload.total_points).await?;

    Ok(Json(preview))
}

/// Returns one exam with its question/point list (owning teacher only).
pub async fn get_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = owned_exam(&state, &claims, id).await?;
    let questions = state.store.list_exam_questions(id).await?;
    Ok(Json(serde_json::json!({
        "exam": exam,
        "questions": questions,
    })))
}

/// Moves an exam between draft/active/inactive.
///
/// Activation requires at least one question and a positive point total,
/// so a zero-point exam can never reach scoring.
pub async fn update_exam_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateExamStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exam = owned_exam(&state, &claims, id).await?;

    if payload.status == ExamStatus::Active {
        let questions = state.store.list_exam_questions(id).await?;
        if questions.is_empty() || exam.total_points <= 0 {
            return Err(AppError::BadRequest(
                "Cannot activate an exam with no questions or zero total points".to_string(),
            ));
        }
    }

    if !state.store.update_exam_status(id, payload.status).await? {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Results overview for the owning teacher: every attempt with its status
/// and score.
pub async fn list_exam_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    owned_exam(&state, &claims, id).await?;
    let attempts = state.store.list_attempts_for_exam(id).await?;
    Ok(Json(attempts))
}

/// Probes whether the exam would admit an attempt with the supplied
/// password, without starting one. Side-effect free.
pub async fn check_access(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AccessCheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exam = state
        .store
        .get_exam(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;

    let decision = access::check_access(&exam, payload.password.as_deref())?;

    Ok(Json(serde_json::json!({ "decision": decision })))
}
