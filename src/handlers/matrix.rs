// src/handlers/matrix.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::{supply::SupplyIndex, validate::validate_matrix},
    error::AppError,
    models::matrix::{
        CreateMatrixItemRequest, CreateMatrixRequest, ExamMatrix, UpdateMatrixItemRequest,
        UpdateMatrixRequest,
    },
    state::AppState,
    utils::jwt::Claims,
};

/// Loads a matrix and checks it belongs to the calling teacher.
async fn owned_matrix(
    state: &AppState,
    claims: &Claims,
    matrix_id: i64,
) -> Result<ExamMatrix, AppError> {
    let teacher_id = claims.user_id()?;
    let matrix = state
        .store
        .get_matrix(matrix_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Matrix not found".to_string()))?;
    if matrix.teacher_id != teacher_id {
        return Err(AppError::Forbidden(
            "Matrix belongs to another teacher".to_string(),
        ));
    }
    Ok(matrix)
}

/// Creates an exam matrix owned by the calling teacher.
pub async fn create_matrix(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateMatrixRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let teacher_id = claims.user_id()?;
    let matrix = state.store.insert_matrix(teacher_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(matrix)))
}

/// Lists the calling teacher's matrices.
pub async fn list_matrices(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.user_id()?;
    let matrices = state.store.list_matrices(teacher_id).await?;
    Ok(Json(matrices))
}

/// Returns one matrix with its items.
pub async fn get_matrix(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let matrix = owned_matrix(&state, &claims, id).await?;
    let items = state.store.list_matrix_items(id).await?;
    Ok(Json(serde_json::json!({
        "matrix": matrix,
        "items": items,
    })))
}

/// Updates matrix fields. Fields absent from the payload are untouched.
pub async fn update_matrix(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateMatrixRequest>,
) -> Result<impl IntoResponse, AppError> {
    owned_matrix(&state, &claims, id).await?;

    if !state.store.update_matrix(id, &payload).await? {
        return Err(AppError::NotFound("Matrix not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a matrix and its items. Exams already assembled from it keep
/// their drawn questions.
pub async fn delete_matrix(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    owned_matrix(&state, &claims, id).await?;

    if !state.store.delete_matrix(id).await? {
        return Err(AppError::NotFound("Matrix not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Appends an item to a matrix.
pub async fn add_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateMatrixItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    owned_matrix(&state, &claims, id).await?;
    let item = state.store.insert_matrix_item(id, &payload).await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// Updates a matrix item. Fields absent from the payload are untouched.
pub async fn update_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, item_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateMatrixItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    owned_matrix(&state, &claims, id).await?;

    if !state.store.update_matrix_item(id, item_id, &payload).await? {
        return Err(AppError::NotFound("Matrix item not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Removes an item from a matrix.
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, item_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    owned_matrix(&state, &claims, id).await?;

    if !state.store.delete_matrix_item(id, item_id).await? {
        return Err(AppError::NotFound("Matrix item not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Runs the matrix validator against live question supply.
///
/// Count/point mismatches come back as advisory violations; only a supply
/// shortfall makes the report invalid.
pub async fn validation_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let matrix = owned_matrix(&state, &claims, id).await?;
    let items = state.store.list_matrix_items(id).await?;

    let supply = SupplyIndex::new(state.store.as_ref());
    let report = validate_matrix(&supply, &matrix, &items).await?;

    Ok(Json(report))
}
