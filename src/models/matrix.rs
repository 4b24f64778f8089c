// src/models/matrix.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'exam_matrices' table.
///
/// A matrix is a declarative recipe for exam composition: how many
/// questions of which domain/difficulty to draw from which banks. It never
/// references concrete question instances.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamMatrix {
    pub id: i64,
    pub teacher_id: i64,
    pub name: String,

    /// Declared target totals. Soft: the validator reports mismatches
    /// against the items, it does not reject them.
    pub total_questions: Option<i32>,
    pub total_points: Option<i32>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'exam_matrix_items' table. Items are ordered by
/// `position` and processed in that order during assembly.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamMatrixItem {
    pub id: i64,
    pub matrix_id: i64,
    pub question_bank_id: i64,

    /// None means "any domain in the bank"; same for difficulty.
    pub domain: Option<String>,
    pub difficulty: Option<i16>,

    pub question_count: i32,
    pub points_per_question: Option<i32>,
    pub position: i32,
}

/// DTO for creating a matrix.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMatrixRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 1))]
    pub total_questions: Option<i32>,
    #[validate(range(min = 1))]
    pub total_points: Option<i32>,
}

/// DTO for updating a matrix. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateMatrixRequest {
    pub name: Option<String>,
    pub total_questions: Option<i32>,
    pub total_points: Option<i32>,
}

/// DTO for adding an item to a matrix.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMatrixItemRequest {
    pub question_bank_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub domain: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub difficulty: Option<i16>,
    #[validate(range(min = 1))]
    pub question_count: i32,
    #[validate(range(min = 1))]
    pub points_per_question: Option<i32>,
}

/// DTO for updating an item. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateMatrixItemRequest {
    pub domain: Option<String>,
    pub difficulty: Option<i16>,
    pub question_count: Option<i32>,
    pub points_per_question: Option<i32>,
}
