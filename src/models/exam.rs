// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Lifecycle status of an exam. Only `Active` exams admit attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    Draft,
    Active,
    Inactive,
}

impl ExamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamStatus::Draft => "draft",
            ExamStatus::Active => "active",
            ExamStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for ExamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ExamStatus::Draft),
            "active" => Ok(ExamStatus::Active),
            "inactive" => Ok(ExamStatus::Inactive),
            other => Err(format!("Unknown exam status '{}'", other)),
        }
    }
}

/// Represents the 'exams' table: a concrete, assembled exam.
///
/// Invariant: the sum of the owned exam questions' `assigned_points`
/// equals `total_points` exactly, from assembly onward.
#[derive(Debug, Clone, Serialize)]
pub struct Exam {
    pub id: i64,
    pub teacher_id: i64,

    /// The matrix this exam was assembled from, when it was.
    pub matrix_id: Option<i64>,
    pub title: String,
    pub status: ExamStatus,

    /// Argon2 hash of the access password; None means no password gate.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    pub duration_minutes: i32,
    pub total_points: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'exam_questions' table: one drawn question with its
/// assigned points, ordered by `order_index`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub exam_id: i64,
    pub question_id: i64,
    pub assigned_points: i32,
    pub order_index: i32,
}

/// DTO for assembling an exam from a matrix.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    pub matrix_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: i32,
    #[validate(length(min = 4, max = 64))]
    pub password: Option<String>,

    /// Overrides per-item points: the total is distributed evenly over the
    /// drawn questions.
    #[validate(range(min = 1))]
    pub total_points: Option<i32>,
}

/// DTO for a non-persisting assembly preview.
#[derive(Debug, Deserialize, Validate)]
pub struct PreviewExamRequest {
    pub matrix_id: i64,
    #[validate(range(min = 1))]
    pub total_points: Option<i32>,
}

/// DTO for moving an exam between draft/active/inactive.
#[derive(Debug, Deserialize)]
pub struct UpdateExamStatusRequest {
    pub status: ExamStatus,
}

/// DTO for probing exam access without starting an attempt.
#[derive(Debug, Deserialize)]
pub struct AccessCheckRequest {
    pub password: Option<String>,
}
