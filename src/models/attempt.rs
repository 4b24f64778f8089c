// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a student's attempt.
///
/// `InProgress` is the only non-terminal state. Scoring is fully automatic,
/// so submission grades in the same transition; a distinct "submitted but
/// not yet graded" state never persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Graded,
    Expired,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Graded => "graded",
            AttemptStatus::Expired => "expired",
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "graded" => Ok(AttemptStatus::Graded),
            "expired" => Ok(AttemptStatus::Expired),
            other => Err(format!("Unknown attempt status '{}'", other)),
        }
    }
}

/// Represents the 'attempts' table: one student's timed run at one exam.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,

    /// started_at + exam duration. There is no background sweep; expiry is
    /// computed against this on every access.
    pub deadline_at: DateTime<Utc>,

    pub submitted_at: Option<DateTime<Utc>>,
    pub score_percentage: Option<f64>,
}

impl Attempt {
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline_at
    }
}

/// A student's saved answer to one question.
///
/// Stored as a JSON payload so both question types share one row shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerPayload {
    Choice { option_id: i64 },
    Blanks { texts: Vec<String> },
}

/// Represents the 'answers' table, keyed by (attempt, question).
/// Mutable only while the owning attempt is in progress.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub attempt_id: i64,
    pub question_id: i64,
    pub response: AnswerPayload,
    pub saved_at: DateTime<Utc>,
}

/// DTO for starting (or resuming) an attempt.
#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub password: Option<String>,
}

/// DTO for saving one answer.
#[derive(Debug, Deserialize)]
pub struct SaveAnswerRequest {
    pub question_id: i64,
    pub response: AnswerPayload,
}
