// src/store/mod.rs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::engine::supply::SupplyFilter;
use crate::error::AppError;
use crate::models::attempt::{Answer, AnswerPayload, Attempt, AttemptStatus};
use crate::models::exam::{Exam, ExamQuestion, ExamStatus};
use crate::models::matrix::{
    CreateMatrixItemRequest, CreateMatrixRequest, ExamMatrix, ExamMatrixItem,
    UpdateMatrixItemRequest, UpdateMatrixRequest,
};
use crate::models::question::Question;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A new exam row, produced by the assembler.
#[derive(Debug, Clone)]
pub struct NewExam {
    pub teacher_id: i64,
    pub matrix_id: Option<i64>,
    pub title: String,
    pub status: ExamStatus,
    pub password_hash: Option<String>,
    pub duration_minutes: i32,
    pub total_points: i32,
}

#[derive(Debug, Clone)]
pub struct NewExamQuestion {
    pub question_id: i64,
    pub assigned_points: i32,
    pub order_index: i32,
}

/// Result of a status-guarded answer upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The owning attempt is no longer in progress; nothing was written.
    NotInProgress,
}

/// Persistence seam for the engine.
///
/// `PgStore` implements it against PostgreSQL; `MemoryStore` backs the test
/// suite. Implementations must uphold two atomicity contracts: at most one
/// in-progress attempt per (exam, student) survives concurrent creates, and
/// `finalize_attempt`/`upsert_answer` are conditional on the attempt still
/// being in progress (no lost updates between racing requests).
#[async_trait]
pub trait Store: Send + Sync {
    // question supply (read-only; authoring lives elsewhere)

    async fn count_eligible_questions(&self, filter: &SupplyFilter) -> Result<i64, AppError>;

    async fn eligible_question_ids(&self, filter: &SupplyFilter) -> Result<Vec<i64>, AppError>;

    /// Fetches full questions (answer keys included) by id. Missing ids are
    /// silently absent from the result.
    async fn fetch_questions(&self, ids: &[i64]) -> Result<Vec<Question>, AppError>;

    // matrices

    async fn insert_matrix(
        &self,
        teacher_id: i64,
        req: &CreateMatrixRequest,
    ) -> Result<ExamMatrix, AppError>;

    async fn get_matrix(&self, id: i64) -> Result<Option<ExamMatrix>, AppError>;

    async fn list_matrices(&self, teacher_id: i64) -> Result<Vec<ExamMatrix>, AppError>;

    /// Returns false when the matrix does not exist.
    async fn update_matrix(&self, id: i64, req: &UpdateMatrixRequest) -> Result<bool, AppError>;

    async fn delete_matrix(&self, id: i64) -> Result<bool, AppError>;

    async fn insert_matrix_item(
        &self,
        matrix_id: i64,
        req: &CreateMatrixItemRequest,
    ) -> Result<ExamMatrixItem, AppError>;

    async fn update_matrix_item(
        &self,
        matrix_id: i64,
        item_id: i64,
        req: &UpdateMatrixItemRequest,
    ) -> Result<bool, AppError>;

    async fn delete_matrix_item(&self, matrix_id: i64, item_id: i64) -> Result<bool, AppError>;

    /// Items in declared order (`position`, then id).
    async fn list_matrix_items(&self, matrix_id: i64) -> Result<Vec<ExamMatrixItem>, AppError>;

    // exams

    /// Persists the exam and its question list in one transaction; either
    /// everything lands or nothing does.
    async fn insert_exam(
        &self,
        exam: &NewExam,
        questions: &[NewExamQuestion],
    ) -> Result<Exam, AppError>;

    async fn get_exam(&self, id: i64) -> Result<Option<Exam>, AppError>;

    /// Exam questions ordered by `order_index`.
    async fn list_exam_questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>, AppError>;

    async fn update_exam_status(&self, id: i64, status: ExamStatus) -> Result<bool, AppError>;

    // attempts

    async fn find_in_progress_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<Attempt>, AppError>;

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError>;

    /// Creates an in-progress attempt. Fails with `Conflict` when one
    /// already exists for (exam, student) — concurrent starts race here and
    /// exactly one wins.
    async fn create_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
        started_at: DateTime<Utc>,
        deadline_at: DateTime<Utc>,
    ) -> Result<Attempt, AppError>;

    async fn list_attempts_for_exam(&self, exam_id: i64) -> Result<Vec<Attempt>, AppError>;

    /// Upserts the answer iff the owning attempt is still in progress,
    /// atomically with that check.
    async fn upsert_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        response: &AnswerPayload,
        saved_at: DateTime<Utc>,
    ) -> Result<SaveOutcome, AppError>;

    async fn list_answers(&self, attempt_id: i64) -> Result<Vec<Answer>, AppError>;

    /// Conditional terminal transition: applies iff the attempt is still
    /// `in_progress`. Returns whether this caller won the transition.
    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        to: AttemptStatus,
        score_percentage: f64,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError>;
}
