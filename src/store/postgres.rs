// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::engine::supply::SupplyFilter;
use crate::error::AppError;
use crate::models::attempt::{Answer, AnswerPayload, Attempt, AttemptStatus};
use crate::models::exam::{Exam, ExamQuestion, ExamStatus};
use crate::models::matrix::{
    CreateMatrixItemRequest, CreateMatrixRequest, ExamMatrix, ExamMatrixItem,
    UpdateMatrixItemRequest, UpdateMatrixRequest,
};
use crate::models::question::{Question, QuestionBlank, QuestionOption};

use super::{NewExam, NewExamQuestion, SaveOutcome, Store};

/// sqlx-backed store. Writes that must be atomic (exam commit, guarded
/// answer upserts) run in short transactions; terminal attempt transitions
/// are single conditional UPDATEs.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    bank_id: i64,
    question_type: String,
    content: String,
    domain: String,
    difficulty: i16,
    active: bool,
    options: Json<Vec<QuestionOption>>,
    blanks: Json<Vec<QuestionBlank>>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, AppError> {
        Ok(Question {
            id: row.id,
            bank_id: row.bank_id,
            question_type: row
                .question_type
                .parse()
                .map_err(AppError::InternalServerError)?,
            content: row.content,
            domain: row.domain,
            difficulty: row.difficulty,
            active: row.active,
            options: row.options.0,
            blanks: row.blanks.0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExamRow {
    id: i64,
    teacher_id: i64,
    matrix_id: Option<i64>,
    title: String,
    status: String,
    password_hash: Option<String>,
    duration_minutes: i32,
    total_points: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExamRow> for Exam {
    type Error = AppError;

    fn try_from(row: ExamRow) -> Result<Self, AppError> {
        Ok(Exam {
            id: row.id,
            teacher_id: row.teacher_id,
            matrix_id: row.matrix_id,
            title: row.title,
            status: row.status.parse().map_err(AppError::InternalServerError)?,
            password_hash: row.password_hash,
            duration_minutes: row.duration_minutes,
            total_points: row.total_points,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: i64,
    exam_id: i64,
    student_id: i64,
    status: String,
    started_at: DateTime<Utc>,
    deadline_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    score_percentage: Option<f64>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, AppError> {
        Ok(Attempt {
            id: row.id,
            exam_id: row.exam_id,
            student_id: row.student_id,
            status: row.status.parse().map_err(AppError::InternalServerError)?,
            started_at: row.started_at,
            deadline_at: row.deadline_at,
            submitted_at: row.submitted_at,
            score_percentage: row.score_percentage,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AnswerRow {
    attempt_id: i64,
    question_id: i64,
    response: Json<AnswerPayload>,
    saved_at: DateTime<Utc>,
}

const ATTEMPT_COLUMNS: &str =
    "id, exam_id, student_id, status, started_at, deadline_at, submitted_at, score_percentage";

const EXAM_COLUMNS: &str =
    "id, teacher_id, matrix_id, title, status, password_hash, duration_minutes, total_points, created_at";

fn internal(context: &str, err: sqlx::Error) -> AppError {
    tracing::error!("{}: {:?}", context, err);
    AppError::InternalServerError(err.to_string())
}

/// Builds `SELECT <select> FROM questions ... WHERE ...` for a supply
/// filter. Eligibility requires both the question and its bank to be
/// active when `active_only` is set.
fn supply_query<'a>(select: &str, filter: &'a SupplyFilter) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(select);
    builder
        .push(" FROM questions q JOIN question_banks b ON q.bank_id = b.id WHERE q.bank_id = ")
        .push_bind(filter.question_bank_id);
    if let Some(domain) = filter.domain.as_deref() {
        builder.push(" AND q.domain = ").push_bind(domain);
    }
    if let Some(difficulty) = filter.difficulty {
        builder.push(" AND q.difficulty = ").push_bind(difficulty);
    }
    if filter.active_only {
        builder.push(" AND q.active AND b.status = 'active'");
    }
    builder
}

#[async_trait]
impl Store for PgStore {
    async fn count_eligible_questions(&self, filter: &SupplyFilter) -> Result<i64, AppError> {
        let mut builder = supply_query("SELECT COUNT(*)", filter);
        builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| internal("Failed to count eligible questions", e))
    }

    async fn eligible_question_ids(&self, filter: &SupplyFilter) -> Result<Vec<i64>, AppError> {
        let mut builder = supply_query("SELECT q.id", filter);
        builder.push(" ORDER BY q.id");
        builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| internal("Failed to list eligible questions", e))
    }

    async fn fetch_questions(&self, ids: &[i64]) -> Result<Vec<Question>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::new(
            "SELECT id, bank_id, question_type, content, domain, difficulty, active, options, blanks
             FROM questions WHERE id IN (",
        );
        let mut separated = builder.separated(",");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<QuestionRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| internal("Failed to fetch questions", e))?;

        rows.into_iter().map(Question::try_from).collect()
    }

    async fn insert_matrix(
        &self,
        teacher_id: i64,
        req: &CreateMatrixRequest,
    ) -> Result<ExamMatrix, AppError> {
        sqlx::query_as(
            "INSERT INTO exam_matrices (teacher_id, name, total_questions, total_points)
             VALUES ($1, $2, $3, $4)
             RETURNING id, teacher_id, name, total_questions, total_points, created_at",
        )
        .bind(teacher_id)
        .bind(&req.name)
        .bind(req.total_questions)
        .bind(req.total_points)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| internal("Failed to create matrix", e))
    }

    async fn get_matrix(&self, id: i64) -> Result<Option<ExamMatrix>, AppError> {
        sqlx::query_as(
            "SELECT id, teacher_id, name, total_questions, total_points, created_at
             FROM exam_matrices WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| internal("Failed to fetch matrix", e))
    }

    async fn list_matrices(&self, teacher_id: i64) -> Result<Vec<ExamMatrix>, AppError> {
        sqlx::query_as(
            "SELECT id, teacher_id, name, total_questions, total_points, created_at
             FROM exam_matrices WHERE teacher_id = $1 ORDER BY id DESC",
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| internal("Failed to list matrices", e))
    }

    async fn update_matrix(&self, id: i64, req: &UpdateMatrixRequest) -> Result<bool, AppError> {
        if req.name.is_none() && req.total_questions.is_none() && req.total_points.is_none() {
            return Ok(true);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE exam_matrices SET ");
        let mut separated = builder.separated(", ");

        if let Some(name) = req.name.as_deref() {
            separated.push("name = ");
            separated.push_bind_unseparated(name);
        }
        if let Some(total_questions) = req.total_questions {
            separated.push("total_questions = ");
            separated.push_bind_unseparated(total_questions);
        }
        if let Some(total_points) = req.total_points {
            separated.push("total_points = ");
            separated.push_bind_unseparated(total_points);
        }

        builder.push(" WHERE id = ").push_bind(id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| internal("Failed to update matrix", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_matrix(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM exam_matrices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| internal("Failed to delete matrix", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_matrix_item(
        &self,
        matrix_id: i64,
        req: &CreateMatrixItemRequest,
    ) -> Result<ExamMatrixItem, AppError> {
        sqlx::query_as(
            "INSERT INTO exam_matrix_items
             (matrix_id, question_bank_id, domain, difficulty, question_count, points_per_question, position)
             VALUES ($1, $2, $3, $4, $5, $6,
                     (SELECT COALESCE(MAX(position) + 1, 0) FROM exam_matrix_items WHERE matrix_id = $1))
             RETURNING id, matrix_id, question_bank_id, domain, difficulty, question_count, points_per_question, position",
        )
        .bind(matrix_id)
        .bind(req.question_bank_id)
        .bind(req.domain.as_deref())
        .bind(req.difficulty)
        .bind(req.question_count)
        .bind(req.points_per_question)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| internal("Failed to add matrix item", e))
    }

    async fn update_matrix_item(
        &self,
        matrix_id: i64,
        item_id: i64,
        req: &UpdateMatrixItemRequest,
    ) -> Result<bool, AppError> {
        if req.domain.is_none()
            && req.difficulty.is_none()
            && req.question_count.is_none()
            && req.points_per_question.is_none()
        {
            return Ok(true);
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE exam_matrix_items SET ");
        let mut separated = builder.separated(", ");

        if let Some(domain) = req.domain.as_deref() {
            separated.push("domain = ");
            separated.push_bind_unseparated(domain);
        }
        if let Some(difficulty) = req.difficulty {
            separated.push("difficulty = ");
            separated.push_bind_unseparated(difficulty);
        }
        if let Some(question_count) = req.question_count {
            separated.push("question_count = ");
            separated.push_bind_unseparated(question_count);
        }
        if let Some(points_per_question) = req.points_per_question {
            separated.push("points_per_question = ");
            separated.push_bind_unseparated(points_per_question);
        }

        builder.push(" WHERE id = ").push_bind(item_id);
        builder.push(" AND matrix_id = ").push_bind(matrix_id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| internal("Failed to update matrix item", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_matrix_item(&self, matrix_id: i64, item_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM exam_matrix_items WHERE id = $1 AND matrix_id = $2")
            .bind(item_id)
            .bind(matrix_id)
            .execute(&self.pool)
            .await
            .map_err(|e| internal("Failed to delete matrix item", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_matrix_items(&self, matrix_id: i64) -> Result<Vec<ExamMatrixItem>, AppError> {
        sqlx::query_as(
            "SELECT id, matrix_id, question_bank_id, domain, difficulty, question_count, points_per_question, position
             FROM exam_matrix_items WHERE matrix_id = $1 ORDER BY position, id",
        )
        .bind(matrix_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| internal("Failed to list matrix items", e))
    }

    async fn insert_exam(
        &self,
        exam: &NewExam,
        questions: &[NewExamQuestion],
    ) -> Result<Exam, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| internal("Failed to open transaction", e))?;

        let row: ExamRow = sqlx::query_as(
            "INSERT INTO exams (teacher_id, matrix_id, title, status, password_hash, duration_minutes, total_points)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, teacher_id, matrix_id, title, status, password_hash, duration_minutes, total_points, created_at",
        )
        .bind(exam.teacher_id)
        .bind(exam.matrix_id)
        .bind(&exam.title)
        .bind(exam.status.as_str())
        .bind(exam.password_hash.as_deref())
        .bind(exam.duration_minutes)
        .bind(exam.total_points)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| internal("Failed to insert exam", e))?;

        for question in questions {
            sqlx::query(
                "INSERT INTO exam_questions (exam_id, question_id, assigned_points, order_index)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(row.id)
            .bind(question.question_id)
            .bind(question.assigned_points)
            .bind(question.order_index)
            .execute(&mut *tx)
            .await
            .map_err(|e| internal("Failed to insert exam question", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| internal("Failed to commit exam", e))?;

        Exam::try_from(row)
    }

    async fn get_exam(&self, id: i64) -> Result<Option<Exam>, AppError> {
        let row: Option<ExamRow> =
            sqlx::query_as(&format!("SELECT {} FROM exams WHERE id = $1", EXAM_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| internal("Failed to fetch exam", e))?;
        row.map(Exam::try_from).transpose()
    }

    async fn list_exam_questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>, AppError> {
        sqlx::query_as(
            "SELECT exam_id, question_id, assigned_points, order_index
             FROM exam_questions WHERE exam_id = $1 ORDER BY order_index",
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| internal("Failed to list exam questions", e))
    }

    async fn update_exam_status(&self, id: i64, status: ExamStatus) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE exams SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| internal("Failed to update exam status", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_in_progress_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM attempts WHERE exam_id = $1 AND student_id = $2 AND status = 'in_progress'",
            ATTEMPT_COLUMNS
        ))
        .bind(exam_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| internal("Failed to fetch open attempt", e))?;
        row.map(Attempt::try_from).transpose()
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM attempts WHERE id = $1",
            ATTEMPT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| internal("Failed to fetch attempt", e))?;
        row.map(Attempt::try_from).transpose()
    }

    async fn create_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
        started_at: DateTime<Utc>,
        deadline_at: DateTime<Utc>,
    ) -> Result<Attempt, AppError> {
        let result: Result<AttemptRow, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO attempts (exam_id, student_id, status, started_at, deadline_at)
             VALUES ($1, $2, 'in_progress', $3, $4)
             RETURNING {}",
            ATTEMPT_COLUMNS
        ))
        .bind(exam_id)
        .bind(student_id)
        .bind(started_at)
        .bind(deadline_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Attempt::try_from(row),
            Err(e) => {
                if e.to_string().contains("unique constraint")
                    || e.to_string().contains("23505")
                    || e.to_string().contains("attempts_single_open")
                {
                    Err(AppError::Conflict(
                        "An attempt is already in progress".to_string(),
                    ))
                } else {
                    Err(internal("Failed to create attempt", e))
                }
            }
        }
    }

    async fn list_attempts_for_exam(&self, exam_id: i64) -> Result<Vec<Attempt>, AppError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM attempts WHERE exam_id = $1 ORDER BY started_at DESC",
            ATTEMPT_COLUMNS
        ))
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| internal("Failed to list attempts", e))?;
        rows.into_iter().map(Attempt::try_from).collect()
    }

    async fn upsert_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        response: &AnswerPayload,
        saved_at: DateTime<Utc>,
    ) -> Result<SaveOutcome, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| internal("Failed to open transaction", e))?;

        // Row lock on the attempt serializes this save against a concurrent
        // submit/expiry finalization of the same attempt.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM attempts WHERE id = $1 FOR UPDATE")
                .bind(attempt_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| internal("Failed to lock attempt", e))?;

        let Some(status) = status else {
            return Err(AppError::NotFound("Attempt not found".to_string()));
        };
        if status != AttemptStatus::InProgress.as_str() {
            return Ok(SaveOutcome::NotInProgress);
        }

        sqlx::query(
            "INSERT INTO answers (attempt_id, question_id, response, saved_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (attempt_id, question_id)
             DO UPDATE SET response = EXCLUDED.response, saved_at = EXCLUDED.saved_at",
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(Json(response))
        .bind(saved_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| internal("Failed to upsert answer", e))?;

        tx.commit()
            .await
            .map_err(|e| internal("Failed to commit answer", e))?;
        Ok(SaveOutcome::Saved)
    }

    async fn list_answers(&self, attempt_id: i64) -> Result<Vec<Answer>, AppError> {
        let rows: Vec<AnswerRow> = sqlx::query_as(
            "SELECT attempt_id, question_id, response, saved_at
             FROM answers WHERE attempt_id = $1",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| internal("Failed to list answers", e))?;

        Ok(rows
            .into_iter()
            .map(|row| Answer {
                attempt_id: row.attempt_id,
                question_id: row.question_id,
                response: row.response.0,
                saved_at: row.saved_at,
            })
            .collect())
    }

    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        to: AttemptStatus,
        score_percentage: f64,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE attempts SET status = $2, score_percentage = $3, submitted_at = $4
             WHERE id = $1 AND status = 'in_progress'",
        )
        .bind(attempt_id)
        .bind(to.as_str())
        .bind(score_percentage)
        .bind(submitted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| internal("Failed to finalize attempt", e))?;
        Ok(result.rows_affected() == 1)
    }
}
