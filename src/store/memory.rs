// src/store/memory.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

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
use crate::models::question::{BankStatus, Question, QuestionBank};

use super::{NewExam, NewExamQuestion, SaveOutcome, Store};

/// In-memory store backing the test suite.
///
/// One lock held across each operation mirrors the SQL store's atomicity:
/// the open-attempt uniqueness check, the guarded answer upsert and the
/// conditional terminal transition all happen under the same guard.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    banks: HashMap<i64, QuestionBank>,
    questions: HashMap<i64, Question>,
    matrices: HashMap<i64, ExamMatrix>,
    items: HashMap<i64, ExamMatrixItem>,
    exams: HashMap<i64, Exam>,
    exam_questions: HashMap<i64, Vec<ExamQuestion>>,
    attempts: HashMap<i64, Attempt>,
    answers: HashMap<(i64, i64), Answer>,
}

impl Inner {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seeds a question bank, returning its id.
    pub fn seed_bank(&self, bank: QuestionBank) -> i64 {
        let mut inner = self.lock();
        let id = if bank.id > 0 { bank.id } else { inner.next() };
        inner.banks.insert(id, QuestionBank { id, ..bank });
        id
    }

    /// Seeds a question, returning its id. Ids <= 0 are auto-assigned.
    pub fn seed_question(&self, question: Question) -> i64 {
        let mut inner = self.lock();
        let id = if question.id > 0 {
            question.id
        } else {
            inner.next()
        };
        inner.questions.insert(id, Question { id, ..question });
        id
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn count_eligible_questions(&self, filter: &SupplyFilter) -> Result<i64, AppError> {
        let ids = self.eligible_question_ids(filter).await?;
        Ok(ids.len() as i64)
    }

    async fn eligible_question_ids(&self, filter: &SupplyFilter) -> Result<Vec<i64>, AppError> {
        let inner = self.lock();
        let mut ids: Vec<i64> = inner
            .questions
            .values()
            .filter(|q| q.bank_id == filter.question_bank_id)
            .filter(|q| filter.domain.as_deref().is_none_or(|d| q.domain == d))
            .filter(|q| filter.difficulty.is_none_or(|d| q.difficulty == d))
            .filter(|q| {
                !filter.active_only
                    || (q.active
                        && inner
                            .banks
                            .get(&q.bank_id)
                            .is_some_and(|b| b.status == BankStatus::Active))
            })
            .map(|q| q.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn fetch_questions(&self, ids: &[i64]) -> Result<Vec<Question>, AppError> {
        let inner = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| inner.questions.get(id).cloned())
            .collect())
    }

    async fn insert_matrix(
        &self,
        teacher_id: i64,
        req: &CreateMatrixRequest,
    ) -> Result<ExamMatrix, AppError> {
        let mut inner = self.lock();
        let id = inner.next();
        let matrix = ExamMatrix {
            id,
            teacher_id,
            name: req.name.clone(),
            total_questions: req.total_questions,
            total_points: req.total_points,
            created_at: Utc::now(),
        };
        inner.matrices.insert(id, matrix.clone());
        Ok(matrix)
    }

    async fn get_matrix(&self, id: i64) -> Result<Option<ExamMatrix>, AppError> {
        Ok(self.lock().matrices.get(&id).cloned())
    }

    async fn list_matrices(&self, teacher_id: i64) -> Result<Vec<ExamMatrix>, AppError> {
        let inner = self.lock();
        let mut matrices: Vec<ExamMatrix> = inner
            .matrices
            .values()
            .filter(|m| m.teacher_id == teacher_id)
            .cloned()
            .collect();
        matrices.sort_by_key(|m| std::cmp::Reverse(m.id));
        Ok(matrices)
    }

    async fn update_matrix(&self, id: i64, req: &UpdateMatrixRequest) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let Some(matrix) = inner.matrices.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(name) = &req.name {
            matrix.name = name.clone();
        }
        if let Some(total_questions) = req.total_questions {
            matrix.total_questions = Some(total_questions);
        }
        if let Some(total_points) = req.total_points {
            matrix.total_points = Some(total_points);
        }
        Ok(true)
    }

    async fn delete_matrix(&self, id: i64) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let existed = inner.matrices.remove(&id).is_some();
        inner.items.retain(|_, item| item.matrix_id != id);
        Ok(existed)
    }

    async fn insert_matrix_item(
        &self,
        matrix_id: i64,
        req: &CreateMatrixItemRequest,
    ) -> Result<ExamMatrixItem, AppError> {
        let mut inner = self.lock();
        let position = inner
            .items
            .values()
            .filter(|i| i.matrix_id == matrix_id)
            .map(|i| i.position + 1)
            .max()
            .unwrap_or(0);
        let id = inner.next();
        let item = ExamMatrixItem {
            id,
            matrix_id,
            question_bank_id: req.question_bank_id,
            domain: req.domain.clone(),
            difficulty: req.difficulty,
            question_count: req.question_count,
            points_per_question: req.points_per_question,
            position,
        };
        inner.items.insert(id, item.clone());
        Ok(item)
    }

    async fn update_matrix_item(
        &self,
        matrix_id: i64,
        item_id: i64,
        req: &UpdateMatrixItemRequest,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let Some(item) = inner.items.get_mut(&item_id) else {
            return Ok(false);
        };
        if item.matrix_id != matrix_id {
            return Ok(false);
        }
        if let Some(domain) = &req.domain {
            item.domain = Some(domain.clone());
        }
        if let Some(difficulty) = req.difficulty {
            item.difficulty = Some(difficulty);
        }
        if let Some(question_count) = req.question_count {
            item.question_count = question_count;
        }
        if let Some(points_per_question) = req.points_per_question {
            item.points_per_question = Some(points_per_question);
        }
        Ok(true)
    }

    async fn delete_matrix_item(&self, matrix_id: i64, item_id: i64) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let matches = inner
            .items
            .get(&item_id)
            .is_some_and(|item| item.matrix_id == matrix_id);
        if matches {
            inner.items.remove(&item_id);
        }
        Ok(matches)
    }

    async fn list_matrix_items(&self, matrix_id: i64) -> Result<Vec<ExamMatrixItem>, AppError> {
        let inner = self.lock();
        let mut items: Vec<ExamMatrixItem> = inner
            .items
            .values()
            .filter(|i| i.matrix_id == matrix_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.position, i.id));
        Ok(items)
    }

    async fn insert_exam(
        &self,
        exam: &NewExam,
        questions: &[NewExamQuestion],
    ) -> Result<Exam, AppError> {
        let mut inner = self.lock();
        let id = inner.next();
        let stored = Exam {
            id,
            teacher_id: exam.teacher_id,
            matrix_id: exam.matrix_id,
            title: exam.title.clone(),
            status: exam.status,
            password_hash: exam.password_hash.clone(),
            duration_minutes: exam.duration_minutes,
            total_points: exam.total_points,
            created_at: Utc::now(),
        };
        inner.exams.insert(id, stored.clone());

        let mut rows: Vec<ExamQuestion> = questions
            .iter()
            .map(|q| ExamQuestion {
                exam_id: id,
                question_id: q.question_id,
                assigned_points: q.assigned_points,
                order_index: q.order_index,
            })
            .collect();
        rows.sort_by_key(|q| q.order_index);
        inner.exam_questions.insert(id, rows);

        Ok(stored)
    }

    async fn get_exam(&self, id: i64) -> Result<Option<Exam>, AppError> {
        Ok(self.lock().exams.get(&id).cloned())
    }

    async fn list_exam_questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>, AppError> {
        Ok(self
            .lock()
            .exam_questions
            .get(&exam_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_exam_status(&self, id: i64, status: ExamStatus) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let Some(exam) = inner.exams.get_mut(&id) else {
            return Ok(false);
        };
        exam.status = status;
        Ok(true)
    }

    async fn find_in_progress_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let inner = self.lock();
        Ok(inner
            .attempts
            .values()
            .find(|a| {
                a.exam_id == exam_id
                    && a.student_id == student_id
                    && a.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.lock().attempts.get(&id).cloned())
    }

    async fn create_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
        started_at: DateTime<Utc>,
        deadline_at: DateTime<Utc>,
    ) -> Result<Attempt, AppError> {
        let mut inner = self.lock();
        let open_exists = inner.attempts.values().any(|a| {
            a.exam_id == exam_id
                && a.student_id == student_id
                && a.status == AttemptStatus::InProgress
        });
        if open_exists {
            return Err(AppError::Conflict(
                "An attempt is already in progress".to_string(),
            ));
        }

        let id = inner.next();
        let attempt = Attempt {
            id,
            exam_id,
            student_id,
            status: AttemptStatus::InProgress,
            started_at,
            deadline_at,
            submitted_at: None,
            score_percentage: None,
        };
        inner.attempts.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn list_attempts_for_exam(&self, exam_id: i64) -> Result<Vec<Attempt>, AppError> {
        let inner = self.lock();
        let mut attempts: Vec<Attempt> = inner
            .attempts
            .values()
            .filter(|a| a.exam_id == exam_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| std::cmp::Reverse(a.started_at));
        Ok(attempts)
    }

    async fn upsert_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        response: &AnswerPayload,
        saved_at: DateTime<Utc>,
    ) -> Result<SaveOutcome, AppError> {
        let mut inner = self.lock();
        let Some(attempt) = inner.attempts.get(&attempt_id) else {
            return Err(AppError::NotFound("Attempt not found".to_string()));
        };
        if attempt.status != AttemptStatus::InProgress {
            return Ok(SaveOutcome::NotInProgress);
        }

        inner.answers.insert(
            (attempt_id, question_id),
            Answer {
                attempt_id,
                question_id,
                response: response.clone(),
                saved_at,
            },
        );
        Ok(SaveOutcome::Saved)
    }

    async fn list_answers(&self, attempt_id: i64) -> Result<Vec<Answer>, AppError> {
        let inner = self.lock();
        Ok(inner
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        to: AttemptStatus,
        score_percentage: f64,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let Some(attempt) = inner.attempts.get_mut(&attempt_id) else {
            return Ok(false);
        };
        if attempt.status != AttemptStatus::InProgress {
            return Ok(false);
        }
        attempt.status = to;
        attempt.score_percentage = Some(score_percentage);
        attempt.submitted_at = submitted_at;
        Ok(true)
    }
}
