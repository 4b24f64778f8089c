// src/engine/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::attempt::{AnswerPayload, Attempt, AttemptStatus};
use crate::models::exam::Exam;
use crate::models::question::{PublicOption, Question, QuestionType};
use crate::store::{SaveOutcome, Store};

use super::access::{AccessDecision, check_access};
use super::score::{self, QuestionScore, ScoreOutcome};

/// One exam question as shown to the student: answer key stripped.
#[derive(Debug, Serialize)]
pub struct AttemptQuestion {
    pub question_id: i64,
    pub order_index: i32,
    pub assigned_points: i32,
    pub question_type: QuestionType,
    pub content: String,
    pub options: Vec<PublicOption>,
    pub blank_count: usize,
}

#[derive(Debug, Serialize)]
pub struct AttemptStartResponse {
    pub attempt_id: i64,
    pub exam_id: i64,
    pub started_at: DateTime<Utc>,

    /// For the client-side countdown; the server re-checks on every access.
    pub deadline_at: DateTime<Utc>,

    pub questions: Vec<AttemptQuestion>,
}

#[derive(Debug, Serialize)]
pub struct SaveAnswerResponse {
    pub attempt_id: i64,
    pub question_id: i64,
    pub saved_at: DateTime<Utc>,
}

/// Returned by submit and by the result endpoint.
#[derive(Debug, Serialize)]
pub struct AttemptResultResponse {
    pub attempt_id: i64,
    pub exam_id: i64,
    pub status: AttemptStatus,
    pub score_percentage: f64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub breakdown: Vec<QuestionScore>,
}

/// Starts (or resumes) an attempt.
///
/// While an in-progress attempt exists for (exam, student), that same
/// attempt is returned, so retrying the call never creates a second row.
/// An open attempt found past its deadline is expired first and a fresh
/// attempt takes its place (terminal attempts do not block retakes).
pub async fn start(
    store: &dyn Store,
    exam_id: i64,
    student_id: i64,
    password: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AttemptStartResponse, AppError> {
    let exam = require_exam(store, exam_id).await?;

    match check_access(&exam, password)? {
        AccessDecision::Granted => {}
        AccessDecision::NotActive => {
            return Err(AppError::Forbidden("Exam is not active".to_string()));
        }
        AccessDecision::WrongPassword => {
            return Err(AppError::Forbidden("Wrong exam password".to_string()));
        }
    }

    if let Some(open) = store.find_in_progress_attempt(exam_id, student_id).await? {
        if open.is_past_deadline(now) {
            expire(store, &open).await?;
        } else {
            return start_response(store, &exam, open).await;
        }
    }

    let deadline_at = now + Duration::minutes(i64::from(exam.duration_minutes));
    let attempt = match store
        .create_attempt(exam_id, student_id, now, deadline_at)
        .await
    {
        Ok(attempt) => attempt,
        // Two concurrent starts: the unique open-attempt constraint lets
        // exactly one insert win; the loser resumes the winner's attempt.
        Err(AppError::Conflict(_)) => store
            .find_in_progress_attempt(exam_id, student_id)
            .await?
            .ok_or_else(|| {
                AppError::Conflict("Attempt creation raced and no open attempt remains".to_string())
            })?,
        Err(e) => return Err(e),
    };

    start_response(store, &exam, attempt).await
}

/// Upserts one answer; the last write for a (attempt, question) pair wins,
/// so retries are safe. A save arriving past the deadline expires the
/// attempt and is rejected; a save losing the race against a concurrent
/// submit is rejected with a conflict, never silently applied.
pub async fn save_answer(
    store: &dyn Store,
    exam_id: i64,
    attempt_id: i64,
    student_id: i64,
    question_id: i64,
    response: &AnswerPayload,
    now: DateTime<Utc>,
) -> Result<SaveAnswerResponse, AppError> {
    let attempt = require_attempt(store, exam_id, attempt_id, student_id).await?;

    match attempt.status {
        AttemptStatus::InProgress => {}
        AttemptStatus::Expired => {
            return Err(AppError::Expired("Attempt has expired".to_string()));
        }
        AttemptStatus::Graded => {
            return Err(AppError::Conflict(
                "Attempt was already submitted".to_string(),
            ));
        }
    }

    if attempt.is_past_deadline(now) {
        expire(store, &attempt).await?;
        return Err(AppError::Expired(
            "Attempt deadline has passed".to_string(),
        ));
    }

    let exam_questions = store.list_exam_questions(exam_id).await?;
    if !exam_questions
        .iter()
        .any(|eq| eq.question_id == question_id)
    {
        return Err(AppError::NotFound(
            "Question is not part of this exam".to_string(),
        ));
    }

    let questions = store.fetch_questions(&[question_id]).await?;
    let question = questions
        .first()
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
    let shape_ok = matches!(
        (response, question.question_type),
        (AnswerPayload::Choice { .. }, QuestionType::MultipleChoice)
            | (AnswerPayload::Blanks { .. }, QuestionType::FillBlank)
    );
    if !shape_ok {
        return Err(AppError::BadRequest(
            "Answer payload does not match the question type".to_string(),
        ));
    }

    match store
        .upsert_answer(attempt_id, question_id, response, now)
        .await?
    {
        SaveOutcome::Saved => Ok(SaveAnswerResponse {
            attempt_id,
            question_id,
            saved_at: now,
        }),
        SaveOutcome::NotInProgress => {
            let current = store
                .get_attempt(attempt_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
            if current.status == AttemptStatus::Expired {
                Err(AppError::Expired("Attempt has expired".to_string()))
            } else {
                Err(AppError::Conflict(
                    "Attempt is no longer accepting answers".to_string(),
                ))
            }
        }
    }
}

/// Submits the attempt: scores whatever answers exist and transitions
/// `in_progress -> graded` atomically. A submit arriving past the deadline
/// expires the attempt instead, independent of the student's intent.
pub async fn submit(
    store: &dyn Store,
    exam_id: i64,
    attempt_id: i64,
    student_id: i64,
    now: DateTime<Utc>,
) -> Result<AttemptResultResponse, AppError> {
    let attempt = require_attempt(store, exam_id, attempt_id, student_id).await?;

    match attempt.status {
        AttemptStatus::InProgress => {}
        AttemptStatus::Expired => {
            return Err(AppError::Expired("Attempt has expired".to_string()));
        }
        AttemptStatus::Graded => {
            return Err(AppError::Conflict(
                "Attempt was already submitted".to_string(),
            ));
        }
    }

    if attempt.is_past_deadline(now) {
        expire(store, &attempt).await?;
        return Err(AppError::Expired(
            "Attempt deadline has passed".to_string(),
        ));
    }

    let outcome = score_attempt(store, &attempt).await?;
    let won = store
        .finalize_attempt(
            attempt_id,
            AttemptStatus::Graded,
            outcome.score_percentage,
            Some(now),
        )
        .await?;
    if !won {
        // Lost the conditional update: another request finalized first.
        let current = store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
        return match current.status {
            AttemptStatus::Expired => Err(AppError::Expired("Attempt has expired".to_string())),
            _ => Err(AppError::Conflict(
                "Attempt was already submitted".to_string(),
            )),
        };
    }

    Ok(AttemptResultResponse {
        attempt_id,
        exam_id,
        status: AttemptStatus::Graded,
        score_percentage: outcome.score_percentage,
        submitted_at: Some(now),
        breakdown: outcome.breakdown,
    })
}

/// Returns the graded (or expired) result with the per-question breakdown.
/// An in-progress attempt found past its deadline is expired on the way,
/// so results become readable without any background sweep.
pub async fn get_result(
    store: &dyn Store,
    exam_id: i64,
    attempt_id: i64,
    student_id: i64,
    now: DateTime<Utc>,
) -> Result<AttemptResultResponse, AppError> {
    let mut attempt = require_attempt(store, exam_id, attempt_id, student_id).await?;

    if attempt.status == AttemptStatus::InProgress {
        if !attempt.is_past_deadline(now) {
            return Err(AppError::Conflict(
                "Attempt is still in progress".to_string(),
            ));
        }
        attempt = expire(store, &attempt).await?;
    }

    let outcome = score_attempt(store, &attempt).await?;
    Ok(AttemptResultResponse {
        attempt_id: attempt.id,
        exam_id,
        status: attempt.status,
        // The percentage persisted at the terminal transition is
        // authoritative; the breakdown recomputes deterministically.
        score_percentage: attempt.score_percentage.unwrap_or(outcome.score_percentage),
        submitted_at: attempt.submitted_at,
        breakdown: outcome.breakdown,
    })
}

/// Terminalizes an attempt whose deadline passed: scores the answers saved
/// before the deadline and conditionally updates `in_progress -> expired`.
/// Losing that update means another request already finalized the attempt;
/// the stored row wins either way.
async fn expire(store: &dyn Store, attempt: &Attempt) -> Result<Attempt, AppError> {
    let outcome = score_attempt(store, attempt).await?;
    store
        .finalize_attempt(
            attempt.id,
            AttemptStatus::Expired,
            outcome.score_percentage,
            None,
        )
        .await?;
    store
        .get_attempt(attempt.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))
}

async fn score_attempt(store: &dyn Store, attempt: &Attempt) -> Result<ScoreOutcome, AppError> {
    let exam_questions = store.list_exam_questions(attempt.exam_id).await?;
    let ids: Vec<i64> = exam_questions.iter().map(|eq| eq.question_id).collect();
    let questions = store.fetch_questions(&ids).await?;
    let mut by_id: HashMap<i64, Question> = questions.into_iter().map(|q| (q.id, q)).collect();

    let mut pairs = Vec::with_capacity(exam_questions.len());
    for eq in exam_questions {
        let question = by_id.remove(&eq.question_id).ok_or_else(|| {
            AppError::InternalServerError(format!(
                "Exam {} references missing question {}",
                attempt.exam_id, eq.question_id
            ))
        })?;
        pairs.push((eq, question));
    }

    let answers: HashMap<i64, AnswerPayload> = store
        .list_answers(attempt.id)
        .await?
        .into_iter()
        .map(|a| (a.question_id, a.response))
        .collect();

    score::score(&pairs, &answers)
}

async fn start_response(
    store: &dyn Store,
    exam: &Exam,
    attempt: Attempt,
) -> Result<AttemptStartResponse, AppError> {
    let exam_questions = store.list_exam_questions(exam.id).await?;
    let ids: Vec<i64> = exam_questions.iter().map(|eq| eq.question_id).collect();
    let questions = store.fetch_questions(&ids).await?;
    let by_id: HashMap<i64, Question> = questions.into_iter().map(|q| (q.id, q)).collect();

    let mut out = Vec::with_capacity(exam_questions.len());
    for eq in &exam_questions {
        let question = by_id.get(&eq.question_id).ok_or_else(|| {
            AppError::InternalServerError(format!(
                "Exam {} references missing question {}",
                exam.id, eq.question_id
            ))
        })?;
        out.push(AttemptQuestion {
            question_id: question.id,
            order_index: eq.order_index,
            assigned_points: eq.assigned_points,
            question_type: question.question_type,
            content: question.content.clone(),
            options: question
                .options
                .iter()
                .map(|o| PublicOption {
                    id: o.id,
                    text: o.text.clone(),
                })
                .collect(),
            blank_count: question.blanks.len(),
        });
    }

    Ok(AttemptStartResponse {
        attempt_id: attempt.id,
        exam_id: exam.id,
        started_at: attempt.started_at,
        deadline_at: attempt.deadline_at,
        questions: out,
    })
}

async fn require_exam(store: &dyn Store, exam_id: i64) -> Result<Exam, AppError> {
    store
        .get_exam(exam_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))
}

async fn require_attempt(
    store: &dyn Store,
    exam_id: i64,
    attempt_id: i64,
    student_id: i64,
) -> Result<Attempt, AppError> {
    let attempt = store
        .get_attempt(attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
    if attempt.exam_id != exam_id {
        return Err(AppError::NotFound(
            "Attempt not found for this exam".to_string(),
        ));
    }
    if attempt.student_id != student_id {
        return Err(AppError::Forbidden(
            "Attempt belongs to another student".to_string(),
        ));
    }
    Ok(attempt)
}
