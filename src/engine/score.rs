// src/engine/score.rs

use std::collections::HashMap;

use serde::Serialize;

use crate::error::AppError;
use crate::models::attempt::AnswerPayload;
use crate::models::exam::ExamQuestion;
use crate::models::question::{Question, QuestionType};

/// Canonical form used for fill-blank comparison: surrounding whitespace
/// trimmed, case folded.
pub fn normalize_answer(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The answer key for one question, echoed back in result breakdowns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectAnswer {
    Choice { option_id: i64 },
    Blanks { answers: Vec<String> },
}

/// Per-question entry of a scored attempt.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionScore {
    pub question_id: i64,
    pub points_possible: i32,
    pub points_earned: i32,
    pub submitted: Option<AnswerPayload>,
    pub correct: CorrectAnswer,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreOutcome {
    pub score_percentage: f64,
    pub breakdown: Vec<QuestionScore>,
}

/// Evaluates saved answers against the questions' answer keys.
///
/// Pure and deterministic: the same inputs always yield the same outcome.
/// A multiple-choice answer earns full points iff the selected option is
/// the flagged-correct one; a fill-blank answer earns full points iff every
/// blank's normalized text matches (all-or-nothing across blanks).
/// Unanswered questions, and payloads of the wrong shape, earn zero but
/// stay in the denominator.
pub fn score(
    questions: &[(ExamQuestion, Question)],
    answers: &HashMap<i64, AnswerPayload>,
) -> Result<ScoreOutcome, AppError> {
    let possible: i32 = questions.iter().map(|(eq, _)| eq.assigned_points).sum();
    if possible <= 0 {
        // Activation rejects zero-point exams before any attempt can exist,
        // so reaching this is an invariant breach, not a user error.
        return Err(AppError::InternalServerError(
            "Cannot score an exam with zero total points".to_string(),
        ));
    }

    let mut earned: i64 = 0;
    let mut breakdown = Vec::with_capacity(questions.len());

    for (exam_question, question) in questions {
        let submitted = answers.get(&exam_question.question_id).cloned();
        let correct = correct_answer(question)?;

        let is_correct = match (&submitted, question.question_type) {
            (Some(AnswerPayload::Choice { option_id }), QuestionType::MultipleChoice) => {
                matches!(&correct, CorrectAnswer::Choice { option_id: c } if *c == *option_id)
            }
            (Some(AnswerPayload::Blanks { texts }), QuestionType::FillBlank) => {
                texts.len() == question.blanks.len()
                    && question
                        .blanks
                        .iter()
                        .zip(texts.iter())
                        .all(|(blank, text)| normalize_answer(text) == blank.normalized_answer)
            }
            _ => false,
        };

        let points_earned = if is_correct {
            exam_question.assigned_points
        } else {
            0
        };
        earned += i64::from(points_earned);

        breakdown.push(QuestionScore {
            question_id: exam_question.question_id,
            points_possible: exam_question.assigned_points,
            points_earned,
            submitted,
            correct,
        });
    }

    Ok(ScoreOutcome {
        score_percentage: 100.0 * earned as f64 / f64::from(possible),
        breakdown,
    })
}

fn correct_answer(question: &Question) -> Result<CorrectAnswer, AppError> {
    match question.question_type {
        QuestionType::MultipleChoice => {
            let option = question
                .options
                .iter()
                .find(|o| o.is_correct)
                .ok_or_else(|| {
                    AppError::InternalServerError(format!(
                        "Question {} has no option flagged correct",
                        question.id
                    ))
                })?;
            Ok(CorrectAnswer::Choice {
                option_id: option.id,
            })
        }
        QuestionType::FillBlank => Ok(CorrectAnswer::Blanks {
            answers: question.blanks.iter().map(|b| b.answer.clone()).collect(),
        }),
    }
}
