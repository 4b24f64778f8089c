// src/engine/assemble.rs

use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::error::AppError;
use crate::models::exam::{Exam, ExamStatus};
use crate::models::matrix::{ExamMatrix, ExamMatrixItem};
use crate::models::question::Question;
use crate::store::{NewExam, NewExamQuestion, Store};
use crate::utils::hash::hash_password;

use super::supply::{SupplyFilter, SupplyIndex};
use super::validate::Violation;

/// Inputs for commit-mode assembly.
#[derive(Debug)]
pub struct CommitRequest<'a> {
    pub teacher_id: i64,
    pub title: &'a str,
    pub duration_minutes: i32,
    pub password: Option<&'a str>,

    /// Overrides per-item points: the total is distributed evenly over the
    /// drawn questions.
    pub requested_total_points: Option<i32>,
}

/// One drawn question in a preview, in final exam order.
#[derive(Debug, Serialize)]
pub struct PreviewQuestion {
    pub question_id: i64,
    pub order_index: i32,
    pub assigned_points: i32,
    pub domain: String,
    pub difficulty: i16,
    pub content: String,
}

/// Transient result of preview-mode assembly; nothing is persisted.
#[derive(Debug, Serialize)]
pub struct PreviewResult {
    pub matrix_id: i64,
    pub total_questions: usize,
    pub total_points: i32,
    pub questions: Vec<PreviewQuestion>,
}

struct Draw {
    item_index: usize,
    question_id: i64,
}

/// Draws questions for every matrix item, in declared item order.
///
/// Sampling is uniform without replacement, seeded fresh per call; preview
/// and commit share this exact path so a preview is representative. A
/// question drawn by an earlier item is unavailable to later items even
/// when their supply slices overlap, so one exam never holds duplicates.
/// Assembly never partially succeeds: the first short item aborts the call.
async fn draw_questions(
    store: &dyn Store,
    items: &[ExamMatrixItem],
) -> Result<Vec<Draw>, AppError> {
    let supply = SupplyIndex::new(store);
    let mut rng = StdRng::seed_from_u64(rand::random::<u64>());
    let mut taken: HashSet<i64> = HashSet::new();
    let mut draws = Vec::new();

    for (item_index, item) in items.iter().enumerate() {
        let filter = SupplyFilter::from_item(item);
        let mut pool = supply.candidate_ids(&filter).await?;
        pool.retain(|id| !taken.contains(id));

        let wanted = item.question_count.max(0) as usize;
        if wanted > pool.len() {
            return Err(AppError::ValidationFailed(vec![
                Violation::InsufficientSupply {
                    item_id: item.id,
                    question_bank_id: item.question_bank_id,
                    domain: item.domain.clone(),
                    difficulty: item.difficulty,
                    requested: item.question_count,
                    available: pool.len() as i64,
                },
            ]));
        }

        let (picked, _) = pool.partial_shuffle(&mut rng, wanted);
        for id in picked.iter() {
            taken.insert(*id);
            draws.push(Draw {
                item_index,
                question_id: *id,
            });
        }
    }

    Ok(draws)
}

/// Assigns points to the drawn questions, in final order.
///
/// Per-item `points_per_question` applies when every item declares one and
/// no explicit total was requested. Otherwise the requested total (falling
/// back to the matrix's declared total) is split evenly: each question gets
/// `total / n`, and the first `total % n` questions get one extra point, so
/// the sum always equals the total exactly.
fn assign_points(
    items: &[ExamMatrixItem],
    draws: &[Draw],
    requested_total: Option<i32>,
    matrix_total: Option<i32>,
) -> Result<Vec<i32>, AppError> {
    if draws.is_empty() {
        return Err(AppError::BadRequest(
            "Matrix produced an empty exam".to_string(),
        ));
    }

    let per_item = items.iter().all(|i| i.points_per_question.is_some());
    if per_item && requested_total.is_none() {
        return Ok(draws
            .iter()
            .map(|d| items[d.item_index].points_per_question.unwrap_or(0))
            .collect());
    }

    let total = requested_total.or(matrix_total).ok_or_else(|| {
        AppError::BadRequest(
            "Matrix items do not all declare points per question; a total point target is required"
                .to_string(),
        )
    })?;
    if total <= 0 {
        return Err(AppError::BadRequest(
            "Total points must be positive".to_string(),
        ));
    }

    let count = draws.len() as i32;
    let base = total / count;
    let remainder = (total - base * count) as usize;
    Ok((0..draws.len())
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect())
}

/// Builds and persists a concrete exam from a matrix, atomically.
///
/// The exam lands in `draft` status; activation is a separate step. A
/// supply that shrank since validation surfaces here as the same
/// insufficient-supply failure, with nothing persisted.
pub async fn assemble_commit(
    store: &dyn Store,
    matrix: &ExamMatrix,
    items: &[ExamMatrixItem],
    req: &CommitRequest<'_>,
) -> Result<Exam, AppError> {
    let draws = draw_questions(store, items).await?;
    let points = assign_points(items, &draws, req.requested_total_points, matrix.total_points)?;
    let total_points: i32 = points.iter().sum();
    if total_points <= 0 {
        return Err(AppError::BadRequest(
            "Assembled exam has zero total points".to_string(),
        ));
    }

    let password_hash = match req.password {
        Some(p) => Some(hash_password(p)?),
        None => None,
    };

    let questions: Vec<NewExamQuestion> = draws
        .iter()
        .zip(points.iter())
        .enumerate()
        .map(|(order, (draw, assigned))| NewExamQuestion {
            question_id: draw.question_id,
            assigned_points: *assigned,
            order_index: order as i32,
        })
        .collect();

    let new_exam = NewExam {
        teacher_id: req.teacher_id,
        matrix_id: Some(matrix.id),
        title: req.title.to_string(),
        status: ExamStatus::Draft,
        password_hash,
        duration_minutes: req.duration_minutes,
        total_points,
    };

    store.insert_exam(&new_exam, &questions).await
}

/// Preview-mode assembly: the same draw and point assignment as commit,
/// but no state is persisted. Consecutive previews may differ (fresh seed
/// per call); each one is a faithful sample of what commit would produce.
pub async fn assemble_preview(
    store: &dyn Store,
    matrix: &ExamMatrix,
    items: &[ExamMatrixItem],
    requested_total_points: Option<i32>,
) -> Result<PreviewResult, AppError> {
    let draws = draw_questions(store, items).await?;
    let points = assign_points(items, &draws, requested_total_points, matrix.total_points)?;

    let ids: Vec<i64> = draws.iter().map(|d| d.question_id).collect();
    let questions = store.fetch_questions(&ids).await?;
    let by_id: HashMap<i64, &Question> = questions.iter().map(|q| (q.id, q)).collect();

    let mut out = Vec::with_capacity(draws.len());
    for (order, (draw, assigned)) in draws.iter().zip(points.iter()).enumerate() {
        let question = by_id.get(&draw.question_id).ok_or_else(|| {
            AppError::InternalServerError(format!(
                "Question {} disappeared during preview",
                draw.question_id
            ))
        })?;
        out.push(PreviewQuestion {
            question_id: question.id,
            order_index: order as i32,
            assigned_points: *assigned,
            domain: question.domain.clone(),
            difficulty: question.difficulty,
            content: question.content.clone(),
        });
    }

    Ok(PreviewResult {
        matrix_id: matrix.id,
        total_questions: out.len(),
        total_points: points.iter().sum(),
        questions: out,
    })
}
