// src/engine/validate.rs

use serde::Serialize;

use crate::error::AppError;
use crate::models::matrix::{ExamMatrix, ExamMatrixItem};

use super::supply::{SupplyFilter, SupplyIndex};

/// A single check failure produced by matrix validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// The item asks for more questions than its supply slice can provide.
    InsufficientSupply {
        item_id: i64,
        question_bank_id: i64,
        domain: Option<String>,
        difficulty: Option<i16>,
        requested: i32,
        available: i64,
    },

    /// Declared matrix total vs. the sum of the items' question counts.
    QuestionCountMismatch { declared: i32, actual: i32 },

    /// Declared matrix total vs. the sum of questionCount * pointsPerQuestion.
    PointTotalMismatch { declared: i32, actual: i32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
}

/// Checks a matrix's declared totals against its items and against live
/// question supply.
///
/// Supply shortfall is the only fatal condition (`is_valid == false`);
/// total mismatches are advisory and merely reported. The point-total check
/// only applies when every item declares points per question — otherwise
/// points come from an assembly-time target and the declared total is not
/// comparable.
pub async fn validate_matrix(
    supply: &SupplyIndex<'_>,
    matrix: &ExamMatrix,
    items: &[ExamMatrixItem],
) -> Result<ValidationReport, AppError> {
    let mut violations = Vec::new();
    let mut fatal = false;

    for item in items {
        let filter = SupplyFilter::from_item(item);
        let available = supply.available(&filter).await?;
        if i64::from(item.question_count) > available {
            fatal = true;
            violations.push(Violation::InsufficientSupply {
                item_id: item.id,
                question_bank_id: item.question_bank_id,
                domain: item.domain.clone(),
                difficulty: item.difficulty,
                requested: item.question_count,
                available,
            });
        }
    }

    if let Some(declared) = matrix.total_questions {
        let actual: i32 = items.iter().map(|i| i.question_count).sum();
        if declared != actual {
            violations.push(Violation::QuestionCountMismatch { declared, actual });
        }
    }

    if let Some(declared) = matrix.total_points {
        if !items.is_empty() && items.iter().all(|i| i.points_per_question.is_some()) {
            let actual: i32 = items
                .iter()
                .map(|i| i.question_count * i.points_per_question.unwrap_or(0))
                .sum();
            if declared != actual {
                violations.push(Violation::PointTotalMismatch { declared, actual });
            }
        }
    }

    Ok(ValidationReport {
        is_valid: !fatal,
        violations,
    })
}
