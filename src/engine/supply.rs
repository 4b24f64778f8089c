// src/engine/supply.rs

use crate::error::AppError;
use crate::models::matrix::ExamMatrixItem;
use crate::store::Store;

/// One slice of the question supply: a bank, optionally narrowed by domain
/// and difficulty.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyFilter {
    pub question_bank_id: i64,
    pub domain: Option<String>,
    pub difficulty: Option<i16>,
    pub active_only: bool,
}

impl SupplyFilter {
    /// Validation and assembly both draw against active questions only.
    pub fn from_item(item: &ExamMatrixItem) -> Self {
        Self {
            question_bank_id: item.question_bank_id,
            domain: item.domain.clone(),
            difficulty: item.difficulty,
            active_only: true,
        }
    }
}

/// Read-only view over question banks, used by the validator (counts) and
/// the assembler (candidate ids).
pub struct SupplyIndex<'a> {
    store: &'a dyn Store,
}

impl<'a> SupplyIndex<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// How many questions currently match the filter.
    pub async fn available(&self, filter: &SupplyFilter) -> Result<i64, AppError> {
        self.store.count_eligible_questions(filter).await
    }

    /// The ids of the questions currently matching the filter.
    pub async fn candidate_ids(&self, filter: &SupplyFilter) -> Result<Vec<i64>, AppError> {
        self.store.eligible_question_ids(filter).await
    }
}
