// src/models/question.rs

use serde::{Deserialize, Serialize};

/// Lifecycle status of a question bank.
///
/// Banks are authored by a separate subsystem; this engine only reads them
/// as a question supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankStatus {
    Draft,
    Active,
    Archived,
}

impl BankStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankStatus::Draft => "draft",
            BankStatus::Active => "active",
            BankStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for BankStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(BankStatus::Draft),
            "active" => Ok(BankStatus::Active),
            "archived" => Ok(BankStatus::Archived),
            other => Err(format!("Unknown bank status '{}'", other)),
        }
    }
}

/// Question type: single-correct-option choice or fill-in-the-blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    FillBlank,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::FillBlank => "fill_blank",
        }
    }
}

impl std::str::FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "fill_blank" => Ok(QuestionType::FillBlank),
            other => Err(format!("Unknown question type '{}'", other)),
        }
    }
}

/// Represents the 'question_banks' table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBank {
    pub id: i64,
    pub teacher_id: i64,
    pub name: String,
    pub grade_level: Option<i16>,
    pub status: BankStatus,
}

/// One choice of a multiple-choice question.
///
/// Exactly one option per question carries `is_correct`; the authoring
/// subsystem enforces that and the scoring engine assumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
}

/// One blank of a fill-blank question. `normalized_answer` is the trimmed,
/// case-folded form of `answer`, precomputed at authoring time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBlank {
    pub answer: String,
    pub normalized_answer: String,
}

/// Represents the 'questions' table, answer key included.
///
/// `options` is populated for multiple-choice questions, `blanks` for
/// fill-blank questions; the other list stays empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub bank_id: i64,
    pub question_type: QuestionType,
    pub content: String,

    /// Topic tag used by matrix items to slice the supply (e.g. "acids").
    pub domain: String,
    pub difficulty: i16,
    pub active: bool,

    pub options: Vec<QuestionOption>,
    pub blanks: Vec<QuestionBlank>,
}

/// DTO for an option shown to a student (excludes the correct flag).
#[derive(Debug, Clone, Serialize)]
pub struct PublicOption {
    pub id: i64,
    pub text: String,
}
