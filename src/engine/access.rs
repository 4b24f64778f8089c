// src/engine/access.rs

use serde::Serialize;

use crate::error::AppError;
use crate::models::exam::{Exam, ExamStatus};
use crate::utils::hash::verify_password;

/// Outcome of the admission check for starting or resuming an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Granted,
    NotActive,
    WrongPassword,
}

/// Decides whether an exam admits an attempt with the supplied password.
///
/// Side-effect free: `start` calls this on every invocation and the
/// access-check endpoint exposes it directly. Password comparison goes
/// through argon2 verification, which does not leak timing.
pub fn check_access(
    exam: &Exam,
    supplied_password: Option<&str>,
) -> Result<AccessDecision, AppError> {
    if exam.status != ExamStatus::Active {
        return Ok(AccessDecision::NotActive);
    }

    if let Some(hash) = exam.password_hash.as_deref() {
        let supplied = supplied_password.unwrap_or("");
        if !verify_password(supplied, hash)? {
            return Ok(AccessDecision::WrongPassword);
        }
    }

    Ok(AccessDecision::Granted)
}
