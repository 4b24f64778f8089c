// tests/attempt_tests.rs

use chrono::{Duration, Utc};
use examina::engine::assemble::{CommitRequest, assemble_commit};
use examina::engine::attempt;
use examina::error::AppError;
use examina::models::attempt::{AnswerPayload, AttemptStatus};
use examina::models::exam::ExamStatus;
use examina::models::matrix::{ExamMatrix, ExamMatrixItem};
use examina::models::question::{
    BankStatus, Question, QuestionBank, QuestionBlank, QuestionOption, QuestionType,
};
use examina::store::{MemoryStore, Store};

const STUDENT: i64 = 42;

fn active_bank(id: i64) -> QuestionBank {
    QuestionBank {
        id,
        teacher_id: 1,
        name: "Geography".to_string(),
        grade_level: Some(7),
        status: BankStatus::Active,
    }
}

fn mc_question(id: i64, bank_id: i64) -> Question {
    Question {
        id,
        bank_id,
        question_type: QuestionType::MultipleChoice,
        content: format!("Question {}", id),
        domain: "capitals".to_string(),
        difficulty: 1,
        active: true,
        options: vec![
            QuestionOption {
                id: 1,
                text: "Option A".to_string(),
                is_correct: true,
            },
            QuestionOption {
                id: 2,
                text: "Option B".to_string(),
                is_correct: false,
            },
        ],
        blanks: vec![],
    }
}

fn blank_question(id: i64, bank_id: i64, answer: &str) -> Question {
    Question {
        id,
        bank_id,
        question_type: QuestionType::FillBlank,
        content: format!("Question {}", id),
        domain: "capitals".to_string(),
        difficulty: 1,
        active: true,
        options: vec![],
        blanks: vec![QuestionBlank {
            answer: answer.to_string(),
            normalized_answer: answer.trim().to_lowercase(),
        }],
    }
}

/// Seeds one bank with questions 1 and 2 (multiple choice, option 1
/// correct) and question 3 (fill blank, answer "Paris"), assembles a
/// 30-minute exam worth 6 points and optionally activates it. Returns the
/// exam id.
async fn build_exam(store: &MemoryStore, password: Option<&str>, activate: bool) -> i64 {
    store.seed_bank(active_bank(1));
    store.seed_question(mc_question(1, 1));
    store.seed_question(mc_question(2, 1));
    store.seed_question(blank_question(3, 1, "Paris"));

    let matrix = ExamMatrix {
        id: 1,
        teacher_id: 1,
        name: "Capitals".to_string(),
        total_questions: None,
        total_points: None,
        created_at: Utc::now(),
    };
    let items = vec![ExamMatrixItem {
        id: 1,
        matrix_id: 1,
        question_bank_id: 1,
        domain: Some("capitals".to_string()),
        difficulty: None,
        question_count: 3,
        points_per_question: Some(2),
        position: 0,
    }];
    let request = CommitRequest {
        teacher_id: 1,
        title: "Capitals exam",
        duration_minutes: 30,
        password,
        requested_total_points: None,
    };

    let exam = assemble_commit(store, &matrix, &items, &request)
        .await
        .expect("assembly should succeed");
    if activate {
        store
            .update_exam_status(exam.id, ExamStatus::Active)
            .await
            .unwrap();
    }
    exam.id
}

fn choice(option_id: i64) -> AnswerPayload {
    AnswerPayload::Choice { option_id }
}

fn blanks(text: &str) -> AnswerPayload {
    AnswerPayload::Blanks {
        texts: vec![text.to_string()],
    }
}

#[tokio::test]
async fn start_is_idempotent_while_an_attempt_is_open() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let first = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();
    let second = attempt::start(&store, exam_id, STUDENT, None, t0 + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(first.attempt_id, second.attempt_id);
    assert_eq!(first.deadline_at, t0 + Duration::minutes(30));
    assert_eq!(second.questions.len(), 3);
}

#[tokio::test]
async fn start_rejects_an_exam_that_is_not_active() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, false).await;

    let err = attempt::start(&store, exam_id, STUDENT, None, Utc::now())
        .await
        .expect_err("draft exam must not admit attempts");
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn start_verifies_the_exam_password() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, Some("quiz-secret"), true).await;
    let t0 = Utc::now();

    let missing = attempt::start(&store, exam_id, STUDENT, None, t0).await;
    assert!(matches!(missing, Err(AppError::Forbidden(_))));

    let wrong = attempt::start(&store, exam_id, STUDENT, Some("nope"), t0).await;
    assert!(matches!(wrong, Err(AppError::Forbidden(_))));

    let ok = attempt::start(&store, exam_id, STUDENT, Some("quiz-secret"), t0).await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn submitting_grades_the_attempt() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let started = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();
    let attempt_id = started.attempt_id;

    // Question 1 right, question 2 wrong, question 3 right after
    // normalization (whitespace and case differ from the stored answer).
    attempt::save_answer(&store, exam_id, attempt_id, STUDENT, 1, &choice(1), t0)
        .await
        .unwrap();
    attempt::save_answer(&store, exam_id, attempt_id, STUDENT, 2, &choice(2), t0)
        .await
        .unwrap();
    attempt::save_answer(&store, exam_id, attempt_id, STUDENT, 3, &blanks(" pARIs "), t0)
        .await
        .unwrap();

    let result = attempt::submit(
        &store,
        exam_id,
        attempt_id,
        STUDENT,
        t0 + Duration::minutes(10),
    )
    .await
    .unwrap();

    assert_eq!(result.status, AttemptStatus::Graded);
    assert!(result.submitted_at.is_some());
    // 4 of 6 points.
    assert!((result.score_percentage - 200.0 / 3.0).abs() < 1e-9);

    let by_question = |id: i64| {
        result
            .breakdown
            .iter()
            .find(|entry| entry.question_id == id)
            .unwrap()
            .points_earned
    };
    assert_eq!(by_question(1), 2);
    assert_eq!(by_question(2), 0);
    assert_eq!(by_question(3), 2);

    let stored = store.get_attempt(attempt_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AttemptStatus::Graded);
    assert_eq!(stored.score_percentage, Some(result.score_percentage));
}

#[tokio::test]
async fn unanswered_questions_stay_in_the_denominator() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let started = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();
    attempt::save_answer(&store, exam_id, started.attempt_id, STUDENT, 1, &choice(1), t0)
        .await
        .unwrap();

    let result = attempt::submit(
        &store,
        exam_id,
        started.attempt_id,
        STUDENT,
        t0 + Duration::minutes(1),
    )
    .await
    .unwrap();

    // 2 of 6 points; the two unanswered questions still count.
    assert!((result.score_percentage - 100.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn deadline_expiry_keeps_the_score_saved_before_it() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let started = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();
    let attempt_id = started.attempt_id;

    attempt::save_answer(
        &store,
        exam_id,
        attempt_id,
        STUDENT,
        1,
        &choice(1),
        t0 + Duration::minutes(1),
    )
    .await
    .unwrap();

    // The save after the deadline is rejected and expires the attempt.
    let late = t0 + Duration::minutes(31);
    let err = attempt::save_answer(&store, exam_id, attempt_id, STUDENT, 2, &choice(1), late)
        .await
        .expect_err("saving past the deadline must fail");
    assert!(matches!(err, AppError::Expired(_)));

    let stored = store.get_attempt(attempt_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AttemptStatus::Expired);
    let expired_score = stored.score_percentage.expect("expiry must score");
    assert!((expired_score - 100.0 / 3.0).abs() < 1e-9);

    // A later submit reports Expired and leaves the score untouched.
    let err = attempt::submit(&store, exam_id, attempt_id, STUDENT, late + Duration::minutes(1))
        .await
        .expect_err("submit after expiry must fail");
    assert!(matches!(err, AppError::Expired(_)));

    let result = attempt::get_result(
        &store,
        exam_id,
        attempt_id,
        STUDENT,
        late + Duration::minutes(2),
    )
    .await
    .unwrap();
    assert_eq!(result.status, AttemptStatus::Expired);
    assert!((result.score_percentage - expired_score).abs() < 1e-9);
}

#[tokio::test]
async fn saving_after_submission_is_a_conflict() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let started = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();
    attempt::submit(
        &store,
        exam_id,
        started.attempt_id,
        STUDENT,
        t0 + Duration::minutes(1),
    )
    .await
    .unwrap();

    let err = attempt::save_answer(
        &store,
        exam_id,
        started.attempt_id,
        STUDENT,
        1,
        &choice(1),
        t0 + Duration::minutes(2),
    )
    .await
    .expect_err("saving into a graded attempt must fail");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn results_are_owner_only() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let started = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();
    attempt::submit(
        &store,
        exam_id,
        started.attempt_id,
        STUDENT,
        t0 + Duration::minutes(1),
    )
    .await
    .unwrap();

    let err = attempt::get_result(
        &store,
        exam_id,
        started.attempt_id,
        STUDENT + 1,
        t0 + Duration::minutes(2),
    )
    .await
    .expect_err("another student must not read the result");
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn result_of_an_open_attempt_is_a_conflict() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let started = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();

    let err = attempt::get_result(
        &store,
        exam_id,
        started.attempt_id,
        STUDENT,
        t0 + Duration::minutes(1),
    )
    .await
    .expect_err("in-progress attempt has no result yet");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn repeated_result_reads_are_identical() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let started = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();
    attempt::save_answer(&store, exam_id, started.attempt_id, STUDENT, 3, &blanks("paris"), t0)
        .await
        .unwrap();
    attempt::submit(
        &store,
        exam_id,
        started.attempt_id,
        STUDENT,
        t0 + Duration::minutes(1),
    )
    .await
    .unwrap();

    let first = attempt::get_result(
        &store,
        exam_id,
        started.attempt_id,
        STUDENT,
        t0 + Duration::minutes(2),
    )
    .await
    .unwrap();
    let second = attempt::get_result(
        &store,
        exam_id,
        started.attempt_id,
        STUDENT,
        t0 + Duration::minutes(3),
    )
    .await
    .unwrap();

    assert_eq!(first.score_percentage, second.score_percentage);
    assert_eq!(first.breakdown.len(), second.breakdown.len());
    for (a, b) in first.breakdown.iter().zip(second.breakdown.iter()) {
        assert_eq!(a.question_id, b.question_id);
        assert_eq!(a.points_earned, b.points_earned);
    }
}

#[tokio::test]
async fn normalized_fill_blank_answers_score_alike() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    // Two students answer the same blank with different surface forms.
    let mut scores = Vec::new();
    for (student, text) in [(STUDENT, " Paris "), (STUDENT + 1, "paris")] {
        let started = attempt::start(&store, exam_id, student, None, t0)
            .await
            .unwrap();
        attempt::save_answer(
            &store,
            exam_id,
            started.attempt_id,
            student,
            3,
            &blanks(text),
            t0,
        )
        .await
        .unwrap();
        let result = attempt::submit(
            &store,
            exam_id,
            started.attempt_id,
            student,
            t0 + Duration::minutes(1),
        )
        .await
        .unwrap();
        scores.push(result.score_percentage);
    }

    assert_eq!(scores[0], scores[1]);
    assert!((scores[0] - 100.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn a_terminal_attempt_does_not_block_a_retake() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let first = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();
    attempt::submit(
        &store,
        exam_id,
        first.attempt_id,
        STUDENT,
        t0 + Duration::minutes(1),
    )
    .await
    .unwrap();

    let second = attempt::start(&store, exam_id, STUDENT, None, t0 + Duration::minutes(2))
        .await
        .unwrap();
    assert_ne!(first.attempt_id, second.attempt_id);
}

#[tokio::test]
async fn an_open_attempt_found_past_its_deadline_expires_on_start() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let first = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();

    // Well past the 30-minute deadline: the stale attempt is expired and a
    // fresh one starts.
    let second = attempt::start(&store, exam_id, STUDENT, None, t0 + Duration::hours(2))
        .await
        .unwrap();

    assert_ne!(first.attempt_id, second.attempt_id);
    let stale = store.get_attempt(first.attempt_id).await.unwrap().unwrap();
    assert_eq!(stale.status, AttemptStatus::Expired);
    assert!(stale.score_percentage.is_some());
}

#[tokio::test]
async fn answer_payload_must_match_the_question_type() {
    let store = MemoryStore::new();
    let exam_id = build_exam(&store, None, true).await;
    let t0 = Utc::now();

    let started = attempt::start(&store, exam_id, STUDENT, None, t0)
        .await
        .unwrap();

    // A choice payload aimed at the fill-blank question.
    let err = attempt::save_answer(&store, exam_id, started.attempt_id, STUDENT, 3, &choice(1), t0)
        .await
        .expect_err("mismatched payload must be rejected");
    assert!(matches!(err, AppError::BadRequest(_)));
}
