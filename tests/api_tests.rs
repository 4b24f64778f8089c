// tests/api_tests.rs

use std::sync::Arc;

use examina::config::Config;
use examina::models::question::{
    BankStatus, Question, QuestionBank, QuestionBlank, QuestionOption, QuestionType,
};
use examina::routes;
use examina::state::AppState;
use examina::store::{MemoryStore, Store};
use examina::utils::jwt::sign_jwt;

/// Helper function to spawn the app on a random port for testing, backed
/// by the given in-memory store.
/// Returns the base URL (e.g., "http://127.0.0.1:12345") and the config.
async fn spawn_app(store: Arc<MemoryStore>) -> (String, Config) {
    let config = Config {
        database_url: "unused-in-tests".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
    };

    let store: Arc<dyn Store> = store;
    let state = AppState {
        store,
        config: config.clone(),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, config)
}

fn token(config: &Config, user_id: i64, role: &str) -> String {
    sign_jwt(user_id, role, &config.jwt_secret, config.jwt_expiration).unwrap()
}

fn seed_bank_with_questions(store: &MemoryStore, question_count: i64) {
    store.seed_bank(QuestionBank {
        id: 1,
        teacher_id: 1,
        name: "Chemistry".to_string(),
        grade_level: Some(9),
        status: BankStatus::Active,
    });

    for id in 1..=question_count {
        store.seed_question(Question {
            id,
            bank_id: 1,
            question_type: QuestionType::MultipleChoice,
            content: format!("Question {}", id),
            domain: "acids".to_string(),
            difficulty: 2,
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
        });
    }

    store.seed_question(Question {
        id: question_count + 1,
        bank_id: 1,
        question_type: QuestionType::FillBlank,
        content: "Capital of France?".to_string(),
        domain: "geography".to_string(),
        difficulty: 1,
        active: true,
        options: vec![],
        blanks: vec![QuestionBlank {
            answer: "Paris".to_string(),
            normalized_answer: "paris".to_string(),
        }],
    });
}

#[tokio::test]
async fn unknown_route_404() {
    // Arrange
    let (address, _config) = spawn_app(Arc::new(MemoryStore::new())).await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn matrix_routes_require_the_teacher_role() {
    let (address, config) = spawn_app(Arc::new(MemoryStore::new())).await;
    let client = reqwest::Client::new();
    let body = serde_json::json!({ "name": "Midterm" });

    // No token at all.
    let response = client
        .post(&format!("{}/api/matrices", address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);

    // Authenticated, but as a student.
    let response = client
        .post(&format!("{}/api/matrices", address))
        .header("Authorization", format!("Bearer {}", token(&config, 7, "student")))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn assembling_against_short_supply_returns_the_violation() {
    let store = Arc::new(MemoryStore::new());
    seed_bank_with_questions(&store, 4);
    let (address, config) = spawn_app(store).await;
    let client = reqwest::Client::new();
    let teacher = token(&config, 1, "teacher");

    let matrix: serde_json::Value = client
        .post(&format!("{}/api/matrices", address))
        .header("Authorization", format!("Bearer {}", teacher))
        .json(&serde_json::json!({ "name": "Too ambitious" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let matrix_id = matrix["id"].as_i64().unwrap();

    client
        .post(&format!("{}/api/matrices/{}/items", address, matrix_id))
        .header("Authorization", format!("Bearer {}", teacher))
        .json(&serde_json::json!({
            "question_bank_id": 1,
            "domain": "acids",
            "question_count": 50,
            "points_per_question": 2,
        }))
        .send()
        .await
        .unwrap();

    let response = client
        .post(&format!("{}/api/exams", address))
        .header("Authorization", format!("Bearer {}", teacher))
        .json(&serde_json::json!({
            "matrix_id": matrix_id,
            "title": "Doomed exam",
            "duration_minutes": 30,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 422);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["violations"][0]["kind"], "insufficient_supply");
    assert_eq!(body["violations"][0]["requested"], 50);
    assert_eq!(body["violations"][0]["available"], 4);
}

#[tokio::test]
async fn full_exam_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    seed_bank_with_questions(&store, 6);
    let (address, config) = spawn_app(store).await;
    let client = reqwest::Client::new();
    let teacher = token(&config, 1, "teacher");
    let student = token(&config, 7, "student");

    // 1. Teacher authors a matrix with one item.
    let response = client
        .post(&format!("{}/api/matrices", address))
        .header("Authorization", format!("Bearer {}", teacher))
        .json(&serde_json::json!({
            "name": "Acids midterm",
            "total_questions": 4,
            "total_points": 8,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let matrix: serde_json::Value = response.json().await.unwrap();
    let matrix_id = matrix["id"].as_i64().unwrap();

    let response = client
        .post(&format!("{}/api/matrices/{}/items", address, matrix_id))
        .header("Authorization", format!("Bearer {}", teacher))
        .json(&serde_json::json!({
            "question_bank_id": 1,
            "domain": "acids",
            "difficulty": 2,
            "question_count": 4,
            "points_per_question": 2,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    // 2. Validation passes against live supply.
    let report: serde_json::Value = client
        .get(&format!("{}/api/matrices/{}/validation", address, matrix_id))
        .header("Authorization", format!("Bearer {}", teacher))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["is_valid"], true);

    // 3. Preview does not persist anything, commit does.
    let preview = client
        .post(&format!("{}/api/exams/preview", address))
        .header("Authorization", format!("Bearer {}", teacher))
        .json(&serde_json::json!({ "matrix_id": matrix_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(preview.status().as_u16(), 200);

    let response = client
        .post(&format!("{}/api/exams", address))
        .header("Authorization", format!("Bearer {}", teacher))
        .json(&serde_json::json!({
            "matrix_id": matrix_id,
            "title": "Acids midterm",
            "duration_minutes": 45,
            "password": "super-secret",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let exam: serde_json::Value = response.json().await.unwrap();
    let exam_id = exam["id"].as_i64().unwrap();
    assert_eq!(exam["total_points"], 8);
    assert_eq!(exam["status"], "draft");

    // 4. Activate.
    let response = client
        .put(&format!("{}/api/exams/{}/status", address, exam_id))
        .header("Authorization", format!("Bearer {}", teacher))
        .json(&serde_json::json!({ "status": "active" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // 5. Access check distinguishes a wrong password from a granted one.
    let decision: serde_json::Value = client
        .post(&format!("{}/api/exams/{}/access-check", address, exam_id))
        .header("Authorization", format!("Bearer {}", student))
        .json(&serde_json::json!({ "password": "nope" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(decision["decision"], "wrong_password");

    // 6. Student starts the attempt; answer keys stay server-side.
    let response = client
        .post(&format!("{}/api/exams/{}/attempts", address, exam_id))
        .header("Authorization", format!("Bearer {}", student))
        .json(&serde_json::json!({ "password": "super-secret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body = response.text().await.unwrap();
    assert!(
        !body.contains("is_correct"),
        "answer key leaked to the student: {}",
        body
    );
    let started: serde_json::Value = serde_json::from_str(&body).unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();
    let questions = started["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 4);

    // 7. Answer every question with the correct option.
    for question in questions {
        let response = client
            .put(&format!(
                "{}/api/exams/{}/attempts/{}/answers",
                address, exam_id, attempt_id
            ))
            .header("Authorization", format!("Bearer {}", student))
            .json(&serde_json::json!({
                "question_id": question["question_id"],
                "response": { "kind": "choice", "option_id": 1 },
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    // 8. Submit and read the result back.
    let response = client
        .post(&format!(
            "{}/api/exams/{}/attempts/{}/submit",
            address, exam_id, attempt_id
        ))
        .header("Authorization", format!("Bearer {}", student))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let submitted: serde_json::Value = response.json().await.unwrap();
    assert_eq!(submitted["status"], "graded");
    assert_eq!(submitted["score_percentage"], 100.0);

    let result: serde_json::Value = client
        .get(&format!(
            "{}/api/exams/{}/attempts/{}/result",
            address, exam_id, attempt_id
        ))
        .header("Authorization", format!("Bearer {}", student))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["score_percentage"], 100.0);
    assert_eq!(result["breakdown"].as_array().unwrap().len(), 4);

    // 9. A second submit is rejected; the attempt is already graded.
    let response = client
        .post(&format!(
            "{}/api/exams/{}/attempts/{}/submit",
            address, exam_id, attempt_id
        ))
        .header("Authorization", format!("Bearer {}", student))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // 10. The teacher sees the attempt in the results overview.
    let overview: serde_json::Value = client
        .get(&format!("{}/api/exams/{}/results", address, exam_id))
        .header("Authorization", format!("Bearer {}", teacher))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let attempts = overview.as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["status"], "graded");
}
