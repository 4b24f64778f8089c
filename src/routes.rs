// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, exam, matrix},
    state::AppState,
    utils::jwt::{auth_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Matrix and exam authoring require the teacher role.
/// * Access checks and attempts only require authentication; the caller's
///   id is the student id.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let matrix_routes = Router::new()
        .route("/", post(matrix::create_matrix).get(matrix::list_matrices))
        .route(
            "/{id}",
            get(matrix::get_matrix)
                .put(matrix::update_matrix)
                .delete(matrix::delete_matrix),
        )
        .route("/{id}/items", post(matrix::add_item))
        .route(
            "/{id}/items/{item_id}",
            put(matrix::update_item).delete(matrix::delete_item),
        )
        .route("/{id}/validation", get(matrix::validation_report))
        // Double middleware protection: Auth first, then role check
        .layer(middleware::from_fn(teacher_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let exam_author_routes = Router::new()
        .route("/", post(exam::create_exam))
        .route("/preview", post(exam::preview_exam))
        .route("/{id}", get(exam::get_exam))
        .route("/{id}/status", put(exam::update_exam_status))
        .route("/{id}/results", get(exam::list_exam_attempts))
        .layer(middleware::from_fn(teacher_middleware));

    let exam_student_routes = Router::new()
        .route("/{id}/access-check", post(exam::check_access))
        .route("/{id}/attempts", post(attempt::start_attempt))
        .route(
            "/{id}/attempts/{attempt_id}/answers",
            put(attempt::save_answer),
        )
        .route(
            "/{id}/attempts/{attempt_id}/submit",
            post(attempt::submit_attempt),
        )
        .route(
            "/{id}/attempts/{attempt_id}/result",
            get(attempt::get_result),
        );

    let exam_routes = Router::new()
        .merge(exam_author_routes)
        .merge(exam_student_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/matrices", matrix_routes)
        .nest("/api/exams", exam_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
