// ABOUTME: HTTP API layer for MarketWise providing REST endpoints and routing
// ABOUTME: Integration layer over the questionnaire engine and the insight service

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

pub mod auth;
pub mod insights_handlers;
pub mod questionnaire_handlers;
pub mod response;
pub mod sessions;
pub mod state;

pub use response::{ApiError, ApiResponse};
pub use sessions::{SessionRegistry, SharedEngine};
pub use state::ApiState;

/// Creates the questionnaire API router (nested under /api/questionnaire)
pub fn create_questionnaire_router() -> Router<ApiState> {
    Router::new()
        .route("/", get(questionnaire_handlers::get_questionnaire))
        .route("/select", post(questionnaire_handlers::select_option))
        .route("/toggle", post(questionnaire_handlers::toggle_option))
        .route("/text", post(questionnaire_handlers::set_free_text))
        .route("/other-text", post(questionnaire_handlers::set_other_text))
        .route("/continue", post(questionnaire_handlers::proceed))
        .route("/back", post(questionnaire_handlers::back))
        .route(
            "/retry-generation",
            post(questionnaire_handlers::retry_generation),
        )
        .route("/answers", get(questionnaire_handlers::list_answers))
}

/// Creates the diagnosis, profile and artifact router (nested under /api)
pub fn create_insights_router() -> Router<ApiState> {
    Router::new()
        .route("/diagnosis", post(insights_handlers::generate_diagnosis))
        .route("/profile", get(insights_handlers::get_profile))
        .route(
            "/business-insights",
            post(insights_handlers::business_insights),
        )
        .route(
            "/actions/post-generator",
            post(insights_handlers::generate_posts),
        )
        .route("/actions/{kind}", post(insights_handlers::generate_artifact))
        .route("/posts", get(insights_handlers::list_posts))
}

async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": { "status": "ok", "service": "marketwise" }
    }))
}

/// Full API router with state applied
pub fn create_router(state: ApiState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .nest("/questionnaire", create_questionnaire_router())
        .merge(create_insights_router());

    Router::new().nest("/api", api).with_state(state)
}
