// ABOUTME: Shared API response types and error handling
// ABOUTME: Provides consistent response format and status mapping across all API endpoints

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use marketwise_insights::InsightError;
use marketwise_questionnaire::QuestionnaireError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// 200 with the standard success envelope
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, ResponseJson(ApiResponse::success(data))).into_response()
}

/// Errors a handler can return
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Questionnaire(#[from] QuestionnaireError),

    #[error(transparent)]
    Insight(#[from] InsightError),
}

fn questionnaire_status(e: &QuestionnaireError) -> StatusCode {
    match e {
        QuestionnaireError::CatalogLoad(_) | QuestionnaireError::CatalogUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        QuestionnaireError::ValidationBlocked => StatusCode::UNPROCESSABLE_ENTITY,
        QuestionnaireError::QuestionNotFound(_) | QuestionnaireError::OptionNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        QuestionnaireError::NotCurrentQuestion { .. }
        | QuestionnaireError::NotInProgress
        | QuestionnaireError::GenerationInFlight
        | QuestionnaireError::NothingToRetry => StatusCode::CONFLICT,
        QuestionnaireError::InputMismatch { .. } => StatusCode::BAD_REQUEST,
        QuestionnaireError::InvalidCatalog(_)
        | QuestionnaireError::AnswerPersist(_)
        | QuestionnaireError::Database(_)
        | QuestionnaireError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Questionnaire(e) => questionnaire_status(e),
            ApiError::Insight(e) => match e {
                InsightError::NoResponses | InsightError::InvalidInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                InsightError::DiagnosisMissing => StatusCode::NOT_FOUND,
                InsightError::EmptyGeneration | InsightError::AIService(_) => {
                    StatusCode::BAD_GATEWAY
                }
                InsightError::Questionnaire(inner) => questionnaire_status(inner),
                InsightError::Prompt(_)
                | InsightError::Database(_)
                | InsightError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Message safe to show to the caller
    fn public_message(&self) -> String {
        match self {
            ApiError::Questionnaire(QuestionnaireError::Database(_))
            | ApiError::Insight(InsightError::Database(_))
            | ApiError::Insight(InsightError::Questionnaire(QuestionnaireError::Database(_))) => {
                "Database error".to_string()
            }
            ApiError::Insight(InsightError::AIService(_)) => {
                "The text generation service is unavailable. Please try again later.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        (
            status,
            ResponseJson(ApiResponse::<()>::error(self.public_message())),
        )
            .into_response()
    }
}
