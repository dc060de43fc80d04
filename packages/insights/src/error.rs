// ABOUTME: Error types for the insights package
// ABOUTME: Wraps AI, prompt, questionnaire and database failures

use marketwise_ai::AIServiceError;
use marketwise_prompts::PromptError;
use marketwise_questionnaire::QuestionnaireError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("No questionnaire responses found")]
    NoResponses,

    #[error("No business diagnosis found. Please complete the diagnosis first.")]
    DiagnosisMissing,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Generated content is empty")]
    EmptyGeneration,

    #[error("AI service error: {0}")]
    AIService(#[from] AIServiceError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Questionnaire error: {0}")]
    Questionnaire(#[from] QuestionnaireError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InsightError>;
