// ABOUTME: Error types for the questionnaire package
// ABOUTME: Catalog, persistence, validation and generation failures

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuestionnaireError {
    #[error("Could not load questionnaire: {0}")]
    CatalogLoad(String),

    #[error("Invalid questionnaire catalog: {0}")]
    InvalidCatalog(String),

    #[error("Questionnaire is not available: {0}")]
    CatalogUnavailable(String),

    #[error("Failed to save answer: {0}")]
    AnswerPersist(String),

    #[error("Cannot continue: the current question is not fully answered")]
    ValidationBlocked,

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    #[error("Question {question_id} is not the current question")]
    NotCurrentQuestion { question_id: String },

    #[error("Option {option_id} does not belong to question {question_id}")]
    OptionNotFound {
        question_id: String,
        option_id: String,
    },

    #[error("Input {input} does not apply to a {kind} question")]
    InputMismatch { input: &'static str, kind: &'static str },

    #[error("Questionnaire is not in progress")]
    NotInProgress,

    #[error("A diagnosis is already being generated")]
    GenerationInFlight,

    #[error("Diagnosis generation can only be retried after a failure")]
    NothingToRetry,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QuestionnaireError>;

/// Failure reported by the diagnosis generator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("No questionnaire responses found")]
    NoResponses,

    #[error("Diagnosis generation timed out after {0} seconds")]
    TimedOut(u64),

    #[error("Diagnosis generation failed: {0}")]
    Failed(String),
}
