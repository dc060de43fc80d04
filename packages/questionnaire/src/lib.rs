// ABOUTME: MarketWise questionnaire library - staged diagnostic questionnaire engine
// ABOUTME: Provides the catalog, per-kind answer policies, progress, persistence and the engine state machine

pub mod catalog;
pub mod engine;
pub mod error;
pub mod import;
pub mod policy;
pub mod progress;
pub mod session;
pub mod sqlite;
pub mod store;
pub mod types;

pub use catalog::{Catalog, CatalogStage, Position};
pub use engine::{CompletionEvent, EngineConfig, EnginePhase, QuestionnaireEngine, StepOutcome};
pub use error::{GenerationError, QuestionnaireError, Result};
pub use import::CatalogDocument;
pub use policy::{policy_for, AnswerCommitPolicy, AnswerInput, LocalOutcome, PersistIntent};
pub use progress::{calculate_progress, Progress};
pub use session::{Selection, SessionProgress};
pub use sqlite::{ImportSummary, QuestionnaireStorage};
pub use store::{
    AnswerStore, CatalogLoader, DiagnosisGenerator, InMemoryAnswerStore, StaticCatalogLoader,
};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::engine::{EngineConfig, EnginePhase, QuestionnaireEngine, StepOutcome};
    pub use crate::error::{GenerationError, QuestionnaireError, Result};
    pub use crate::store::{AnswerStore, CatalogLoader, DiagnosisGenerator};
    pub use crate::types::{Answer, Diagnosis, Question, QuestionKind, StoredAnswer};
}
