// ABOUTME: Shared application state for API handlers
// ABOUTME: Bundles the insight service, questionnaire storage and the session registry

use std::sync::Arc;

use marketwise_insights::InsightService;
use marketwise_questionnaire::{EngineConfig, QuestionnaireStorage};

use crate::sessions::SessionRegistry;

#[derive(Clone)]
pub struct ApiState {
    pub insights: Arc<InsightService>,
    pub questionnaire: QuestionnaireStorage,
    pub sessions: SessionRegistry,
}

impl ApiState {
    /// Sessions load their catalog from and save answers to `questionnaire`,
    /// and ask `insights` for the diagnosis on completion.
    pub fn new(
        insights: Arc<InsightService>,
        questionnaire: QuestionnaireStorage,
        engine_config: EngineConfig,
    ) -> Self {
        let storage = Arc::new(questionnaire.clone());
        let sessions = SessionRegistry::new(
            storage.clone(),
            storage,
            insights.clone(),
            engine_config,
        );

        Self {
            insights,
            questionnaire,
            sessions,
        }
    }
}
