// ABOUTME: Per-user questionnaire session registry
// ABOUTME: Resumes a user's engine on first use and hands out shared, serialized access to it

use std::collections::HashMap;
use std::sync::Arc;

use marketwise_questionnaire::{
    AnswerStore, CatalogLoader, DiagnosisGenerator, EngineConfig, EnginePhase,
    QuestionnaireEngine,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// One user's engine; the mutex serializes that user's actions
pub type SharedEngine = Arc<Mutex<QuestionnaireEngine>>;

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SharedEngine>>>,
    loader: Arc<dyn CatalogLoader>,
    store: Arc<dyn AnswerStore>,
    generator: Arc<dyn DiagnosisGenerator>,
    config: EngineConfig,
}

impl SessionRegistry {
    pub fn new(
        loader: Arc<dyn CatalogLoader>,
        store: Arc<dyn AnswerStore>,
        generator: Arc<dyn DiagnosisGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            loader,
            store,
            generator,
            config,
        }
    }

    /// The user's live session, resumed from stored answers when there is none.
    ///
    /// A session whose catalog failed to load is returned but not kept, so the
    /// next call tries loading again.
    pub async fn session(&self, user_id: &str) -> SharedEngine {
        if let Some(engine) = self.sessions.read().await.get(user_id) {
            debug!("Reusing questionnaire session for user {}", user_id);
            return engine.clone();
        }

        let engine = QuestionnaireEngine::resume(
            user_id,
            self.loader.as_ref(),
            self.store.clone(),
            self.generator.clone(),
            self.config,
        )
        .await;

        if let EnginePhase::LoadFailed { message } = engine.phase() {
            warn!(
                "Not keeping questionnaire session for user {}: {}",
                user_id, message
            );
            return Arc::new(Mutex::new(engine));
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                info!("Opened questionnaire session for user {}", user_id);
                Arc::new(Mutex::new(engine))
            })
            .clone()
    }

    /// Drop the user's session; the next request resumes from storage
    pub async fn discard(&self, user_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(user_id).is_some();
        if removed {
            info!("Discarded questionnaire session for user {}", user_id);
        }
        removed
    }

    /// Drop every session, e.g. after the catalog was replaced
    pub async fn clear(&self) {
        let mut sessions = self.sessions.write().await;
        if !sessions.is_empty() {
            info!("Discarding {} questionnaire sessions", sessions.len());
        }
        sessions.clear();
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use marketwise_questionnaire::{
        Catalog, Diagnosis, GenerationError, InMemoryAnswerStore, QuestionnaireError, Question,
        QuestionKind, QuestionOption, Stage, StaticCatalogLoader,
    };

    struct NeverGenerates;

    #[async_trait]
    impl DiagnosisGenerator for NeverGenerates {
        async fn generate_diagnosis(&self, _user_id: &str) -> Result<Diagnosis, GenerationError> {
            Err(GenerationError::Failed("not used".to_string()))
        }
    }

    struct NoCatalog;

    #[async_trait]
    impl CatalogLoader for NoCatalog {
        async fn load_catalog(&self, _user_id: &str) -> marketwise_questionnaire::Result<Catalog> {
            Err(QuestionnaireError::CatalogLoad("offline".to_string()))
        }
    }

    fn catalog() -> Catalog {
        let stage = Stage {
            id: "s1".to_string(),
            order: 1,
            title: "Business".to_string(),
            description: None,
        };
        let question = Question {
            id: "q1".to_string(),
            stage_id: "s1".to_string(),
            order: 1,
            prompt_text: "Industry?".to_string(),
            localized_text: None,
            kind: QuestionKind::SingleSelect,
            max_selections: 1,
            category: None,
            options: vec![QuestionOption {
                id: "o1".to_string(),
                question_id: "q1".to_string(),
                display_text: "Retail".to_string(),
                localized_text: None,
                option_key: None,
                allows_free_text: false,
            }],
        };
        Catalog::new(vec![stage], vec![question]).unwrap()
    }

    fn registry(loader: Arc<dyn CatalogLoader>) -> SessionRegistry {
        SessionRegistry::new(
            loader,
            Arc::new(InMemoryAnswerStore::new()),
            Arc::new(NeverGenerates),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_session_is_shared_per_user() {
        let registry = registry(Arc::new(StaticCatalogLoader::new(catalog())));

        let first = registry.session("user-1").await;
        let again = registry.session("user-1").await;
        let other = registry.session("user-2").await;

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len().await, 2);

        assert!(registry.discard("user-1").await);
        assert!(!registry.discard("user-1").await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_kept() {
        let registry = registry(Arc::new(NoCatalog));

        let engine = registry.session("user-1").await;
        assert_eq!(engine.lock().await.phase().name(), "load_failed");
        assert!(registry.is_empty().await);
    }
}
