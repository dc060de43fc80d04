// ABOUTME: Behavioural tests for the questionnaire engine
// ABOUTME: Covers traversal, per-kind commits, persistence failures, resumption and generation

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use marketwise_questionnaire::{
    AnswerStore, Catalog, CatalogLoader, Diagnosis, DiagnosisGenerator, EngineConfig,
    EnginePhase, GenerationError, InMemoryAnswerStore, OptionId, Position, Question,
    QuestionKind, QuestionOption, QuestionnaireEngine, QuestionnaireError, Result, Stage,
    StaticCatalogLoader, StepOutcome, StoredAnswer,
};

// ============================================================================
// Fixtures
// ============================================================================

fn stage(id: &str, order: i64) -> Stage {
    Stage {
        id: id.to_string(),
        order,
        title: format!("Stage {}", id),
        description: None,
    }
}

fn question(stage_id: &str, id: &str, order: i64, kind: QuestionKind, options: &[&str]) -> Question {
    Question {
        id: id.to_string(),
        stage_id: stage_id.to_string(),
        order,
        prompt_text: format!("{}?", id),
        localized_text: None,
        kind,
        max_selections: 1,
        category: None,
        options: options
            .iter()
            .map(|o| QuestionOption {
                id: o.to_string(),
                question_id: id.to_string(),
                display_text: o.to_uppercase(),
                localized_text: None,
                option_key: None,
                allows_free_text: false,
            })
            .collect(),
    }
}

/// One stage: q1 single-select [o1, o2], q2 free text
fn scenario_a_catalog() -> Catalog {
    Catalog::new(
        vec![stage("s1", 1)],
        vec![
            question("s1", "q1", 1, QuestionKind::SingleSelect, &["o1", "o2"]),
            question("s1", "q2", 2, QuestionKind::FreeText, &[]),
        ],
    )
    .unwrap()
}

/// Two stages covering every question kind, with "other" options
fn full_catalog() -> Catalog {
    let mut industry = question("s1", "industry", 1, QuestionKind::SingleSelect, &["retail", "other"]);
    industry.options[1].allows_free_text = true;

    let mut channels = question("s1", "channels", 2, QuestionKind::MultiSelect, &["a", "b", "c"]);
    channels.max_selections = 2;

    Catalog::new(
        vec![stage("s1", 1), stage("s2", 2)],
        vec![
            industry,
            channels,
            question("s2", "goal", 1, QuestionKind::FreeText, &[]),
        ],
    )
    .unwrap()
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        persist_timeout: Duration::from_millis(500),
        generation_timeout: Duration::from_secs(5),
    }
}

/// Generator failing a fixed number of times before succeeding
struct ScriptedGenerator {
    calls: AtomicUsize,
    failures: usize,
    delay: Duration,
    store: Option<Arc<dyn AnswerStore>>,
    answers_seen: AtomicUsize,
}

impl ScriptedGenerator {
    fn succeeding() -> Self {
        Self::failing(0)
    }

    fn failing(failures: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures,
            delay: Duration::ZERO,
            store: None,
            answers_seen: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiagnosisGenerator for ScriptedGenerator {
    async fn generate_diagnosis(
        &self,
        user_id: &str,
    ) -> std::result::Result<Diagnosis, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(store) = &self.store {
            let answers = store
                .list_answers(user_id)
                .await
                .map_err(|e| GenerationError::Failed(e.to_string()))?;
            self.answers_seen.store(answers.len(), Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call < self.failures {
            return Err(GenerationError::Failed("upstream unavailable".to_string()));
        }
        Ok(Diagnosis {
            user_id: user_id.to_string(),
            text: "Summary".to_string(),
            generated_at: Utc::now(),
        })
    }
}

/// Answer store wrapper that can count, delay and fail writes
struct ControlledStore {
    inner: InMemoryAnswerStore,
    writes: AtomicUsize,
    failing_writes: AtomicUsize,
    delay: Duration,
}

impl ControlledStore {
    fn new() -> Self {
        Self {
            inner: InMemoryAnswerStore::new(),
            writes: AtomicUsize::new(0),
            failing_writes: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn failing_first(count: usize) -> Self {
        let store = Self::new();
        store.failing_writes.store(count, Ordering::SeqCst);
        store
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn before_write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let remaining = self.failing_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(QuestionnaireError::AnswerPersist(
                "database is locked".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AnswerStore for ControlledStore {
    async fn upsert_single_answer(
        &self,
        user_id: &str,
        question_id: &str,
        option_id: &str,
        free_text: Option<&str>,
    ) -> Result<()> {
        self.before_write().await?;
        self.inner
            .upsert_single_answer(user_id, question_id, option_id, free_text)
            .await
    }

    async fn reconcile_multi_answers(
        &self,
        user_id: &str,
        question_id: &str,
        selected: &[OptionId],
        free_text_by_option: &BTreeMap<OptionId, String>,
    ) -> Result<()> {
        self.before_write().await?;
        self.inner
            .reconcile_multi_answers(user_id, question_id, selected, free_text_by_option)
            .await
    }

    async fn upsert_free_text_answer(
        &self,
        user_id: &str,
        question_id: &str,
        text: &str,
    ) -> Result<()> {
        self.before_write().await?;
        self.inner
            .upsert_free_text_answer(user_id, question_id, text)
            .await
    }

    async fn list_answers(&self, user_id: &str) -> Result<Vec<StoredAnswer>> {
        self.inner.list_answers(user_id).await
    }
}

struct BrokenLoader;

#[async_trait]
impl CatalogLoader for BrokenLoader {
    async fn load_catalog(&self, _user_id: &str) -> Result<Catalog> {
        Err(QuestionnaireError::CatalogLoad(
            "connection refused".to_string(),
        ))
    }
}

fn engine_with(
    catalog: Catalog,
    store: Arc<ControlledStore>,
    generator: Arc<ScriptedGenerator>,
) -> QuestionnaireEngine {
    QuestionnaireEngine::with_catalog("user-1", catalog, store, generator, fast_config())
}

async fn rows_for(store: &ControlledStore, question_id: &str) -> Vec<StoredAnswer> {
    store
        .list_answers("user-1")
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.question_id == question_id)
        .collect()
}

// ============================================================================
// Walkthrough scenarios
// ============================================================================

#[tokio::test]
async fn test_single_select_then_free_text_completes() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(scenario_a_catalog(), store.clone(), generator.clone());
    let mut completed = engine.subscribe_completed();

    let outcome = engine.select_option("q1", "o1").await.unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Advanced {
            position: Position::new(0, 1)
        }
    );
    assert_eq!(engine.progress().percent, 50.0);
    assert_eq!(engine.current_question().unwrap().id, "q2");

    assert_eq!(
        engine.set_free_text("q2", "Great").await.unwrap(),
        StepOutcome::Updated
    );
    assert_eq!(engine.proceed().await.unwrap(), StepOutcome::Completed);
    assert_eq!(completed.try_recv().unwrap().user_id, "user-1");
    assert_eq!(engine.progress().percent, 100.0);

    let q1 = rows_for(&store, "q1").await;
    assert_eq!(q1.len(), 1);
    assert_eq!(q1[0].answer.option_id(), Some("o1"));

    let q2 = rows_for(&store, "q2").await;
    assert_eq!(q2.len(), 1);
    assert_eq!(q2[0].answer.option_id(), None);
    assert_eq!(q2[0].answer.text(), Some("Great"));

    assert!(matches!(
        engine.wait_for_generation().await,
        EnginePhase::DiagnosisReady { .. }
    ));
    assert_eq!(engine.diagnosis().unwrap().text, "Summary");
}

#[tokio::test]
async fn test_multi_select_over_cap_evicts_first_choice() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(full_catalog(), store.clone(), generator);

    engine.select_option("industry", "retail").await.unwrap();
    for option in ["a", "b", "c"] {
        assert_eq!(
            engine.toggle_option("channels", option).await.unwrap(),
            StepOutcome::Updated
        );
    }

    assert_eq!(
        engine.session().multi_selection("channels"),
        &["b".to_string(), "c".to_string()]
    );
    assert!(rows_for(&store, "channels").await.is_empty());

    engine.proceed().await.unwrap();
    let stored: Vec<String> = rows_for(&store, "channels")
        .await
        .iter()
        .filter_map(|r| r.answer.option_id().map(str::to_string))
        .collect();
    assert_eq!(stored, vec!["b".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn test_other_option_waits_for_text() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(full_catalog(), store.clone(), generator);

    assert_eq!(
        engine.select_option("industry", "other").await.unwrap(),
        StepOutcome::Updated
    );
    assert_eq!(engine.current_question().unwrap().id, "industry");
    assert_eq!(store.writes(), 0);

    assert!(!engine.can_advance());
    assert!(matches!(
        engine.proceed().await,
        Err(QuestionnaireError::ValidationBlocked)
    ));

    engine
        .set_other_text("industry", "other", "custom reason")
        .await
        .unwrap();
    assert!(engine.can_advance());
    assert_eq!(
        engine.proceed().await.unwrap(),
        StepOutcome::Advanced {
            position: Position::new(0, 1)
        }
    );

    let rows = rows_for(&store, "industry").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].answer.option_id(), Some("other"));
    assert_eq!(rows[0].answer.text(), Some("custom reason"));
}

#[tokio::test]
async fn test_generation_failure_then_retry_succeeds() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::failing(1));
    let mut engine = engine_with(scenario_a_catalog(), store.clone(), generator.clone());

    engine.select_option("q1", "o2").await.unwrap();
    engine.set_free_text("q2", "Great").await.unwrap();
    engine.proceed().await.unwrap();
    assert_eq!(engine.phase(), &EnginePhase::GeneratingDiagnosis);
    let writes_after_completion = store.writes();

    assert!(matches!(
        engine.wait_for_generation().await,
        EnginePhase::GenerationFailed { .. }
    ));
    assert!(engine.last_error().is_some());

    engine.retry_generation().await.unwrap();
    assert_eq!(engine.phase(), &EnginePhase::GeneratingDiagnosis);
    assert!(matches!(
        engine.wait_for_generation().await,
        EnginePhase::DiagnosisReady { .. }
    ));

    assert_eq!(generator.calls(), 2);
    assert_eq!(engine.generation_attempts(), 2);
    assert_eq!(store.writes(), writes_after_completion);
    assert!(engine.current_question().is_none());
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_progress_never_decreases_and_reaches_full_only_on_completion() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(full_catalog(), store, generator);

    let mut seen = vec![engine.progress().percent];

    engine.select_option("industry", "retail").await.unwrap();
    seen.push(engine.progress().percent);

    engine.toggle_option("channels", "a").await.unwrap();
    seen.push(engine.progress().percent);
    engine.proceed().await.unwrap();
    seen.push(engine.progress().percent);

    engine.set_free_text("goal", "More customers").await.unwrap();
    seen.push(engine.progress().percent);
    assert!(seen.iter().all(|p| *p < 100.0));

    engine.proceed().await.unwrap();
    seen.push(engine.progress().percent);

    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last(), Some(&100.0));
}

#[tokio::test]
async fn test_reanswering_single_select_keeps_one_row() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(scenario_a_catalog(), store.clone(), generator);

    engine.select_option("q1", "o1").await.unwrap();
    engine.back().await.unwrap();
    engine.select_option("q1", "o2").await.unwrap();

    let rows = rows_for(&store, "q1").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].answer.option_id(), Some("o2"));
}

#[tokio::test]
async fn test_back_and_forward_without_changes_writes_nothing() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(full_catalog(), store.clone(), generator);

    engine.select_option("industry", "retail").await.unwrap();
    engine.toggle_option("channels", "a").await.unwrap();
    engine.toggle_option("channels", "b").await.unwrap();
    engine.proceed().await.unwrap();
    assert_eq!(engine.current_question().unwrap().id, "goal");

    let writes = store.writes();
    let snapshot = store.list_answers("user-1").await.unwrap();

    assert_eq!(
        engine.back().await.unwrap(),
        StepOutcome::MovedBack {
            position: Position::new(0, 1)
        }
    );
    engine.back().await.unwrap();
    assert_eq!(engine.back().await.unwrap(), StepOutcome::Unchanged);

    engine.proceed().await.unwrap();
    engine.proceed().await.unwrap();
    assert_eq!(engine.current_question().unwrap().id, "goal");

    assert_eq!(store.writes(), writes);
    assert_eq!(store.list_answers("user-1").await.unwrap(), snapshot);
}

#[tokio::test]
async fn test_completion_invokes_generator_once() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(scenario_a_catalog(), store, generator.clone());

    engine.select_option("q1", "o1").await.unwrap();
    engine.set_free_text("q2", "Great").await.unwrap();
    engine.proceed().await.unwrap();

    for _ in 0..3 {
        engine.poll_generation().await;
        let _ = engine.progress();
        let _ = engine.current_question();
    }
    engine.wait_for_generation().await;

    assert!(matches!(
        engine.proceed().await,
        Err(QuestionnaireError::NotInProgress)
    ));
    assert!(matches!(
        engine.retry_generation().await,
        Err(QuestionnaireError::NothingToRetry)
    ));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_retry_is_refused_while_generation_is_pending() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator {
        delay: Duration::from_secs(2),
        ..ScriptedGenerator::succeeding()
    });
    let mut engine = engine_with(scenario_a_catalog(), store, generator.clone());

    engine.select_option("q1", "o1").await.unwrap();
    engine.set_free_text("q2", "Great").await.unwrap();
    engine.proceed().await.unwrap();

    assert!(matches!(
        engine.retry_generation().await,
        Err(QuestionnaireError::GenerationInFlight)
    ));
    assert_eq!(engine.phase(), &EnginePhase::GeneratingDiagnosis);
}

#[tokio::test]
async fn test_slow_generation_times_out() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator {
        delay: Duration::from_secs(2),
        ..ScriptedGenerator::succeeding()
    });
    let config = EngineConfig {
        generation_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let mut engine =
        QuestionnaireEngine::with_catalog("user-1", scenario_a_catalog(), store, generator, config);

    engine.select_option("q1", "o1").await.unwrap();
    engine.set_free_text("q2", "Great").await.unwrap();
    engine.proceed().await.unwrap();

    match engine.wait_for_generation().await {
        EnginePhase::GenerationFailed { message } => assert!(message.contains("timed out")),
        other => panic!("expected a timeout, got {:?}", other),
    }
}

// ============================================================================
// Input handling
// ============================================================================

#[tokio::test]
async fn test_actions_must_target_current_question() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(scenario_a_catalog(), store, generator);

    let result = engine.set_free_text("q2", "too early").await;
    assert!(matches!(
        result,
        Err(QuestionnaireError::NotCurrentQuestion { .. })
    ));
    assert!(engine.session().free_text("q2").is_none());
}

#[tokio::test]
async fn test_empty_multi_select_blocks_continue() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(full_catalog(), store, generator);

    engine.select_option("industry", "retail").await.unwrap();
    engine.toggle_option("channels", "a").await.unwrap();
    engine.toggle_option("channels", "a").await.unwrap();

    assert!(!engine.can_advance());
    assert!(matches!(
        engine.proceed().await,
        Err(QuestionnaireError::ValidationBlocked)
    ));
}

// ============================================================================
// Persistence failures
// ============================================================================

#[tokio::test]
async fn test_failed_write_keeps_pointer_and_selection() {
    let store = Arc::new(ControlledStore::failing_first(1));
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine = engine_with(scenario_a_catalog(), store.clone(), generator);

    let outcome = engine.select_option("q1", "o1").await.unwrap();
    assert_eq!(
        outcome,
        StepOutcome::PersistFailed {
            message: "Failed to save answer: database is locked".to_string()
        }
    );
    assert_eq!(engine.current_question().unwrap().id, "q1");
    assert_eq!(engine.session().single_selection("q1"), Some("o1"));
    assert!(engine.last_error().is_some());

    let retried = engine.select_option("q1", "o1").await.unwrap();
    assert_eq!(
        retried,
        StepOutcome::Advanced {
            position: Position::new(0, 1)
        }
    );
    assert!(engine.last_error().is_none());
    assert_eq!(rows_for(&store, "q1").await.len(), 1);
}

#[tokio::test]
async fn test_slow_write_does_not_block_navigation() {
    let store = Arc::new(ControlledStore::slow(Duration::from_millis(300)));
    let generator = Arc::new(ScriptedGenerator {
        store: Some(store.clone() as Arc<dyn AnswerStore>),
        ..ScriptedGenerator::succeeding()
    });
    let config = EngineConfig {
        persist_timeout: Duration::from_millis(20),
        ..fast_config()
    };
    let mut engine = QuestionnaireEngine::with_catalog(
        "user-1",
        scenario_a_catalog(),
        store.clone(),
        generator.clone(),
        config,
    );

    let outcome = engine.select_option("q1", "o1").await.unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Advanced {
            position: Position::new(0, 1)
        }
    );
    assert!(engine.last_error().is_none());

    engine.set_free_text("q2", "Great").await.unwrap();
    engine.proceed().await.unwrap();

    assert!(matches!(
        engine.wait_for_generation().await,
        EnginePhase::DiagnosisReady { .. }
    ));
    assert_eq!(generator.answers_seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_late_write_failure_is_surfaced_on_next_action() {
    let store = Arc::new(ControlledStore {
        delay: Duration::from_millis(100),
        ..ControlledStore::failing_first(1)
    });
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let config = EngineConfig {
        persist_timeout: Duration::from_millis(10),
        ..fast_config()
    };
    let mut engine =
        QuestionnaireEngine::with_catalog("user-1", scenario_a_catalog(), store, generator, config);

    engine.select_option("q1", "o1").await.unwrap();
    assert!(engine.last_error().is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.set_free_text("q2", "Great").await.unwrap();
    assert_eq!(
        engine.last_error(),
        Some("Failed to save answer: database is locked")
    );
}

#[tokio::test]
async fn test_late_write_failure_is_rewritten_before_diagnosis() {
    let store = Arc::new(ControlledStore {
        delay: Duration::from_millis(100),
        ..ControlledStore::failing_first(1)
    });
    let generator = Arc::new(ScriptedGenerator {
        store: Some(store.clone() as Arc<dyn AnswerStore>),
        ..ScriptedGenerator::succeeding()
    });
    let config = EngineConfig {
        persist_timeout: Duration::from_millis(10),
        ..fast_config()
    };
    let mut engine = QuestionnaireEngine::with_catalog(
        "user-1",
        scenario_a_catalog(),
        store.clone(),
        generator.clone(),
        config,
    );

    engine.select_option("q1", "o1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.set_free_text("q2", "Great").await.unwrap();
    assert!(rows_for(&store, "q1").await.is_empty());

    // Saving q2 does not hide the q1 failure
    assert_eq!(engine.proceed().await.unwrap(), StepOutcome::Completed);
    assert!(engine.last_error().is_some());

    assert!(matches!(
        engine.wait_for_generation().await,
        EnginePhase::DiagnosisReady { .. }
    ));
    assert_eq!(generator.answers_seen.load(Ordering::SeqCst), 2);
    let q1 = rows_for(&store, "q1").await;
    assert_eq!(q1.len(), 1);
    assert_eq!(q1[0].answer.option_id(), Some("o1"));
    assert!(engine.last_error().is_none());
}

#[tokio::test]
async fn test_late_write_failure_clears_once_answer_is_saved_again() {
    let store = Arc::new(ControlledStore {
        delay: Duration::from_millis(100),
        ..ControlledStore::failing_first(1)
    });
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let config = EngineConfig {
        persist_timeout: Duration::from_millis(10),
        ..fast_config()
    };
    let mut engine = QuestionnaireEngine::with_catalog(
        "user-1",
        scenario_a_catalog(),
        store.clone(),
        generator,
        config,
    );

    engine.select_option("q1", "o1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(
        engine.back().await.unwrap(),
        StepOutcome::MovedBack { .. }
    ));
    assert!(engine.last_error().is_some());

    engine.select_option("q1", "o1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.set_free_text("q2", "Great").await.unwrap();
    assert!(engine.last_error().is_none());
    assert_eq!(rows_for(&store, "q1").await.len(), 1);
}

#[tokio::test]
async fn test_unreadable_catalog_is_terminal() {
    let store: Arc<dyn AnswerStore> = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let mut engine =
        QuestionnaireEngine::start("user-1", &BrokenLoader, store, generator.clone(), fast_config())
            .await;

    assert!(matches!(engine.phase(), EnginePhase::LoadFailed { .. }));
    assert!(engine.current_question().is_none());
    assert_eq!(engine.progress().total_questions, 0);
    assert!(engine.last_error().unwrap().contains("connection refused"));
    assert!(matches!(
        engine.select_option("q1", "o1").await,
        Err(QuestionnaireError::CatalogUnavailable(_))
    ));
    assert!(matches!(
        engine.retry_generation().await,
        Err(QuestionnaireError::CatalogUnavailable(_))
    ));
    assert_eq!(generator.calls(), 0);
}

// ============================================================================
// Resumption
// ============================================================================

#[tokio::test]
async fn test_resume_lands_on_first_unanswered_question() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let loader = StaticCatalogLoader::new(full_catalog());

    let mut first = engine_with(full_catalog(), store.clone(), generator.clone());
    first.select_option("industry", "other").await.unwrap();
    first
        .set_other_text("industry", "other", "Bakery")
        .await
        .unwrap();
    first.proceed().await.unwrap();
    drop(first);

    let resumed = QuestionnaireEngine::resume(
        "user-1",
        &loader,
        store.clone(),
        generator.clone(),
        fast_config(),
    )
    .await;

    assert_eq!(resumed.current_question().unwrap().id, "channels");
    assert_eq!(resumed.session().single_selection("industry"), Some("other"));
    assert_eq!(resumed.session().other_text("industry", "other"), Some("Bakery"));
}

#[tokio::test]
async fn test_resume_with_everything_answered_waits_for_continue() {
    let store = Arc::new(ControlledStore::new());
    let generator = Arc::new(ScriptedGenerator::succeeding());
    let loader = StaticCatalogLoader::new(scenario_a_catalog());

    store
        .upsert_single_answer("user-1", "q1", "o2", None)
        .await
        .unwrap();
    store
        .upsert_free_text_answer("user-1", "q2", "Great")
        .await
        .unwrap();
    let writes = store.writes();

    let mut engine =
        QuestionnaireEngine::resume("user-1", &loader, store.clone(), generator.clone(), fast_config())
            .await;

    assert_eq!(engine.current_question().unwrap().id, "q2");
    assert!(engine.can_advance());
    assert_eq!(generator.calls(), 0);

    assert_eq!(engine.proceed().await.unwrap(), StepOutcome::Completed);
    engine.wait_for_generation().await;
    assert_eq!(generator.calls(), 1);
    assert_eq!(store.writes(), writes);
}
