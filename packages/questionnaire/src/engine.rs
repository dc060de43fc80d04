// ABOUTME: Questionnaire engine walking one user through the staged catalog
// ABOUTME: Applies answers through per-kind policies, persists commits and triggers diagnosis generation

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use marketwise_config::{DEFAULT_GENERATION_TIMEOUT_SECS, DEFAULT_PERSIST_TIMEOUT_MS};

use crate::catalog::{Catalog, Position};
use crate::error::{GenerationError, QuestionnaireError, Result};
use crate::policy::{policy_for, AnswerInput, LocalOutcome, PersistIntent};
use crate::progress::{calculate_progress, Progress};
use crate::session::{first_unanswered, SessionProgress};
use crate::store::{AnswerStore, CatalogLoader, DiagnosisGenerator};
use crate::types::{Diagnosis, Question, QuestionId, StoredAnswer, UserId};

type GenerationResult = std::result::Result<Diagnosis, GenerationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long navigation waits for an answer write before moving on
    pub persist_timeout: Duration,
    /// Upper bound for one diagnosis generation attempt
    pub generation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_timeout: Duration::from_millis(DEFAULT_PERSIST_TIMEOUT_MS),
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EnginePhase {
    /// Terminal: the catalog could not be loaded
    LoadFailed { message: String },
    InProgress { position: Position },
    Completed,
    GeneratingDiagnosis,
    DiagnosisReady { diagnosis: Diagnosis },
    GenerationFailed { message: String },
}

impl EnginePhase {
    pub fn name(&self) -> &'static str {
        match self {
            EnginePhase::LoadFailed { .. } => "load_failed",
            EnginePhase::InProgress { .. } => "in_progress",
            EnginePhase::Completed => "completed",
            EnginePhase::GeneratingDiagnosis => "generating_diagnosis",
            EnginePhase::DiagnosisReady { .. } => "diagnosis_ready",
            EnginePhase::GenerationFailed { .. } => "generation_failed",
        }
    }
}

/// Result of one user action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Local state changed; the pointer stays
    Updated,
    Advanced { position: Position },
    /// The last question was committed and generation has started
    Completed,
    /// The write failed; the pointer stays and the local answer is kept
    PersistFailed { message: String },
    MovedBack { position: Position },
    /// Nothing to do, e.g. back on the very first question
    Unchanged,
}

/// Broadcast when a user finishes the questionnaire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionEvent {
    pub user_id: UserId,
    pub completed_at: DateTime<Utc>,
}

/// An answer write that outlived the persist timeout
struct PendingWrite {
    intent: PersistIntent,
    handle: JoinHandle<Result<()>>,
}

/// Most recent save failure, kept until that answer is stored
struct PersistFailure {
    /// None when the failure is not tied to one question
    question_id: Option<QuestionId>,
    message: String,
}

pub struct QuestionnaireEngine {
    user_id: UserId,
    catalog: Option<Catalog>,
    session: SessionProgress,
    phase: EnginePhase,
    store: Arc<dyn AnswerStore>,
    generator: Arc<dyn DiagnosisGenerator>,
    config: EngineConfig,
    /// Last write known to be applied (or in flight) per question
    committed: HashMap<QuestionId, PersistIntent>,
    background_writes: Vec<PendingWrite>,
    /// Intents to write again before generation: background writes that
    /// failed, plus those still unconfirmed when generation started
    unconfirmed: Vec<PersistIntent>,
    generation: Option<JoinHandle<GenerationResult>>,
    generation_attempts: u32,
    persist_error: Option<PersistFailure>,
    completed_tx: broadcast::Sender<CompletionEvent>,
}

impl QuestionnaireEngine {
    /// Engine over an already loaded catalog, positioned at the first question
    pub fn with_catalog(
        user_id: impl Into<UserId>,
        catalog: Catalog,
        store: Arc<dyn AnswerStore>,
        generator: Arc<dyn DiagnosisGenerator>,
        config: EngineConfig,
    ) -> Self {
        let position = catalog.first_position().unwrap_or_default();
        let (completed_tx, _) = broadcast::channel(8);

        Self {
            user_id: user_id.into(),
            catalog: Some(catalog),
            session: SessionProgress::new(position),
            phase: EnginePhase::InProgress { position },
            store,
            generator,
            config,
            committed: HashMap::new(),
            background_writes: Vec::new(),
            unconfirmed: Vec::new(),
            generation: None,
            generation_attempts: 0,
            persist_error: None,
            completed_tx,
        }
    }

    /// Load the catalog and start a fresh session.
    ///
    /// A load failure is not returned: the engine enters the terminal
    /// `LoadFailed` phase and rejects every action.
    pub async fn start(
        user_id: impl Into<UserId>,
        loader: &dyn CatalogLoader,
        store: Arc<dyn AnswerStore>,
        generator: Arc<dyn DiagnosisGenerator>,
        config: EngineConfig,
    ) -> Self {
        let user_id = user_id.into();
        info!("Starting questionnaire for user {}", user_id);

        match loader.load_catalog(&user_id).await {
            Ok(catalog) => Self::with_catalog(user_id, catalog, store, generator, config),
            Err(e) => {
                error!("Failed to load questionnaire for user {}: {}", user_id, e);
                let (completed_tx, _) = broadcast::channel(8);
                Self {
                    user_id,
                    catalog: None,
                    session: SessionProgress::default(),
                    phase: EnginePhase::LoadFailed {
                        message: e.to_string(),
                    },
                    store,
                    generator,
                    config,
                    committed: HashMap::new(),
                    background_writes: Vec::new(),
                    unconfirmed: Vec::new(),
                    generation: None,
                    generation_attempts: 0,
                    persist_error: None,
                    completed_tx,
                }
            }
        }
    }

    /// Start a session rebuilt from the user's stored answers.
    ///
    /// The pointer lands on the first unanswered question, or on the final
    /// question when everything is answered. Resuming never triggers
    /// generation by itself.
    pub async fn resume(
        user_id: impl Into<UserId>,
        loader: &dyn CatalogLoader,
        store: Arc<dyn AnswerStore>,
        generator: Arc<dyn DiagnosisGenerator>,
        config: EngineConfig,
    ) -> Self {
        let mut engine = Self::start(user_id, loader, store, generator, config).await;
        if engine.catalog.is_none() {
            return engine;
        }

        match engine.store.list_answers(&engine.user_id).await {
            Ok(answers) => engine.restore(&answers),
            Err(e) => {
                error!(
                    "Failed to read stored answers for user {}: {}",
                    engine.user_id, e
                );
                engine.persist_error = Some(PersistFailure {
                    question_id: None,
                    message: format!("Could not restore saved answers: {}", e),
                });
            }
        }
        engine
    }

    fn restore(&mut self, answers: &[StoredAnswer]) {
        let Some(catalog) = &self.catalog else {
            return;
        };
        let (mut session, answered) = SessionProgress::restore(catalog, answers);
        let position = first_unanswered(catalog, &answered)
            .or_else(|| catalog.last_position())
            .unwrap_or_default();
        session.position = position;

        for question_id in &answered {
            if let Some(question) = catalog.find_question(question_id) {
                if let Some(intent) = policy_for(question.kind).commit(question, &session) {
                    self.committed.insert(question_id.clone(), intent);
                }
            }
        }

        info!(
            "Resumed questionnaire for user {} with {} answered questions",
            self.user_id,
            answered.len()
        );
        self.session = session;
        self.phase = EnginePhase::InProgress { position };
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn phase(&self) -> &EnginePhase {
        &self.phase
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    pub fn session(&self) -> &SessionProgress {
        &self.session
    }

    pub fn generation_attempts(&self) -> u32 {
        self.generation_attempts
    }

    pub fn subscribe_completed(&self) -> broadcast::Receiver<CompletionEvent> {
        self.completed_tx.subscribe()
    }

    /// The question to render, only while in progress
    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            EnginePhase::InProgress { position } => self.catalog.as_ref()?.question_at(position),
            _ => None,
        }
    }

    pub fn progress(&self) -> Progress {
        match (&self.phase, &self.catalog) {
            (EnginePhase::InProgress { position }, Some(catalog)) => {
                calculate_progress(catalog, *position)
            }
            (EnginePhase::LoadFailed { .. }, _) | (_, None) => Progress {
                total_questions: 0,
                completed_questions: 0,
                percent: 0.0,
            },
            (_, Some(catalog)) => Progress::complete(catalog),
        }
    }

    /// Whether continue may be invoked on the current question
    pub fn can_advance(&self) -> bool {
        self.current_question()
            .is_some_and(|q| policy_for(q.kind).can_advance(q, &self.session))
    }

    /// Plain-language message for the most recent failure, if any
    pub fn last_error(&self) -> Option<&str> {
        match &self.phase {
            EnginePhase::LoadFailed { message } | EnginePhase::GenerationFailed { message } => {
                Some(message)
            }
            _ => self.persist_error.as_ref().map(|f| f.message.as_str()),
        }
    }

    pub fn diagnosis(&self) -> Option<&Diagnosis> {
        match &self.phase {
            EnginePhase::DiagnosisReady { diagnosis } => Some(diagnosis),
            _ => None,
        }
    }

    pub async fn select_option(&mut self, question_id: &str, option_id: &str) -> Result<StepOutcome> {
        let input = AnswerInput::Select {
            option_id: option_id.to_string(),
        };
        self.answer(question_id, input).await
    }

    pub async fn toggle_option(&mut self, question_id: &str, option_id: &str) -> Result<StepOutcome> {
        let input = AnswerInput::Toggle {
            option_id: option_id.to_string(),
        };
        self.answer(question_id, input).await
    }

    pub async fn set_free_text(&mut self, question_id: &str, text: &str) -> Result<StepOutcome> {
        let input = AnswerInput::Text {
            text: text.to_string(),
        };
        self.answer(question_id, input).await
    }

    pub async fn set_other_text(
        &mut self,
        question_id: &str,
        option_id: &str,
        text: &str,
    ) -> Result<StepOutcome> {
        let input = AnswerInput::OtherText {
            option_id: option_id.to_string(),
            text: text.to_string(),
        };
        self.answer(question_id, input).await
    }

    /// Apply `input` to the current question, committing when its policy asks to
    pub async fn answer(&mut self, question_id: &str, input: AnswerInput) -> Result<StepOutcome> {
        let position = self.require_in_progress()?;
        self.settle_background_writes().await;

        let question = self.question_at(position)?.clone();
        if question.id != question_id {
            return Err(QuestionnaireError::NotCurrentQuestion {
                question_id: question_id.to_string(),
            });
        }

        debug!(
            "User {} {} on question {}",
            self.user_id,
            input.name(),
            question.id
        );
        match policy_for(question.kind).apply_local(&question, &mut self.session, input)? {
            LocalOutcome::Pending => Ok(StepOutcome::Updated),
            LocalOutcome::CommitNow => self.commit(&question).await,
        }
    }

    /// Explicit continue: commit the current answer and advance
    pub async fn proceed(&mut self) -> Result<StepOutcome> {
        let position = self.require_in_progress()?;
        self.settle_background_writes().await;

        let question = self.question_at(position)?.clone();
        if !policy_for(question.kind).can_advance(&question, &self.session) {
            return Err(QuestionnaireError::ValidationBlocked);
        }
        self.commit(&question).await
    }

    /// Step to the previous question; committed answers stay as they are
    pub async fn back(&mut self) -> Result<StepOutcome> {
        let position = self.require_in_progress()?;
        self.settle_background_writes().await;

        let previous = self
            .catalog
            .as_ref()
            .and_then(|c| c.previous_position(position));

        match previous {
            Some(previous) => {
                self.move_to(previous);
                Ok(StepOutcome::MovedBack { position: previous })
            }
            None => Ok(StepOutcome::Unchanged),
        }
    }

    fn require_in_progress(&self) -> Result<Position> {
        match &self.phase {
            EnginePhase::InProgress { position } => Ok(*position),
            EnginePhase::LoadFailed { message } => {
                Err(QuestionnaireError::CatalogUnavailable(message.clone()))
            }
            _ => Err(QuestionnaireError::NotInProgress),
        }
    }

    fn question_at(&self, position: Position) -> Result<&Question> {
        self.catalog
            .as_ref()
            .and_then(|c| c.question_at(position))
            .ok_or_else(|| {
                QuestionnaireError::QuestionNotFound(format!(
                    "stage {} question {}",
                    position.stage_index, position.question_index
                ))
            })
    }

    fn move_to(&mut self, position: Position) {
        self.session.position = position;
        self.phase = EnginePhase::InProgress { position };
    }

    async fn commit(&mut self, question: &Question) -> Result<StepOutcome> {
        let intent = policy_for(question.kind)
            .commit(question, &self.session)
            .ok_or(QuestionnaireError::ValidationBlocked)?;

        if self.committed.get(&question.id) == Some(&intent) {
            debug!("Answer to {} unchanged, skipping write", question.id);
        } else if let Some(message) = self.persist(intent).await {
            return Ok(StepOutcome::PersistFailed { message });
        }

        let resolved = self.persist_error.as_ref().is_some_and(|f| {
            f.question_id
                .as_ref()
                .map_or(true, |failed| *failed == question.id)
        });
        if resolved {
            self.persist_error = None;
        }
        Ok(self.advance())
    }

    /// Write `intent`, waiting at most the persist timeout.
    ///
    /// Returns the failure message when the write failed in time. A write
    /// that is still running is tracked and checked on later actions.
    async fn persist(&mut self, intent: PersistIntent) -> Option<String> {
        let question_id = intent.question_id().to_string();

        // A newer answer supersedes an older write still in flight
        self.background_writes.retain(|pending| {
            if pending.intent.question_id() == question_id {
                pending.handle.abort();
                false
            } else {
                true
            }
        });

        let store = Arc::clone(&self.store);
        let user_id = self.user_id.clone();
        let task_intent = intent.clone();
        let mut handle =
            tokio::spawn(async move { task_intent.apply(store.as_ref(), &user_id).await });

        match tokio::time::timeout(self.config.persist_timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => {
                debug!("Saved answer to {} for user {}", question_id, self.user_id);
                self.unconfirmed.retain(|i| i.question_id() != question_id.as_str());
                self.committed.insert(question_id, intent);
                None
            }
            Ok(Ok(Err(e))) => Some(self.record_persist_failure(&question_id, persist_reason(e))),
            Ok(Err(join_error)) => {
                Some(self.record_persist_failure(&question_id, join_error.to_string()))
            }
            Err(_) => {
                warn!(
                    "Saving answer to {} for user {} is taking longer than {:?}, continuing",
                    question_id, self.user_id, self.config.persist_timeout
                );
                self.unconfirmed.retain(|i| i.question_id() != question_id.as_str());
                self.committed.insert(question_id, intent.clone());
                self.background_writes.push(PendingWrite { intent, handle });
                None
            }
        }
    }

    fn record_persist_failure(&mut self, question_id: &str, reason: String) -> String {
        error!(
            "Failed to save answer to {} for user {}: {}",
            question_id, self.user_id, reason
        );
        let message = QuestionnaireError::AnswerPersist(reason).to_string();
        self.persist_error = Some(PersistFailure {
            question_id: Some(question_id.to_string()),
            message: message.clone(),
        });
        message
    }

    /// Collect the results of background writes that have finished
    async fn settle_background_writes(&mut self) {
        let mut still_running = Vec::new();

        for pending in std::mem::take(&mut self.background_writes) {
            if !pending.handle.is_finished() {
                still_running.push(pending);
                continue;
            }

            let question_id = pending.intent.question_id().to_string();
            let failure = match pending.handle.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(persist_reason(e)),
                Err(join_error) => Some(join_error.to_string()),
            };

            match failure {
                None => debug!("Background save of {} finished", question_id),
                Some(reason) => {
                    if self.committed.get(&question_id) == Some(&pending.intent) {
                        self.committed.remove(&question_id);
                    }
                    self.record_persist_failure(&question_id, reason);
                    self.unconfirmed.push(pending.intent);
                }
            }
        }

        self.background_writes = still_running;
    }

    fn advance(&mut self) -> StepOutcome {
        let current = self.session.position;
        let next = self
            .catalog
            .as_ref()
            .and_then(|c| c.next_position(current));

        match next {
            Some(next) => {
                self.move_to(next);
                StepOutcome::Advanced { position: next }
            }
            None => {
                self.complete();
                StepOutcome::Completed
            }
        }
    }

    fn complete(&mut self) {
        info!("User {} completed the questionnaire", self.user_id);
        self.phase = EnginePhase::Completed;

        let event = CompletionEvent {
            user_id: self.user_id.clone(),
            completed_at: Utc::now(),
        };
        if self.completed_tx.send(event).is_err() {
            debug!("No completion subscribers for user {}", self.user_id);
        }

        let in_flight: Vec<PersistIntent> = self
            .background_writes
            .iter()
            .map(|pending| pending.intent.clone())
            .collect();
        self.unconfirmed.extend(in_flight);
        let pending = std::mem::take(&mut self.background_writes);
        self.start_generation(pending);
    }

    fn start_generation(&mut self, pending: Vec<PendingWrite>) {
        self.generation_attempts += 1;
        info!(
            "Generating diagnosis for user {} (attempt {})",
            self.user_id, self.generation_attempts
        );

        let store = Arc::clone(&self.store);
        let generator = Arc::clone(&self.generator);
        let user_id = self.user_id.clone();
        let reapply: Vec<PersistIntent> = self
            .unconfirmed
            .iter()
            .filter(|intent| {
                !pending
                    .iter()
                    .any(|p| p.intent.question_id() == intent.question_id())
            })
            .cloned()
            .collect();
        let timeout = self.config.generation_timeout;

        let attempt = async move {
            confirm_writes(store.as_ref(), &user_id, pending, reapply).await?;
            generator.generate_diagnosis(&user_id).await
        };

        self.generation = Some(tokio::spawn(async move {
            match tokio::time::timeout(timeout, attempt).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::TimedOut(timeout.as_secs())),
            }
        }));
        self.phase = EnginePhase::GeneratingDiagnosis;
    }

    fn finish_generation(
        &mut self,
        result: std::result::Result<GenerationResult, tokio::task::JoinError>,
    ) {
        let result = result.unwrap_or_else(|join_error| {
            Err(GenerationError::Failed(format!(
                "generation task ended unexpectedly: {}",
                join_error
            )))
        });

        match result {
            Ok(diagnosis) => {
                info!("Diagnosis ready for user {}", self.user_id);
                self.unconfirmed.clear();
                self.persist_error = None;
                self.phase = EnginePhase::DiagnosisReady { diagnosis };
            }
            Err(e) => {
                error!("Diagnosis generation failed for user {}: {}", self.user_id, e);
                self.phase = EnginePhase::GenerationFailed {
                    message: e.to_string(),
                };
            }
        }
    }

    /// Pick up the generation result if it has arrived, without waiting
    pub async fn poll_generation(&mut self) -> &EnginePhase {
        let finished = self.generation.as_ref().is_some_and(|h| h.is_finished());
        if finished {
            if let Some(handle) = self.generation.take() {
                let result = handle.await;
                self.finish_generation(result);
            }
        }
        &self.phase
    }

    /// Wait for the in-flight generation, if any, to settle
    pub async fn wait_for_generation(&mut self) -> &EnginePhase {
        if let Some(handle) = self.generation.take() {
            let result = handle.await;
            self.finish_generation(result);
        }
        &self.phase
    }

    /// Re-run generation after a failure without replaying any question
    pub async fn retry_generation(&mut self) -> Result<()> {
        self.poll_generation().await;

        match &self.phase {
            EnginePhase::GenerationFailed { .. } => {
                info!("Retrying diagnosis generation for user {}", self.user_id);
                self.start_generation(Vec::new());
                Ok(())
            }
            EnginePhase::GeneratingDiagnosis => Err(QuestionnaireError::GenerationInFlight),
            EnginePhase::LoadFailed { message } => {
                Err(QuestionnaireError::CatalogUnavailable(message.clone()))
            }
            _ => Err(QuestionnaireError::NothingToRetry),
        }
    }
}

/// Store errors already carry the "failed to save" wording
fn persist_reason(error: QuestionnaireError) -> String {
    match error {
        QuestionnaireError::AnswerPersist(reason) => reason,
        other => other.to_string(),
    }
}

/// Make sure every answer is stored before the generator reads them.
///
/// Pending writes are awaited; any that failed, and every intent in
/// `reapply`, is written again.
async fn confirm_writes(
    store: &dyn AnswerStore,
    user_id: &str,
    pending: Vec<PendingWrite>,
    reapply: Vec<PersistIntent>,
) -> std::result::Result<(), GenerationError> {
    let mut to_write = reapply;

    for write in pending {
        match write.handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    "Answer to {} was not saved ({}), retrying",
                    write.intent.question_id(),
                    e
                );
                to_write.push(write.intent);
            }
            Err(e) => {
                warn!(
                    "Answer to {} was not saved ({}), retrying",
                    write.intent.question_id(),
                    e
                );
                to_write.push(write.intent);
            }
        }
    }

    for intent in to_write {
        intent.apply(store, user_id).await.map_err(|e| {
            GenerationError::Failed(format!(
                "answer to question {} could not be saved: {}",
                intent.question_id(),
                e
            ))
        })?;
    }

    Ok(())
}
