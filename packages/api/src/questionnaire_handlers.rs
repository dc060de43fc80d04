// ABOUTME: HTTP request handlers for the staged questionnaire
// ABOUTME: Drives the caller's engine session and renders its state as a view

use std::collections::BTreeMap;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use marketwise_questionnaire::{
    AnswerInput, AnswerStore, Diagnosis, OptionId, Progress, QuestionKind, QuestionnaireEngine,
    StepOutcome, StoredAnswer,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::CurrentUser;
use crate::response::{ok, ApiError};
use crate::state::ApiState;

#[derive(Debug, Serialize)]
pub struct OptionView {
    pub id: String,
    pub label: String,
    pub allows_free_text: bool,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub stage_title: String,
    pub prompt: String,
    pub kind: QuestionKind,
    pub max_selections: u32,
    pub category: Option<String>,
    pub options: Vec<OptionView>,
}

/// Unsaved local answer for the current question
#[derive(Debug, Default, Serialize)]
pub struct SelectionView {
    pub selected: Vec<OptionId>,
    pub free_text: Option<String>,
    pub other_text: BTreeMap<OptionId, String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionnaireView {
    pub phase: &'static str,
    pub progress: Progress,
    pub current_question: Option<QuestionView>,
    pub selection: SelectionView,
    pub can_continue: bool,
    pub error: Option<String>,
    pub diagnosis: Option<Diagnosis>,
    pub generation_attempts: u32,
}

impl QuestionnaireView {
    pub fn from_engine(engine: &QuestionnaireEngine) -> Self {
        let session = engine.session();
        let current = engine.current_question();

        let stage_title = engine
            .catalog()
            .and_then(|c| c.stages().get(session.position.stage_index))
            .map(|s| s.stage.title.clone())
            .unwrap_or_default();

        let selection = current
            .map(|question| {
                let selected = match question.kind {
                    QuestionKind::SingleSelect => session
                        .single_selection(&question.id)
                        .map(|o| vec![o.to_string()])
                        .unwrap_or_default(),
                    QuestionKind::MultiSelect => session.multi_selection(&question.id).to_vec(),
                    QuestionKind::FreeText => Vec::new(),
                };
                let other_text = question
                    .options
                    .iter()
                    .filter(|o| o.allows_free_text)
                    .filter_map(|o| {
                        session
                            .other_text(&question.id, &o.id)
                            .map(|text| (o.id.clone(), text.to_string()))
                    })
                    .collect();

                SelectionView {
                    selected,
                    free_text: session.free_text(&question.id).map(str::to_string),
                    other_text,
                }
            })
            .unwrap_or_default();

        let current_question = current.map(|question| QuestionView {
            id: question.id.clone(),
            stage_title,
            prompt: question.prompt().to_string(),
            kind: question.kind,
            max_selections: question.max_selections,
            category: question.category.clone(),
            options: question
                .options
                .iter()
                .map(|o| OptionView {
                    id: o.id.clone(),
                    label: o.label().to_string(),
                    allows_free_text: o.allows_free_text,
                })
                .collect(),
        });

        Self {
            phase: engine.phase().name(),
            progress: engine.progress(),
            current_question,
            selection,
            can_continue: engine.can_advance(),
            error: engine.last_error().map(str::to_string),
            diagnosis: engine.diagnosis().cloned(),
            generation_attempts: engine.generation_attempts(),
        }
    }
}

/// Result of an action together with the refreshed view
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub outcome: StepOutcome,
    pub questionnaire: QuestionnaireView,
}

#[derive(Debug, Deserialize)]
pub struct OptionRequest {
    pub question_id: String,
    pub option_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub question_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct OtherTextRequest {
    pub question_id: String,
    pub option_id: String,
    pub text: String,
}

/// Start or resume the caller's questionnaire and return its view
pub async fn get_questionnaire(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> impl IntoResponse {
    info!("Getting questionnaire for user {}", user.id);

    let session = state.sessions.session(&user.id).await;
    let mut engine = session.lock().await;
    engine.poll_generation().await;
    ok(QuestionnaireView::from_engine(&engine))
}

/// One user action on the questionnaire
enum Step {
    Answer { question_id: String, input: AnswerInput },
    Continue,
    Back,
}

/// Run one step against the caller's session and return the outcome with the new view
async fn run_step(state: &ApiState, user_id: &str, step: Step) -> Result<Response, ApiError> {
    let session = state.sessions.session(user_id).await;
    let mut engine = session.lock().await;

    let result = match step {
        Step::Answer { question_id, input } => engine.answer(&question_id, input).await,
        Step::Continue => engine.proceed().await,
        Step::Back => engine.back().await,
    };
    let outcome = result.map_err(|e| {
        error!("Questionnaire action failed for user {}: {}", user_id, e);
        ApiError::from(e)
    })?;
    engine.poll_generation().await;

    Ok(ok(ActionResponse {
        outcome,
        questionnaire: QuestionnaireView::from_engine(&engine),
    }))
}

pub async fn select_option(
    State(state): State<ApiState>,
    user: CurrentUser,
    Json(request): Json<OptionRequest>,
) -> Result<Response, ApiError> {
    info!(
        "User {} selecting option {} on question {}",
        user.id, request.option_id, request.question_id
    );
    let step = Step::Answer {
        question_id: request.question_id,
        input: AnswerInput::Select {
            option_id: request.option_id,
        },
    };
    run_step(&state, &user.id, step).await
}

pub async fn toggle_option(
    State(state): State<ApiState>,
    user: CurrentUser,
    Json(request): Json<OptionRequest>,
) -> Result<Response, ApiError> {
    info!(
        "User {} toggling option {} on question {}",
        user.id, request.option_id, request.question_id
    );
    let step = Step::Answer {
        question_id: request.question_id,
        input: AnswerInput::Toggle {
            option_id: request.option_id,
        },
    };
    run_step(&state, &user.id, step).await
}

pub async fn set_free_text(
    State(state): State<ApiState>,
    user: CurrentUser,
    Json(request): Json<TextRequest>,
) -> Result<Response, ApiError> {
    info!("User {} editing text on question {}", user.id, request.question_id);
    let step = Step::Answer {
        question_id: request.question_id,
        input: AnswerInput::Text { text: request.text },
    };
    run_step(&state, &user.id, step).await
}

pub async fn set_other_text(
    State(state): State<ApiState>,
    user: CurrentUser,
    Json(request): Json<OtherTextRequest>,
) -> Result<Response, ApiError> {
    info!(
        "User {} editing other text for option {} on question {}",
        user.id, request.option_id, request.question_id
    );
    let step = Step::Answer {
        question_id: request.question_id,
        input: AnswerInput::OtherText {
            option_id: request.option_id,
            text: request.text,
        },
    };
    run_step(&state, &user.id, step).await
}

/// Explicit continue on the current question
pub async fn proceed(State(state): State<ApiState>, user: CurrentUser) -> Result<Response, ApiError> {
    info!("User {} continuing questionnaire", user.id);
    run_step(&state, &user.id, Step::Continue).await
}

pub async fn back(State(state): State<ApiState>, user: CurrentUser) -> Result<Response, ApiError> {
    info!("User {} going back in questionnaire", user.id);
    run_step(&state, &user.id, Step::Back).await
}

/// Retry diagnosis generation after a failure
pub async fn retry_generation(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> Result<Response, ApiError> {
    info!("User {} retrying diagnosis generation", user.id);

    let session = state.sessions.session(&user.id).await;
    let mut engine = session.lock().await;
    engine.retry_generation().await.map_err(|e| {
        error!("Retry refused for user {}: {}", user.id, e);
        ApiError::from(e)
    })?;

    Ok(ok(QuestionnaireView::from_engine(&engine)))
}

/// The caller's stored answers in the order they were saved
pub async fn list_answers(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> Result<Response, ApiError> {
    info!("Listing stored answers for user {}", user.id);
    let answers: Vec<StoredAnswer> = state.questionnaire.list_answers(&user.id).await?;
    Ok(ok(answers))
}
