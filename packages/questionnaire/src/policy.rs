// ABOUTME: Per-kind answer commit policies
// ABOUTME: Local state transitions, advance gating and the persistence intent for each question kind

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{QuestionnaireError, Result};
use crate::session::{Selection, SessionProgress};
use crate::store::AnswerStore;
use crate::types::{OptionId, Question, QuestionId, QuestionKind};

/// A user action on the current question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AnswerInput {
    Select { option_id: OptionId },
    Toggle { option_id: OptionId },
    Text { text: String },
    OtherText { option_id: OptionId, text: String },
}

impl AnswerInput {
    pub fn name(&self) -> &'static str {
        match self {
            AnswerInput::Select { .. } => "select",
            AnswerInput::Toggle { .. } => "toggle",
            AnswerInput::Text { .. } => "text",
            AnswerInput::OtherText { .. } => "other_text",
        }
    }
}

/// What applying an input asks of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOutcome {
    /// Keep the pointer; wait for more input or an explicit continue
    Pending,
    /// Persist and advance right away
    CommitNow,
}

/// The write a commit performs against the answer store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PersistIntent {
    Single {
        question_id: QuestionId,
        option_id: OptionId,
        free_text: Option<String>,
    },
    Multi {
        question_id: QuestionId,
        selected: Vec<OptionId>,
        free_text_by_option: BTreeMap<OptionId, String>,
    },
    FreeText {
        question_id: QuestionId,
        text: String,
    },
}

impl PersistIntent {
    pub fn question_id(&self) -> &str {
        match self {
            PersistIntent::Single { question_id, .. }
            | PersistIntent::Multi { question_id, .. }
            | PersistIntent::FreeText { question_id, .. } => question_id,
        }
    }

    pub async fn apply(&self, store: &dyn AnswerStore, user_id: &str) -> Result<()> {
        match self {
            PersistIntent::Single {
                question_id,
                option_id,
                free_text,
            } => {
                store
                    .upsert_single_answer(user_id, question_id, option_id, free_text.as_deref())
                    .await
            }
            PersistIntent::Multi {
                question_id,
                selected,
                free_text_by_option,
            } => {
                store
                    .reconcile_multi_answers(user_id, question_id, selected, free_text_by_option)
                    .await
            }
            PersistIntent::FreeText { question_id, text } => {
                store
                    .upsert_free_text_answer(user_id, question_id, text)
                    .await
            }
        }
    }
}

/// Answer handling for one question kind
pub trait AnswerCommitPolicy: Send + Sync {
    fn kind(&self) -> QuestionKind;

    /// Fold `input` into the session state
    fn apply_local(
        &self,
        question: &Question,
        state: &mut SessionProgress,
        input: AnswerInput,
    ) -> Result<LocalOutcome>;

    /// Whether continue may be invoked for `question`
    fn can_advance(&self, question: &Question, state: &SessionProgress) -> bool;

    /// The write for the current local answer, `None` while it cannot advance
    fn commit(&self, question: &Question, state: &SessionProgress) -> Option<PersistIntent>;
}

pub struct SingleSelectPolicy;
pub struct MultiSelectPolicy;
pub struct FreeTextPolicy;

static SINGLE_SELECT: SingleSelectPolicy = SingleSelectPolicy;
static MULTI_SELECT: MultiSelectPolicy = MultiSelectPolicy;
static FREE_TEXT: FreeTextPolicy = FreeTextPolicy;

pub fn policy_for(kind: QuestionKind) -> &'static dyn AnswerCommitPolicy {
    match kind {
        QuestionKind::SingleSelect => &SINGLE_SELECT,
        QuestionKind::MultiSelect => &MULTI_SELECT,
        QuestionKind::FreeText => &FREE_TEXT,
    }
}

fn mismatch(input: &AnswerInput, kind: QuestionKind) -> QuestionnaireError {
    QuestionnaireError::InputMismatch {
        input: input.name(),
        kind: kind.as_str(),
    }
}

fn require_option(question: &Question, option_id: &str) -> Result<()> {
    match question.option(option_id) {
        Some(_) => Ok(()),
        None => Err(QuestionnaireError::OptionNotFound {
            question_id: question.id.clone(),
            option_id: option_id.to_string(),
        }),
    }
}

fn require_other_option(question: &Question, option_id: &str) -> Result<()> {
    require_option(question, option_id)?;
    match question.option(option_id) {
        Some(option) if option.allows_free_text => Ok(()),
        _ => Err(QuestionnaireError::InputMismatch {
            input: "other_text",
            kind: "option without free text",
        }),
    }
}

fn has_text(text: Option<&str>) -> bool {
    text.is_some_and(|t| !t.trim().is_empty())
}

impl AnswerCommitPolicy for SingleSelectPolicy {
    fn kind(&self) -> QuestionKind {
        QuestionKind::SingleSelect
    }

    fn apply_local(
        &self,
        question: &Question,
        state: &mut SessionProgress,
        input: AnswerInput,
    ) -> Result<LocalOutcome> {
        match input {
            AnswerInput::Select { option_id } => {
                require_option(question, &option_id)?;
                let is_other = question
                    .option(&option_id)
                    .is_some_and(|o| o.allows_free_text);
                state
                    .responses
                    .insert(question.id.clone(), Selection::Single(option_id));

                if is_other {
                    Ok(LocalOutcome::Pending)
                } else {
                    Ok(LocalOutcome::CommitNow)
                }
            }
            AnswerInput::OtherText { option_id, text } => {
                require_other_option(question, &option_id)?;
                state.set_other_text(&question.id, &option_id, text);
                Ok(LocalOutcome::Pending)
            }
            other => Err(mismatch(&other, self.kind())),
        }
    }

    fn can_advance(&self, question: &Question, state: &SessionProgress) -> bool {
        let Some(option_id) = state.single_selection(&question.id) else {
            return false;
        };
        match question.option(option_id) {
            Some(option) if option.allows_free_text => {
                has_text(state.other_text(&question.id, option_id))
            }
            Some(_) => true,
            None => false,
        }
    }

    fn commit(&self, question: &Question, state: &SessionProgress) -> Option<PersistIntent> {
        if !self.can_advance(question, state) {
            return None;
        }
        let option_id = state.single_selection(&question.id)?;
        let option = question.option(option_id)?;
        let free_text = if option.allows_free_text {
            state
                .other_text(&question.id, option_id)
                .map(|t| t.trim().to_string())
        } else {
            None
        };

        Some(PersistIntent::Single {
            question_id: question.id.clone(),
            option_id: option_id.to_string(),
            free_text,
        })
    }
}

impl AnswerCommitPolicy for MultiSelectPolicy {
    fn kind(&self) -> QuestionKind {
        QuestionKind::MultiSelect
    }

    fn apply_local(
        &self,
        question: &Question,
        state: &mut SessionProgress,
        input: AnswerInput,
    ) -> Result<LocalOutcome> {
        match input {
            AnswerInput::Toggle { option_id } => {
                require_option(question, &option_id)?;
                let cap = question.max_selections.max(1) as usize;
                let entry = state
                    .responses
                    .entry(question.id.clone())
                    .or_insert_with(|| Selection::Multi(Vec::new()));

                if let Selection::Single(previous) = entry {
                    *entry = Selection::Multi(vec![previous.clone()]);
                }

                if let Selection::Multi(selected) = entry {
                    if let Some(index) = selected.iter().position(|o| *o == option_id) {
                        selected.remove(index);
                    } else {
                        while selected.len() >= cap {
                            selected.remove(0);
                        }
                        selected.push(option_id);
                    }
                }
                Ok(LocalOutcome::Pending)
            }
            AnswerInput::OtherText { option_id, text } => {
                require_other_option(question, &option_id)?;
                state.set_other_text(&question.id, &option_id, text);
                Ok(LocalOutcome::Pending)
            }
            other => Err(mismatch(&other, self.kind())),
        }
    }

    fn can_advance(&self, question: &Question, state: &SessionProgress) -> bool {
        let selected = state.multi_selection(&question.id);
        !selected.is_empty()
            && selected.iter().all(|option_id| match question.option(option_id) {
                Some(option) if option.allows_free_text => {
                    has_text(state.other_text(&question.id, option_id))
                }
                Some(_) => true,
                None => false,
            })
    }

    fn commit(&self, question: &Question, state: &SessionProgress) -> Option<PersistIntent> {
        if !self.can_advance(question, state) {
            return None;
        }
        let selected = state.multi_selection(&question.id).to_vec();
        let free_text_by_option = selected
            .iter()
            .filter(|o| question.option(o).is_some_and(|opt| opt.allows_free_text))
            .filter_map(|o| {
                state
                    .other_text(&question.id, o)
                    .map(|t| (o.clone(), t.trim().to_string()))
            })
            .collect();

        Some(PersistIntent::Multi {
            question_id: question.id.clone(),
            selected,
            free_text_by_option,
        })
    }
}

impl AnswerCommitPolicy for FreeTextPolicy {
    fn kind(&self) -> QuestionKind {
        QuestionKind::FreeText
    }

    fn apply_local(
        &self,
        question: &Question,
        state: &mut SessionProgress,
        input: AnswerInput,
    ) -> Result<LocalOutcome> {
        match input {
            AnswerInput::Text { text } => {
                state.free_text_drafts.insert(question.id.clone(), text);
                Ok(LocalOutcome::Pending)
            }
            other => Err(mismatch(&other, self.kind())),
        }
    }

    fn can_advance(&self, question: &Question, state: &SessionProgress) -> bool {
        has_text(state.free_text(&question.id))
    }

    fn commit(&self, question: &Question, state: &SessionProgress) -> Option<PersistIntent> {
        let text = state.free_text(&question.id)?.trim();
        if text.is_empty() {
            return None;
        }
        Some(PersistIntent::FreeText {
            question_id: question.id.clone(),
            text: text.to_string(),
        })
    }
}
