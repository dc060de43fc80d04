// ABOUTME: Session-local answer state for one questionnaire run
// ABOUTME: Current position, selections and unsaved text drafts, rebuilt from stored answers on resume

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::catalog::{Catalog, Position};
use crate::types::{Answer, OptionId, QuestionId, QuestionKind, StoredAnswer};

/// Options chosen for one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum Selection {
    Single(OptionId),
    /// Oldest selection first
    Multi(Vec<OptionId>),
}

impl Selection {
    pub fn contains(&self, option_id: &str) -> bool {
        match self {
            Selection::Single(selected) => selected == option_id,
            Selection::Multi(selected) => selected.iter().any(|o| o == option_id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionProgress {
    pub position: Position,
    pub responses: HashMap<QuestionId, Selection>,
    pub free_text_drafts: HashMap<QuestionId, String>,
    /// Elaboration text for "other" options, per question then option
    pub other_option_drafts: HashMap<QuestionId, HashMap<OptionId, String>>,
}

impl SessionProgress {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn single_selection(&self, question_id: &str) -> Option<&str> {
        match self.responses.get(question_id) {
            Some(Selection::Single(option_id)) => Some(option_id),
            _ => None,
        }
    }

    pub fn multi_selection(&self, question_id: &str) -> &[OptionId] {
        match self.responses.get(question_id) {
            Some(Selection::Multi(selected)) => selected,
            _ => &[],
        }
    }

    pub fn free_text(&self, question_id: &str) -> Option<&str> {
        self.free_text_drafts.get(question_id).map(String::as_str)
    }

    pub fn other_text(&self, question_id: &str, option_id: &str) -> Option<&str> {
        self.other_option_drafts
            .get(question_id)?
            .get(option_id)
            .map(String::as_str)
    }

    pub fn set_other_text(&mut self, question_id: &str, option_id: &str, text: String) {
        self.other_option_drafts
            .entry(question_id.to_string())
            .or_default()
            .insert(option_id.to_string(), text);
    }

    /// Rebuild local state from stored answers.
    ///
    /// Answers are applied in creation order, so multi-select selections keep
    /// the order they were stored in. Returns the ids of answered questions.
    pub fn restore(catalog: &Catalog, answers: &[StoredAnswer]) -> (Self, HashSet<QuestionId>) {
        let mut ordered: Vec<&StoredAnswer> = answers.iter().collect();
        ordered.sort_by_key(|a| a.created_at);

        let mut session = Self::default();
        let mut answered = HashSet::new();

        for stored in ordered {
            let Some(question) = catalog.find_question(&stored.question_id) else {
                warn!(
                    "Ignoring stored answer for unknown question {}",
                    stored.question_id
                );
                continue;
            };

            match (question.kind, &stored.answer) {
                (QuestionKind::SingleSelect, Answer::SelectedOption { option_id, text }) => {
                    session
                        .responses
                        .insert(question.id.clone(), Selection::Single(option_id.clone()));
                    if let Some(text) = text {
                        session.set_other_text(&question.id, option_id, text.clone());
                    }
                }
                (QuestionKind::MultiSelect, Answer::SelectedOption { option_id, text }) => {
                    let entry = session
                        .responses
                        .entry(question.id.clone())
                        .or_insert_with(|| Selection::Multi(Vec::new()));
                    if let Selection::Multi(selected) = entry {
                        if !selected.contains(option_id) {
                            selected.push(option_id.clone());
                        }
                    }
                    if let Some(text) = text {
                        session.set_other_text(&question.id, option_id, text.clone());
                    }
                }
                (QuestionKind::FreeText, answer) => match answer.text() {
                    Some(text) => {
                        session
                            .free_text_drafts
                            .insert(question.id.clone(), text.to_string());
                    }
                    None => continue,
                },
                (kind, _) => {
                    warn!(
                        "Ignoring free-text answer stored for {} question {}",
                        kind, question.id
                    );
                    continue;
                }
            }

            answered.insert(question.id.clone());
        }

        (session, answered)
    }
}

/// First question in traversal order without a stored answer
pub fn first_unanswered(catalog: &Catalog, answered: &HashSet<QuestionId>) -> Option<Position> {
    catalog
        .positions()
        .find(|(_, q)| !answered.contains(&q.id))
        .map(|(position, _)| position)
}
