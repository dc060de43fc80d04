// ABOUTME: Collaborator contracts consumed by the questionnaire engine
// ABOUTME: Catalog loading, answer persistence and diagnosis generation, plus in-memory implementations

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::catalog::Catalog;
use crate::error::{GenerationError, Result};
use crate::types::{Answer, Diagnosis, OptionId, StoredAnswer};

#[async_trait]
pub trait CatalogLoader: Send + Sync {
    /// Load the ordered catalog shown to `user_id`
    async fn load_catalog(&self, user_id: &str) -> Result<Catalog>;
}

/// Durable answers, isolated per user.
///
/// Every write is idempotent: repeating a call with the same arguments leaves
/// the stored rows untouched.
#[async_trait]
pub trait AnswerStore: Send + Sync {
    /// Replace whatever is stored for the question with one option row
    async fn upsert_single_answer(
        &self,
        user_id: &str,
        question_id: &str,
        option_id: &str,
        free_text: Option<&str>,
    ) -> Result<()>;

    /// Diff the stored option rows against `selected`: delete deselected,
    /// insert newly selected, leave unchanged rows alone
    async fn reconcile_multi_answers(
        &self,
        user_id: &str,
        question_id: &str,
        selected: &[OptionId],
        free_text_by_option: &BTreeMap<OptionId, String>,
    ) -> Result<()>;

    /// Replace whatever is stored for the question with one text-only row
    async fn upsert_free_text_answer(
        &self,
        user_id: &str,
        question_id: &str,
        text: &str,
    ) -> Result<()>;

    /// All rows for the user in creation order
    async fn list_answers(&self, user_id: &str) -> Result<Vec<StoredAnswer>>;
}

#[async_trait]
pub trait DiagnosisGenerator: Send + Sync {
    /// Long running; safe to call again after a failure
    async fn generate_diagnosis(
        &self,
        user_id: &str,
    ) -> std::result::Result<Diagnosis, GenerationError>;
}

/// Serves a fixed catalog to every user
pub struct StaticCatalogLoader {
    catalog: Catalog,
}

impl StaticCatalogLoader {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl CatalogLoader for StaticCatalogLoader {
    async fn load_catalog(&self, _user_id: &str) -> Result<Catalog> {
        Ok(self.catalog.clone())
    }
}

/// Answer store kept in process memory
#[derive(Default)]
pub struct InMemoryAnswerStore {
    rows: RwLock<Vec<StoredAnswer>>,
}

impl InMemoryAnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_row(user_id: &str, question_id: &str, answer: Answer) -> StoredAnswer {
        StoredAnswer {
            id: nanoid::nanoid!(8),
            user_id: user_id.to_string(),
            question_id: question_id.to_string(),
            answer,
            created_at: Utc::now(),
        }
    }

    async fn replace_with(&self, user_id: &str, question_id: &str, answer: Answer) {
        let mut rows = self.rows.write().await;
        let existing: Vec<&StoredAnswer> = rows
            .iter()
            .filter(|r| r.user_id == user_id && r.question_id == question_id)
            .collect();

        if existing.len() == 1 && existing[0].answer == answer {
            return;
        }

        rows.retain(|r| !(r.user_id == user_id && r.question_id == question_id));
        rows.push(Self::new_row(user_id, question_id, answer));
    }
}

#[async_trait]
impl AnswerStore for InMemoryAnswerStore {
    async fn upsert_single_answer(
        &self,
        user_id: &str,
        question_id: &str,
        option_id: &str,
        free_text: Option<&str>,
    ) -> Result<()> {
        let answer = Answer::SelectedOption {
            option_id: option_id.to_string(),
            text: free_text.map(str::to_string),
        };
        self.replace_with(user_id, question_id, answer).await;
        Ok(())
    }

    async fn reconcile_multi_answers(
        &self,
        user_id: &str,
        question_id: &str,
        selected: &[OptionId],
        free_text_by_option: &BTreeMap<OptionId, String>,
    ) -> Result<()> {
        let mut rows = self.rows.write().await;

        rows.retain(|r| {
            r.user_id != user_id
                || r.question_id != question_id
                || r.answer
                    .option_id()
                    .is_some_and(|o| selected.iter().any(|s| s == o))
        });

        for option_id in selected {
            let text = free_text_by_option.get(option_id).cloned();
            let existing = rows.iter_mut().find(|r| {
                r.user_id == user_id
                    && r.question_id == question_id
                    && r.answer.option_id() == Some(option_id.as_str())
            });

            match existing {
                Some(row) => {
                    if let Answer::SelectedOption { text: stored, .. } = &mut row.answer {
                        *stored = text;
                    }
                }
                None => {
                    let answer = Answer::SelectedOption {
                        option_id: option_id.clone(),
                        text,
                    };
                    rows.push(Self::new_row(user_id, question_id, answer));
                }
            }
        }

        Ok(())
    }

    async fn upsert_free_text_answer(
        &self,
        user_id: &str,
        question_id: &str,
        text: &str,
    ) -> Result<()> {
        let answer = Answer::FreeText {
            text: text.to_string(),
        };
        self.replace_with(user_id, question_id, answer).await;
        Ok(())
    }

    async fn list_answers(&self, user_id: &str) -> Result<Vec<StoredAnswer>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}
