// ABOUTME: SQLite-backed catalog loader and answer store
// ABOUTME: Replace and reconcile writes run in one transaction and are idempotent

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info};

use crate::catalog::Catalog;
use crate::error::{QuestionnaireError, Result};
use crate::store::{AnswerStore, CatalogLoader};
use crate::types::{Answer, OptionId, Question, QuestionKind, QuestionOption, Stage, StoredAnswer};

/// Row counts written by a catalog import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub stages: usize,
    pub questions: usize,
    pub options: usize,
}

#[derive(Clone)]
pub struct QuestionnaireStorage {
    pool: SqlitePool,
}

/// One stored answer row as kept in `responses`
struct ResponseRow {
    id: String,
    option_id: Option<String>,
    free_text: Option<String>,
}

impl QuestionnaireStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace the whole catalog with `catalog`.
    ///
    /// Stored answers reference questions, so they are removed with the
    /// questions they belong to.
    pub async fn replace_catalog(&self, catalog: &Catalog) -> Result<ImportSummary> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM responses").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM options").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM questions").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM question_stages")
            .execute(&mut *tx)
            .await?;

        let mut summary = ImportSummary {
            stages: 0,
            questions: 0,
            options: 0,
        };

        for catalog_stage in catalog.stages() {
            let stage = &catalog_stage.stage;
            sqlx::query(
                "INSERT INTO question_stages (id, step_number, title, description) VALUES (?, ?, ?, ?)",
            )
            .bind(&stage.id)
            .bind(stage.order)
            .bind(&stage.title)
            .bind(&stage.description)
            .execute(&mut *tx)
            .await?;
            summary.stages += 1;

            for question in &catalog_stage.questions {
                sqlx::query(
                    r#"
                    INSERT INTO questions (id, stage_id, step, text, localized_text, question_type, max_selections, category)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&question.id)
                .bind(&question.stage_id)
                .bind(question.order)
                .bind(&question.prompt_text)
                .bind(&question.localized_text)
                .bind(question.kind)
                .bind(i64::from(question.max_selections))
                .bind(&question.category)
                .execute(&mut *tx)
                .await?;
                summary.questions += 1;

                for (display_order, option) in question.options.iter().enumerate() {
                    sqlx::query(
                        r#"
                        INSERT INTO options (id, question_id, display_order, display, localized_text, option_key, allows_free_text)
                        VALUES (?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&option.id)
                    .bind(&option.question_id)
                    .bind(display_order as i64)
                    .bind(&option.display_text)
                    .bind(&option.localized_text)
                    .bind(&option.option_key)
                    .bind(option.allows_free_text)
                    .execute(&mut *tx)
                    .await?;
                    summary.options += 1;
                }
            }
        }

        tx.commit().await?;

        info!(
            "Imported questionnaire catalog: {} stages, {} questions, {} options",
            summary.stages, summary.questions, summary.options
        );
        Ok(summary)
    }

    async fn response_rows(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
        question_id: &str,
    ) -> Result<Vec<ResponseRow>> {
        let rows = sqlx::query(
            "SELECT id, option_id, free_text_response FROM responses WHERE user_id = ? AND question_id = ?",
        )
        .bind(user_id)
        .bind(question_id)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ResponseRow {
                    id: row.try_get("id")?,
                    option_id: row.try_get("option_id")?,
                    free_text: row.try_get("free_text_response")?,
                })
            })
            .collect()
    }

    async fn insert_response(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
        question_id: &str,
        option_id: Option<&str>,
        free_text: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO responses (id, user_id, question_id, option_id, free_text_response, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(nanoid::nanoid!(10))
        .bind(user_id)
        .bind(question_id)
        .bind(option_id)
        .bind(free_text)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Keep a lone matching row, otherwise delete everything and insert one row
    async fn replace_answer(
        &self,
        user_id: &str,
        question_id: &str,
        option_id: Option<&str>,
        free_text: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let existing = Self::response_rows(&mut tx, user_id, question_id).await?;

        if let [only] = existing.as_slice() {
            if only.option_id.as_deref() == option_id && only.free_text.as_deref() == free_text {
                debug!("Answer for question {} unchanged", question_id);
                tx.commit().await?;
                return Ok(());
            }
        }

        sqlx::query("DELETE FROM responses WHERE user_id = ? AND question_id = ?")
            .bind(user_id)
            .bind(question_id)
            .execute(&mut *tx)
            .await?;
        Self::insert_response(&mut tx, user_id, question_id, option_id, free_text).await?;

        tx.commit().await?;
        debug!("Stored answer for question {}", question_id);
        Ok(())
    }
}

fn row_to_stage(row: &SqliteRow) -> Result<Stage> {
    Ok(Stage {
        id: row.try_get("id")?,
        order: row.try_get("step_number")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
    })
}

fn row_to_option(row: &SqliteRow) -> Result<QuestionOption> {
    Ok(QuestionOption {
        id: row.try_get("id")?,
        question_id: row.try_get("question_id")?,
        display_text: row.try_get("display")?,
        localized_text: row.try_get("localized_text")?,
        option_key: row.try_get("option_key")?,
        allows_free_text: row.try_get("allows_free_text")?,
    })
}

fn row_to_question(row: &SqliteRow, options: Vec<QuestionOption>) -> Result<Question> {
    let id: String = row.try_get("id")?;
    let max_selections: i64 = row.try_get("max_selections")?;
    let max_selections = u32::try_from(max_selections).map_err(|_| {
        QuestionnaireError::InvalidCatalog(format!(
            "question '{}' has invalid max_selections {}",
            id, max_selections
        ))
    })?;
    let kind: QuestionKind = row.try_get("question_type")?;

    Ok(Question {
        id,
        stage_id: row.try_get("stage_id")?,
        order: row.try_get("step")?,
        prompt_text: row.try_get("text")?,
        localized_text: row.try_get("localized_text")?,
        kind,
        max_selections,
        category: row.try_get("category")?,
        options,
    })
}

fn row_to_answer(row: &SqliteRow) -> Result<StoredAnswer> {
    let option_id: Option<String> = row.try_get("option_id")?;
    let free_text: Option<String> = row.try_get("free_text_response")?;
    let id: String = row.try_get("id")?;

    let answer = match (option_id, free_text) {
        (Some(option_id), text) => Answer::SelectedOption { option_id, text },
        (None, Some(text)) => Answer::FreeText { text },
        (None, None) => {
            return Err(QuestionnaireError::AnswerPersist(format!(
                "response {} has neither option nor text",
                id
            )))
        }
    };
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(StoredAnswer {
        id,
        user_id: row.try_get("user_id")?,
        question_id: row.try_get("question_id")?,
        answer,
        created_at,
    })
}

#[async_trait]
impl CatalogLoader for QuestionnaireStorage {
    async fn load_catalog(&self, user_id: &str) -> Result<Catalog> {
        debug!("Loading questionnaire catalog for user {}", user_id);

        let stage_rows = sqlx::query(
            "SELECT id, step_number, title, description FROM question_stages ORDER BY step_number",
        )
        .fetch_all(&self.pool)
        .await?;
        let stages = stage_rows
            .iter()
            .map(row_to_stage)
            .collect::<Result<Vec<_>>>()?;

        let option_rows =
            sqlx::query("SELECT * FROM options ORDER BY question_id, display_order, rowid")
                .fetch_all(&self.pool)
                .await?;
        let mut options_by_question: HashMap<String, Vec<QuestionOption>> = HashMap::new();
        for row in &option_rows {
            let option = row_to_option(row)?;
            options_by_question
                .entry(option.question_id.clone())
                .or_default()
                .push(option);
        }

        let question_rows = sqlx::query("SELECT * FROM questions ORDER BY stage_id, step")
            .fetch_all(&self.pool)
            .await?;
        let questions = question_rows
            .iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let options = options_by_question.remove(&id).unwrap_or_default();
                row_to_question(row, options)
            })
            .collect::<Result<Vec<_>>>()?;

        Catalog::new(stages, questions).map_err(|e| {
            error!("Stored questionnaire catalog is invalid: {}", e);
            e
        })
    }
}

#[async_trait]
impl AnswerStore for QuestionnaireStorage {
    async fn upsert_single_answer(
        &self,
        user_id: &str,
        question_id: &str,
        option_id: &str,
        free_text: Option<&str>,
    ) -> Result<()> {
        self.replace_answer(user_id, question_id, Some(option_id), free_text)
            .await
    }

    async fn reconcile_multi_answers(
        &self,
        user_id: &str,
        question_id: &str,
        selected: &[OptionId],
        free_text_by_option: &BTreeMap<OptionId, String>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let existing = Self::response_rows(&mut tx, user_id, question_id).await?;

        let mut removed = 0;
        for row in &existing {
            let still_selected = row
                .option_id
                .as_ref()
                .is_some_and(|o| selected.contains(o));
            if !still_selected {
                sqlx::query("DELETE FROM responses WHERE id = ?")
                    .bind(&row.id)
                    .execute(&mut *tx)
                    .await?;
                removed += 1;
            }
        }

        let mut added = 0;
        for option_id in selected {
            let text = free_text_by_option.get(option_id).map(String::as_str);
            let current = existing
                .iter()
                .find(|r| r.option_id.as_deref() == Some(option_id.as_str()));

            match current {
                Some(row) if row.free_text.as_deref() == text => {}
                Some(row) => {
                    sqlx::query("UPDATE responses SET free_text_response = ? WHERE id = ?")
                        .bind(text)
                        .bind(&row.id)
                        .execute(&mut *tx)
                        .await?;
                }
                None => {
                    Self::insert_response(&mut tx, user_id, question_id, Some(option_id), text)
                        .await?;
                    added += 1;
                }
            }
        }

        tx.commit().await?;
        debug!(
            "Reconciled question {}: {} added, {} removed",
            question_id, added, removed
        );
        Ok(())
    }

    async fn upsert_free_text_answer(
        &self,
        user_id: &str,
        question_id: &str,
        text: &str,
    ) -> Result<()> {
        self.replace_answer(user_id, question_id, None, Some(text))
            .await
    }

    async fn list_answers(&self, user_id: &str) -> Result<Vec<StoredAnswer>> {
        let rows = sqlx::query(
            "SELECT * FROM responses WHERE user_id = ? ORDER BY created_at, rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_answer).collect()
    }
}
