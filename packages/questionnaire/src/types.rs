// ABOUTME: Type definitions for the staged questionnaire
// ABOUTME: Stages, questions, options and the tagged answer union persisted per user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QuestionnaireError;

pub type UserId = String;
pub type QuestionId = String;
pub type OptionId = String;

/// Shape of a question, which decides how its answers are collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Exactly one option; choosing replaces the previous answer
    SingleSelect,
    /// Up to `max_selections` options, committed together on continue
    MultiSelect,
    /// Free text committed on continue
    FreeText,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::SingleSelect => "single_select",
            QuestionKind::MultiSelect => "multi_select",
            QuestionKind::FreeText => "free_text",
        }
    }

    /// Whether questions of this kind must offer at least one option
    pub fn requires_options(&self) -> bool {
        !matches!(self, QuestionKind::FreeText)
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = QuestionnaireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_select" => Ok(QuestionKind::SingleSelect),
            "multi_select" => Ok(QuestionKind::MultiSelect),
            "free_text" => Ok(QuestionKind::FreeText),
            other => Err(QuestionnaireError::InvalidCatalog(format!(
                "unknown question type '{}'",
                other
            ))),
        }
    }
}

/// A named, ordered group of questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    /// Position among stages (step_number)
    pub order: i64,
    pub title: String,
    pub description: Option<String>,
}

/// A selectable choice of a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: OptionId,
    pub question_id: QuestionId,
    pub display_text: String,
    pub localized_text: Option<String>,
    /// Stable key for the option across catalog imports
    pub option_key: Option<String>,
    /// "Other, please specify": choosing it requires accompanying text
    pub allows_free_text: bool,
}

impl QuestionOption {
    /// Text shown to the user, localized when available
    pub fn label(&self) -> &str {
        self.localized_text
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(self.display_text.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub stage_id: String,
    /// Position within the stage (step)
    pub order: i64,
    pub prompt_text: String,
    pub localized_text: Option<String>,
    pub kind: QuestionKind,
    /// Only meaningful for multi-select questions
    pub max_selections: u32,
    pub category: Option<String>,
    pub options: Vec<QuestionOption>,
}

impl Question {
    pub fn option(&self, option_id: &str) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// Prompt shown to the user, localized when available
    pub fn prompt(&self) -> &str {
        self.localized_text
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(self.prompt_text.as_str())
    }
}

/// What a user answered to one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    /// A chosen option, with elaboration text for "other" options
    SelectedOption {
        option_id: OptionId,
        text: Option<String>,
    },
    /// A free-text answer without any option
    FreeText { text: String },
}

impl Answer {
    pub fn option_id(&self) -> Option<&str> {
        match self {
            Answer::SelectedOption { option_id, .. } => Some(option_id),
            Answer::FreeText { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Answer::SelectedOption { text, .. } => text.as_deref(),
            Answer::FreeText { text } => Some(text),
        }
    }
}

/// An answer row as kept by an answer store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnswer {
    pub id: String,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub answer: Answer,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful diagnosis generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub user_id: UserId,
    pub text: String,
    pub generated_at: DateTime<Utc>,
}
