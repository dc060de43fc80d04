// ABOUTME: JSON catalog documents used to seed or replace the questionnaire
// ABOUTME: Assigns ids and validates the result with the same rules as the loader

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::catalog::Catalog;
use crate::error::{QuestionnaireError, Result};
use crate::types::{Question, QuestionKind, QuestionOption, Stage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub stages: Vec<StageDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDocument {
    pub step_number: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDocument {
    pub step: i64,
    pub text: String,
    #[serde(default)]
    pub localized_text: Option<String>,
    pub kind: QuestionKind,
    #[serde(default = "default_max_selections")]
    pub max_selections: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDocument {
    pub display: String,
    #[serde(default)]
    pub localized_text: Option<String>,
    #[serde(default)]
    pub option_key: Option<String>,
    #[serde(default)]
    pub allows_free_text: bool,
}

fn default_max_selections() -> u32 {
    1
}

impl CatalogDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            QuestionnaireError::CatalogLoad(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Build a validated catalog, generating fresh ids for every entry
    pub fn into_catalog(self) -> Result<Catalog> {
        let mut stages = Vec::with_capacity(self.stages.len());
        let mut questions = Vec::new();

        for stage_doc in self.stages {
            let stage_id = nanoid::nanoid!(8);

            for question_doc in stage_doc.questions {
                let question_id = nanoid::nanoid!(8);
                let options = question_doc
                    .options
                    .into_iter()
                    .map(|o| QuestionOption {
                        id: nanoid::nanoid!(8),
                        question_id: question_id.clone(),
                        display_text: o.display,
                        localized_text: o.localized_text,
                        option_key: o.option_key,
                        allows_free_text: o.allows_free_text,
                    })
                    .collect();

                questions.push(Question {
                    id: question_id,
                    stage_id: stage_id.clone(),
                    order: question_doc.step,
                    prompt_text: question_doc.text,
                    localized_text: question_doc.localized_text,
                    kind: question_doc.kind,
                    max_selections: question_doc.max_selections,
                    category: question_doc.category,
                    options,
                });
            }

            stages.push(Stage {
                id: stage_id,
                order: stage_doc.step_number,
                title: stage_doc.title,
                description: stage_doc.description,
            });
        }

        Catalog::new(stages, questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "stages": [
            {
                "step_number": 2,
                "title": "Customers",
                "questions": [
                    { "step": 1, "text": "Who buys from you?", "kind": "free_text" }
                ]
            },
            {
                "step_number": 1,
                "title": "Business",
                "description": "About your business",
                "questions": [
                    {
                        "step": 1,
                        "text": "Which channels do you use?",
                        "kind": "multi_select",
                        "max_selections": 2,
                        "options": [
                            { "display": "Instagram" },
                            { "display": "Other", "allows_free_text": true }
                        ]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_document_builds_ordered_catalog() {
        let catalog = CatalogDocument::from_json(DOCUMENT)
            .unwrap()
            .into_catalog()
            .unwrap();

        assert_eq!(catalog.stages()[0].stage.title, "Business");
        assert_eq!(catalog.total_questions(), 2);

        let channels = &catalog.stages()[0].questions[0];
        assert_eq!(channels.kind, QuestionKind::MultiSelect);
        assert_eq!(channels.max_selections, 2);
        assert!(channels.options[1].allows_free_text);
        assert!(channels.options.iter().all(|o| o.question_id == channels.id));
    }

    #[test]
    fn test_document_with_optionless_select_is_rejected() {
        let json = r#"{"stages":[{"step_number":1,"title":"S","questions":[
            {"step":1,"text":"Pick","kind":"single_select"}]}]}"#;
        let result = CatalogDocument::from_json(json).unwrap().into_catalog();
        assert!(matches!(result, Err(QuestionnaireError::InvalidCatalog(_))));
    }

    #[test]
    fn test_unknown_kind_is_a_parse_error() {
        let json = r#"{"stages":[{"step_number":1,"title":"S","questions":[
            {"step":1,"text":"Pick","kind":"dropdown"}]}]}"#;
        assert!(matches!(
            CatalogDocument::from_json(json),
            Err(QuestionnaireError::Serialization(_))
        ));
    }
}
