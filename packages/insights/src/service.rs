// ABOUTME: Insight service generating the diagnosis and marketing artifacts
// ABOUTME: Renders prompt templates, calls the text generator and stores results on the profile

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use marketwise_ai::{parse_json_response, GenerationRequest, TextGenerator};
use marketwise_prompts::PromptManager;
use marketwise_questionnaire::{
    AnswerStore, CatalogLoader, Diagnosis, DiagnosisGenerator, GenerationError,
    QuestionnaireStorage,
};

use crate::error::{InsightError, Result};
use crate::format::{format_responses, split_posts};
use crate::profile::ProfileStorage;
use crate::types::{ArtifactKind, BusinessInsights, GeneratedArtifact, Profile, ProfileField, SavedPost};

const DIAGNOSIS_MAX_TOKENS: u32 = 1000;
const INSIGHT_LIST_MAX_TOKENS: u32 = 400;
const ARTIFACT_MAX_TOKENS: u32 = 1000;
const POSTS_MAX_TOKENS: u32 = 1500;

const MESSAGES_FALLBACK: &str = "Could not generate marketing messages. Please try again later.";
const AUDIENCES_FALLBACK: &str = "Could not identify target audiences. Please try again later.";

pub struct InsightService {
    generator: Arc<dyn TextGenerator>,
    prompts: Mutex<PromptManager>,
    questionnaire: QuestionnaireStorage,
    profiles: ProfileStorage,
    language: String,
}

impl InsightService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompts: PromptManager,
        questionnaire: QuestionnaireStorage,
        profiles: ProfileStorage,
        language: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            prompts: Mutex::new(prompts),
            questionnaire,
            profiles,
            language: language.into(),
        }
    }

    pub fn profiles(&self) -> &ProfileStorage {
        &self.profiles
    }

    fn render(&self, prompt_id: &str, parameters: &[(&str, &str)]) -> Result<String> {
        let mut prompts = self
            .prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(prompts.get_prompt(prompt_id, parameters)?)
    }

    fn system_prompt(&self, name: &str) -> Result<String> {
        let mut prompts = self
            .prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(prompts.get_system_prompt(name)?)
    }

    async fn generate(&self, system: &str, prompt: String, max_tokens: u32) -> Result<String> {
        let request = GenerationRequest::new(prompt)
            .with_system(self.system_prompt(system)?)
            .with_max_tokens(max_tokens);

        let response = self.generator.generate_text(request).await.map_err(|e| {
            error!("Text generation failed: {}", e);
            e
        })?;
        Ok(response.data.trim().to_string())
    }

    async fn require_diagnosis(&self, user_id: &str) -> Result<String> {
        self.profiles
            .get_diagnosis(user_id)
            .await?
            .ok_or(InsightError::DiagnosisMissing)
    }

    /// Synthesize a diagnosis from the user's stored answers and save it on the profile
    pub async fn generate_diagnosis(&self, user_id: &str) -> Result<Diagnosis> {
        info!("Generating diagnosis for user {}", user_id);

        let answers = self.questionnaire.list_answers(user_id).await?;
        if answers.is_empty() {
            warn!("No questionnaire responses for user {}", user_id);
            return Err(InsightError::NoResponses);
        }

        let catalog = self.questionnaire.load_catalog(user_id).await?;
        let responses = format_responses(&catalog, &answers);
        if responses.is_empty() {
            return Err(InsightError::NoResponses);
        }

        let prompt = self.render(
            "diagnosis",
            &[
                ("language", self.language.as_str()),
                ("responses", responses.as_str()),
            ],
        )?;
        let text = self
            .generate("consultant", prompt, DIAGNOSIS_MAX_TOKENS)
            .await?;
        if text.is_empty() {
            return Err(InsightError::EmptyGeneration);
        }

        self.profiles
            .set_field(user_id, ProfileField::BusinessDiagnosis, &text)
            .await?;

        info!("Stored diagnosis for user {}", user_id);
        Ok(Diagnosis {
            user_id: user_id.to_string(),
            text,
            generated_at: Utc::now(),
        })
    }

    /// Marketing messages and target audiences derived from the stored diagnosis.
    ///
    /// Unparsable model output falls back to a single apology entry.
    pub async fn business_insights(&self, user_id: &str) -> Result<BusinessInsights> {
        let diagnosis = self.require_diagnosis(user_id).await?;
        let params = [("language", self.language.as_str()), ("diagnosis", diagnosis.as_str())];

        let messages_prompt = self.render("business_messages", &params)?;
        let audiences_prompt = self.render("business_audiences", &params)?;

        let (messages_text, audiences_text) = tokio::join!(
            self.generate("marketing", messages_prompt, INSIGHT_LIST_MAX_TOKENS),
            self.generate("marketing", audiences_prompt, INSIGHT_LIST_MAX_TOKENS),
        );

        let messages = parse_list(&messages_text?, "messages").unwrap_or_else(|| {
            warn!("Could not parse marketing messages for user {}", user_id);
            vec![MESSAGES_FALLBACK.to_string()]
        });
        let audiences = parse_list(&audiences_text?, "audiences").unwrap_or_else(|| {
            warn!("Could not parse target audiences for user {}", user_id);
            vec![AUDIENCES_FALLBACK.to_string()]
        });

        self.profiles
            .set_field(
                user_id,
                ProfileField::MarketingMessages,
                &serde_json::to_string(&messages)?,
            )
            .await?;
        self.profiles
            .set_field(
                user_id,
                ProfileField::TargetAudience,
                &serde_json::to_string(&audiences)?,
            )
            .await?;

        Ok(BusinessInsights {
            messages,
            audiences,
        })
    }

    /// Generate one text artifact from the stored diagnosis and save it on the profile
    pub async fn generate_artifact(&self, user_id: &str, kind: ArtifactKind) -> Result<GeneratedArtifact> {
        info!("Generating {} for user {}", kind, user_id);
        let diagnosis = self.require_diagnosis(user_id).await?;

        let prompt = self.render(
            kind.prompt_id(),
            &[
                ("language", self.language.as_str()),
                ("diagnosis", diagnosis.as_str()),
            ],
        )?;
        let content = self
            .generate(kind.system_prompt(), prompt, ARTIFACT_MAX_TOKENS)
            .await?;
        if content.is_empty() {
            return Err(InsightError::EmptyGeneration);
        }

        self.profiles
            .set_field(user_id, kind.profile_field(), &content)
            .await?;

        Ok(GeneratedArtifact { kind, content })
    }

    /// Three social posts of `post_type`, optionally centred on `keywords`
    pub async fn generate_posts(
        &self,
        user_id: &str,
        post_type: &str,
        keywords: Option<&str>,
    ) -> Result<Vec<String>> {
        let post_type = post_type.trim();
        if post_type.is_empty() {
            return Err(InsightError::InvalidInput(
                "Post type is required".to_string(),
            ));
        }
        let diagnosis = self.require_diagnosis(user_id).await?;

        let keywords_line = keywords
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| format!("Keywords: {}", k))
            .unwrap_or_default();
        let prompt = self.render(
            "social_posts",
            &[
                ("language", self.language.as_str()),
                ("diagnosis", diagnosis.as_str()),
                ("post_type", post_type),
                ("keywords", keywords_line.as_str()),
            ],
        )?;

        let text = self
            .generate("social_media", prompt, POSTS_MAX_TOKENS)
            .await?;
        let posts = split_posts(&text);
        if posts.is_empty() {
            return Err(InsightError::EmptyGeneration);
        }

        info!("Generated {} {} posts for user {}", posts.len(), post_type, user_id);
        Ok(posts)
    }

    pub async fn save_post(&self, user_id: &str, post_type: &str, content: &str) -> Result<SavedPost> {
        if content.trim().is_empty() {
            return Err(InsightError::InvalidInput(
                "Post content is required".to_string(),
            ));
        }
        self.profiles.save_post(user_id, post_type, content).await
    }

    pub async fn saved_posts(&self, user_id: &str) -> Result<Vec<SavedPost>> {
        self.profiles.list_posts(user_id).await
    }

    pub async fn profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.profiles.get_profile(user_id).await
    }
}

#[async_trait]
impl DiagnosisGenerator for InsightService {
    async fn generate_diagnosis(
        &self,
        user_id: &str,
    ) -> std::result::Result<Diagnosis, GenerationError> {
        InsightService::generate_diagnosis(self, user_id)
            .await
            .map_err(|e| match e {
                InsightError::NoResponses => GenerationError::NoResponses,
                other => GenerationError::Failed(other.to_string()),
            })
    }
}

/// Read a list of strings from `{"<key>": [...]}` or a bare JSON array
fn parse_list(text: &str, key: &str) -> Option<Vec<String>> {
    let value: Value = parse_json_response(text).ok()?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => map.get(key)?.as_array()?,
        _ => return None,
    };

    let list: Vec<String> = items.iter().filter_map(item_text).collect();
    if list.is_empty() {
        None
    } else {
        Some(list)
    }
}

/// Strings as-is; objects such as `{"name": …, "description": …}` as "name: description"
fn item_text(item: &Value) -> Option<String> {
    match item {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => {
            let title = ["name", "title", "audience", "message"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str));
            let description = map.get("description").and_then(Value::as_str);
            match (title, description) {
                (Some(title), Some(description)) => Some(format!("{}: {}", title, description)),
                (Some(text), None) | (None, Some(text)) => Some(text.to_string()),
                (None, None) => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_list_reads_keyed_object() {
        let list = parse_list(r#"{"messages": ["Fresh daily", "Local"]}"#, "messages").unwrap();
        assert_eq!(list, vec!["Fresh daily".to_string(), "Local".to_string()]);
    }

    #[test]
    fn test_parse_list_accepts_fenced_array_and_objects() {
        let text = "```json\n[{\"name\": \"Parents\", \"description\": \"Busy mornings\"}]\n```";
        let list = parse_list(text, "audiences").unwrap();
        assert_eq!(list, vec!["Parents: Busy mornings".to_string()]);
    }

    #[test]
    fn test_parse_list_rejects_prose_and_empty_lists() {
        assert!(parse_list("Here are some messages", "messages").is_none());
        assert!(parse_list(r#"{"messages": []}"#, "messages").is_none());
        assert!(parse_list(r#"{"other": ["x"]}"#, "messages").is_none());
    }
}
