// ABOUTME: Centralized prompt management for text generation requests
// ABOUTME: Provides type-safe prompt loading and parameter substitution from JSON files

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories searched, in order, when resolving a prompt id
const PROMPT_CATEGORIES: &[&str] = &["insights", "system"];

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Prompt not found: {0}")]
    NotFound(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Failed to read prompt file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse prompt JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid prompt format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub version: String,
    #[serde(rename = "lastModified")]
    pub last_modified: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub name: String,
    pub category: String,
    pub template: String,
    pub parameters: Vec<String>,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PromptMetadata>,
}

pub struct PromptManager {
    prompts_dir: PathBuf,
    cache: HashMap<String, Prompt>,
}

impl PromptManager {
    /// Create a new PromptManager
    ///
    /// If prompts_dir is None, the prompts directory is looked up next to the binary
    pub fn new(prompts_dir: Option<PathBuf>) -> Self {
        let prompts_dir = prompts_dir.unwrap_or_else(Self::discover_prompts_dir);

        Self {
            prompts_dir,
            cache: HashMap::new(),
        }
    }

    /// Directory the manager reads from
    pub fn prompts_dir(&self) -> &Path {
        &self.prompts_dir
    }

    fn discover_prompts_dir() -> PathBuf {
        let fallback = PathBuf::from("./packages/prompts");

        let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        else {
            return fallback;
        };

        [
            exe_dir.join("prompts"),
            exe_dir.join("../prompts"),
            exe_dir.join("../../packages/prompts"),
            exe_dir.join("../../../packages/prompts"),
        ]
        .into_iter()
        .find(|p| p.join("insights").exists())
        .unwrap_or(fallback)
    }

    /// Get a prompt by ID with parameter substitution
    pub fn get_prompt(
        &mut self,
        prompt_id: &str,
        parameters: &[(&str, &str)],
    ) -> Result<String, PromptError> {
        let prompt = self.load_prompt(prompt_id)?;

        // Always validate required parameters, even if empty list provided
        self.substitute_parameters(&prompt.template, parameters, &prompt.parameters)
    }

    /// Get a system prompt by name
    pub fn get_system_prompt(&mut self, name: &str) -> Result<String, PromptError> {
        let path = self.prompts_dir.join("system").join(format!("{}.json", name));
        let prompt = self.load_prompt_from_path(&path).map_err(|e| match e {
            PromptError::IoError(_) => PromptError::NotFound(name.to_string()),
            other => other,
        })?;
        Ok(prompt.template)
    }

    /// Substitute parameters in a template
    fn substitute_parameters(
        &self,
        template: &str,
        parameters: &[(&str, &str)],
        required_params: &[String],
    ) -> Result<String, PromptError> {
        let param_map: HashMap<&str, &str> = parameters.iter().copied().collect();

        for required in required_params {
            if !param_map.contains_key(required.as_str()) {
                return Err(PromptError::MissingParameter(required.clone()));
            }
        }

        // Replace {{parameter}} with values
        let mut result = template.to_string();
        for (key, value) in parameters {
            let placeholder = format!("{{{{{}}}}}", key);
            result = result.replace(&placeholder, value);
        }

        Ok(result)
    }

    /// Load a prompt from disk with caching
    fn load_prompt(&mut self, prompt_id: &str) -> Result<Prompt, PromptError> {
        if let Some(prompt) = self.cache.get(prompt_id) {
            return Ok(prompt.clone());
        }

        for category in PROMPT_CATEGORIES {
            let path = self
                .prompts_dir
                .join(category)
                .join(format!("{}.json", prompt_id));

            if !path.exists() {
                continue;
            }

            let prompt = self.load_prompt_from_path(&path)?;
            self.cache.insert(prompt_id.to_string(), prompt.clone());
            return Ok(prompt);
        }

        Err(PromptError::NotFound(prompt_id.to_string()))
    }

    /// Load a prompt from a specific file path
    fn load_prompt_from_path(&self, path: &Path) -> Result<Prompt, PromptError> {
        let content = fs::read_to_string(path)?;
        let prompt: Prompt = serde_json::from_str(&content)?;

        if prompt.id.is_empty() || prompt.template.is_empty() || prompt.category.is_empty() {
            return Err(PromptError::InvalidFormat(format!(
                "Invalid prompt format in {}",
                path.display()
            )));
        }

        Ok(prompt)
    }
}
