// ABOUTME: Types for generated business insights and per-user profiles
// ABOUTME: Artifact kinds, profile fields, insight payloads and saved posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InsightError;

/// Text artifacts generated from a stored diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    TargetAudience,
    MarketingMessages,
    ContentStrategy,
    MarketingPlan,
    /// SMART goals
    BusinessGoals,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::TargetAudience,
        ArtifactKind::MarketingMessages,
        ArtifactKind::ContentStrategy,
        ArtifactKind::MarketingPlan,
        ArtifactKind::BusinessGoals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::TargetAudience => "target_audience",
            ArtifactKind::MarketingMessages => "marketing_messages",
            ArtifactKind::ContentStrategy => "content_strategy",
            ArtifactKind::MarketingPlan => "marketing_plan",
            ArtifactKind::BusinessGoals => "business_goals",
        }
    }

    /// Prompt template id, which matches the artifact name
    pub fn prompt_id(&self) -> &'static str {
        self.as_str()
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            ArtifactKind::BusinessGoals => "consultant",
            _ => "marketing",
        }
    }

    pub fn profile_field(&self) -> ProfileField {
        match self {
            ArtifactKind::TargetAudience => ProfileField::TargetAudience,
            ArtifactKind::MarketingMessages => ProfileField::MarketingMessages,
            ArtifactKind::ContentStrategy => ProfileField::ContentStrategy,
            ArtifactKind::MarketingPlan => ProfileField::MarketingPlan,
            ArtifactKind::BusinessGoals => ProfileField::BusinessGoals,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = InsightError;

    /// Accepts both `marketing_plan` and `marketing-plan`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| InsightError::InvalidInput(format!("unknown action '{}'", s)))
    }
}

/// Generated-text columns of the `profiles` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    BusinessDiagnosis,
    TargetAudience,
    MarketingMessages,
    ContentStrategy,
    MarketingPlan,
    BusinessGoals,
}

impl ProfileField {
    pub fn column(&self) -> &'static str {
        match self {
            ProfileField::BusinessDiagnosis => "business_diagnosis",
            ProfileField::TargetAudience => "target_audience",
            ProfileField::MarketingMessages => "marketing_messages",
            ProfileField::ContentStrategy => "content_strategy",
            ProfileField::MarketingPlan => "marketing_plan",
            ProfileField::BusinessGoals => "business_goals",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub business_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub business_diagnosis: Option<String>,
    pub target_audience: Option<String>,
    pub marketing_messages: Option<String>,
    pub content_strategy: Option<String>,
    pub marketing_plan: Option<String>,
    pub business_goals: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Marketing messages and audiences derived from a diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessInsights {
    pub messages: Vec<String>,
    pub audiences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub kind: ArtifactKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPost {
    pub id: String,
    pub user_id: String,
    pub post_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
