// ABOUTME: HTTP request handlers for diagnosis, profile and marketing artifacts
// ABOUTME: Thin wrappers over the insight service scoped to the calling user

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use marketwise_insights::{ArtifactKind, SavedPost};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::CurrentUser;
use crate::response::{ok, ApiError};
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct PostGeneratorRequest {
    pub post_type: String,
    pub keywords: Option<String>,
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Serialize)]
pub struct PostGeneratorResponse {
    pub posts: Vec<String>,
    /// Present when the request asked for the posts to be saved
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub saved: Vec<SavedPost>,
}

/// Generate (or regenerate) the caller's diagnosis from their stored answers
pub async fn generate_diagnosis(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> Result<Response, ApiError> {
    info!("Generating diagnosis for user {}", user.id);
    let diagnosis = state.insights.generate_diagnosis(&user.id).await?;
    Ok(ok(diagnosis))
}

pub async fn get_profile(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> Result<Response, ApiError> {
    info!("Getting profile for user {}", user.id);
    let profile = state.insights.profile(&user.id).await?;
    Ok(ok(profile))
}

pub async fn business_insights(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> Result<Response, ApiError> {
    info!("Generating business insights for user {}", user.id);
    let insights = state.insights.business_insights(&user.id).await?;
    Ok(ok(insights))
}

/// Generate one profile artifact, e.g. `/actions/marketing-plan`
pub async fn generate_artifact(
    State(state): State<ApiState>,
    user: CurrentUser,
    Path(kind): Path<String>,
) -> Result<Response, ApiError> {
    info!("Generating {} for user {}", kind, user.id);
    let kind: ArtifactKind = kind.parse()?;
    let artifact = state.insights.generate_artifact(&user.id, kind).await?;
    Ok(ok(artifact))
}

pub async fn generate_posts(
    State(state): State<ApiState>,
    user: CurrentUser,
    Json(request): Json<PostGeneratorRequest>,
) -> Result<Response, ApiError> {
    info!(
        "Generating {} posts for user {}",
        request.post_type, user.id
    );
    let posts = state
        .insights
        .generate_posts(&user.id, &request.post_type, request.keywords.as_deref())
        .await?;

    let mut saved = Vec::new();
    if request.save {
        for post in &posts {
            saved.push(
                state
                    .insights
                    .save_post(&user.id, request.post_type.trim(), post)
                    .await?,
            );
        }
    }

    Ok(ok(PostGeneratorResponse { posts, saved }))
}

pub async fn list_posts(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> Result<Response, ApiError> {
    info!("Listing saved posts for user {}", user.id);
    let posts = state.insights.saved_posts(&user.id).await?;
    Ok(ok(posts))
}
