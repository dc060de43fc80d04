// ABOUTME: SQLite storage for user profiles and saved social posts
// ABOUTME: Generated artifacts are upserted into the profile row keyed by user id

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, error};

use crate::error::Result;
use crate::types::{Profile, ProfileField, SavedPost};

#[derive(Clone)]
pub struct ProfileStorage {
    pool: SqlitePool,
}

impl ProfileStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT * FROM profiles WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to load profile {}: {}", user_id, e);
                e
            })?;

        row.as_ref().map(row_to_profile).transpose()
    }

    /// Stored diagnosis text, ignoring blank values
    pub async fn get_diagnosis(&self, user_id: &str) -> Result<Option<String>> {
        let diagnosis: Option<Option<String>> =
            sqlx::query_scalar("SELECT business_diagnosis FROM profiles WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(diagnosis
            .flatten()
            .filter(|text| !text.trim().is_empty()))
    }

    /// Write one generated column, creating the profile row when missing
    pub async fn set_field(&self, user_id: &str, field: ProfileField, value: &str) -> Result<()> {
        let column = field.column();
        let now = Utc::now();
        let query = format!(
            "INSERT INTO profiles (id, {column}, created_at, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET {column} = excluded.{column}, updated_at = excluded.updated_at"
        );

        sqlx::query(&query)
            .bind(user_id)
            .bind(value)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to update {} for profile {}: {}", column, user_id, e);
                e
            })?;

        debug!("Updated {} for profile {}", column, user_id);
        Ok(())
    }

    pub async fn save_post(&self, user_id: &str, post_type: &str, content: &str) -> Result<SavedPost> {
        let post = SavedPost {
            id: nanoid::nanoid!(10),
            user_id: user_id.to_string(),
            post_type: post_type.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO saved_posts (id, user_id, post_type, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.post_type)
        .bind(&post.content)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        Ok(post)
    }

    pub async fn list_posts(&self, user_id: &str) -> Result<Vec<SavedPost>> {
        let rows = sqlx::query(
            "SELECT * FROM saved_posts WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SavedPost {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    post_type: row.try_get("post_type")?,
                    content: row.try_get("content")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

fn row_to_profile(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        business_name: row.try_get("business_name")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        role: row.try_get("role")?,
        business_diagnosis: row.try_get("business_diagnosis")?,
        target_audience: row.try_get("target_audience")?,
        marketing_messages: row.try_get("marketing_messages")?,
        content_strategy: row.try_get("content_strategy")?,
        marketing_plan: row.try_get("marketing_plan")?,
        business_goals: row.try_get("business_goals")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
