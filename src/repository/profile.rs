use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::ProfileStore;
use crate::database::Database;
use crate::error::Result;
use crate::models::{PendingUpdate, ProfileStatus};

/// Repository for the profiles table
#[derive(Clone)]
pub struct ProfileRepository {
    db: Database,
    table: String,
}

impl ProfileRepository {
    /// `table` must already be validated as a plain SQL identifier
    pub fn new(db: Database, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    /// Random sample of up to `limit` usernames still to collect
    pub async fn sample_pending(&self, limit: i64) -> Result<Vec<String>> {
        let query = format!(
            "SELECT username FROM {} WHERE status = $1 ORDER BY random() LIMIT $2",
            self.table
        );

        let usernames = sqlx::query_scalar::<_, String>(&query)
            .bind(ProfileStatus::NotCollected.as_str())
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        debug!(count = usernames.len(), limit, "Sampled pending profiles");
        Ok(usernames)
    }

    /// Apply all updates in one statement; returns rows affected
    pub async fn apply_updates(&self, updates: &[PendingUpdate]) -> Result<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let collapsed = collapse_updates(updates);
        let mut usernames = Vec::with_capacity(collapsed.len());
        let mut statuses = Vec::with_capacity(collapsed.len());
        let mut timestamps: Vec<DateTime<Utc>> = Vec::with_capacity(collapsed.len());
        for update in collapsed {
            usernames.push(update.profile.clone());
            statuses.push(update.status.as_str().to_string());
            timestamps.push(update.timestamp);
        }

        let query = format!(
            r#"
            UPDATE {} AS p
            SET status = u.status, updated_at = u.updated_at
            FROM UNNEST($1::text[], $2::text[], $3::timestamptz[])
                AS u(username, status, updated_at)
            WHERE p.username = u.username
            "#,
            self.table
        );

        let result = sqlx::query(&query)
            .bind(&usernames)
            .bind(&statuses)
            .bind(&timestamps)
            .execute(self.db.pool())
            .await?;

        info!(
            submitted = updates.len(),
            matched = result.rows_affected(),
            "Applied profile status updates"
        );
        Ok(result.rows_affected())
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[async_trait]
impl ProfileStore for ProfileRepository {
    async fn sample_pending(&self, limit: i64) -> Result<Vec<String>> {
        ProfileRepository::sample_pending(self, limit).await
    }

    async fn apply_updates(&self, updates: &[PendingUpdate]) -> Result<u64> {
        ProfileRepository::apply_updates(self, updates).await
    }

    async fn close(&self) {
        ProfileRepository::close(self).await;
    }
}

/// Keep only the last update per profile, in first-seen order
///
/// A single `UPDATE ... FROM` may not touch the same row twice with a
/// deterministic result, so duplicates are resolved here.
pub fn collapse_updates(updates: &[PendingUpdate]) -> Vec<&PendingUpdate> {
    let mut order: Vec<&str> = Vec::new();
    let mut latest: HashMap<&str, &PendingUpdate> = HashMap::new();

    for update in updates {
        if latest.insert(update.profile.as_str(), update).is_none() {
            order.push(update.profile.as_str());
        }
    }

    order
        .into_iter()
        .filter_map(|profile| latest.get(profile).copied())
        .collect()
}
