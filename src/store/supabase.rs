//! Supabase REST API client using service_role key

use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;

use crate::config::SupabaseSettings;

use super::archive::{CheckpointRecord, GameRecord, MatchArchive, ParticipantRecord};

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(settings: &SupabaseSettings) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            service_role_key: settings.service_role_key.clone(),
        })
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
    }

    /// Insert one or more rows
    pub async fn insert<T: Serialize + ?Sized>(&self, table: &str, rows: &T) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;

        check(response).await
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<(), StoreError> {
        let url = format!("{}?{}", self.rest_url(table), query);
        let response = self
            .authorized(self.client.patch(&url))
            .json(data)
            .send()
            .await?;

        check(response).await
    }

    /// Upsert (insert or update on conflict)
    pub async fn upsert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        rows: &T,
        on_conflict: &str,
    ) -> Result<(), StoreError> {
        let url = format!("{}?on_conflict={}", self.rest_url(table), on_conflict);
        let response = self
            .authorized(self.client.post(&url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;

        check(response).await
    }
}

async fn check(response: Response) -> Result<(), StoreError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Api { status, body })
}

/// Durable archive backed by the `games`, `participants` and `checkpoints` tables
#[derive(Clone)]
pub struct SupabaseArchive {
    client: SupabaseClient,
}

impl SupabaseArchive {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

impl MatchArchive for SupabaseArchive {
    fn record_start(
        &self,
        game: GameRecord,
        roster: Vec<ParticipantRecord>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.client.upsert("games", &game, "id").await?;
            if !roster.is_empty() {
                self.client.insert("participants", roster.as_slice()).await?;
            }
            Ok(())
        })
    }

    fn record_checkpoint(&self, checkpoint: CheckpointRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.client
                .upsert("checkpoints", &checkpoint, "game_id,round")
                .await
        })
    }

    fn record_finish(&self, game: GameRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let query = format!("id=eq.{}", game.id);
            self.client.update("games", &query, &game).await
        })
    }
}

/// Durable store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rest_urls_ignore_trailing_slash() {
        let client = SupabaseClient::new(&SupabaseSettings {
            url: "https://example.supabase.co/".into(),
            service_role_key: "key".into(),
            request_timeout: Duration::from_secs(2),
        })
        .unwrap();
        assert_eq!(client.rest_url("games"), "https://example.supabase.co/rest/v1/games");
    }
}
