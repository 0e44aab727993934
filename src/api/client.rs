use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::ProfileSink;
use crate::config::ApiConfig;
use crate::error::{CollectorError, Result};
use crate::models::ProfilePayload;

/// Client for the downstream ingestion API
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    route: Url,
    secret_token: String,
}

/// Summary some deployments return with a 200
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeliverySummary {
    pub total: Option<serde_json::Value>,
    pub erros: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DeliveryResponse {
    resposta: Option<DeliverySummary>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            route: config.route.clone(),
            secret_token: config.secret_token.clone(),
        })
    }

    /// POST `payload` as JSON with the bearer token
    pub async fn send_json(&self, payload: &ProfilePayload) -> Result<()> {
        let response = self
            .client
            .post(self.route.clone())
            .bearer_auth(&self.secret_token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(CollectorError::Delivery {
                status: status.as_u16(),
                body,
            });
        }

        match parse_summary(&body) {
            Some(summary) => info!(
                profile = %payload.username,
                total = %display_field(&summary.total),
                errors = %display_field(&summary.erros),
                "API accepted payload"
            ),
            None => debug!(profile = %payload.username, "API accepted payload"),
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileSink for ApiClient {
    async fn deliver(&self, payload: &ProfilePayload) -> Result<()> {
        self.send_json(payload).await
    }
}

/// The optional `resposta` summary of a success body; non-JSON bodies yield none
pub fn parse_summary(body: &str) -> Option<DeliverySummary> {
    serde_json::from_str::<DeliveryResponse>(body)
        .ok()
        .and_then(|r| r.resposta)
}

fn display_field(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "N/A".to_string(),
    }
}
