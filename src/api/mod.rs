//! Delivery of scraped profiles to the downstream API

pub mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ProfilePayload;

pub use client::ApiClient;

/// Receives each successfully scraped profile
#[async_trait]
pub trait ProfileSink: Send + Sync {
    async fn deliver(&self, payload: &ProfilePayload) -> Result<()>;
}
