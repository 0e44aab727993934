pub mod profile;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::PendingUpdate;

pub use profile::ProfileRepository;

/// Storage of per-profile collection status
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Up to `limit` identifiers whose status is `not_collected`
    async fn sample_pending(&self, limit: i64) -> Result<Vec<String>>;

    /// Apply status updates as one unordered bulk write
    async fn apply_updates(&self, updates: &[PendingUpdate]) -> Result<u64>;

    async fn close(&self);
}
