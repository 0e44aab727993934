use std::mem;

use tracing::{debug, error, info};

use crate::models::{PendingUpdate, ProfileStatus};
use crate::repository::ProfileStore;

/// Status changes accumulated between flushes, in arrival order
#[derive(Debug, Default)]
pub struct PendingUpdates {
    updates: Vec<PendingUpdate>,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, profile: impl Into<String>, status: ProfileStatus) {
        self.updates.push(PendingUpdate::new(profile, status));
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Write the batch to `store`; the batch is cleared whatever the outcome
    pub async fn flush(&mut self, store: &dyn ProfileStore) -> bool {
        if self.updates.is_empty() {
            debug!("No pending status updates to flush");
            return true;
        }

        let batch = mem::take(&mut self.updates);
        match store.apply_updates(&batch).await {
            Ok(matched) => {
                info!(
                    phase = "flush",
                    submitted = batch.len(),
                    matched,
                    "Pending status updates written"
                );
                true
            }
            Err(e) => {
                error!(
                    phase = "flush",
                    dropped = batch.len(),
                    category = %e.category(),
                    "Failed to write pending status updates: {}",
                    e
                );
                false
            }
        }
    }
}
