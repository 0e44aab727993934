//! Profile scraping collaborator and its failure classification

pub mod instagram;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ProfileRecord;

pub use instagram::InstagramScraper;

/// Phrases the upstream uses when it throttles the caller
const RATE_LIMIT_PHRASES: &[&str] = &[
    "please wait a few minutes before you try again",
    "too many requests",
];

/// Fetches public profile metadata by username
#[async_trait]
pub trait ProfileScraper: Send + Sync {
    async fn fetch(&self, username: &str) -> Result<ProfileRecord>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeFailureKind {
    RateLimited,
    Other,
}

impl ScrapeFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeFailureKind::RateLimited => "rate_limited",
            ScrapeFailureKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ScrapeFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a scrape error by its message text
pub fn classify_scrape_error(message: &str) -> ScrapeFailureKind {
    let message = message.to_lowercase();
    if RATE_LIMIT_PHRASES.iter().any(|p| message.contains(p)) {
        ScrapeFailureKind::RateLimited
    } else {
        ScrapeFailureKind::Other
    }
}
