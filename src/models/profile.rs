use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const PROFILE_URL_BASE: &str = "https://www.instagram.com";

/// Collection status stored per profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    NotCollected,
    Collected,
    Error,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileStatus::NotCollected => "not_collected",
            ProfileStatus::Collected => "collected",
            ProfileStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "not_collected" => Some(ProfileStatus::NotCollected),
            "collected" => Some(ProfileStatus::Collected),
            "error" => Some(ProfileStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Public profile metadata as returned by the scraper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub username: String,
    pub full_name: String,
    pub user_id: u64,
    pub biography: String,
    pub external_url: Option<String>,
    pub followers: u64,
    pub following: u64,
}

/// Body forwarded to the downstream API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePayload {
    pub username: String,
    pub full_name: String,
    pub profile_url: String,
    pub userid: u64,
    pub biography: String,
    pub external_url: Option<String>,
    pub followers: u64,
    pub following: u64,
}

impl From<ProfileRecord> for ProfilePayload {
    fn from(record: ProfileRecord) -> Self {
        Self {
            profile_url: format!("{}/{}/", PROFILE_URL_BASE, record.username),
            username: record.username,
            full_name: record.full_name,
            userid: record.user_id,
            biography: record.biography,
            external_url: record.external_url,
            followers: record.followers,
            following: record.following,
        }
    }
}

/// A status change not yet written to the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub profile: String,
    pub status: ProfileStatus,
    pub timestamp: DateTime<Utc>,
}

impl PendingUpdate {
    pub fn new(profile: impl Into<String>, status: ProfileStatus) -> Self {
        Self {
            profile: profile.into(),
            status,
            timestamp: Utc::now(),
        }
    }
}
