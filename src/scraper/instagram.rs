use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::ProfileScraper;
use crate::error::{CollectorError, Result};
use crate::models::ProfileRecord;

const PROFILE_ENDPOINT: &str = "https://i.instagram.com/api/v1/users/web_profile_info/";
const APP_ID: &str = "936619743392459";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Scraper for the public web profile endpoint
#[derive(Clone)]
pub struct InstagramScraper {
    client: Client,
    endpoint: String,
}

impl InstagramScraper {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(PROFILE_ENDPOINT, DEFAULT_TIMEOUT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        // No idle sockets: after a rotation every request must use the new tunnel.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ProfileScraper for InstagramScraper {
    async fn fetch(&self, username: &str) -> Result<ProfileRecord> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("username", username)])
            .header("x-ig-app-id", APP_ID)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(profile = %username, status = status.as_u16(), "Profile response");

        if status == StatusCode::NOT_FOUND {
            return Err(CollectorError::ProfileNotFound {
                username: username.to_string(),
            });
        }
        if !status.is_success() {
            return Err(CollectorError::Upstream {
                status: status.as_u16(),
                message: upstream_message(status, &body),
            });
        }

        parse_profile(username, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    data: Option<ProfileData>,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    user: Option<UserNode>,
}

#[derive(Debug, Deserialize)]
struct UserNode {
    id: String,
    username: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    biography: Option<String>,
    #[serde(default)]
    external_url: Option<String>,
    edge_followed_by: EdgeCount,
    edge_follow: EdgeCount,
}

#[derive(Debug, Deserialize)]
struct EdgeCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    message: Option<String>,
}

/// Map a successful response body to a profile record
pub fn parse_profile(username: &str, body: &str) -> Result<ProfileRecord> {
    let response: ProfileResponse = serde_json::from_str(body)
        .map_err(|e| CollectorError::InvalidProfile(format!("{}: {}", username, e)))?;

    let user = response
        .data
        .and_then(|d| d.user)
        .ok_or_else(|| CollectorError::ProfileNotFound {
            username: username.to_string(),
        })?;

    let user_id = user.id.parse::<u64>().map_err(|_| {
        CollectorError::InvalidProfile(format!("{}: non-numeric id {:?}", username, user.id))
    })?;

    Ok(ProfileRecord {
        username: user.username,
        full_name: user.full_name.unwrap_or_default(),
        user_id,
        biography: user.biography.unwrap_or_default(),
        external_url: user.external_url.filter(|u| !u.is_empty()),
        followers: user.edge_followed_by.count,
        following: user.edge_follow.count,
    })
}

/// Message text of a refused request, preferring the upstream's own wording
pub fn upstream_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<UpstreamError>(body)
        .ok()
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::{classify_scrape_error, ScrapeFailureKind};

    const PROFILE_BODY: &str = r#"{
        "data": {
            "user": {
                "id": "25025320",
                "username": "instagram",
                "full_name": "Instagram",
                "biography": "Discover what's new.",
                "external_url": "https://help.instagram.com/",
                "edge_followed_by": {"count": 672000000},
                "edge_follow": {"count": 220},
                "is_private": false
            }
        },
        "status": "ok"
    }"#;

    #[test]
    fn test_parse_profile() {
        let record = parse_profile("instagram", PROFILE_BODY).unwrap();
        assert_eq!(record.username, "instagram");
        assert_eq!(record.user_id, 25025320);
        assert_eq!(record.full_name, "Instagram");
        assert_eq!(record.external_url.as_deref(), Some("https://help.instagram.com/"));
        assert_eq!(record.followers, 672000000);
        assert_eq!(record.following, 220);
    }

    #[test]
    fn test_parse_profile_nullable_fields() {
        let body = r#"{"data":{"user":{"id":"1","username":"quiet","full_name":null,
            "biography":"","external_url":"","edge_followed_by":{"count":0},
            "edge_follow":{"count":3}}}}"#;
        let record = parse_profile("quiet", body).unwrap();
        assert_eq!(record.full_name, "");
        assert!(record.external_url.is_none());
    }

    #[test]
    fn test_parse_profile_missing_user() {
        let err = parse_profile("ghost", r#"{"data":{"user":null},"status":"ok"}"#).unwrap_err();
        assert!(matches!(err, CollectorError::ProfileNotFound { .. }));
    }

    #[test]
    fn test_parse_profile_invalid_body() {
        let err = parse_profile("x", "<html>login</html>").unwrap_err();
        assert!(matches!(err, CollectorError::InvalidProfile(_)));
    }

    #[test]
    fn test_upstream_message_is_rate_limit() {
        let body = r#"{"message":"Please wait a few minutes before you try again.","require_login":true,"status":"fail"}"#;
        let message = upstream_message(StatusCode::UNAUTHORIZED, body);
        assert_eq!(message, "Please wait a few minutes before you try again.");
        assert_eq!(classify_scrape_error(&message), ScrapeFailureKind::RateLimited);
    }

    #[test]
    fn test_upstream_message_falls_back_to_reason() {
        assert_eq!(
            upstream_message(StatusCode::TOO_MANY_REQUESTS, ""),
            "Too Many Requests"
        );
    }
}
