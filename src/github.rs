//! GitHub data provider
//!
//! Thin client over the GitHub REST API surface the sync engine consumes:
//! the authenticated user, their public repositories and organizations, and
//! each organization's public repositories. Multi-page listings are followed
//! through the `Link` header and fully materialized before returning, so the
//! reconciliation diff never runs against a partial listing.

use reqwest::Response;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Production API root; tests point `base_url` at a wiremock server instead.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!("hubsync/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: &str = "100";

/// Errors surfaced by data provider calls. The engine never retries these;
/// retry policy lives with the task consumer.
#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GitHub API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error talking to GitHub: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid GitHub API url: {0}")]
    Url(#[from] url::ParseError),
}

/// Owner half of a repository listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct OwnerRecord {
    pub id: i64,
    pub login: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Requesting user's access flags as reported per repository.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PermissionRecord {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

/// One repository as returned by the listing endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoRecord {
    pub id: i64,
    pub name: String,
    pub html_url: String,
    pub owner: OwnerRecord,
    #[serde(default)]
    pub permissions: PermissionRecord,
}

/// One organization as returned by listing or detail endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgRecord {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
}

/// The authenticated user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub login: String,
}

/// GitHub API client bound to one user's access token.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GithubClient {
    /// Creates a client against the production API root.
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    /// Creates a client against an explicit API root (mock servers in tests).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Public repositories owned directly by the authenticated user.
    pub async fn list_user_repositories(&self) -> Result<Vec<RepoRecord>, GithubError> {
        let url = self.listing_url("/user/repos", &[("type", "public")])?;
        self.get_paginated(url).await
    }

    /// Organizations the authenticated user belongs to.
    pub async fn list_user_organizations(&self) -> Result<Vec<OrgRecord>, GithubError> {
        let url = self.listing_url("/user/orgs", &[])?;
        self.get_paginated(url).await
    }

    /// Public repositories owned by the given organization.
    pub async fn list_org_repositories(&self, login: &str) -> Result<Vec<RepoRecord>, GithubError> {
        let url = self.listing_url(&format!("/orgs/{login}/repos"), &[("type", "public")])?;
        self.get_paginated(url).await
    }

    /// Detail record for one organization (listing payloads omit the name).
    pub async fn get_organization(&self, login: &str) -> Result<OrgRecord, GithubError> {
        let url = Url::parse(&format!("{}/orgs/{login}", self.base_url))?;
        let response = self.send(url).await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// The authenticated user behind this client's token.
    pub async fn get_user(&self) -> Result<UserRecord, GithubError> {
        let url = Url::parse(&format!("{}/user", self.base_url))?;
        let response = self.send(url).await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    fn listing_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, GithubError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("per_page", PER_PAGE);
        }
        Ok(url)
    }

    /// Follows `rel="next"` links until the listing is exhausted.
    async fn get_paginated<T: serde::de::DeserializeOwned>(
        &self,
        first: Url,
    ) -> Result<Vec<T>, GithubError> {
        let mut next = Some(first);
        let mut items = Vec::new();

        while let Some(url) = next.take() {
            let response = self.send(url).await?;

            let link_header = response
                .headers()
                .get("Link")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string());

            let response = Self::check_status(response).await?;
            let page: Vec<T> = response.json().await?;
            items.extend(page);

            if let Some(link) = link_header.as_deref().and_then(parse_link_next) {
                next = Some(Url::parse(&link)?);
            }
        }

        Ok(items)
    }

    async fn send(&self, url: Url) -> Result<Response, GithubError> {
        Ok(self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await?)
    }

    async fn check_status(response: Response) -> Result<Response, GithubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "GitHub API call failed");
        Err(GithubError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Extracts the `rel="next"` target from a GitHub `Link` header.
///
/// Header format: `<https://api.github.com/resource?page=2>; rel="next",
/// <https://api.github.com/resource?page=5>; rel="last"`.
fn parse_link_next(link_header: &str) -> Option<String> {
    for link in link_header.split(',') {
        let mut parts = link.split(';');
        let url_part = parts.next()?.trim();
        let is_next = parts.any(|rel| rel.trim().contains("rel=\"next\""));
        if is_next
            && let Some(start) = url_part.find('<')
            && let Some(end) = url_part.find('>')
        {
            return Some(url_part[start + 1..end].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_link_next_picks_next_relation() {
        let header = r#"<https://api.github.com/user/repos?page=2>; rel="next", <https://api.github.com/user/repos?page=5>; rel="last""#;
        assert_eq!(
            parse_link_next(header).as_deref(),
            Some("https://api.github.com/user/repos?page=2")
        );
    }

    #[test]
    fn parse_link_next_none_on_last_page() {
        let header = r#"<https://api.github.com/user/repos?page=1>; rel="first", <https://api.github.com/user/repos?page=4>; rel="prev""#;
        assert_eq!(parse_link_next(header), None);
    }

    #[test]
    fn repo_record_deserializes_github_payload() {
        let payload = serde_json::json!({
            "id": 1000,
            "name": "test",
            "html_url": "https://github.com/xobb1t/test",
            "owner": {"login": "xobb1t", "type": "User", "id": 3000},
            "permissions": {"admin": true, "push": false, "pull": true},
            "fork": false
        });
        let repo: RepoRecord = serde_json::from_value(payload).unwrap();
        assert_eq!(repo.id, 1000);
        assert_eq!(repo.owner.kind, "User");
        assert!(repo.permissions.admin);
        assert!(!repo.permissions.push);
    }

    #[test]
    fn org_record_tolerates_missing_name() {
        let payload = serde_json::json!({"id": 5000, "login": "acme"});
        let org: OrgRecord = serde_json::from_value(payload).unwrap();
        assert_eq!(org.login, "acme");
        assert!(org.name.is_none());
    }
}
