//! GitHub repository contents backed state store.
//!
//! Each record is a small text file in a state repository. The contents
//! API returns a blob `sha` with every read and rejects writes whose
//! `sha` no longer matches, which is exactly the version-token contract
//! the pipeline needs: read, remember the sha, write conditioned on it.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use crate::config::StoreConfig;

use super::{StateStore, StoreError, VersionedRecord, WriteOutcome};

const GITHUB_API_VERSION: &str = "2022-11-28";
const BODY_SNIPPET_LEN: usize = 500;

/// State store over the GitHub repository contents API
pub struct GitHubStateStore {
    api_base: String,
    owner: String,
    repo: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<String>,
    sha: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: Option<PutContent>,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

impl GitHubStateStore {
    /// Build a store from configuration. Fails fast when the token is
    /// missing; a store without credentials can never make progress.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StoreError::NotConfigured {
                detail: "store.token is not set".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("salesbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport {
                detail: e.to_string(),
            })?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token,
            client,
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    fn decode_content(encoded: &str) -> Result<String, StoreError> {
        // The contents API wraps base64 at 60 columns
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| StoreError::Decode {
                detail: format!("invalid base64 content: {e}"),
            })?;
        String::from_utf8(bytes).map_err(|e| StoreError::Decode {
            detail: format!("record is not UTF-8: {e}"),
        })
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

#[async_trait]
impl StateStore for GitHubStateStore {
    async fn read(&self, key: &str) -> Result<VersionedRecord, StoreError> {
        let response = self
            .request(self.client.get(self.contents_url(key)))
            .send()
            .await
            .map_err(|e| StoreError::Transport {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(VersionedRecord::default());
        }

        let body = response.text().await.map_err(|e| StoreError::Transport {
            detail: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                snippet: snippet(&body),
            });
        }

        let parsed: ContentResponse =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode {
                detail: format!("contents response: {e}"),
            })?;

        let value = match parsed.content {
            Some(encoded) => Some(Self::decode_content(&encoded)?),
            None => None,
        };

        Ok(VersionedRecord {
            value,
            version: parsed.sha,
        })
    }

    async fn write(
        &self,
        key: &str,
        value: &str,
        expected_version: Option<&str>,
    ) -> Result<WriteOutcome, StoreError> {
        let body = PutRequest {
            message: &format!("state: set {key}"),
            content: general_purpose::STANDARD.encode(value.as_bytes()),
            sha: expected_version,
        };

        let response = self
            .request(self.client.put(self.contents_url(key)))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Transport {
                detail: e.to_string(),
            })?;

        let status = response.status();

        // 409 is an explicit conflict; 422 is how the contents API rejects
        // a missing or stale sha
        if status == reqwest::StatusCode::CONFLICT
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            return Ok(WriteOutcome::Conflict);
        }

        let text = response.text().await.map_err(|e| StoreError::Transport {
            detail: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                snippet: snippet(&text),
            });
        }

        let parsed: PutResponse = serde_json::from_str(&text).map_err(|e| StoreError::Decode {
            detail: format!("contents put response: {e}"),
        })?;

        let version = parsed
            .content
            .map(|c| c.sha)
            .ok_or_else(|| StoreError::Decode {
                detail: "contents put response missing content.sha".to_string(),
            })?;

        Ok(WriteOutcome::Written { version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_a_configuration_error() {
        let config = StoreConfig::default();
        assert!(matches!(
            GitHubStateStore::new(&config),
            Err(StoreError::NotConfigured { .. })
        ));
    }

    #[test]
    fn decode_handles_wrapped_base64() {
        // "15560678" encoded and wrapped the way the contents API returns it
        let wrapped = "MTU1\nNjA2\nNzg=\n";
        assert_eq!(
            GitHubStateStore::decode_content(wrapped).unwrap(),
            "15560678"
        );
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(matches!(
            GitHubStateStore::decode_content("!!!"),
            Err(StoreError::Decode { .. })
        ));
    }

    #[test]
    fn contents_url_includes_owner_repo_and_path() {
        let config = StoreConfig {
            token: Some("t".to_string()),
            ..StoreConfig::default()
        };
        let store = GitHubStateStore::new(&config).unwrap();
        assert_eq!(
            store.contents_url("state/last_processed_id.txt"),
            "https://api.github.com/repos/example-org/sync-state/contents/state/last_processed_id.txt"
        );
    }
}
