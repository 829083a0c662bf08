//! HTTP client for the accounting backend.
//!
//! Credentials ride as query parameters. Some tenants are provisioned
//! with key and token swapped, and one legacy gateway matches the
//! parameter names case-sensitively in upper case; on 401/403 the client
//! walks a fixed ladder of alternate encodings before giving up. This is
//! a compatibility affordance only: any other 4xx is surfaced
//! immediately and nothing is ever retried on application errors.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::SourceConfig;
use crate::extract;

use super::{normalize_candidates, DocumentSource, DocumentSummary, SourceError};

const BODY_SNIPPET_LEN: usize = 500;

/// Query-parameter encodings tried on auth failures, in order.
const AUTH_SCHEMES: [AuthScheme; 3] = [
    AuthScheme::Normal,
    AuthScheme::Swapped,
    AuthScheme::UpperCase,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthScheme {
    Normal,
    Swapped,
    UpperCase,
}

impl AuthScheme {
    fn params<'a>(self, key: &'a str, token: &'a str) -> [(&'static str, &'a str); 2] {
        match self {
            AuthScheme::Normal => [("APIKey", key), ("APIToken", token)],
            AuthScheme::Swapped => [("APIKey", token), ("APIToken", key)],
            AuthScheme::UpperCase => [("APIKEY", key), ("APITOKEN", token)],
        }
    }

    fn label(self) -> &'static str {
        match self {
            AuthScheme::Normal => "query_normal",
            AuthScheme::Swapped => "query_swapped",
            AuthScheme::UpperCase => "query_case_alt",
        }
    }
}

pub struct HttpDocumentSource {
    base_url: String,
    api_key: String,
    api_token: String,
    list_timeout: Duration,
    fetch_timeout: Duration,
    client: reqwest::Client,
}

impl HttpDocumentSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SourceError::NotConfigured {
                detail: "source.api_key is not set".to_string(),
            })?;
        let api_token = config
            .api_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SourceError::NotConfigured {
                detail: "source.api_token is not set".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("salesbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport {
                detail: e.to_string(),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_token,
            list_timeout: Duration::from_secs(config.list_timeout_secs),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            client,
        })
    }

    /// GET a path, walking the auth-scheme ladder on 401/403.
    /// Returns the final status and body; callers decide what non-success
    /// means for them.
    async fn get_with_auth(
        &self,
        path: &str,
        extra: &[(&str, String)],
        timeout: Duration,
    ) -> Result<(u16, String), SourceError> {
        let url = format!("{}{}", self.base_url, path);

        let mut last: Option<(u16, String)> = None;
        for scheme in AUTH_SCHEMES {
            let response = self
                .client
                .get(&url)
                .timeout(timeout)
                .query(&scheme.params(&self.api_key, &self.api_token))
                .query(extra)
                .send()
                .await
                .map_err(|e| SourceError::Transport {
                    detail: e.to_string(),
                })?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| SourceError::Transport {
                detail: e.to_string(),
            })?;

            // Only auth rejections advance the ladder
            if status != 401 && status != 403 {
                return Ok((status, body));
            }
            tracing::debug!(scheme = scheme.label(), status, path, "auth scheme rejected");
            last = Some((status, body));
        }

        // Ladder exhausted; report the final auth failure
        let (status, body) = last.unwrap_or((401, String::new()));
        Ok((status, body))
    }

    fn http_error(status: u16, body: &str) -> SourceError {
        SourceError::Http {
            status,
            snippet: body.chars().take(BODY_SNIPPET_LEN).collect(),
        }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn list_newer_than(
        &self,
        watermark: u64,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<u64>, SourceError> {
        let mut extra = Vec::new();
        if let Some(date) = date_hint {
            extra.push(("DateFrom", date.format("%Y-%m-%d").to_string()));
        }

        let (status, body) = self
            .get_with_auth("/api/sales", &extra, self.list_timeout)
            .await?;
        if !(200..300).contains(&status) {
            return Err(Self::http_error(status, &body));
        }

        let ids = extract::extract_document_ids(&body).map_err(|e| SourceError::Parse {
            detail: e.to_string(),
        })?;
        Ok(normalize_candidates(ids, watermark))
    }

    async fn fetch_full(&self, id: u64) -> Result<String, SourceError> {
        let primary = format!("/api/sale/{id}");
        let (status, body) = self
            .get_with_auth(&primary, &[], self.fetch_timeout)
            .await?;
        if (200..300).contains(&status) {
            return Ok(body);
        }

        // Some document types are only served through the UBL endpoint
        let fallback = format!("/api/saleUBL/{id}");
        tracing::debug!(id, status, "primary fetch failed, trying UBL endpoint");
        let (status2, body2) = self
            .get_with_auth(&fallback, &[], self.fetch_timeout)
            .await?;
        if (200..300).contains(&status2) {
            return Ok(body2);
        }

        Err(Self::http_error(status, &body))
    }

    async fn fetch_summary(&self, id: u64) -> Result<DocumentSummary, SourceError> {
        // The backend has no cheap summary endpoint; fetch and flatten
        let xml = self.fetch_full(id).await?;
        let fields = extract::extract_fields(&xml).map_err(|e| SourceError::Parse {
            detail: e.to_string(),
        })?;

        Ok(DocumentSummary {
            id,
            document_ref: fields.document_ref.clone(),
            comment: fields.comment.clone(),
            document_date: fields.date(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_scheme_params() {
        assert_eq!(
            AuthScheme::Normal.params("k", "t"),
            [("APIKey", "k"), ("APIToken", "t")]
        );
        assert_eq!(
            AuthScheme::Swapped.params("k", "t"),
            [("APIKey", "t"), ("APIToken", "k")]
        );
        assert_eq!(
            AuthScheme::UpperCase.params("k", "t"),
            [("APIKEY", "k"), ("APITOKEN", "t")]
        );
    }

    #[test]
    fn missing_credentials_are_configuration_errors() {
        let config = SourceConfig::default();
        assert!(matches!(
            HttpDocumentSource::new(&config),
            Err(SourceError::NotConfigured { .. })
        ));

        let config = SourceConfig {
            api_key: Some("k".to_string()),
            ..SourceConfig::default()
        };
        assert!(matches!(
            HttpDocumentSource::new(&config),
            Err(SourceError::NotConfigured { .. })
        ));
    }
}
