//! Downstream delivery boundary: the CRM worker call.
//!
//! The pipeline only depends on the worker's structured outcome: the
//! HTTP status, the top-level status tag, and the nested completion
//! trace the finalize gate uses as proof of full completion.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::DeliveryConfig;
use crate::extract::DocumentFields;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery worker not configured: {detail}")]
    NotConfigured { detail: String },
    #[error("delivery transport error: {detail}")]
    Transport { detail: String },
}

/// Normalized document summary sent to the worker
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRequest {
    pub document_id: u64,
    pub title: String,
    pub value: Option<f64>,
    pub currency: String,
    pub reference: Option<String>,
    pub client_name: Option<String>,
    pub pipeline_id: u64,
    pub stage_id: u64,
    /// Raw payload; the worker parses line items and syncs products from it
    pub raw_xml: String,
}

impl DeliveryRequest {
    /// Build the request from extracted document fields.
    pub fn from_fields(
        document_id: u64,
        fields: &DocumentFields,
        raw_xml: String,
        config: &DeliveryConfig,
    ) -> Self {
        let reference = fields.document_ref.clone();
        let title = match &reference {
            Some(r) => format!("DOC {document_id} {r}"),
            None => format!("DOC {document_id}"),
        };

        Self {
            document_id,
            title,
            value: fields.value(),
            currency: fields.currency.clone().unwrap_or_else(|| "EUR".to_string()),
            reference,
            client_name: fields.client_name.clone(),
            pipeline_id: config.pipeline_id,
            stage_id: config.stage_id,
            raw_xml,
        }
    }

    fn body(&self) -> serde_json::Value {
        json!({
            "document": {
                "id": self.document_id,
                "client": { "name": self.client_name, "email": null, "phone": null },
                "deal": {
                    "title": self.title,
                    "pipeline_id": self.pipeline_id,
                    "stage_id": self.stage_id,
                    "value": self.value,
                    "currency": self.currency,
                },
                "meta": { "document_ref": self.reference },
                "document_xml": self.raw_xml,
            }
        })
    }
}

/// One sub-step of the worker's own pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryTraceEntry {
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub ok: Option<bool>,
}

/// Structured body the worker returns
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeliveryBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub deal_id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub document_id: Option<u64>,
    #[serde(default)]
    pub line_items_count: Option<u64>,
    #[serde(default, rename = "_trace")]
    pub trace: Option<Vec<DeliveryTraceEntry>>,
}

/// Full outcome of one delivery call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryOutcome {
    pub status_code: u16,
    /// Parsed body when the worker returned valid JSON
    pub body: Option<DeliveryBody>,
}

impl DeliveryOutcome {
    pub fn is_http_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Post the document to the worker. Non-2xx responses are returned as
    /// outcomes, not errors; only transport failures error.
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryOutcome, DeliveryError>;
}

/// HTTP delivery client posting to the configured worker endpoint
pub struct HttpDeliveryClient {
    worker_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpDeliveryClient {
    pub fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let worker_url = config
            .worker_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DeliveryError::NotConfigured {
                detail: "delivery.worker_url is not set".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("salesbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Transport {
                detail: e.to_string(),
            })?;

        Ok(Self {
            worker_url,
            timeout: Duration::from_secs(config.timeout_secs),
            client,
        })
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryOutcome, DeliveryError> {
        let response = self
            .client
            .post(&self.worker_url)
            .timeout(self.timeout)
            .json(&request.body())
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                detail: e.to_string(),
            })?;

        let status_code = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| DeliveryError::Transport {
                detail: e.to_string(),
            })?;

        // A body that is not valid JSON is still an outcome; the finalize
        // gate simply finds no completion proof in it
        let body = serde_json::from_str::<DeliveryBody>(&text).ok();

        Ok(DeliveryOutcome { status_code, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> DocumentFields {
        DocumentFields {
            document_ref: Some("M-860325-29886".to_string()),
            currency: Some("EUR".to_string()),
            total: Some("125.50".to_string()),
            client_name: Some("SIA Example".to_string()),
            ..DocumentFields::default()
        }
    }

    #[test]
    fn request_title_includes_id_and_reference() {
        let request = DeliveryRequest::from_fields(
            15_560_678,
            &fields(),
            "<Sale/>".to_string(),
            &DeliveryConfig::default(),
        );
        assert_eq!(request.title, "DOC 15560678 M-860325-29886");
        assert_eq!(request.value, Some(125.50));
        assert_eq!(request.currency, "EUR");
    }

    #[test]
    fn request_without_reference_still_has_title() {
        let request = DeliveryRequest::from_fields(
            7,
            &DocumentFields::default(),
            String::new(),
            &DeliveryConfig::default(),
        );
        assert_eq!(request.title, "DOC 7");
        // Currency falls back to the accounting backend's default
        assert_eq!(request.currency, "EUR");
    }

    #[test]
    fn body_nests_document_and_deal() {
        let request = DeliveryRequest::from_fields(
            7,
            &fields(),
            "<Sale/>".to_string(),
            &DeliveryConfig::default(),
        );
        let body = request.body();
        assert_eq!(body["document"]["id"], 7);
        assert_eq!(body["document"]["deal"]["pipeline_id"], 7);
        assert_eq!(body["document"]["document_xml"], "<Sale/>");
    }

    #[test]
    fn outcome_body_parses_worker_trace() {
        let text = r#"{
            "status": "created",
            "deal_id": 991,
            "_trace": [
                {"step": "deal", "ok": true},
                {"step": "products", "ok": false}
            ]
        }"#;
        let body: DeliveryBody = serde_json::from_str(text).unwrap();
        assert_eq!(body.status.as_deref(), Some("created"));
        let trace = body.trace.unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[1].ok, Some(false));
    }

    #[test]
    fn missing_worker_url_is_configuration_error() {
        assert!(matches!(
            HttpDeliveryClient::new(&DeliveryConfig::default()),
            Err(DeliveryError::NotConfigured { .. })
        ));
    }
}
