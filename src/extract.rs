//! Field extraction from sales document XML payloads.
//!
//! The pipeline treats fetched documents as opaque text; this module is
//! the collaborator that flattens the handful of header fields the
//! delivery payload and the override filters need. Everything is
//! optional: upstream documents omit fields freely and the delivery
//! worker copes with holes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SNIPPET_LEN: usize = 400;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The payload is not well-formed XML; carries a bounded snippet for
    /// diagnosis.
    #[error("XML parse error: {detail} (snippet: {snippet})")]
    Parse { detail: String, snippet: String },
}

/// Flattened header fields of a sales document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentFields {
    pub document_date: Option<String>,
    pub document_ref: Option<String>,
    pub document_status: Option<String>,
    pub sale_type: Option<String>,
    pub operation: Option<String>,
    pub currency: Option<String>,
    pub total: Option<String>,
    pub amount_due: Option<String>,
    pub issued_by: Option<String>,
    pub comment: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub ship_to: Option<String>,
    pub ship_address: Option<String>,
    pub ship_zip: Option<String>,
    pub ship_country: Option<String>,
}

impl DocumentFields {
    /// Document date parsed as a calendar date, when present and ISO-formatted
    pub fn date(&self) -> Option<NaiveDate> {
        self.document_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
    }

    /// Deal value parsed from the document total
    pub fn value(&self) -> Option<f64> {
        self.total.as_deref().and_then(|t| t.trim().parse().ok())
    }
}

/// Extract the header fields from a full document payload.
pub fn extract_fields(xml: &str) -> Result<DocumentFields, ExtractError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| ExtractError::Parse {
        detail: e.to_string(),
        snippet: xml.chars().take(SNIPPET_LEN).collect(),
    })?;

    let root = doc.root_element();

    Ok(DocumentFields {
        document_date: text_at(root, &["Header", "Document", "DocumentDate"]),
        document_ref: text_at(root, &["Header", "Document", "DocumentRef"]),
        document_status: text_at(root, &["Header", "Document", "DocumentStatus"]),
        sale_type: text_at(root, &["Header", "SaleType"]),
        operation: text_at(root, &["Header", "Operation"]),
        currency: text_at(root, &["Header", "Currency"]),
        total: text_at(root, &["Header", "Total"]),
        amount_due: text_at(root, &["Header", "AmountDue"]),
        issued_by: text_at(root, &["Header", "IssuedBy"]),
        comment: text_at(root, &["Header", "Comment"]),
        client_id: text_at(root, &["Header", "Document", "Client", "ClientID"]),
        client_name: text_at(root, &["Header", "Document", "Client", "ClientName"]),
        ship_to: text_at(root, &["Header", "ShippingData", "ShippingAddress", "ShipTo"]),
        ship_address: text_at(root, &["Header", "ShippingData", "ShippingAddress", "Address"]),
        ship_zip: text_at(root, &["Header", "ShippingData", "ShippingAddress", "Zip"]),
        ship_country: text_at(root, &["Header", "ShippingData", "ShippingAddress", "Country"]),
    })
}

/// Collect every `<DocumentID>` in a list payload, in document order.
pub fn extract_document_ids(xml: &str) -> Result<Vec<u64>, ExtractError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| ExtractError::Parse {
        detail: e.to_string(),
        snippet: xml.chars().take(SNIPPET_LEN).collect(),
    })?;

    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name("DocumentID"))
        .filter_map(|n| n.text())
        .filter_map(|t| t.trim().parse().ok())
        .collect())
}

/// Walk a fixed child-element path from `node`, returning trimmed text.
fn text_at(node: roxmltree::Node, path: &[&str]) -> Option<String> {
    let mut current = node;
    for name in path {
        current = current
            .children()
            .find(|c| c.is_element() && c.has_tag_name(*name))?;
    }
    let text = current.text()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
