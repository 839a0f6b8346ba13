// src/ingest/providers/mod.rs
//! Extractors, one per fetch mechanism. Each turns a raw response body into
//! ordered candidates plus the item-level failures it stepped over.

pub mod document;
pub mod feed;
pub mod json_api;

use crate::ingest::error::ExtractionError;
use crate::ingest::types::{CandidateRecord, Mechanism};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub candidates: Vec<CandidateRecord>,
    /// Items dropped individually (malformed or incomplete).
    pub skipped: Vec<ExtractionError>,
}

/// Dispatch on the mechanism tag. Whole-response failures come back as `Err`.
pub fn extract(
    mechanism: &Mechanism,
    body: &str,
    endpoint: &str,
) -> Result<Extraction, ExtractionError> {
    match mechanism {
        Mechanism::Document { selectors } => document::extract(body, selectors, endpoint),
        Mechanism::Feed => feed::extract(body, endpoint),
        Mechanism::Api { items_key, .. } => json_api::extract(body, items_key.as_deref()),
    }
}
