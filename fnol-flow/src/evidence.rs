//! Evidence store adapter.
//!
//! Uploads, file storage and the OCR/vision extraction call are all external;
//! the core only consumes the structured result keyed by an evidence
//! reference. `EvidenceNotReady` is retriable (the pipeline is still
//! working), `EvidenceInvalid` means the claimant must re-upload.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FnolError, Result};

/// Structured fields extracted from an uploaded document or photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub incident_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub report_number: Option<String>,
    pub total_amount: Option<Decimal>,
    /// Extraction confidence in [0, 1] as reported by the pipeline.
    pub confidence: f64,
}

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn get_extracted_entities(&self, evidence_ref: &str) -> Result<ExtractedEntities>;
}

#[derive(Debug, Clone)]
enum ExtractionState {
    Processing,
    Ready(ExtractedEntities),
    Invalid(String),
}

/// In-memory store for tests and local development. The external pipeline is
/// simulated by registering extraction results explicitly.
pub struct InMemoryEvidenceStore {
    records: DashMap<String, ExtractionState>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Mark an upload as received but not yet extracted.
    pub fn mark_processing(&self, evidence_ref: &str) {
        self.records
            .insert(evidence_ref.to_string(), ExtractionState::Processing);
    }

    /// Register the extraction result for an upload.
    pub fn put_extracted(&self, evidence_ref: &str, entities: ExtractedEntities) {
        self.records
            .insert(evidence_ref.to_string(), ExtractionState::Ready(entities));
    }

    pub fn mark_invalid(&self, evidence_ref: &str, reason: &str) {
        self.records.insert(
            evidence_ref.to_string(),
            ExtractionState::Invalid(reason.to_string()),
        );
    }
}

impl Default for InMemoryEvidenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn get_extracted_entities(&self, evidence_ref: &str) -> Result<ExtractedEntities> {
        match self.records.get(evidence_ref).map(|e| e.clone()) {
            Some(ExtractionState::Ready(entities)) => Ok(entities),
            Some(ExtractionState::Processing) => {
                Err(FnolError::EvidenceNotReady(evidence_ref.to_string()))
            }
            Some(ExtractionState::Invalid(reason)) => Err(FnolError::EvidenceInvalid(format!(
                "{evidence_ref}: {reason}"
            ))),
            None => Err(FnolError::EvidenceInvalid(format!(
                "{evidence_ref}: unknown evidence reference"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn processing_then_ready() {
        let store = InMemoryEvidenceStore::new();
        store.mark_processing("ev-1");

        let err = store.get_extracted_entities("ev-1").await.unwrap_err();
        assert!(matches!(err, FnolError::EvidenceNotReady(_)));
        assert!(err.is_retriable());

        store.put_extracted(
            "ev-1",
            ExtractedEntities {
                incident_date: None,
                location: None,
                report_number: None,
                total_amount: None,
                confidence: 0.9,
            },
        );
        let entities = store.get_extracted_entities("ev-1").await.unwrap();
        assert_eq!(entities.confidence, 0.9);
    }

    #[tokio::test]
    async fn unknown_reference_is_invalid() {
        let store = InMemoryEvidenceStore::new();
        let err = store.get_extracted_entities("missing").await.unwrap_err();
        assert!(matches!(err, FnolError::EvidenceInvalid(_)));
        assert!(!err.is_retriable());
    }
}
