//! Inference client trait and wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub smiles: String,
    pub fasta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein_name: Option<String>,
}

impl InferenceRequest {
    pub fn new(smiles: impl Into<String>, fasta: impl Into<String>) -> Self {
        Self {
            smiles: smiles.into(),
            fasta: fasta.into(),
            drug_name: None,
            protein_name: None,
        }
    }

    pub fn with_names(mut self, drug_name: impl Into<String>, protein_name: impl Into<String>) -> Self {
        self.drug_name = Some(drug_name.into());
        self.protein_name = Some(protein_name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub binding_affinity_pk: f64,
    /// Model confidence on the 0–1 scale.
    pub confidence_score: f64,
}

impl InferenceResponse {
    /// Confidence rescaled to 0–100 for storage and display.
    pub fn confidence_percent(&self) -> f64 {
        self.confidence_score * 100.0
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// A remote (or mocked) affinity predictor.
///
/// Implementations may be slow and may fail; callers own retry and timeout
/// policy.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn predict(&self, request: &InferenceRequest) -> Result<InferenceResponse>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "inference"
    }
}

#[async_trait]
impl<T: InferenceClient + ?Sized> InferenceClient for Arc<T> {
    async fn predict(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        (**self).predict(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_missing_names() {
        let json = serde_json::to_value(InferenceRequest::new("CCO", "MKT")).unwrap();
        assert_eq!(json, serde_json::json!({"smiles": "CCO", "fasta": "MKT"}));

        let named = InferenceRequest::new("CCO", "MKT").with_names("Ethanol", "ADH1");
        let json = serde_json::to_value(named).unwrap();
        assert_eq!(json["drug_name"], "Ethanol");
        assert_eq!(json["protein_name"], "ADH1");
    }

    #[test]
    fn test_confidence_percent() {
        let resp = InferenceResponse { binding_affinity_pk: 7.2, confidence_score: 0.875 };
        assert!((resp.confidence_percent() - 87.5).abs() < 1e-9);
    }
}
