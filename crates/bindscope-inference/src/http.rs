//! HTTP client for the affinity endpoint.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, instrument};

use crate::client::{InferenceClient, InferenceRequest, InferenceResponse};
use crate::error::{InferenceError, Result};

const PREDICT_PATH: &str = "/predict";

pub struct HttpInferenceClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpInferenceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bindscope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(base_url, client)
    }

    /// Use a preconfigured reqwest client (proxies, TLS roots, ...).
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(InferenceError::Config("inference base URL is empty".to_string()));
        }
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn predict_url(&self) -> String {
        format!("{}{}", self.base_url, PREDICT_PATH)
    }
}

/// Map a non-success response onto an error, pulling the message out of the
/// usual JSON error envelopes when present.
async fn error_from_response(resp: reqwest::Response) -> InferenceError {
    let status = resp.status();
    let retry_after_secs = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    if status == StatusCode::TOO_MANY_REQUESTS {
        return InferenceError::RateLimited { retry_after_secs };
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|body| {
            body["detail"]
                .as_str()
                .or_else(|| body["error"].as_str())
                .or_else(|| body["error"]["message"].as_str())
                .or_else(|| body["message"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown API error").to_string()
            } else {
                text.trim().to_string()
            }
        });

    InferenceError::Api { status: status.as_u16(), message }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    #[instrument(skip(self, request), fields(drug = ?request.drug_name, protein = ?request.protein_name))]
    async fn predict(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let resp = self.client.post(self.predict_url()).json(request).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: InferenceResponse = resp.json().await?;
        if !body.binding_affinity_pk.is_finite() || !body.confidence_score.is_finite() {
            return Err(InferenceError::InvalidResponse(format!(
                "non-finite prediction: pk={}, confidence={}",
                body.binding_affinity_pk, body.confidence_score
            )));
        }

        debug!(pk = body.binding_affinity_pk, confidence = body.confidence_score, "Prediction received");
        Ok(body)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = HttpInferenceClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.predict_url(), "http://localhost:8000/predict");
    }

    #[test]
    fn test_empty_base_url_is_rejected() {
        assert!(matches!(HttpInferenceClient::new(""), Err(InferenceError::Config(_))));
    }
}
