//! Deadline wrapper for inference clients.

use async_trait::async_trait;
use std::time::Duration;

use crate::client::{InferenceClient, InferenceRequest, InferenceResponse};
use crate::error::{InferenceError, Result};

/// Fails a call with [`InferenceError::Timeout`] once `timeout` elapses.
///
/// The underlying request future is dropped on expiry.
pub struct TimeoutClient<C> {
    inner: C,
    timeout: Duration,
}

impl<C: InferenceClient> TimeoutClient<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C: InferenceClient> InferenceClient for TimeoutClient<C> {
    async fn predict(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        match tokio::time::timeout(self.timeout, self.inner.predict(request)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(self.timeout)),
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy(Duration);

    #[async_trait]
    impl InferenceClient for Sleepy {
        async fn predict(&self, _request: &InferenceRequest) -> Result<InferenceResponse> {
            tokio::time::sleep(self.0).await;
            Ok(InferenceResponse { binding_affinity_pk: 6.0, confidence_score: 0.5 })
        }
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let client = TimeoutClient::new(Sleepy(Duration::from_secs(5)), Duration::from_millis(20));
        let err = client.predict(&InferenceRequest::new("C", "M")).await.unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let client = TimeoutClient::new(Sleepy(Duration::from_millis(1)), Duration::from_secs(5));
        let resp = client.predict(&InferenceRequest::new("C", "M")).await.unwrap();
        assert_eq!(resp.binding_affinity_pk, 6.0);
    }
}
