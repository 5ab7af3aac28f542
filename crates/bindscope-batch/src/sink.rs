//! Where successful batch predictions are recorded.

use async_trait::async_trait;
use bindscope_common::NewPrediction;
use bindscope_db::PredictionRepository;

/// Destination for successful predictions. Returns the stored record id.
#[async_trait]
pub trait PredictionSink: Send + Sync {
    async fn record(&self, prediction: NewPrediction) -> anyhow::Result<String>;
}

#[async_trait]
impl PredictionSink for PredictionRepository {
    async fn record(&self, prediction: NewPrediction) -> anyhow::Result<String> {
        Ok(self.add(prediction).await?)
    }
}
