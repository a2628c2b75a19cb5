use async_trait::async_trait;
use base64::Engine as _;

use crate::config::DetectorConfig;
use crate::errors::{BenchError, BenchResult};
use crate::scoring::BoundingBox;
use crate::services::traits::ElementDetector;

/// Client for the vision-detector service.
pub struct HttpElementDetector {
    api_url: String,
    client: reqwest::Client,
}

impl HttpElementDetector {
    pub fn new(config: &DetectorConfig, client: reqwest::Client) -> Self {
        Self {
            api_url: config.api_url.clone(),
            client,
        }
    }
}

#[async_trait]
impl ElementDetector for HttpElementDetector {
    async fn detect(&self, image_bytes: &[u8], query: &str) -> BenchResult<Option<BoundingBox>> {
        let body = serde_json::json!({
            "query": query,
            "imgBase64": base64::engine::general_purpose::STANDARD.encode(image_bytes),
        });

        tracing::debug!(
            url = %self.api_url,
            query = %query,
            image_len = image_bytes.len(),
            "sending detector request"
        );

        let response = self.client.post(&self.api_url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(BenchError::Detector(format!("{}: {}", status, err_body)));
        }

        let json: serde_json::Value = response.json().await?;
        let bbox = parse_detector_response(&json);
        tracing::info!(bbox = ?bbox, "detector response received");
        Ok(bbox)
    }
}

/// Pull `data.bbox` out of a detector reply. Anything other than four
/// numbers means no prediction.
pub fn parse_detector_response(json: &serde_json::Value) -> Option<BoundingBox> {
    let values: Vec<f64> = json["data"]["bbox"]
        .as_array()?
        .iter()
        .map(|v| v.as_f64())
        .collect::<Option<_>>()?;
    BoundingBox::from_slice(&values)
}
