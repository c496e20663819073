//! Hosted zero-shot image classifier.
//!
//! Speaks the Hugging Face zero-shot-image-classification contract, which
//! self-hosted CLIP servers commonly mirror:
//!
//! ```text
//! POST {base_url}/models/{model}
//! {"inputs": "<base64 image>",
//!  "parameters": {"candidate_labels": [...], "hypothesis_template": "a photo of a {}"}}
//!
//! 200 -> [{"label": "dog", "score": 0.93}, ...]
//! 4xx/5xx -> {"error": "...", "estimated_time": 20.0}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::debug;

use super::InferenceAdapter;
use crate::config::InferenceProvider;
use crate::error::{Error, Result};
use crate::models::{Prediction, Predictions};

/// Maximum attempts per request
const MAX_RETRIES: u32 = 3;

/// Delay between retries (doubles each time)
const RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Scores(Vec<Prediction>),
    Failure {
        error: String,
        #[serde(default)]
        estimated_time: Option<f64>,
    },
}

/// HTTP client for a hosted CLIP-style classifier.
pub struct HostedClassifier {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    hypothesis_template: String,
    client: Client,
    retry_delay: Duration,
}

impl HostedClassifier {
    /// Create a classifier for one configured provider.
    pub fn new(
        provider: &InferenceProvider,
        hypothesis_template: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: provider.name.clone(),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            model: provider.model.clone(),
            api_key: provider.api_key.clone(),
            hypothesis_template: hypothesis_template.to_string(),
            client,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Override the initial retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }

    async fn call(
        &self,
        image: &[u8],
        labels: &[String],
    ) -> std::result::Result<Predictions, CallFailure> {
        let body = json!({
            "inputs": STANDARD.encode(image),
            "parameters": {
                "candidate_labels": labels,
                "hypothesis_template": self.hypothesis_template,
            }
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| CallFailure {
            retryable: e.is_timeout(),
            error: Error::Inference(format!("{} request failed: {}", self.name, e)),
        })?;

        let status = response.status();
        let retryable = is_retryable_status(status);
        let text = response.text().await.map_err(|e| CallFailure {
            retryable: retryable || e.is_timeout(),
            error: Error::Inference(format!("{} response unreadable: {}", self.name, e)),
        })?;

        let error = match serde_json::from_str::<ClassifyResponse>(&text) {
            Ok(ClassifyResponse::Scores(scores)) if status.is_success() => {
                return Ok(Predictions::new(scores));
            }
            Ok(ClassifyResponse::Failure {
                error,
                estimated_time,
            }) => match estimated_time {
                Some(secs) => format!(
                    "{} returned {}: {} (ready in ~{:.0}s)",
                    self.name, status, error, secs
                ),
                None => format!("{} returned {}: {}", self.name, status, error),
            },
            _ => format!(
                "{} returned {}: unexpected body: {}",
                self.name,
                status,
                truncate(&text, 200)
            ),
        };

        Err(CallFailure {
            error: Error::Inference(error),
            retryable,
        })
    }
}

/// A failed attempt and whether another attempt may succeed.
struct CallFailure {
    error: Error,
    retryable: bool,
}

/// Statuses worth another attempt.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

#[async_trait]
impl InferenceAdapter for HostedClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, image: &[u8], labels: &[String]) -> Result<Predictions> {
        let mut delay = self.retry_delay;

        for attempt in 0..MAX_RETRIES {
            match self.call(image, labels).await {
                Ok(predictions) => return Ok(predictions),
                Err(CallFailure {
                    error: e,
                    retryable: true,
                }) if attempt < MAX_RETRIES - 1 => {
                    debug!(
                        provider = %self.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after error"
                    );
                    sleep(delay).await;
                    delay *= 2;
                }
                Err(failure) => return Err(failure.error),
            }
        }

        Err(Error::Inference("Max retries exceeded".to_string()))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier(server: &MockServer, api_key: Option<&str>) -> HostedClassifier {
        let provider = InferenceProvider {
            name: "test".to_string(),
            base_url: server.uri(),
            model: "openai/clip-vit-base-patch32".to_string(),
            api_key: api_key.map(String::from),
            priority: 1,
        };
        HostedClassifier::new(&provider, "a photo of a {}", Duration::from_secs(5))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10))
    }

    fn labels() -> Vec<String> {
        vec!["dog".to_string(), "cat".to_string()]
    }

    #[tokio::test]
    async fn test_classify_parses_scores() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/openai/clip-vit-base-patch32"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "inputs": STANDARD.encode(b"png-bytes"),
                "parameters": {"candidate_labels": ["dog", "cat"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"label": "cat", "score": 0.25},
                {"label": "dog", "score": 0.75}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let predictions = classifier(&server, Some("secret"))
            .classify(b"png-bytes", &labels())
            .await
            .unwrap();

        let top = predictions.top().unwrap();
        assert_eq!(top.label, "dog");
        assert_eq!(top.score, 0.75);
    }

    #[tokio::test]
    async fn test_retries_while_model_loads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": "Model is currently loading",
                "estimated_time": 12.0
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"label": "cat", "score": 0.6}])),
            )
            .mount(&server)
            .await;

        let predictions = classifier(&server, None)
            .classify(b"img", &labels())
            .await
            .unwrap();
        assert_eq!(predictions.top().unwrap().label, "cat");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "bad image"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = classifier(&server, None)
            .classify(b"img", &labels())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(ref m) if m.contains("bad image")));
    }

    #[tokio::test]
    async fn test_client_error_mentioning_loading_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "error loading image, rate unknown"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = classifier(&server, None)
            .classify(b"img", &labels())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(ref m) if m.contains("error loading image")));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(serde_json::json!({"error": "slow down"})),
            )
            .expect(u64::from(MAX_RETRIES))
            .mount(&server)
            .await;

        let err = classifier(&server, None)
            .classify(b"img", &labels())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(ref m) if m.contains("slow down")));
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
