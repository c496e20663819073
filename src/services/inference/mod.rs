//! Inference adapter boundary.
//!
//! Pre-labels come from external pretrained models (CLIP or compatible
//! zero-shot classifiers). Each backend implements [`InferenceAdapter`];
//! [`InferenceService`] tries them in priority order and keeps enough
//! state to report provider health.

mod hosted;
mod placeholder;

pub use hosted::HostedClassifier;
pub use placeholder::PlaceholderClassifier;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::InferenceConfig;
use crate::error::{Error, Result};
use crate::models::Predictions;

/// Number of consecutive failed predictions before reporting unavailable
const ERROR_THRESHOLD: u32 = 3;

/// A model that scores candidate labels for an image.
#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    /// Provider name, used in logs and status output.
    fn name(&self) -> &str;

    /// Score `labels` for the encoded image in `image`.
    async fn classify(&self, image: &[u8], labels: &[String]) -> Result<Predictions>;
}

/// Provider health as reported by `/health` and `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceStatus {
    pub providers: Vec<String>,
    pub available: bool,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

/// Service for label prediction with multi-provider fallback.
pub struct InferenceService {
    adapters: Vec<Arc<dyn InferenceAdapter>>,
    last_error: RwLock<Option<String>>,
    error_count: AtomicU32,
}

impl InferenceService {
    /// Create the service from configuration.
    ///
    /// Falls back to the placeholder classifier when no providers are configured.
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        if config.providers.is_empty() {
            warn!("No inference providers configured - using placeholder scores");
            return Ok(Self::placeholder());
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let adapters = config
            .providers
            .iter()
            .map(|p| {
                HostedClassifier::new(p, &config.hypothesis_template, timeout)
                    .map(|c| Arc::new(c) as Arc<dyn InferenceAdapter>)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::with_adapters(adapters))
    }

    /// Create the service with explicit adapters, tried in the given order.
    pub fn with_adapters(adapters: Vec<Arc<dyn InferenceAdapter>>) -> Self {
        info!(
            providers = ?adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            "Inference service initialized"
        );

        Self {
            adapters,
            last_error: RwLock::new(None),
            error_count: AtomicU32::new(0),
        }
    }

    /// Create a service backed only by the placeholder classifier.
    pub fn placeholder() -> Self {
        Self::with_adapters(vec![Arc::new(PlaceholderClassifier::new())])
    }

    /// Provider names in priority order.
    pub fn providers(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Score `labels` for an image, trying each provider until one succeeds.
    pub async fn predict(&self, image: &[u8], labels: &[String]) -> Result<Predictions> {
        if labels.is_empty() {
            return Err(Error::Validation(
                "At least one candidate label is required".to_string(),
            ));
        }

        let mut last_error = None;

        for adapter in &self.adapters {
            match adapter.classify(image, labels).await {
                Ok(predictions) if !predictions.is_empty() => {
                    debug!(
                        provider = adapter.name(),
                        top = ?predictions.top().map(|p| &p.label),
                        "Prediction complete"
                    );
                    self.error_count.store(0, Ordering::Relaxed);
                    return Ok(predictions);
                }
                Ok(_) => {
                    warn!(provider = adapter.name(), "Provider returned no scores");
                    last_error = Some(format!("{} returned no scores", adapter.name()));
                }
                Err(e) => {
                    warn!(provider = adapter.name(), error = %e, "Provider failed, trying next");
                    last_error = Some(e.to_string());
                }
            }
        }

        let message = last_error.unwrap_or_else(|| "No inference providers configured".to_string());
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write().await = Some(message.clone());

        Err(Error::Inference(format!(
            "All inference providers failed: {}",
            message
        )))
    }

    /// Current provider health.
    pub async fn status(&self) -> InferenceStatus {
        let consecutive_errors = self.error_count.load(Ordering::Relaxed);
        InferenceStatus {
            providers: self.providers(),
            available: !self.adapters.is_empty() && consecutive_errors < ERROR_THRESHOLD,
            consecutive_errors,
            last_error: self.last_error.read().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FailingAdapter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceAdapter for FailingAdapter {
        fn name(&self) -> &str {
            "failing"
        }

        async fn classify(&self, _image: &[u8], _labels: &[String]) -> Result<Predictions> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Inference("boom".to_string()))
        }
    }

    fn labels() -> Vec<String> {
        vec!["dog".to_string(), "cat".to_string()]
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let failing = Arc::new(FailingAdapter {
            calls: AtomicUsize::new(0),
        });
        let service = InferenceService::with_adapters(vec![
            failing.clone() as Arc<dyn InferenceAdapter>,
            Arc::new(PlaceholderClassifier::new()),
        ]);

        let predictions = service.predict(b"image", &labels()).await.unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.status().await.consecutive_errors, 0);
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_reported() {
        let service = InferenceService::with_adapters(vec![Arc::new(FailingAdapter {
            calls: AtomicUsize::new(0),
        })]);

        for _ in 0..ERROR_THRESHOLD {
            let result = service.predict(b"image", &labels()).await;
            assert!(matches!(result, Err(Error::Inference(_))));
        }

        let status = service.status().await;
        assert!(!status.available);
        assert_eq!(status.consecutive_errors, ERROR_THRESHOLD);
        assert!(status.last_error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_empty_labels_rejected() {
        let service = InferenceService::placeholder();
        let result = service.predict(b"image", &[]).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_from_config_without_providers_uses_placeholder() {
        let service = InferenceService::from_config(&InferenceConfig::default()).unwrap();
        assert_eq!(service.providers(), vec!["placeholder".to_string()]);
    }
}
