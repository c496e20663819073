//! Hash-based placeholder classifier.
//!
//! Used when no inference provider is configured. Scores are derived from
//! SHA-256 of the image and label, then softmax-normalized, so the same
//! image always gets the same pre-label. This is NOT semantic.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::InferenceAdapter;
use crate::error::Result;
use crate::models::Predictions;

/// Logits are spread over [0, LOGIT_RANGE) before softmax.
const LOGIT_RANGE: f64 = 4.0;

#[derive(Debug, Default, Clone)]
pub struct PlaceholderClassifier;

impl PlaceholderClassifier {
    pub fn new() -> Self {
        Self
    }

    fn logit(image_digest: &[u8], label: &str) -> f64 {
        let mut hasher = Sha256::new();
        hasher.update(image_digest);
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let value = u64::from_be_bytes(bytes);

        (value as f64 / u64::MAX as f64) * LOGIT_RANGE
    }
}

#[async_trait]
impl InferenceAdapter for PlaceholderClassifier {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn classify(&self, image: &[u8], labels: &[String]) -> Result<Predictions> {
        let image_digest = Sha256::digest(image);

        let logits: Vec<f64> = labels
            .iter()
            .map(|label| Self::logit(&image_digest, label))
            .collect();

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        Ok(labels
            .iter()
            .cloned()
            .zip(exps.into_iter().map(|e| e / total))
            .collect())
    }
}
