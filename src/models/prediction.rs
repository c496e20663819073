//! Label scores returned by an inference adapter.

use serde::{Deserialize, Serialize};

/// A single label score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f64,
}

/// Label scores for one image, sorted by descending score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predictions(Vec<Prediction>);

impl Predictions {
    /// Build from unsorted scores. Non-finite scores are dropped.
    pub fn new(mut scores: Vec<Prediction>) -> Self {
        scores.retain(|p| p.score.is_finite());
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self(scores)
    }

    /// Highest-scoring label.
    pub fn top(&self) -> Option<&Prediction> {
        self.0.first()
    }

    /// Score for a specific label.
    pub fn score_of(&self, label: &str) -> Option<f64> {
        self.0.iter().find(|p| p.label == label).map(|p| p.score)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prediction> {
        self.0.iter()
    }
}

impl FromIterator<(String, f64)> for Predictions {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(label, score)| Prediction { label, score })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_descending_and_top() {
        let preds: Predictions = vec![
            ("cat".to_string(), 0.2),
            ("dog".to_string(), 0.7),
            ("bird".to_string(), 0.1),
        ]
        .into_iter()
        .collect();

        let top = preds.top().unwrap();
        assert_eq!(top.label, "dog");
        assert_eq!(top.score, 0.7);
        assert_eq!(preds.score_of("bird"), Some(0.1));
        assert_eq!(preds.score_of("fish"), None);
        assert_eq!(preds.len(), 3);
    }

    #[test]
    fn test_non_finite_scores_dropped() {
        let preds: Predictions = vec![("a".to_string(), f64::NAN), ("b".to_string(), 0.5)]
            .into_iter()
            .collect();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds.top().unwrap().label, "b");
    }

    #[test]
    fn test_serializes_as_list() {
        let preds: Predictions = vec![("dog".to_string(), 1.0)].into_iter().collect();
        let json = serde_json::to_value(&preds).unwrap();
        assert_eq!(json, serde_json::json!([{"label": "dog", "score": 1.0}]));
    }
}
