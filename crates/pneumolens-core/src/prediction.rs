//! Binary pneumonia decision derived from a single model logit.

use serde::{Deserialize, Serialize};

/// Confidence strictly above this value classifies as [`Label::Pneumonia`].
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Classifier output label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Pneumonia,
    Normal,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pneumonia => "Pneumonia",
            Self::Normal => "Normal",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one classification.
///
/// Serializes as `{"prediction": "Pneumonia", "confidence": 0.93}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "prediction")]
    pub label: Label,
    /// Sigmoid of the logit, in `[0, 1]`.
    pub confidence: f32,
}

impl Prediction {
    /// Map a raw logit through the sigmoid and the fixed threshold.
    pub fn from_logit(logit: f32) -> Self {
        Self::from_confidence(sigmoid(logit))
    }

    /// Label a probability. Exactly 0.5 is `Normal`.
    pub fn from_confidence(confidence: f32) -> Self {
        let label = if confidence > DECISION_THRESHOLD {
            Label::Pneumonia
        } else {
            Label::Normal
        };
        Self { label, confidence }
    }
}

/// Logistic function, stable for large negative inputs.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
