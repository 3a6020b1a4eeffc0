//! Signal quality scores
//!
//! A [`QualityScore`] is a bounded scalar together with the sub-scores it was
//! composed from, so a reviewer can see why a segment was rated as it was.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered categorical quality rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    Unacceptable,
    Acceptable,
    Excellent,
}

impl QualityLabel {
    /// Three-level numeric index (0.0, 0.5, 1.0)
    pub fn level(&self) -> f64 {
        match self {
            QualityLabel::Unacceptable => 0.0,
            QualityLabel::Acceptable => 0.5,
            QualityLabel::Excellent => 1.0,
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityLabel::Unacceptable => write!(f, "unacceptable"),
            QualityLabel::Acceptable => write!(f, "acceptable"),
            QualityLabel::Excellent => write!(f, "excellent"),
        }
    }
}

/// One ingredient of a quality score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityComponent {
    pub name: String,
    /// Raw measurement (dB, ratio, index)
    pub raw: f64,
    /// Normalized contribution in [0, 1]
    pub score: f64,
    /// Weight in the combined score; zero for audit-only indices
    pub weight: f64,
    /// Categorical reading of the raw value, when the index defines one
    pub label: Option<QualityLabel>,
}

impl QualityComponent {
    pub fn new(name: &str, raw: f64, score: f64, weight: f64) -> Self {
        QualityComponent {
            name: name.to_string(),
            raw,
            score: if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 },
            weight,
            label: None,
        }
    }

    pub fn with_label(mut self, label: QualityLabel) -> Self {
        self.label = Some(label);
        self
    }
}

/// Bounded quality score in [0, 1] with its label and sub-scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: f64,
    pub label: QualityLabel,
    pub components: Vec<QualityComponent>,
}

impl QualityScore {
    /// Look up a sub-score by name
    pub fn component(&self, name: &str) -> Option<&QualityComponent> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Attach an audit-only component that does not change the score
    pub fn push_audit(&mut self, component: QualityComponent) {
        self.components.push(QualityComponent { weight: 0.0, ..component });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_ordering() {
        assert!(QualityLabel::Excellent > QualityLabel::Acceptable);
        assert!(QualityLabel::Acceptable > QualityLabel::Unacceptable);
        assert_eq!(QualityLabel::Acceptable.level(), 0.5);
    }

    #[test]
    fn test_component_clamping() {
        let component = QualityComponent::new("snr", 42.0, 1.7, 0.5);
        assert_eq!(component.score, 1.0);
        assert_eq!(QualityComponent::new("snr", 0.0, f64::NAN, 0.5).score, 0.0);
    }

    #[test]
    fn test_audit_components_carry_no_weight() {
        let mut quality = QualityScore {
            score: 0.8,
            label: QualityLabel::Excellent,
            components: Vec::new(),
        };
        quality.push_audit(QualityComponent::new("csqi", 0.1, 1.0, 0.7));
        assert_eq!(quality.component("csqi").unwrap().weight, 0.0);
        assert_eq!(quality.score, 0.8);
    }
}
