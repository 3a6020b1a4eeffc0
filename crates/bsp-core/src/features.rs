//! Feature vectors with per-entry validity

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Feature family computed from an event series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureDomain {
    Time,
    Frequency,
    Nonlinear,
}

impl FeatureDomain {
    pub const ALL: [FeatureDomain; 3] = [FeatureDomain::Time, FeatureDomain::Frequency, FeatureDomain::Nonlinear];
}

/// Why a feature could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UndefinedFeature {
    /// Fewer events than the statistic requires
    InsufficientEvents { required: usize, available: usize },
    /// Event series spans less time than the statistic requires
    InsufficientDuration { required_s: f64, available_s: f64 },
    /// Zero-variance or zero-duration input
    NumericDegeneracy,
}

impl fmt::Display for UndefinedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndefinedFeature::InsufficientEvents { required, available } => {
                write!(f, "requires {} events, {} available", required, available)
            }
            UndefinedFeature::InsufficientDuration { required_s, available_s } => {
                write!(f, "requires {:.1}s of events, {:.1}s available", required_s, available_s)
            }
            UndefinedFeature::NumericDegeneracy => write!(f, "numerically degenerate input"),
        }
    }
}

/// Value of a single feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "validity", content = "value", rename_all = "snake_case")]
pub enum FeatureValue {
    Valid(f64),
    Undefined(UndefinedFeature),
}

impl FeatureValue {
    /// Wrap a computed number, demoting non-finite results to degeneracy
    pub fn from_number(value: f64) -> Self {
        if value.is_finite() {
            FeatureValue::Valid(value)
        } else {
            FeatureValue::Undefined(UndefinedFeature::NumericDegeneracy)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            FeatureValue::Valid(v) => Some(*v),
            FeatureValue::Undefined(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, FeatureValue::Valid(_))
    }
}

impl From<Result<f64, UndefinedFeature>> for FeatureValue {
    fn from(result: Result<f64, UndefinedFeature>) -> Self {
        match result {
            Ok(v) => FeatureValue::from_number(v),
            Err(reason) => FeatureValue::Undefined(reason),
        }
    }
}

/// Context the features were computed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    pub sampling_rate: f64,
    /// Events in the input series
    pub event_count: usize,
    /// Intervals that entered the statistics
    pub interval_count: usize,
    /// True when every requested feature is valid
    pub valid: bool,
}

/// Named scalar features plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub features: BTreeMap<String, FeatureValue>,
    pub metadata: FeatureMetadata,
}

impl FeatureVector {
    /// Create an empty vector; `valid` is recomputed on insert
    pub fn new(sampling_rate: f64, event_count: usize, interval_count: usize) -> Self {
        FeatureVector {
            features: BTreeMap::new(),
            metadata: FeatureMetadata {
                sampling_rate,
                event_count,
                interval_count,
                valid: true,
            },
        }
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FeatureValue>) {
        let value = value.into();
        if !value.is_valid() {
            self.metadata.valid = false;
        }
        self.features.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }

    /// Value of a valid feature
    pub fn value(&self, name: &str) -> Option<f64> {
        self.features.get(name).and_then(FeatureValue::value)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Names of features marked undefined
    pub fn undefined_names(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|(_, v)| !v.is_valid())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::from_number(value)
    }
}

impl From<UndefinedFeature> for FeatureValue {
    fn from(reason: UndefinedFeature) -> Self {
        FeatureValue::Undefined(reason)
    }
}
