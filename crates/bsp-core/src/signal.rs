//! Signal: immutable container for a single-channel sample buffer

use crate::error::{BspError, BspResult};
use crate::modality::Modality;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Single-channel physiological recording.
///
/// A `Signal` never changes after construction. Conditioning steps produce a
/// new `Signal` through [`Signal::derive`], which keeps the recording id,
/// modality and unit so downstream artifacts stay attributable to their source.
#[derive(Debug, Clone)]
pub struct Signal {
    id: Uuid,
    samples: Arc<[f64]>,
    sampling_rate: f64,
    modality: Option<Modality>,
    unit: Option<String>,
}

impl Signal {
    /// Create a new signal from samples and sampling rate
    pub fn new(samples: Vec<f64>, sampling_rate: f64) -> BspResult<Self> {
        validate_sampling_rate(sampling_rate)?;

        if let Some(position) = samples.iter().position(|x| !x.is_finite()) {
            return Err(BspError::InvalidSignalData {
                reason: format!("non-finite sample at index {}", position),
            });
        }

        Ok(Signal {
            id: Uuid::new_v4(),
            samples: samples.into(),
            sampling_rate,
            modality: None,
            unit: None,
        })
    }

    /// Tag the signal with its modality
    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = Some(modality);
        self
    }

    /// Tag the signal with its physical unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Build a new signal carrying this signal's identity and tags
    pub fn derive(&self, samples: Vec<f64>) -> BspResult<Self> {
        self.derive_with_rate(samples, self.sampling_rate)
    }

    /// Like [`Signal::derive`], for steps that change the sampling rate
    pub fn derive_with_rate(&self, samples: Vec<f64>, sampling_rate: f64) -> BspResult<Self> {
        let mut derived = Signal::new(samples, sampling_rate)?;
        derived.id = self.id;
        derived.modality = self.modality;
        derived.unit = self.unit.clone();
        Ok(derived)
    }

    /// Recording identifier shared by all signals derived from the same source
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Sample buffer
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if signal is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sampling rate in Hz
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Nyquist frequency in Hz
    pub fn nyquist(&self) -> f64 {
        self.sampling_rate / 2.0
    }

    /// Modality tag, if known
    pub fn modality(&self) -> Option<Modality> {
        self.modality
    }

    /// Unit tag, if known
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Get signal duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sampling_rate
    }

    /// Convert a duration in seconds to a whole number of samples
    pub fn seconds_to_samples(&self, seconds: f64) -> usize {
        (seconds * self.sampling_rate).round().max(0.0) as usize
    }

    /// Calculate basic statistics
    pub fn stats(&self) -> SignalStats {
        SignalStats::calculate(&self.samples)
    }
}

/// Validate that a sampling rate is finite and strictly positive
pub fn validate_sampling_rate(rate: f64) -> BspResult<()> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(BspError::InvalidSamplingRate { rate })
    }
}

/// Basic statistics for a sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub mean: f64,
    pub rms: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub peak_to_peak: f64,
}

impl SignalStats {
    pub fn calculate(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                peak_to_peak: 0.0,
            };
        }

        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let rms = (data.iter().map(|x| x * x).sum::<f64>() / n).sqrt();
        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let min = data.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        Self {
            mean,
            rms,
            std_dev: variance.sqrt(),
            min,
            max,
            peak_to_peak: max - min,
        }
    }
}
