//! Seeded pulse-train generator with known event locations

use crate::signal_patterns::PulseShape;
use bsp_core::{config_error, validate_sampling_rate, BspResult, Modality, Signal};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Additive disturbances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// White Gaussian noise standard deviation (0.0 = no noise)
    pub gaussian_std: f64,
    pub baseline_wander_amp: f64,
    pub baseline_wander_hz: f64,
    pub powerline_amp: f64,
    pub powerline_hz: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            gaussian_std: 0.0,
            baseline_wander_amp: 0.0,
            baseline_wander_hz: 0.3,
            powerline_amp: 0.0,
            powerline_hz: 50.0,
        }
    }
}

/// Sinusoidal modulation of the pulse period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodModulation {
    pub depth_s: f64,
    pub freq_hz: f64,
}

/// One pulse scaled down, e.g. below a detector's threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuppressedPulse {
    /// Zero-based pulse number
    pub pulse: usize,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseTrainConfig {
    pub sampling_rate: f64,
    pub duration_s: f64,
    pub period_s: f64,
    /// Time of the first pulse
    pub first_pulse_s: f64,
    pub amplitude: f64,
    /// Constant added to every sample
    pub offset: f64,
    pub shape: PulseShape,
    pub modulation: Option<PeriodModulation>,
    pub suppressed: Vec<SuppressedPulse>,
    pub noise: NoiseConfig,
    pub modality: Option<Modality>,
    pub seed: u64,
}

impl PulseTrainConfig {
    /// Unit Gaussian pulses every `period_s`, first one half a period in
    pub fn new(sampling_rate: f64, period_s: f64, duration_s: f64) -> Self {
        PulseTrainConfig {
            sampling_rate,
            duration_s,
            period_s,
            first_pulse_s: 0.5 * period_s,
            amplitude: 1.0,
            offset: 0.0,
            shape: PulseShape::Gaussian { width_s: 0.01 },
            modulation: None,
            suppressed: Vec::new(),
            noise: NoiseConfig::default(),
            modality: None,
            seed: 42,
        }
    }

    /// ECG-like QRS complexes in millivolts
    pub fn ecg(sampling_rate: f64, period_s: f64, duration_s: f64) -> Self {
        PulseTrainConfig {
            shape: PulseShape::Qrs { width_s: 0.01 },
            modality: Some(Modality::Ecg),
            ..Self::new(sampling_rate, period_s, duration_s)
        }
    }

    /// Broad systolic pulses
    pub fn ppg(sampling_rate: f64, period_s: f64, duration_s: f64) -> Self {
        PulseTrainConfig {
            shape: PulseShape::Gaussian { width_s: 0.08 },
            modality: Some(Modality::Ppg),
            ..Self::new(sampling_rate, period_s, duration_s)
        }
    }

    /// Skin conductance responses on a tonic level of 2 uS
    pub fn eda(sampling_rate: f64, period_s: f64, duration_s: f64) -> Self {
        PulseTrainConfig {
            shape: PulseShape::Scr { rise_s: 0.75, decay_s: 2.0 },
            amplitude: 0.5,
            offset: 2.0,
            modality: Some(Modality::Eda),
            ..Self::new(sampling_rate, period_s, duration_s)
        }
    }

    /// Slow breathing cycles
    pub fn respiration(sampling_rate: f64, period_s: f64, duration_s: f64) -> Self {
        PulseTrainConfig {
            shape: PulseShape::Gaussian { width_s: 0.2 * period_s },
            modality: Some(Modality::Respiration),
            ..Self::new(sampling_rate, period_s, duration_s)
        }
    }

    /// Muscle activation bursts
    pub fn emg(sampling_rate: f64, period_s: f64, duration_s: f64) -> Self {
        PulseTrainConfig {
            shape: PulseShape::Burst {
                duration_s: 0.4 * period_s,
                carrier_hz: 80.0,
            },
            modality: Some(Modality::Emg),
            ..Self::new(sampling_rate, period_s, duration_s)
        }
    }

    pub fn with_noise(mut self, gaussian_std: f64) -> Self {
        self.noise.gaussian_std = gaussian_std;
        self
    }

    pub fn with_baseline_wander(mut self, amp: f64, hz: f64) -> Self {
        self.noise.baseline_wander_amp = amp;
        self.noise.baseline_wander_hz = hz;
        self
    }

    pub fn with_powerline(mut self, amp: f64, hz: f64) -> Self {
        self.noise.powerline_amp = amp;
        self.noise.powerline_hz = hz;
        self
    }

    pub fn with_modulation(mut self, depth_s: f64, freq_hz: f64) -> Self {
        self.modulation = Some(PeriodModulation { depth_s, freq_hz });
        self
    }

    pub fn with_suppressed(mut self, pulse: usize, scale: f64) -> Self {
        self.suppressed.push(SuppressedPulse { pulse, scale });
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> BspResult<()> {
        validate_sampling_rate(self.sampling_rate)?;
        if !(self.duration_s >= 0.0) || !self.duration_s.is_finite() {
            return Err(config_error!("duration must be finite and non-negative, got {}", self.duration_s));
        }
        if !(self.period_s > 0.0) {
            return Err(config_error!("pulse period must be positive, got {}", self.period_s));
        }
        if let Some(m) = self.modulation {
            if !(m.depth_s.abs() < self.period_s) {
                return Err(config_error!("modulation depth must stay below the period"));
            }
        }
        if !(self.noise.gaussian_std >= 0.0) {
            return Err(config_error!("noise standard deviation must not be negative"));
        }
        Ok(())
    }
}

/// Generated signal with the ground-truth pulse locations
#[derive(Debug, Clone)]
pub struct Recording {
    pub signal: Signal,
    /// Sample index of every pulse inside the signal, suppressed ones included
    pub pulse_indices: Vec<usize>,
}

impl Recording {
    /// The same recording preceded by `k` copies of its first sample
    pub fn delayed(&self, k: usize) -> BspResult<Recording> {
        let first = self.signal.samples().first().copied().unwrap_or(0.0);
        let mut samples = vec![first; k];
        samples.extend_from_slice(self.signal.samples());

        Ok(Recording {
            signal: self.signal.derive(samples)?,
            pulse_indices: self.pulse_indices.iter().map(|i| i + k).collect(),
        })
    }

    /// Ground-truth intervals in seconds
    pub fn true_intervals(&self) -> Vec<f64> {
        let fs = self.signal.sampling_rate();
        self.pulse_indices
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 / fs)
            .collect()
    }
}

/// Pulse-train generator; identical configs give identical recordings
pub struct PulseTrain {
    config: PulseTrainConfig,
    rng: StdRng,
    normal_dist: Normal<f64>,
}

impl PulseTrain {
    pub fn new(config: PulseTrainConfig) -> BspResult<Self> {
        config.validate()?;
        let normal_dist = Normal::new(0.0, config.noise.gaussian_std)
            .map_err(|e| config_error!("failed to create noise distribution: {}", e))?;

        Ok(PulseTrain {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            normal_dist,
        })
    }

    pub fn config(&self) -> &PulseTrainConfig {
        &self.config
    }

    /// Pulse times in seconds, including those beyond the end of the signal
    fn pulse_times(&self) -> Vec<f64> {
        let mut times = Vec::new();
        let mut t = self.config.first_pulse_s;
        while t < self.config.duration_s {
            times.push(t);
            let step = match self.config.modulation {
                Some(m) => self.config.period_s + m.depth_s * (2.0 * PI * m.freq_hz * t).sin(),
                None => self.config.period_s,
            };
            t += step;
        }
        times
    }

    pub fn generate(&mut self) -> BspResult<Recording> {
        let fs = self.config.sampling_rate;
        let n = (self.config.duration_s * fs).round() as usize;
        let noise = &self.config.noise;

        let mut samples: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                self.config.offset
                    + noise.baseline_wander_amp * (2.0 * PI * noise.baseline_wander_hz * t).sin()
                    + noise.powerline_amp * (2.0 * PI * noise.powerline_hz * t).sin()
            })
            .collect();

        let times = self.pulse_times();
        let (before, after) = self.config.shape.support_s();
        let mut pulse_indices = Vec::with_capacity(times.len());

        for (k, &t0) in times.iter().enumerate() {
            let scale = self
                .config
                .suppressed
                .iter()
                .find(|s| s.pulse == k)
                .map_or(1.0, |s| s.scale);
            let amplitude = self.config.amplitude * scale;

            let lo = ((t0 + before) * fs).floor().max(0.0) as usize;
            let hi = (((t0 + after) * fs).ceil().max(0.0) as usize).min(n);
            for (i, sample) in samples.iter_mut().enumerate().take(hi).skip(lo) {
                *sample += amplitude * self.config.shape.value_at(i as f64 / fs - t0);
            }

            let index = (t0 * fs).round() as usize;
            if index < n {
                pulse_indices.push(index);
            }
        }

        if self.config.noise.gaussian_std > 0.0 {
            for sample in samples.iter_mut() {
                *sample += self.normal_dist.sample(&mut self.rng);
            }
        }

        let mut signal = Signal::new(samples, fs)?;
        if let Some(modality) = self.config.modality {
            signal = signal.with_modality(modality).with_unit(modality.default_unit());
        }

        Ok(Recording { signal, pulse_indices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_locations() {
        let recording = PulseTrain::new(PulseTrainConfig::new(1000.0, 0.8, 10.0))
            .unwrap()
            .generate()
            .unwrap();

        assert_eq!(recording.signal.len(), 10_000);
        assert_eq!(recording.pulse_indices.len(), 12);
        assert_eq!(recording.pulse_indices[0], 400);
        assert!(recording.true_intervals().iter().all(|i| (i - 0.8).abs() < 1e-9));
        assert!((recording.signal.samples()[400] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let config = PulseTrainConfig::ecg(500.0, 0.8, 5.0).with_noise(0.1).with_seed(7);
        let a = PulseTrain::new(config.clone()).unwrap().generate().unwrap();
        let b = PulseTrain::new(config.clone()).unwrap().generate().unwrap();
        let c = PulseTrain::new(config.with_seed(8)).unwrap().generate().unwrap();

        assert_eq!(a.signal.samples(), b.signal.samples());
        assert_ne!(a.signal.samples(), c.signal.samples());
        assert_eq!(a.signal.modality(), Some(Modality::Ecg));
    }

    #[test]
    fn test_suppressed_pulse() {
        let config = PulseTrainConfig::new(500.0, 1.0, 5.0).with_suppressed(2, 0.2);
        let recording = PulseTrain::new(config).unwrap().generate().unwrap();

        let peak = recording.signal.samples()[recording.pulse_indices[2]];
        assert!((peak - 0.2).abs() < 1e-9);
        assert_eq!(recording.pulse_indices.len(), 5);
    }

    #[test]
    fn test_modulated_period() {
        let config = PulseTrainConfig::new(250.0, 1.0, 60.0).with_modulation(0.1, 0.25);
        let recording = PulseTrain::new(config).unwrap().generate().unwrap();
        let intervals = recording.true_intervals();

        let min = intervals.iter().copied().fold(f64::INFINITY, f64::min);
        let max = intervals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(min < 0.95 && max > 1.05);
    }

    #[test]
    fn test_delayed_recording() {
        let recording = PulseTrain::new(PulseTrainConfig::new(500.0, 0.8, 4.0))
            .unwrap()
            .generate()
            .unwrap();
        let delayed = recording.delayed(37).unwrap();

        assert_eq!(delayed.signal.len(), recording.signal.len() + 37);
        assert_eq!(delayed.pulse_indices[0], recording.pulse_indices[0] + 37);
        assert_eq!(&delayed.signal.samples()[37..], recording.signal.samples());
    }

    #[test]
    fn test_invalid_config() {
        assert!(PulseTrain::new(PulseTrainConfig::new(0.0, 0.8, 4.0)).is_err());
        assert!(PulseTrain::new(PulseTrainConfig::new(500.0, 0.0, 4.0)).is_err());
        assert!(PulseTrain::new(PulseTrainConfig::new(500.0, 0.8, 4.0).with_noise(-1.0)).is_err());
    }
}
