//! Pulse shapes and simple waveforms

use bsp_core::{BspResult, Signal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Shape of a single pulse, placed with its event time at `dt = 0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PulseShape {
    /// Symmetric bump peaking at the event
    Gaussian { width_s: f64 },
    /// Q-R-S complex with a trailing T wave; R peaks at the event
    Qrs { width_s: f64 },
    /// Skin conductance response starting at the event
    Scr { rise_s: f64, decay_s: f64 },
    /// Hann-windowed carrier burst starting at the event
    Burst { duration_s: f64, carrier_hz: f64 },
}

impl PulseShape {
    /// Value at `dt` seconds from the event, for unit amplitude
    pub fn value_at(&self, dt: f64) -> f64 {
        match *self {
            PulseShape::Gaussian { width_s } => gaussian(dt, width_s),
            PulseShape::Qrs { width_s } => {
                let offset = 2.5 * width_s;
                gaussian(dt, width_s) - 0.15 * gaussian(dt + offset, width_s) - 0.25 * gaussian(dt - offset, width_s)
                    + 0.25 * gaussian(dt - 0.25, 0.04)
            }
            PulseShape::Scr { rise_s, decay_s } => {
                if dt < 0.0 {
                    return 0.0;
                }
                let raw = |t: f64| (-t / decay_s).exp() - (-t / rise_s).exp();
                // normalize to a unit maximum
                let t_peak = rise_s * decay_s * (decay_s / rise_s).ln() / (decay_s - rise_s);
                raw(dt) / raw(t_peak)
            }
            PulseShape::Burst { duration_s, carrier_hz } => {
                if !(0.0..duration_s).contains(&dt) {
                    return 0.0;
                }
                let window = 0.5 - 0.5 * (2.0 * PI * dt / duration_s).cos();
                window * (2.0 * PI * carrier_hz * dt).sin()
            }
        }
    }

    /// Time span around the event outside which the pulse is negligible
    pub fn support_s(&self) -> (f64, f64) {
        match *self {
            PulseShape::Gaussian { width_s } => (-6.0 * width_s, 6.0 * width_s),
            PulseShape::Qrs { width_s } => (-9.0 * width_s, 0.25 + 0.24),
            PulseShape::Scr { decay_s, .. } => (0.0, 10.0 * decay_s),
            PulseShape::Burst { duration_s, .. } => (0.0, duration_s),
        }
    }
}

fn gaussian(dt: f64, width: f64) -> f64 {
    let d = dt / width;
    (-0.5 * d * d).exp()
}

/// `amplitude * sin(2 pi freq t)` sampled for `duration_s`
pub fn sinusoid(freq: f64, amplitude: f64, sampling_rate: f64, duration_s: f64) -> BspResult<Signal> {
    let n = (duration_s * sampling_rate).round().max(0.0) as usize;
    let samples = (0..n)
        .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sampling_rate).sin())
        .collect();
    Signal::new(samples, sampling_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peaks_at_event() {
        let gaussian = PulseShape::Gaussian { width_s: 0.01 };
        assert_eq!(gaussian.value_at(0.0), 1.0);
        assert!(gaussian.value_at(0.02) < gaussian.value_at(0.01));

        let qrs = PulseShape::Qrs { width_s: 0.01 };
        assert!(qrs.value_at(0.0) > 0.9);
        assert!(qrs.value_at(0.025) < 0.0);
        assert!(qrs.value_at(0.25) < qrs.value_at(0.0));
    }

    #[test]
    fn test_scr_normalized() {
        let scr = PulseShape::Scr { rise_s: 0.75, decay_s: 2.0 };
        assert_eq!(scr.value_at(-0.1), 0.0);
        assert_eq!(scr.value_at(0.0), 0.0);

        let peak = (0..1000)
            .map(|i| scr.value_at(i as f64 * 0.01))
            .fold(f64::NEG_INFINITY, f64::max);
        assert!((peak - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_burst_is_bounded() {
        let burst = PulseShape::Burst { duration_s: 0.5, carrier_hz: 80.0 };
        assert_eq!(burst.value_at(-0.01), 0.0);
        assert_eq!(burst.value_at(0.6), 0.0);
        assert!((0..500).all(|i| burst.value_at(i as f64 * 0.001).abs() <= 1.0));
    }

    #[test]
    fn test_sinusoid() {
        let signal = sinusoid(5.0, 2.0, 100.0, 1.0).unwrap();
        assert_eq!(signal.len(), 100);
        assert!((signal.samples()[5] - 2.0).abs() < 1e-12);
    }
}
