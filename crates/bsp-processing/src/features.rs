//! Interval-series feature extraction (heart-rate-variability style)
//!
//! Features are computed from the inter-event intervals of a refined
//! [`EventSeries`]. Every requested feature ends up in the output vector:
//! when the series cannot support a statistic the entry carries an
//! [`UndefinedFeature`] reason instead of a number.

use crate::config::FeatureConfig;
use crate::dsp;
use bsp_core::{BspResult, EventSeries, FeatureDomain, FeatureVector, UndefinedFeature};
use tracing::trace;

/// Feature names
pub mod names {
    pub const MEAN_NN: &str = "mean_nn";
    pub const SDNN: &str = "sdnn";
    pub const RMSSD: &str = "rmssd";
    pub const SDSD: &str = "sdsd";
    pub const NN50: &str = "nn50";
    pub const PNN50: &str = "pnn50";
    pub const MEAN_HR: &str = "mean_hr";
    pub const MIN_HR: &str = "min_hr";
    pub const MAX_HR: &str = "max_hr";

    pub const VLF_POWER: &str = "vlf_power";
    pub const LF_POWER: &str = "lf_power";
    pub const HF_POWER: &str = "hf_power";
    pub const TOTAL_POWER: &str = "total_power";
    pub const LF_HF_RATIO: &str = "lf_hf_ratio";
    pub const LF_NU: &str = "lf_nu";
    pub const HF_NU: &str = "hf_nu";
    pub const LF_PEAK: &str = "lf_peak";
    pub const HF_PEAK: &str = "hf_peak";

    pub const SD1: &str = "sd1";
    pub const SD2: &str = "sd2";
    pub const SD1_SD2_RATIO: &str = "sd1_sd2_ratio";
    pub const POINCARE_AREA: &str = "poincare_area";
    pub const SAMPLE_ENTROPY: &str = "sample_entropy";

    pub const TIME: [&str; 9] = [MEAN_NN, SDNN, RMSSD, SDSD, NN50, PNN50, MEAN_HR, MIN_HR, MAX_HR];
    pub const FREQUENCY: [&str; 9] = [
        VLF_POWER, LF_POWER, HF_POWER, TOTAL_POWER, LF_HF_RATIO, LF_NU, HF_NU, LF_PEAK, HF_PEAK,
    ];
    pub const NONLINEAR: [&str; 5] = [SD1, SD2, SD1_SD2_RATIO, POINCARE_AREA, SAMPLE_ENTROPY];
}

/// Successive intervals larger than this count toward NN50 (ms)
const NN50_THRESHOLD_MS: f64 = 50.0;

type Feature = Result<f64, UndefinedFeature>;

/// Intervals that enter the statistics, in milliseconds, with the time (s)
/// of the event each one ends at
#[derive(Debug, Clone)]
struct IntervalSeries {
    times: Vec<f64>,
    nn: Vec<f64>,
    /// Whether each interval directly follows the previous kept one
    contiguous: Vec<bool>,
}

impl IntervalSeries {
    fn from_series(series: &EventSeries, sampling_rate: f64, exclude_flagged: bool) -> Self {
        let events = series.events();
        let mut times = Vec::with_capacity(events.len().saturating_sub(1));
        let mut nn = Vec::with_capacity(events.len().saturating_sub(1));
        let mut contiguous = Vec::with_capacity(events.len().saturating_sub(1));
        let mut gap = true;

        for pair in events.windows(2) {
            if exclude_flagged && pair[1].flags.is_suspect() {
                gap = true;
                continue;
            }
            times.push(pair[1].index as f64 / sampling_rate);
            nn.push((pair[1].index - pair[0].index) as f64 * 1000.0 / sampling_rate);
            contiguous.push(!gap);
            gap = false;
        }

        IntervalSeries { times, nn, contiguous }
    }

    /// Events the kept intervals correspond to
    fn effective_events(&self, series_len: usize) -> usize {
        if self.nn.is_empty() {
            series_len.min(1)
        } else {
            self.nn.len() + 1
        }
    }

    /// Differences between intervals that were neighbours before exclusion
    fn successive_differences(&self) -> Vec<f64> {
        self.nn
            .windows(2)
            .zip(self.contiguous.iter().skip(1))
            .filter(|(_, contiguous)| **contiguous)
            .map(|(w, _)| w[1] - w[0])
            .collect()
    }
}

fn require_events(required: usize, available: usize) -> Result<(), UndefinedFeature> {
    if available < required {
        Err(UndefinedFeature::InsufficientEvents { required, available })
    } else {
        Ok(())
    }
}

fn ratio(num: f64, den: f64) -> Feature {
    if den.abs() <= f64::EPSILON {
        Err(UndefinedFeature::NumericDegeneracy)
    } else {
        Ok(num / den)
    }
}

/// Interval-series feature extractor
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    /// Create new extractor; fails on out-of-range settings
    pub fn new(config: FeatureConfig) -> BspResult<Self> {
        config.validate()?;
        Ok(FeatureExtractor { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Features of the configured domains at the series' own sampling rate
    pub fn extract_configured(&self, series: &EventSeries) -> FeatureVector {
        self.extract(series, series.sampling_rate(), &self.config.domains)
    }

    /// Compute every feature of `domains` from `series`
    pub fn extract(&self, series: &EventSeries, sampling_rate: f64, domains: &[FeatureDomain]) -> FeatureVector {
        let intervals = IntervalSeries::from_series(series, sampling_rate, self.config.exclude_flagged);
        let available = intervals.effective_events(series.len());
        let mut vector = FeatureVector::new(sampling_rate, series.len(), intervals.nn.len());

        let mut requested: Vec<FeatureDomain> = domains.to_vec();
        requested.sort();
        requested.dedup();

        for domain in requested {
            let features = match domain {
                FeatureDomain::Time => self.extract_time_features(&intervals, available),
                FeatureDomain::Frequency => self.extract_frequency_features(&intervals, available),
                FeatureDomain::Nonlinear => self.extract_nonlinear_features(&intervals, available),
            };
            for (name, value) in features {
                vector.insert(name, value);
            }
        }

        trace!(
            events = series.len(),
            intervals = intervals.nn.len(),
            features = vector.len(),
            valid = vector.metadata.valid,
            "features extracted"
        );
        vector
    }

    fn extract_time_features(&self, intervals: &IntervalSeries, available: usize) -> Vec<(&'static str, Feature)> {
        let nn = &intervals.nn;
        let mean_check = require_events(self.config.min_events_mean, available);
        let dispersion_check = require_events(self.config.min_events_dispersion, available);

        let heart_rates: Vec<f64> = nn.iter().map(|i| 60_000.0 / i).collect();
        let diffs = intervals.successive_differences();

        let mean_nn = mean_check.and_then(|_| dsp::mean(nn).ok_or(UndefinedFeature::NumericDegeneracy));
        let mean_hr = mean_check.and_then(|_| dsp::mean(&heart_rates).ok_or(UndefinedFeature::NumericDegeneracy));
        let min_hr = mean_check.map(|_| heart_rates.iter().copied().fold(f64::INFINITY, f64::min));
        let max_hr = mean_check.map(|_| heart_rates.iter().copied().fold(f64::NEG_INFINITY, f64::max));

        let sdnn = dispersion_check.and_then(|_| dsp::std_dev(nn, 1).ok_or(UndefinedFeature::NumericDegeneracy));
        let rmssd = dispersion_check.and_then(|_| {
            dsp::mean(&diffs.iter().map(|d| d * d).collect::<Vec<_>>())
                .map(f64::sqrt)
                .ok_or(UndefinedFeature::NumericDegeneracy)
        });
        let sdsd = dispersion_check.and_then(|_| {
            // a single difference has no spread
            dsp::std_dev(&diffs, 1).ok_or(UndefinedFeature::NumericDegeneracy)
        });
        let nn50_count = diffs.iter().filter(|d| d.abs() > NN50_THRESHOLD_MS).count() as f64;
        let nn50 = dispersion_check.map(|_| nn50_count);
        let pnn50 = dispersion_check.and_then(|_| ratio(100.0 * nn50_count, diffs.len() as f64));

        vec![
            (names::MEAN_NN, mean_nn),
            (names::SDNN, sdnn),
            (names::RMSSD, rmssd),
            (names::SDSD, sdsd),
            (names::NN50, nn50),
            (names::PNN50, pnn50),
            (names::MEAN_HR, mean_hr),
            (names::MIN_HR, min_hr),
            (names::MAX_HR, max_hr),
        ]
    }

    fn extract_frequency_features(
        &self,
        intervals: &IntervalSeries,
        available: usize,
    ) -> Vec<(&'static str, Feature)> {
        let undefined = |reason: UndefinedFeature| -> Vec<(&'static str, Feature)> {
            names::FREQUENCY.iter().map(|name| (*name, Err(reason))).collect()
        };

        if let Err(reason) = require_events(self.config.min_events_frequency, available) {
            return undefined(reason);
        }
        let span = match (intervals.times.first(), intervals.times.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        if span < self.config.min_duration_frequency_s {
            return undefined(UndefinedFeature::InsufficientDuration {
                required_s: self.config.min_duration_frequency_s,
                available_s: span,
            });
        }

        let fs = self.config.interpolation_rate_hz;
        let start = intervals.times[0];
        let count = (span * fs).floor() as usize + 1;
        let grid: Vec<f64> = (0..count).map(|k| start + k as f64 / fs).collect();
        let resampled = dsp::detrend_linear(&dsp::interpolate_linear(&intervals.times, &intervals.nn, &grid));

        let segment = (self.config.welch_segment_s * fs).round() as usize;
        let spectrum = match dsp::welch(&resampled, fs, segment) {
            Ok(spectrum) => spectrum,
            Err(_) => return undefined(UndefinedFeature::NumericDegeneracy),
        };

        let (vlf, lf, hf) = (self.config.vlf_band, self.config.lf_band, self.config.hf_band);
        let vlf_power = spectrum.band_power(vlf.low, vlf.high);
        let lf_power = spectrum.band_power(lf.low, lf.high);
        let hf_power = spectrum.band_power(hf.low, hf.high);
        let total = vlf_power + lf_power + hf_power;
        let peak = |low: f64, high: f64| -> Feature {
            if total <= f64::EPSILON {
                return Err(UndefinedFeature::NumericDegeneracy);
            }
            spectrum
                .peak_frequency(low, high)
                .ok_or(UndefinedFeature::NumericDegeneracy)
        };

        vec![
            (names::VLF_POWER, Ok(vlf_power)),
            (names::LF_POWER, Ok(lf_power)),
            (names::HF_POWER, Ok(hf_power)),
            (names::TOTAL_POWER, Ok(total)),
            (names::LF_HF_RATIO, ratio(lf_power, hf_power)),
            (names::LF_NU, ratio(100.0 * lf_power, lf_power + hf_power)),
            (names::HF_NU, ratio(100.0 * hf_power, lf_power + hf_power)),
            (names::LF_PEAK, peak(lf.low, lf.high)),
            (names::HF_PEAK, peak(hf.low, hf.high)),
        ]
    }

    fn extract_nonlinear_features(
        &self,
        intervals: &IntervalSeries,
        available: usize,
    ) -> Vec<(&'static str, Feature)> {
        let nn = &intervals.nn;
        let diffs = intervals.successive_differences();
        let poincare =
            require_events(self.config.min_events_nonlinear, available).and_then(|_| poincare(nn, &diffs));

        let sd1 = poincare.map(|(sd1, _)| sd1);
        let sd2 = poincare.map(|(_, sd2)| sd2);
        let sd_ratio = poincare.and_then(|(sd1, sd2)| ratio(sd1, sd2));
        let area = poincare.map(|(sd1, sd2)| std::f64::consts::PI * sd1 * sd2);

        let entropy = require_events(self.config.min_events_entropy, available).and_then(|_| {
            sample_entropy(nn, self.config.entropy_dimension, self.config.entropy_tolerance)
        });

        vec![
            (names::SD1, sd1),
            (names::SD2, sd2),
            (names::SD1_SD2_RATIO, sd_ratio),
            (names::POINCARE_AREA, area),
            (names::SAMPLE_ENTROPY, entropy),
        ]
    }
}

/// Short- and long-term dispersion of the lag-1 interval scatter
fn poincare(nn: &[f64], diffs: &[f64]) -> Result<(f64, f64), UndefinedFeature> {
    let var_diff = dsp::std_dev(diffs, 1)
        .map(|s| s * s)
        .ok_or(UndefinedFeature::NumericDegeneracy)?;
    let var_nn = dsp::std_dev(nn, 1)
        .map(|s| s * s)
        .ok_or(UndefinedFeature::NumericDegeneracy)?;

    let sd1 = (0.5 * var_diff).sqrt();
    let sd2 = (2.0 * var_nn - 0.5 * var_diff).max(0.0).sqrt();
    Ok((sd1, sd2))
}

/// Sample entropy with embedding `m` and tolerance `r_factor` times the
/// population standard deviation
fn sample_entropy(data: &[f64], m: usize, r_factor: f64) -> Feature {
    let n = data.len();
    if n < m + 2 {
        return Err(UndefinedFeature::InsufficientEvents {
            required: m + 3,
            available: n + 1,
        });
    }

    let r = r_factor * dsp::std_dev(data, 0).unwrap_or(0.0);
    if r <= f64::EPSILON {
        return Err(UndefinedFeature::NumericDegeneracy);
    }

    let mut count_m = 0u64;
    let mut count_m1 = 0u64;
    for i in 0..n - m {
        for j in (i + 1)..n - m {
            let matches = (0..m).all(|k| (data[i + k] - data[j + k]).abs() <= r);
            if matches {
                count_m += 1;
                if (data[i + m] - data[j + m]).abs() <= r {
                    count_m1 += 1;
                }
            }
        }
    }

    if count_m == 0 || count_m1 == 0 {
        Err(UndefinedFeature::NumericDegeneracy)
    } else {
        Ok(-(count_m1 as f64 / count_m as f64).ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsp_core::{Event, EventKind, FeatureValue};

    const FS: f64 = 1000.0;

    fn series_from_intervals(intervals_ms: &[usize]) -> EventSeries {
        let mut index = 500;
        let mut events = vec![Event::new(index, EventKind::RPeak, 0.9, 1.0)];
        for &interval in intervals_ms {
            index += interval;
            events.push(Event::new(index, EventKind::RPeak, 0.9, 1.0));
        }
        EventSeries::new(events, FS, 250, index + 500).unwrap()
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(FeatureConfig::default()).unwrap()
    }

    #[test]
    fn test_time_features() {
        let series = series_from_intervals(&[800, 820, 780, 900, 800]);
        let features = extractor().extract(&series, FS, &[FeatureDomain::Time]);

        assert_eq!(features.len(), names::TIME.len());
        assert!((features.value(names::MEAN_NN).unwrap() - 820.0).abs() < 1e-9);
        // diffs: 20, -40, 120, -100
        let rmssd = ((400.0 + 1600.0 + 14400.0 + 10000.0) / 4.0f64).sqrt();
        assert!((features.value(names::RMSSD).unwrap() - rmssd).abs() < 1e-9);
        assert_eq!(features.value(names::NN50), Some(2.0));
        assert_eq!(features.value(names::PNN50), Some(50.0));
        assert!((features.value(names::MAX_HR).unwrap() - 60_000.0 / 780.0).abs() < 1e-9);
        assert!((features.value(names::MIN_HR).unwrap() - 60_000.0 / 900.0).abs() < 1e-9);
        assert!(features.metadata.valid);
        assert_eq!(features.metadata.interval_count, 5);
    }

    #[test]
    fn test_two_events_mark_dispersion_invalid() {
        let series = series_from_intervals(&[800]);
        let features = extractor().extract(&series, FS, &[FeatureDomain::Time]);

        assert_eq!(features.value(names::MEAN_NN), Some(800.0));
        assert_eq!(
            features.get(names::SDNN),
            Some(&FeatureValue::Undefined(UndefinedFeature::InsufficientEvents {
                required: 3,
                available: 2
            }))
        );
        assert!(!features.get(names::RMSSD).unwrap().is_valid());
        assert!(!features.metadata.valid);
    }

    #[test]
    fn test_empty_series_all_invalid() {
        let series = EventSeries::empty(FS, 250, 10_000).unwrap();
        let features = extractor().extract(&series, FS, &FeatureDomain::ALL);

        assert_eq!(
            features.len(),
            names::TIME.len() + names::FREQUENCY.len() + names::NONLINEAR.len()
        );
        assert!(features.features.values().all(|v| !v.is_valid()));
        assert_eq!(features.metadata.event_count, 0);
    }

    #[test]
    fn test_frequency_features_need_duration() {
        let series = series_from_intervals(&[800; 15]);
        let features = extractor().extract(&series, FS, &[FeatureDomain::Frequency]);
        assert!(matches!(
            features.get(names::LF_POWER),
            Some(FeatureValue::Undefined(UndefinedFeature::InsufficientDuration { .. }))
        ));
    }

    #[test]
    fn test_respiratory_modulation_lands_in_hf() {
        // 0.25 Hz modulation of an 800 ms rhythm over ~5 minutes
        let mut intervals = Vec::new();
        let mut t = 0.0;
        while t < 300.0 {
            let interval = 800.0 + 40.0 * (2.0 * std::f64::consts::PI * 0.25 * t).sin();
            intervals.push(interval.round() as usize);
            t += interval / 1000.0;
        }
        let series = series_from_intervals(&intervals);
        let features = extractor().extract(&series, FS, &[FeatureDomain::Frequency]);

        let hf = features.value(names::HF_POWER).unwrap();
        let lf = features.value(names::LF_POWER).unwrap();
        assert!(hf > 5.0 * lf, "hf {} lf {}", hf, lf);
        let hf_peak = features.value(names::HF_PEAK).unwrap();
        assert!((hf_peak - 0.25).abs() < 0.03, "hf peak {}", hf_peak);
        assert!(features.value(names::HF_NU).unwrap() > 80.0);
    }

    #[test]
    fn test_constant_rhythm_is_degenerate() {
        let series = series_from_intervals(&[800; 60]);
        let features = extractor().extract(&series, FS, &FeatureDomain::ALL);

        assert_eq!(features.value(names::SDNN), Some(0.0));
        assert_eq!(features.value(names::SD1), Some(0.0));
        for name in [names::SAMPLE_ENTROPY, names::SD1_SD2_RATIO, names::LF_HF_RATIO, names::LF_NU] {
            assert_eq!(
                features.get(name),
                Some(&FeatureValue::Undefined(UndefinedFeature::NumericDegeneracy)),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_poincare_and_entropy() {
        let intervals: Vec<usize> = (0..40).map(|k| if k % 2 == 0 { 780 } else { 820 }).collect();
        let series = series_from_intervals(&intervals);
        let features = extractor().extract(&series, FS, &[FeatureDomain::Nonlinear]);

        // alternating rhythm: all spread is beat-to-beat
        let sd1 = features.value(names::SD1).unwrap();
        let sd2 = features.value(names::SD2).unwrap();
        assert!(sd1 > sd2);
        assert!((features.value(names::POINCARE_AREA).unwrap() - std::f64::consts::PI * sd1 * sd2).abs() < 1e-9);

        // perfectly regular pattern: every template continues the same way
        let entropy = features.value(names::SAMPLE_ENTROPY).unwrap();
        assert!(entropy.abs() < 1e-9);
    }

    #[test]
    fn test_flagged_intervals_excluded() {
        let mut events: Vec<Event> = (0..6)
            .map(|k| Event::new(500 + 800 * k, EventKind::RPeak, 0.9, 1.0))
            .collect();
        events[3].flags.interval_outlier = true;
        let series = EventSeries::new(events, FS, 250, 6000).unwrap();

        let features = extractor().extract(&series, FS, &[FeatureDomain::Time]);
        assert_eq!(features.metadata.interval_count, 4);

        let keep_all = FeatureExtractor::new(FeatureConfig {
            exclude_flagged: false,
            ..FeatureConfig::default()
        })
        .unwrap();
        assert_eq!(keep_all.extract(&series, FS, &[FeatureDomain::Time]).metadata.interval_count, 5);
    }

    #[test]
    fn test_excluded_interval_breaks_successive_differences() {
        // 2100 -> 3300 is flagged; 800 and 900 ms intervals never touch
        let events: Vec<Event> = [500, 1300, 2100, 3300, 4200, 5100]
            .iter()
            .enumerate()
            .map(|(k, &index)| {
                let mut event = Event::new(index, EventKind::RPeak, 0.9, 1.0);
                event.flags.interval_outlier = k == 3;
                event
            })
            .collect();
        let series = EventSeries::new(events, FS, 250, 6000).unwrap();

        let features = extractor().extract(&series, FS, &[FeatureDomain::Time]);
        assert_eq!(features.metadata.interval_count, 4);
        assert_eq!(features.value(names::RMSSD), Some(0.0));
        assert_eq!(features.value(names::NN50), Some(0.0));
        assert_eq!(features.value(names::PNN50), Some(0.0));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let series = series_from_intervals(&[800, 810, 790, 805, 795, 800, 812, 788, 801, 799, 803]);
        let ex = extractor();
        let first = ex.extract(&series, FS, &FeatureDomain::ALL);
        let second = ex.extract(&series, FS, &FeatureDomain::ALL);
        assert_eq!(first, second);
    }
}
