//! Signal and detection quality scoring

use crate::config::{FrequencyBand, QualityConfig};
use crate::dsp;
use bsp_core::{BspError, BspResult, EventSeries, QualityComponent, QualityLabel, QualityScore, Signal};
use tracing::debug;

/// Component names
pub const SNR: &str = "snr";
pub const CONFIDENCE: &str = "confidence";
pub const REGULARITY: &str = "regularity";
pub const HOS_SQI: &str = "hos_sqi";
pub const ECG_LEVEL3: &str = "ecg_level3";
pub const EDA_BOTTCHER: &str = "eda_bottcher";
pub const KSQI: &str = "ksqi";
pub const PSQI: &str = "psqi";
pub const FSQI: &str = "fsqi";

/// SNR reported when the baseline has no variance at all
const SNR_CAP_DB: f64 = 120.0;

const CSQI_OPTIMAL: f64 = 0.45;
const CSQI_SUSPICIOUS: f64 = 0.64;

/// Interval coefficient of variation (cSQI); needs at least two intervals
pub fn csqi(series: &EventSeries) -> Option<f64> {
    let intervals = series.intervals();
    if intervals.len() < 2 {
        return None;
    }
    let mean = dsp::mean(&intervals)?;
    let std = dsp::std_dev(&intervals, 0)?;
    if mean <= 0.0 {
        None
    } else {
        Some(std / mean)
    }
}

/// Optimal below 0.45, suspicious up to 0.64, unqualified above
pub fn csqi_label(value: f64) -> QualityLabel {
    if value < CSQI_OPTIMAL {
        QualityLabel::Excellent
    } else if value <= CSQI_SUSPICIOUS {
        QualityLabel::Acceptable
    } else {
        QualityLabel::Unacceptable
    }
}

/// Higher-order-statistics index |skewness| * excess kurtosis / 5
pub fn hos_sqi(signal: &Signal) -> Option<f64> {
    let skew = dsp::skewness(signal.samples())?;
    let kurt = dsp::excess_kurtosis(signal.samples())?;
    Some(skew.abs() * kurt / 5.0)
}

pub fn hos_sqi_label(value: f64) -> QualityLabel {
    if value > 0.8 {
        QualityLabel::Excellent
    } else if value > 0.5 {
        QualityLabel::Acceptable
    } else {
        QualityLabel::Unacceptable
    }
}

/// Three-level ECG index: 0.0 for saturated segments or implausible heart
/// rate, 0.5 for a plausible rate, 1.0 when beat templates also agree.
///
/// `adc_bits` enables the saturation check; the segment must span 5 s.
pub fn ecg_sqi_level3(
    signal: &Signal,
    series: &EventSeries,
    adc_bits: Option<u32>,
    correlation_threshold: f64,
) -> BspResult<f64> {
    const LOW: f64 = 0.0;
    const MEDIUM: f64 = 0.5;
    const HIGH: f64 = 1.0;

    let fs = signal.sampling_rate();
    let required = (5.0 * fs).ceil() as usize;
    if signal.len() < required {
        return Err(BspError::InsufficientSignalLength {
            required,
            actual: signal.len(),
        });
    }

    if adc_bits.is_some_and(|bits| adc_saturated(signal, bits)) {
        return Ok(LOW);
    }

    if series.len() < 2 {
        return Ok(LOW);
    }
    let rates: Vec<f64> = series.intervals().iter().map(|i| 60.0 / i).collect();
    let plausible = rates.iter().all(|hr| (40.0..=200.0).contains(hr));
    if !plausible {
        return Ok(LOW);
    }

    let before = (0.2 * fs).round() as usize;
    let after = (0.4 * fs).round() as usize;
    let samples = signal.samples();
    let templates: Vec<&[f64]> = series
        .iter()
        .filter(|e| e.index >= before && e.index + after <= samples.len())
        .map(|e| &samples[e.index - before..e.index + after])
        .collect();
    if templates.len() < 2 {
        return Ok(MEDIUM);
    }

    // mean of the full correlation matrix, diagonal included
    let n = templates.len();
    let mut total = 0.0;
    for a in &templates {
        for b in &templates {
            total += dsp::pearson(a, b).unwrap_or(0.0);
        }
    }
    let mean_correlation = total / (n * n) as f64;

    Ok(if mean_correlation > correlation_threshold {
        HIGH
    } else {
        MEDIUM
    })
}

/// Whether the signal spans the full range of a `bits`-bit converter
pub fn adc_saturated(signal: &Signal, bits: u32) -> bool {
    signal.stats().peak_to_peak >= 2f64.powi(bits as i32) - 1.0
}

/// Kurtosis index (kSQI): excess kurtosis of the samples
pub fn ksqi(signal: &Signal) -> Option<f64> {
    dsp::excess_kurtosis(signal.samples())
}

/// Flatline index (pSQI): percentage of first differences smaller than
/// `threshold` in magnitude
pub fn psqi(signal: &Signal, threshold: f64) -> Option<f64> {
    let samples = signal.samples();
    if samples.len() < 2 {
        return None;
    }
    let flat = samples.windows(2).filter(|w| (w[1] - w[0]).abs() < threshold).count();
    Some(100.0 * flat as f64 / (samples.len() - 1) as f64)
}

/// Spectral index (fSQI): Welch power in `band` over the power in
/// `reference`, or over the whole spectrum when no reference is given
pub fn fsqi(
    signal: &Signal,
    band: FrequencyBand,
    reference: Option<FrequencyBand>,
    segment_len: usize,
) -> BspResult<f64> {
    let spectrum = dsp::welch(signal.samples(), signal.sampling_rate(), segment_len)?;
    let numerator = spectrum.band_power(band.low, band.high);
    let denominator = match reference {
        Some(reference) => spectrum.band_power(reference.low, reference.high),
        None => spectrum.band_power(0.0, f64::INFINITY),
    };
    if !(denominator > 0.0) {
        return Err(BspError::InvalidSignalData {
            reason: "no spectral power in the reference band".to_string(),
        });
    }
    Ok(numerator / denominator)
}

/// Fraction of 2 s windows whose relative amplitude change is below 0.2 and
/// whose mean exceeds 0.05 (skin conductance in uS)
pub fn eda_sqi_bottcher(signal: &Signal) -> BspResult<f64> {
    let window = signal.seconds_to_samples(2.0).max(1);
    if signal.len() < window {
        return Err(BspError::InsufficientSignalLength {
            required: window,
            actual: signal.len(),
        });
    }

    let scores: Vec<f64> = signal
        .samples()
        .chunks_exact(window)
        .map(|segment| {
            let min = segment.iter().copied().fold(f64::INFINITY, f64::min);
            let max = segment.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let rac = ((max - min) / max).abs();
            let mean = segment.iter().sum::<f64>() / segment.len() as f64;
            if rac < 0.2 && mean > 0.05 {
                1.0
            } else {
                0.0
            }
        })
        .collect();

    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

fn level_label(level: f64) -> QualityLabel {
    if level >= 1.0 {
        QualityLabel::Excellent
    } else if level >= 0.5 {
        QualityLabel::Acceptable
    } else {
        QualityLabel::Unacceptable
    }
}

/// Combines an SNR proxy, detection confidence and interval regularity
#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> BspResult<Self> {
        config.validate()?;
        Ok(QualityScorer { config })
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Score `series` detected in `signal`
    pub fn score(&self, signal: &Signal, series: &EventSeries) -> QualityScore {
        let components = vec![
            self.snr_component(signal, series),
            self.confidence_component(series),
            self.regularity_component(series),
        ];

        let weight: f64 = components.iter().map(|c| c.weight).sum();
        let score = components.iter().map(|c| c.weight * c.score).sum::<f64>() / weight;
        let label = self.label(score);

        debug!(score, %label, events = series.len(), "quality scored");
        QualityScore {
            score,
            label,
            components,
        }
    }

    /// hosSQI as an audit sub-score; `None` for a flat signal
    pub fn hos_audit(&self, signal: &Signal) -> Option<QualityComponent> {
        let value = hos_sqi(signal)?;
        Some(QualityComponent::new(HOS_SQI, value, value, 0.0).with_label(hos_sqi_label(value)))
    }

    /// Three-level ECG index as an audit sub-score.
    ///
    /// Saturation is judged on the `raw` recording; heart rate and beat
    /// templates come from `templates`.
    pub fn ecg_level3_audit(
        &self,
        raw: &Signal,
        templates: &Signal,
        series: &EventSeries,
    ) -> BspResult<QualityComponent> {
        let mut level = ecg_sqi_level3(templates, series, None, self.config.template_correlation)?;
        if self.config.adc_bits.is_some_and(|bits| adc_saturated(raw, bits)) {
            level = 0.0;
        }
        Ok(QualityComponent::new(ECG_LEVEL3, level, level, 0.0).with_label(level_label(level)))
    }

    /// kSQI, pSQI and fSQI of a raw ECG as audit sub-scores; indices that
    /// cannot be computed are left out
    pub fn ecg_raw_audits(&self, raw: &Signal) -> Vec<QualityComponent> {
        let mut audits = Vec::with_capacity(3);
        if let Some(value) = ksqi(raw) {
            audits.push(QualityComponent::new(KSQI, value, value, 0.0));
        }
        if let Some(value) = psqi(raw, self.config.flatline_threshold) {
            audits.push(QualityComponent::new(PSQI, value, 1.0 - value / 100.0, 0.0));
        }
        match fsqi(
            raw,
            self.config.spectral_band,
            self.config.spectral_reference,
            self.config.spectral_segment,
        ) {
            Ok(value) => audits.push(QualityComponent::new(FSQI, value, value, 0.0)),
            Err(e) => debug!(error = %e, "ECG spectral index skipped"),
        }
        audits
    }

    /// EDA Böttcher index as an audit sub-score
    pub fn eda_audit(&self, signal: &Signal) -> BspResult<QualityComponent> {
        let value = eda_sqi_bottcher(signal)?;
        Ok(QualityComponent::new(EDA_BOTTCHER, value, value, 0.0).with_label(self.label(value)))
    }

    fn label(&self, score: f64) -> QualityLabel {
        if score >= self.config.excellent_threshold {
            QualityLabel::Excellent
        } else if score >= self.config.acceptable_threshold {
            QualityLabel::Acceptable
        } else {
            QualityLabel::Unacceptable
        }
    }

    /// Event amplitude against the spread of the samples away from events
    fn snr_component(&self, signal: &Signal, series: &EventSeries) -> QualityComponent {
        let samples = signal.samples();
        let guard = signal.seconds_to_samples(self.config.peak_guard_s);

        let amplitudes: Vec<f64> = series
            .iter()
            .filter_map(|e| samples.get(e.index))
            .map(|v| v.abs())
            .collect();

        let mut near_event = vec![false; samples.len()];
        for event in series {
            let lo = event.index.saturating_sub(guard);
            let hi = (event.index + guard + 1).min(samples.len());
            if lo < hi {
                near_event[lo..hi].iter_mut().for_each(|flag| *flag = true);
            }
        }
        let baseline: Vec<f64> = samples
            .iter()
            .zip(&near_event)
            .filter(|(_, near)| !**near)
            .map(|(v, _)| *v)
            .collect();

        let snr_db = match (dsp::mean(&amplitudes), dsp::std_dev(&baseline, 0)) {
            (Some(amp), Some(noise)) if amp > 0.0 && noise > 0.0 => (20.0 * (amp / noise).log10()).min(SNR_CAP_DB),
            (Some(amp), Some(_)) if amp > 0.0 => SNR_CAP_DB,
            // no events, or no samples left outside the guard bands
            _ => self.config.snr_floor_db,
        };

        let span = self.config.snr_ceiling_db - self.config.snr_floor_db;
        let score = (snr_db - self.config.snr_floor_db) / span;
        QualityComponent::new(SNR, snr_db, score, self.config.snr_weight)
    }

    /// Mean confidence, reduced by the share of merged or outlier events
    fn confidence_component(&self, series: &EventSeries) -> QualityComponent {
        let Some(mean) = series.mean_confidence() else {
            return QualityComponent::new(CONFIDENCE, 0.0, 0.0, self.config.confidence_weight);
        };
        let suspect_fraction = series.suspect_count() as f64 / series.len() as f64;
        let score = (mean * (1.0 - self.config.flag_penalty * suspect_fraction)).max(0.0);
        QualityComponent::new(CONFIDENCE, mean, score, self.config.confidence_weight)
    }

    fn regularity_component(&self, series: &EventSeries) -> QualityComponent {
        match csqi(series) {
            Some(value) => {
                let score = 1.0 - value / CSQI_SUSPICIOUS;
                QualityComponent::new(REGULARITY, value, score, self.config.regularity_weight)
                    .with_label(csqi_label(value))
            }
            None => QualityComponent::new(REGULARITY, 0.0, 0.0, self.config.regularity_weight)
                .with_label(QualityLabel::Unacceptable),
        }
    }
}
