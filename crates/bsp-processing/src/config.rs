//! Configuration management for signal processing
//!
//! Every option has a documented default. Configurations are plain immutable
//! values handed to each component; the component that consumes an option
//! validates it on construction.

use crate::filters::{Cutoff, FilterFamily};
use bsp_core::{config_error, BspError, BspResult, EventKind, FeatureDomain, Modality};
use serde::{Deserialize, Serialize};

/// Complete processing configuration for one modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Configuration name/profile
    pub name: String,
    /// Modality the defaults were chosen for
    pub modality: Modality,
    pub conditioning: ConditioningConfig,
    pub detector: DetectorConfig,
    pub refiner: RefinerConfig,
    pub features: FeatureConfig,
    pub quality: QualityConfig,
}

/// Primary filter request, before it is checked against a sampling rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub family: FilterFamily,
    pub order: usize,
    pub cutoff: Cutoff,
    /// Forward-backward application with zero net phase delay
    pub zero_phase: bool,
    /// Quality factor, used by the notch family only
    pub q_factor: Option<f64>,
}

impl FilterRequest {
    pub fn lowpass(cutoff: f64, order: usize) -> Self {
        Self::new(FilterFamily::Lowpass, order, Cutoff::Single(cutoff))
    }

    pub fn highpass(cutoff: f64, order: usize) -> Self {
        Self::new(FilterFamily::Highpass, order, Cutoff::Single(cutoff))
    }

    pub fn bandpass(low: f64, high: f64, order: usize) -> Self {
        Self::new(FilterFamily::Bandpass, order, Cutoff::Band(low, high))
    }

    pub fn bandstop(low: f64, high: f64, order: usize) -> Self {
        Self::new(FilterFamily::Bandstop, order, Cutoff::Band(low, high))
    }

    pub fn notch(freq: f64, q_factor: f64) -> Self {
        FilterRequest {
            q_factor: Some(q_factor),
            ..Self::new(FilterFamily::Notch, 2, Cutoff::Single(freq))
        }
    }

    fn new(family: FilterFamily, order: usize, cutoff: Cutoff) -> Self {
        FilterRequest {
            family,
            order,
            cutoff,
            zero_phase: true,
            q_factor: None,
        }
    }

    /// Single forward pass; leaves a phase delay for the refiner to undo
    pub fn causal(mut self) -> Self {
        self.zero_phase = false;
        self
    }
}

/// How slow baseline drift is removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BaselineMethod {
    /// Zero-phase Butterworth high-pass
    Highpass { cutoff: f64, order: usize },
    /// Subtract a centered moving-average trend
    MovingAverage { window_s: f64 },
}

/// Whether baseline removal runs before or after the primary filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselinePlacement {
    BeforePrimary,
    AfterPrimary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRemoval {
    pub method: BaselineMethod,
    pub placement: BaselinePlacement,
}

/// Signal conditioning stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditioningConfig {
    pub filter: FilterRequest,
    pub baseline: Option<BaselineRemoval>,
    /// Target sampling rate for an explicit resample step
    pub resample_hz: Option<f64>,
}

impl ConditioningConfig {
    pub fn validate(&self) -> BspResult<()> {
        if let Some(baseline) = &self.baseline {
            match baseline.method {
                BaselineMethod::Highpass { cutoff, order } => {
                    if !(cutoff > 0.0) || order == 0 {
                        return Err(config_error!(
                            "baseline high-pass needs positive cutoff and order (got {}Hz, order {})",
                            cutoff,
                            order
                        ));
                    }
                }
                BaselineMethod::MovingAverage { window_s } => {
                    if !(window_s > 0.0) {
                        return Err(config_error!("baseline window must be positive, got {}s", window_s));
                    }
                }
            }
        }

        if let Some(rate) = self.resample_hz {
            if !(rate > 0.0) || !rate.is_finite() {
                return Err(BspError::InvalidSamplingRate { rate });
            }
        }

        Ok(())
    }
}

/// Refractory period in seconds or samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefractoryPeriod {
    Seconds(f64),
    Samples(usize),
}

impl RefractoryPeriod {
    /// Resolve to whole samples at the given rate
    pub fn to_samples(&self, sampling_rate: f64) -> BspResult<usize> {
        let samples = match *self {
            RefractoryPeriod::Seconds(s) => {
                if !(s > 0.0) || !s.is_finite() {
                    return Err(config_error!("refractory period must be positive, got {}s", s));
                }
                (s * sampling_rate).round() as usize
            }
            RefractoryPeriod::Samples(n) => n,
        };

        if samples == 0 {
            return Err(config_error!(
                "refractory period resolves to zero samples at {}Hz",
                sampling_rate
            ));
        }
        Ok(samples)
    }
}

/// Which excursions count as events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
    Absolute,
}

impl Polarity {
    /// Map a sample so that events become positive excursions
    pub fn orient(&self, value: f64) -> f64 {
        match self {
            Polarity::Positive => value,
            Polarity::Negative => -value,
            Polarity::Absolute => value.abs(),
        }
    }
}

/// Adaptive-threshold detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub event_kind: EventKind,
    pub refractory: RefractoryPeriod,
    pub polarity: Polarity,
    /// Smoothing window of the modality's detection emphasis (seconds)
    pub emphasis_window_s: f64,
    /// Threshold = noise + coefficient * (signal - noise)
    pub threshold_coefficient: f64,
    /// Weight of a new peak in the signal/noise running averages
    pub peak_smoothing: f64,
    /// Weight of a recovered peak in the signal running average
    pub search_back_smoothing: f64,
    /// Search back once this multiple of the mean interval has elapsed
    pub search_back_multiplier: f64,
    /// Search-back threshold as a fraction of the regular threshold
    pub search_back_fraction: f64,
    /// Intervals kept in the running interval average
    pub interval_history: usize,
    /// Initial window used to seed the running averages (seconds)
    pub learning_window_s: f64,
}

impl DetectorConfig {
    pub fn validate(&self) -> BspResult<()> {
        let unit_open = |name: &str, v: f64| -> BspResult<()> {
            if v > 0.0 && v < 1.0 {
                Ok(())
            } else {
                Err(config_error!("{} must lie in (0, 1), got {}", name, v))
            }
        };

        unit_open("threshold_coefficient", self.threshold_coefficient)?;
        unit_open("peak_smoothing", self.peak_smoothing)?;
        unit_open("search_back_smoothing", self.search_back_smoothing)?;
        unit_open("search_back_fraction", self.search_back_fraction)?;

        if !(self.search_back_multiplier > 1.0) || !self.search_back_multiplier.is_finite() {
            return Err(config_error!(
                "search_back_multiplier must exceed 1, got {}",
                self.search_back_multiplier
            ));
        }
        if self.interval_history == 0 {
            return Err(config_error!("interval_history must be at least 1"));
        }
        if !(self.learning_window_s > 0.0) {
            return Err(config_error!("learning_window_s must be positive"));
        }
        if !(self.emphasis_window_s >= 0.0) {
            return Err(config_error!("emphasis_window_s must not be negative"));
        }
        if let RefractoryPeriod::Seconds(s) = self.refractory {
            if !(s > 0.0) || !s.is_finite() {
                return Err(config_error!("refractory period must be positive, got {}s", s));
            }
        }
        if let RefractoryPeriod::Samples(0) = self.refractory {
            return Err(config_error!("refractory period must be at least one sample"));
        }

        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            event_kind: Modality::Ecg.event_kind(),
            refractory: RefractoryPeriod::Seconds(0.25),
            polarity: Polarity::Positive,
            emphasis_window_s: 0.0,
            threshold_coefficient: 0.25,
            peak_smoothing: 0.125,
            search_back_smoothing: 0.25,
            search_back_multiplier: 1.5,
            search_back_fraction: 0.5,
            interval_history: 8,
            learning_window_s: 2.0,
        }
    }
}

/// Event refinement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinerConfig {
    /// Half-width of the extremum search around the delay-corrected index (seconds)
    pub correction_window_s: f64,
    pub polarity: Polarity,
    /// Flag intervals further than this many local standard deviations away
    pub outlier_multiplier: f64,
    /// Neighbouring intervals considered on each side
    pub outlier_neighbourhood: usize,
    /// Lower bound on the local standard deviation, as a fraction of the local mean
    pub min_std_fraction: f64,
}

impl RefinerConfig {
    pub fn validate(&self) -> BspResult<()> {
        if !(self.correction_window_s >= 0.0) || !self.correction_window_s.is_finite() {
            return Err(config_error!("correction_window_s must be finite and >= 0"));
        }
        if !(self.outlier_multiplier > 0.0) {
            return Err(config_error!(
                "outlier_multiplier must be positive, got {}",
                self.outlier_multiplier
            ));
        }
        if self.outlier_neighbourhood == 0 {
            return Err(config_error!("outlier_neighbourhood must be at least 1"));
        }
        if !(self.min_std_fraction >= 0.0) {
            return Err(config_error!("min_std_fraction must not be negative"));
        }
        Ok(())
    }
}

impl Default for RefinerConfig {
    fn default() -> Self {
        RefinerConfig {
            correction_window_s: 0.05,
            polarity: Polarity::Positive,
            outlier_multiplier: 3.0,
            outlier_neighbourhood: 4,
            min_std_fraction: 0.02,
        }
    }
}

/// Frequency band in Hz, low edge inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low: f64,
    pub high: f64,
}

impl FrequencyBand {
    pub const fn new(low: f64, high: f64) -> Self {
        FrequencyBand { low, high }
    }
}

/// Interval-series feature settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub domains: Vec<FeatureDomain>,
    /// Events needed for mean interval and heart rate
    pub min_events_mean: usize,
    /// Events needed for dispersion and successive-difference statistics
    pub min_events_dispersion: usize,
    pub min_events_frequency: usize,
    /// Span of the event series needed for spectral estimates (seconds)
    pub min_duration_frequency_s: f64,
    pub min_events_nonlinear: usize,
    pub min_events_entropy: usize,
    /// Rate the interval series is interpolated to before the transform
    pub interpolation_rate_hz: f64,
    /// Welch segment length (seconds); shorter series use a single segment
    pub welch_segment_s: f64,
    pub vlf_band: FrequencyBand,
    pub lf_band: FrequencyBand,
    pub hf_band: FrequencyBand,
    /// Sample entropy embedding dimension
    pub entropy_dimension: usize,
    /// Sample entropy tolerance as a fraction of the interval standard deviation
    pub entropy_tolerance: f64,
    /// Drop intervals that end at a refiner-flagged event
    pub exclude_flagged: bool,
}

impl FeatureConfig {
    pub fn validate(&self) -> BspResult<()> {
        if self.min_events_mean < 2 {
            return Err(config_error!("min_events_mean must be at least 2"));
        }
        if self.min_events_dispersion < 3 {
            return Err(config_error!("min_events_dispersion must be at least 3"));
        }
        if self.min_events_frequency < 3 || self.min_events_nonlinear < 3 {
            return Err(config_error!("spectral and nonlinear features need at least 3 events"));
        }
        if self.min_events_entropy < self.entropy_dimension + 3 {
            return Err(config_error!(
                "min_events_entropy must be at least entropy_dimension + 3 ({})",
                self.entropy_dimension + 3
            ));
        }
        if !(self.interpolation_rate_hz > 0.0) || !(self.welch_segment_s > 0.0) {
            return Err(config_error!("interpolation rate and Welch segment must be positive"));
        }
        if self.entropy_dimension == 0 || !(self.entropy_tolerance > 0.0) {
            return Err(config_error!("sample entropy needs dimension >= 1 and positive tolerance"));
        }
        let nyquist = self.interpolation_rate_hz / 2.0;
        for (name, band) in [("vlf", self.vlf_band), ("lf", self.lf_band), ("hf", self.hf_band)] {
            if !(band.low >= 0.0 && band.low < band.high && band.high <= nyquist) {
                return Err(config_error!(
                    "{} band [{}, {}) must be ordered and below {}Hz",
                    name,
                    band.low,
                    band.high,
                    nyquist
                ));
            }
        }
        Ok(())
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            domains: FeatureDomain::ALL.to_vec(),
            min_events_mean: 2,
            min_events_dispersion: 3,
            min_events_frequency: 10,
            min_duration_frequency_s: 30.0,
            min_events_nonlinear: 4,
            min_events_entropy: 10,
            interpolation_rate_hz: 4.0,
            welch_segment_s: 64.0,
            vlf_band: FrequencyBand::new(0.003, 0.04),
            lf_band: FrequencyBand::new(0.04, 0.15),
            hf_band: FrequencyBand::new(0.15, 0.4),
            entropy_dimension: 2,
            entropy_tolerance: 0.2,
            exclude_flagged: true,
        }
    }
}

/// Quality score weighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    pub snr_weight: f64,
    pub confidence_weight: f64,
    pub regularity_weight: f64,
    /// Confidence penalty per unit fraction of suspect events
    pub flag_penalty: f64,
    /// SNR mapped to score 0
    pub snr_floor_db: f64,
    /// SNR mapped to score 1
    pub snr_ceiling_db: f64,
    /// Samples within this distance of an event are excluded from the baseline (seconds)
    pub peak_guard_s: f64,
    pub excellent_threshold: f64,
    pub acceptable_threshold: f64,
    /// Mean beat-template correlation required for the top ECG level
    pub template_correlation: f64,
    /// Converter resolution for the ECG saturation check
    pub adc_bits: Option<u32>,
    /// Sample-to-sample change below which the raw ECG counts as flat (signal units)
    pub flatline_threshold: f64,
    /// Numerator band of the ECG spectral ratio
    pub spectral_band: FrequencyBand,
    /// Denominator band of the spectral ratio; the whole spectrum when unset
    pub spectral_reference: Option<FrequencyBand>,
    /// Welch segment length for the spectral ratio (samples)
    pub spectral_segment: usize,
}

impl QualityConfig {
    pub fn validate(&self) -> BspResult<()> {
        let weights = [self.snr_weight, self.confidence_weight, self.regularity_weight];
        if weights.iter().any(|w| !(*w >= 0.0)) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(config_error!("quality weights must be non-negative with a positive sum"));
        }
        if !(self.flag_penalty >= 0.0) {
            return Err(config_error!("flag_penalty must not be negative"));
        }
        if !(self.snr_ceiling_db > self.snr_floor_db) {
            return Err(config_error!("snr_ceiling_db must exceed snr_floor_db"));
        }
        if !(self.peak_guard_s >= 0.0) {
            return Err(config_error!("peak_guard_s must not be negative"));
        }
        if !(0.0 < self.acceptable_threshold
            && self.acceptable_threshold < self.excellent_threshold
            && self.excellent_threshold <= 1.0)
        {
            return Err(config_error!("label thresholds must satisfy 0 < acceptable < excellent <= 1"));
        }
        if !(self.template_correlation > 0.0 && self.template_correlation <= 1.0) {
            return Err(config_error!(
                "template_correlation must lie in (0, 1], got {}",
                self.template_correlation
            ));
        }
        if self.adc_bits == Some(0) {
            return Err(config_error!("adc_bits must be at least 1"));
        }
        if !(self.flatline_threshold > 0.0) {
            return Err(config_error!("flatline_threshold must be positive"));
        }
        for band in std::iter::once(self.spectral_band).chain(self.spectral_reference) {
            if !(band.low >= 0.0 && band.high > band.low) {
                return Err(config_error!("spectral band {}-{} Hz is empty", band.low, band.high));
            }
        }
        if self.spectral_segment < 4 {
            return Err(config_error!("spectral_segment must be at least 4 samples"));
        }
        Ok(())
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            snr_weight: 0.4,
            confidence_weight: 0.4,
            regularity_weight: 0.2,
            flag_penalty: 1.0,
            snr_floor_db: 0.0,
            snr_ceiling_db: 20.0,
            peak_guard_s: 0.1,
            excellent_threshold: 0.7,
            acceptable_threshold: 0.4,
            template_correlation: 0.9,
            adc_bits: None,
            flatline_threshold: 0.01,
            spectral_band: FrequencyBand::new(5.0, 20.0),
            spectral_reference: None,
            spectral_segment: 1024,
        }
    }
}

/// Preset configurations per modality
impl ProcessingConfig {
    /// ECG R-peak detection and HRV
    pub fn ecg() -> Self {
        ProcessingConfig {
            name: "ECG".to_string(),
            modality: Modality::Ecg,
            conditioning: ConditioningConfig {
                filter: FilterRequest::bandpass(3.0, 45.0, 4),
                baseline: None,
                resample_hz: None,
            },
            detector: DetectorConfig {
                event_kind: Modality::Ecg.event_kind(),
                refractory: RefractoryPeriod::Seconds(0.25),
                emphasis_window_s: 0.08,
                ..DetectorConfig::default()
            },
            refiner: RefinerConfig::default(),
            features: FeatureConfig::default(),
            quality: QualityConfig::default(),
        }
    }

    /// PPG systolic peak detection
    pub fn ppg() -> Self {
        ProcessingConfig {
            name: "PPG".to_string(),
            modality: Modality::Ppg,
            conditioning: ConditioningConfig {
                filter: FilterRequest::bandpass(1.0, 8.0, 4),
                baseline: None,
                resample_hz: None,
            },
            detector: DetectorConfig {
                event_kind: Modality::Ppg.event_kind(),
                refractory: RefractoryPeriod::Seconds(0.3),
                ..DetectorConfig::default()
            },
            refiner: RefinerConfig {
                correction_window_s: 0.1,
                ..RefinerConfig::default()
            },
            features: FeatureConfig::default(),
            quality: QualityConfig::default(),
        }
    }

    /// EDA skin-conductance-response onsets
    pub fn eda() -> Self {
        ProcessingConfig {
            name: "EDA".to_string(),
            modality: Modality::Eda,
            conditioning: ConditioningConfig {
                filter: FilterRequest::lowpass(5.0, 4),
                baseline: Some(BaselineRemoval {
                    method: BaselineMethod::MovingAverage { window_s: 10.0 },
                    placement: BaselinePlacement::AfterPrimary,
                }),
                resample_hz: None,
            },
            detector: DetectorConfig {
                event_kind: Modality::Eda.event_kind(),
                refractory: RefractoryPeriod::Seconds(1.0),
                emphasis_window_s: 0.25,
                learning_window_s: 10.0,
                ..DetectorConfig::default()
            },
            refiner: RefinerConfig {
                correction_window_s: 0.25,
                ..RefinerConfig::default()
            },
            features: FeatureConfig {
                domains: vec![FeatureDomain::Time],
                ..FeatureConfig::default()
            },
            quality: QualityConfig::default(),
        }
    }

    /// Breath detection from a respiration trace
    pub fn respiration() -> Self {
        ProcessingConfig {
            name: "Respiration".to_string(),
            modality: Modality::Respiration,
            conditioning: ConditioningConfig {
                filter: FilterRequest::bandpass(0.1, 0.35, 2),
                baseline: None,
                resample_hz: None,
            },
            detector: DetectorConfig {
                event_kind: Modality::Respiration.event_kind(),
                refractory: RefractoryPeriod::Seconds(1.0),
                learning_window_s: 10.0,
                ..DetectorConfig::default()
            },
            refiner: RefinerConfig {
                correction_window_s: 0.5,
                ..RefinerConfig::default()
            },
            features: FeatureConfig {
                domains: vec![FeatureDomain::Time, FeatureDomain::Nonlinear],
                ..FeatureConfig::default()
            },
            quality: QualityConfig::default(),
        }
    }

    /// EMG activation onsets on the rectified envelope
    pub fn emg() -> Self {
        ProcessingConfig {
            name: "EMG".to_string(),
            modality: Modality::Emg,
            conditioning: ConditioningConfig {
                filter: FilterRequest::bandpass(20.0, 450.0, 4),
                baseline: None,
                resample_hz: None,
            },
            detector: DetectorConfig {
                event_kind: Modality::Emg.event_kind(),
                refractory: RefractoryPeriod::Seconds(0.5),
                polarity: Polarity::Positive,
                emphasis_window_s: 0.1,
                ..DetectorConfig::default()
            },
            refiner: RefinerConfig {
                polarity: Polarity::Absolute,
                ..RefinerConfig::default()
            },
            features: FeatureConfig {
                domains: vec![FeatureDomain::Time],
                ..FeatureConfig::default()
            },
            quality: QualityConfig::default(),
        }
    }

    /// EEG transients on the rectified envelope
    pub fn eeg() -> Self {
        ProcessingConfig {
            name: "EEG".to_string(),
            modality: Modality::Eeg,
            conditioning: ConditioningConfig {
                filter: FilterRequest::bandpass(1.0, 40.0, 4),
                baseline: None,
                resample_hz: None,
            },
            detector: DetectorConfig {
                event_kind: Modality::Eeg.event_kind(),
                refractory: RefractoryPeriod::Seconds(0.5),
                emphasis_window_s: 0.1,
                ..DetectorConfig::default()
            },
            refiner: RefinerConfig {
                polarity: Polarity::Absolute,
                ..RefinerConfig::default()
            },
            features: FeatureConfig {
                domains: vec![FeatureDomain::Time],
                ..FeatureConfig::default()
            },
            quality: QualityConfig::default(),
        }
    }

    /// PCG first heart sounds on the rectified envelope
    pub fn pcg() -> Self {
        ProcessingConfig {
            name: "PCG".to_string(),
            modality: Modality::Pcg,
            conditioning: ConditioningConfig {
                filter: FilterRequest::bandpass(25.0, 400.0, 2),
                baseline: None,
                resample_hz: None,
            },
            detector: DetectorConfig {
                event_kind: Modality::Pcg.event_kind(),
                refractory: RefractoryPeriod::Seconds(0.25),
                emphasis_window_s: 0.05,
                ..DetectorConfig::default()
            },
            refiner: RefinerConfig {
                polarity: Polarity::Absolute,
                ..RefinerConfig::default()
            },
            features: FeatureConfig::default(),
            quality: QualityConfig::default(),
        }
    }

    /// Create configuration suitable for a modality
    pub fn for_modality(modality: Modality) -> Self {
        match modality {
            Modality::Ecg => Self::ecg(),
            Modality::Ppg => Self::ppg(),
            Modality::Eda => Self::eda(),
            Modality::Respiration => Self::respiration(),
            Modality::Emg => Self::emg(),
            Modality::Eeg => Self::eeg(),
            Modality::Pcg => Self::pcg(),
        }
    }

    /// Validate everything that does not depend on a sampling rate
    pub fn validate(&self) -> BspResult<()> {
        if self.name.is_empty() {
            return Err(config_error!("configuration name cannot be empty"));
        }
        self.conditioning.validate()?;
        self.detector.validate()?;
        self.refiner.validate()?;
        self.features.validate()?;
        self.quality.validate()?;
        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> BspResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BspError::SerializationError {
            message: format!("Failed to serialize configuration: {}", e),
        })
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> BspResult<Self> {
        serde_json::from_str(json).map_err(|e| BspError::SerializationError {
            message: format!("Failed to deserialize configuration: {}", e),
        })
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self::ecg()
    }
}
