//! Per-modality processing strategies
//!
//! Every modality runs the same six stages (design, apply, detect, refine,
//! extract, score). A [`ModalityStrategy`] supplies the modality-specific
//! parts: the detection emphasis, which signal events are refined against,
//! and any reference quality indices attached to the score. The stages
//! themselves are built once from a [`ProcessingConfig`] and shared as
//! read-only [`Stages`].

use crate::config::{ConditioningConfig, ProcessingConfig};
use crate::detector::{Emphasis, EventDetector};
use crate::features::FeatureExtractor;
use crate::filters::{FilterDesigner, FilterSpec, SignalConditioner};
use crate::quality::QualityScorer;
use crate::refiner::{EventRefiner, Refinement};
use bsp_core::{BspResult, EventSeries, FeatureVector, Modality, QualityScore, Signal};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Configured processing components, immutable once built
#[derive(Debug, Clone)]
pub struct Stages {
    pub conditioner: SignalConditioner,
    pub detector: EventDetector,
    pub refiner: EventRefiner,
    pub extractor: FeatureExtractor,
    pub scorer: QualityScorer,
}

impl Stages {
    /// Validate `config` and build every stage; `designer` may be shared
    /// between pipelines to share its design cache.
    pub fn from_config(config: &ProcessingConfig, designer: FilterDesigner) -> BspResult<Self> {
        config.validate()?;
        Ok(Stages {
            conditioner: SignalConditioner::new(designer),
            detector: EventDetector::new(config.detector.clone())?,
            refiner: EventRefiner::new(config.refiner.clone())?,
            extractor: FeatureExtractor::new(config.features.clone())?,
            scorer: QualityScorer::new(config.quality.clone())?,
        })
    }
}

/// Signals produced along the way that later stages need
#[derive(Debug, Clone)]
pub struct StageSignals<'a> {
    /// Input on the processing time base (after any resampling)
    pub input: &'a Signal,
    pub conditioned: &'a Signal,
    /// Detection input derived from `conditioned`
    pub emphasized: &'a Signal,
}

/// Modality-specific behaviour of the shared processing contract
pub trait ModalityStrategy: Send + Sync + fmt::Debug {
    fn modality(&self) -> Modality;

    /// Transform applied to the conditioned signal before detection
    fn emphasis(&self, stages: &Stages) -> Emphasis;

    /// Primary filter for signals at `sampling_rate`
    fn design(&self, stages: &Stages, conditioning: &ConditioningConfig, sampling_rate: f64) -> BspResult<Arc<FilterSpec>> {
        stages
            .conditioner
            .designer()
            .design_request(&conditioning.filter, sampling_rate)
    }

    /// Baseline removal and primary filtering
    fn apply(
        &self,
        stages: &Stages,
        signal: &Signal,
        spec: &FilterSpec,
        conditioning: &ConditioningConfig,
    ) -> BspResult<Signal> {
        stages
            .conditioner
            .condition_with(signal, spec, conditioning.baseline.as_ref())
    }

    fn emphasize(&self, stages: &Stages, conditioned: &Signal) -> BspResult<Signal> {
        self.emphasis(stages).apply(conditioned)
    }

    fn detect(&self, stages: &Stages, emphasized: &Signal) -> BspResult<EventSeries> {
        stages.detector.detect(emphasized)
    }

    /// Signal events are relocated against. A zero-phase conditioned signal
    /// shares the input's time base, so the detection input itself is used;
    /// after a causal filter only the input's own shape is trustworthy.
    fn refinement_basis(&self, stages: &Stages, signals: &StageSignals<'_>, spec: &FilterSpec) -> BspResult<Signal> {
        if spec.zero_phase() {
            Ok(signals.emphasized.clone())
        } else {
            self.emphasize(stages, signals.input)
        }
    }

    fn refine(&self, stages: &Stages, basis: &Signal, series: &EventSeries, spec: &FilterSpec) -> BspResult<Refinement> {
        stages.refiner.refine_with_report(basis, series, spec)
    }

    fn extract(&self, stages: &Stages, series: &EventSeries) -> FeatureVector {
        stages.extractor.extract_configured(series)
    }

    /// Score refined events against the signal they were refined on
    fn score(&self, stages: &Stages, basis: &Signal, _input: &Signal, series: &EventSeries) -> QualityScore {
        stages.scorer.score(basis, series)
    }
}

/// R-peaks: detection on the slope energy, relocation onto the filtered peak
#[derive(Debug, Clone, Copy, Default)]
pub struct EcgStrategy;

impl ModalityStrategy for EcgStrategy {
    fn modality(&self) -> Modality {
        Modality::Ecg
    }

    fn emphasis(&self, stages: &Stages) -> Emphasis {
        Emphasis::EnergyEnvelope {
            window_s: stages.detector.config().emphasis_window_s,
        }
    }

    fn refinement_basis(&self, _stages: &Stages, signals: &StageSignals<'_>, spec: &FilterSpec) -> BspResult<Signal> {
        if spec.zero_phase() {
            Ok(signals.conditioned.clone())
        } else {
            Ok(signals.input.clone())
        }
    }

    fn score(&self, stages: &Stages, basis: &Signal, input: &Signal, series: &EventSeries) -> QualityScore {
        let mut quality = stages.scorer.score(basis, series);

        if let Some(hos) = stages.scorer.hos_audit(basis) {
            quality.push_audit(hos);
        }
        // the three-level index needs a 5 s segment; shorter ones go unaudited
        match stages.scorer.ecg_level3_audit(input, basis, series) {
            Ok(level3) => quality.push_audit(level3),
            Err(e) => debug!(error = %e, "ECG level-3 index skipped"),
        }
        for audit in stages.scorer.ecg_raw_audits(input) {
            quality.push_audit(audit);
        }
        quality
    }
}

/// Peaks detected directly on the conditioned waveform (PPG, respiration)
#[derive(Debug, Clone, Copy)]
pub struct PeakStrategy {
    modality: Modality,
}

impl PeakStrategy {
    pub fn new(modality: Modality) -> Self {
        PeakStrategy { modality }
    }
}

impl ModalityStrategy for PeakStrategy {
    fn modality(&self) -> Modality {
        self.modality
    }

    fn emphasis(&self, _stages: &Stages) -> Emphasis {
        Emphasis::Identity
    }
}

/// SCR onsets on the smoothed positive slope, with the Böttcher index
#[derive(Debug, Clone, Copy, Default)]
pub struct EdaStrategy;

impl ModalityStrategy for EdaStrategy {
    fn modality(&self) -> Modality {
        Modality::Eda
    }

    fn emphasis(&self, stages: &Stages) -> Emphasis {
        Emphasis::OnsetSlope {
            window_s: stages.detector.config().emphasis_window_s,
        }
    }

    fn score(&self, stages: &Stages, basis: &Signal, input: &Signal, series: &EventSeries) -> QualityScore {
        let mut quality = stages.scorer.score(basis, series);
        // judged on raw conductance, not the detrended signal
        match stages.scorer.eda_audit(input) {
            Ok(bottcher) => quality.push_audit(bottcher),
            Err(e) => debug!(error = %e, "EDA Böttcher index skipped"),
        }
        quality
    }
}

/// Bursts located on the rectified envelope (EMG, EEG, PCG)
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeStrategy {
    modality: Modality,
}

impl EnvelopeStrategy {
    pub fn new(modality: Modality) -> Self {
        EnvelopeStrategy { modality }
    }
}

impl ModalityStrategy for EnvelopeStrategy {
    fn modality(&self) -> Modality {
        self.modality
    }

    fn emphasis(&self, stages: &Stages) -> Emphasis {
        Emphasis::RectifiedEnvelope {
            window_s: stages.detector.config().emphasis_window_s,
        }
    }
}

/// Strategy registered for `modality`
pub fn strategy_for(modality: Modality) -> Box<dyn ModalityStrategy> {
    match modality {
        Modality::Ecg => Box::new(EcgStrategy),
        Modality::Ppg | Modality::Respiration => Box::new(PeakStrategy::new(modality)),
        Modality::Eda => Box::new(EdaStrategy),
        Modality::Emg | Modality::Eeg | Modality::Pcg => Box::new(EnvelopeStrategy::new(modality)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{ECG_LEVEL3, EDA_BOTTCHER, FSQI, HOS_SQI, KSQI, PSQI};
    use std::f64::consts::PI;

    fn stages(config: &ProcessingConfig) -> Stages {
        Stages::from_config(config, FilterDesigner::new()).unwrap()
    }

    #[test]
    fn test_strategy_selection() {
        for modality in Modality::ALL {
            assert_eq!(strategy_for(modality).modality(), modality);
        }
    }

    #[test]
    fn test_emphasis_per_modality() {
        let ecg = stages(&ProcessingConfig::ecg());
        assert!(matches!(
            strategy_for(Modality::Ecg).emphasis(&ecg),
            Emphasis::EnergyEnvelope { window_s } if window_s == 0.08
        ));

        let ppg = stages(&ProcessingConfig::ppg());
        assert_eq!(strategy_for(Modality::Ppg).emphasis(&ppg), Emphasis::Identity);

        let eda = stages(&ProcessingConfig::eda());
        assert!(matches!(strategy_for(Modality::Eda).emphasis(&eda), Emphasis::OnsetSlope { .. }));

        let emg = stages(&ProcessingConfig::emg());
        assert!(matches!(
            strategy_for(Modality::Emg).emphasis(&emg),
            Emphasis::RectifiedEnvelope { .. }
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ProcessingConfig::ecg();
        config.detector.threshold_coefficient = 1.5;
        assert!(Stages::from_config(&config, FilterDesigner::new()).is_err());
    }

    #[test]
    fn test_refinement_basis_follows_phase() {
        let config = ProcessingConfig::ecg();
        let stages = stages(&config);
        let strategy = strategy_for(Modality::Ecg);

        let input = Signal::new((0..2000).map(|i| (i as f64 * 0.01).sin()).collect(), 500.0).unwrap();
        let conditioned = input.derive(vec![1.0; 2000]).unwrap();
        let emphasized = input.derive(vec![2.0; 2000]).unwrap();
        let signals = StageSignals {
            input: &input,
            conditioned: &conditioned,
            emphasized: &emphasized,
        };

        let zero_phase = strategy.design(&stages, &config.conditioning, 500.0).unwrap();
        let basis = strategy.refinement_basis(&stages, &signals, &zero_phase).unwrap();
        assert_eq!(basis.samples(), conditioned.samples());

        let causal = zero_phase.with_zero_phase(false);
        let basis = strategy.refinement_basis(&stages, &signals, &causal).unwrap();
        assert_eq!(basis.samples(), input.samples());

        // envelope strategies refine on the detection input
        let emg_config = ProcessingConfig::emg();
        let emg_stages = Stages::from_config(&emg_config, FilterDesigner::new()).unwrap();
        let basis = strategy_for(Modality::Emg)
            .refinement_basis(&emg_stages, &signals, &zero_phase)
            .unwrap();
        assert_eq!(basis.samples(), emphasized.samples());
    }

    fn ecg_fixture() -> (Signal, EventSeries) {
        let fs = 500.0;
        let centers: Vec<usize> = (0..8).map(|k| 200 + 400 * k).collect();
        let samples: Vec<f64> = (0..3500)
            .map(|i| {
                centers
                    .iter()
                    .map(|&c| {
                        let d = (i as f64 - c as f64) / 5.0;
                        (-0.5 * d * d).exp()
                    })
                    .sum::<f64>()
                    + 0.01 * (2.0 * PI * 7.0 * i as f64 / fs).sin()
            })
            .collect();
        let signal = Signal::new(samples, fs).unwrap();
        let events = centers
            .iter()
            .map(|&c| bsp_core::Event::new(c, bsp_core::EventKind::RPeak, 0.8, 1.0))
            .collect();
        let series = EventSeries::new(events, fs, 125, 3500).unwrap();
        (signal, series)
    }

    #[test]
    fn test_ecg_score_carries_audits() {
        let config = ProcessingConfig::ecg();
        let stages = stages(&config);
        let (signal, series) = ecg_fixture();
        let fs = signal.sampling_rate();

        let quality = EcgStrategy.score(&stages, &signal, &signal, &series);
        assert_eq!(quality.component(ECG_LEVEL3).unwrap().raw, 1.0);
        assert_eq!(quality.component(HOS_SQI).unwrap().weight, 0.0);
        for name in [KSQI, PSQI, FSQI] {
            assert_eq!(quality.component(name).unwrap().weight, 0.0, "{}", name);
        }
        assert!(quality.component(KSQI).unwrap().raw > 3.0);
        let fsqi = quality.component(FSQI).unwrap().raw;
        assert!(fsqi > 0.0 && fsqi < 1.0);

        // under 5 s the level-3 index is left out
        let short = signal.derive(signal.samples()[..2000].to_vec()).unwrap();
        let short_series = EventSeries::new(
            series.iter().filter(|e| e.index < 2000).cloned().collect(),
            fs,
            125,
            2000,
        )
        .unwrap();
        let quality = EcgStrategy.score(&stages, &short, &short, &short_series);
        assert!(quality.component(ECG_LEVEL3).is_none());
    }

    #[test]
    fn test_ecg_saturation_judged_on_raw_input() {
        let mut config = ProcessingConfig::ecg();
        config.quality.adc_bits = Some(10);
        let stages = stages(&config);
        let (basis, series) = ecg_fixture();

        // baseline clips at 0 and R peaks at 1023 on a 10-bit converter
        let clipped = basis
            .derive(basis.samples().iter().map(|v| (1500.0 * v - 200.0).clamp(0.0, 1023.0)).collect())
            .unwrap();
        let quality = EcgStrategy.score(&stages, &basis, &clipped, &series);
        assert_eq!(quality.component(ECG_LEVEL3).unwrap().raw, 0.0);

        let quality = EcgStrategy.score(&stages, &basis, &basis, &series);
        assert_eq!(quality.component(ECG_LEVEL3).unwrap().raw, 1.0);
    }

    #[test]
    fn test_eda_score_uses_raw_conductance() {
        let config = ProcessingConfig::eda();
        let stages = stages(&config);
        let raw = Signal::new(vec![3.0; 1000], 50.0).unwrap();
        let basis = raw.derive(vec![0.0; 1000]).unwrap();
        let series = EventSeries::empty(50.0, 50, 1000).unwrap();

        let quality = EdaStrategy.score(&stages, &basis, &raw, &series);
        assert_eq!(quality.component(EDA_BOTTCHER).unwrap().raw, 1.0);
    }
}
