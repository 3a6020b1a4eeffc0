//! Event-detection pipeline
//!
//! Runs one modality's strategy over a signal: resample, design, condition,
//! emphasize, detect, refine, extract and score. The pipeline holds only
//! immutable configuration, so one instance can process many signals
//! concurrently.

use crate::config::{FilterRequest, ProcessingConfig, RefractoryPeriod};
use crate::filters::{FilterDesigner, FilterSpec};
use crate::processor::{strategy_for, ModalityStrategy, StageSignals, Stages};
use crate::refiner::RefinementReport;
use bsp_core::{
    BspError, BspResult, Event, EventSeries, FeatureDomain, FeatureVector, Modality, QualityScore, Signal,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Processing pipeline for one modality
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    config: ProcessingConfig,
    strategy: Box<dyn ModalityStrategy>,
    stages: Stages,
}

/// Builder starting from a modality preset
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: Option<String>,
    config: ProcessingConfig,
    designer: FilterDesigner,
}

/// Everything produced for one signal
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub modality: Modality,
    /// Conditioned signal, on the processing time base
    pub conditioned: Signal,
    pub filter: Arc<FilterSpec>,
    /// Detector output before refinement
    pub detected: EventSeries,
    pub events: EventSeries,
    pub refinement: RefinementReport,
    pub features: FeatureVector,
    pub quality: QualityScore,
    /// Reported, non-fatal conditions such as [`BspError::NoEventsDetected`]
    pub conditions: Vec<BspError>,
    pub warnings: Vec<String>,
    pub processing_time_us: u64,
}

/// Serializable summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub modality: Modality,
    pub sampling_rate: f64,
    pub events: Vec<Event>,
    pub features: FeatureVector,
    pub quality: QualityScore,
    pub refinement: RefinementReport,
}

impl Pipeline {
    /// Pipeline with the preset configuration for `modality`
    pub fn for_modality(modality: Modality) -> BspResult<Self> {
        PipelineBuilder::new(modality).build()
    }

    /// Pipeline from an explicit configuration
    pub fn new(config: ProcessingConfig) -> BspResult<Self> {
        PipelineBuilder::from_config(config).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn modality(&self) -> Modality {
        self.strategy.modality()
    }

    /// Primary filter this pipeline applies to signals recorded at `sampling_rate`
    pub fn filter_spec(&self, sampling_rate: f64) -> BspResult<Arc<FilterSpec>> {
        let rate = self.config.conditioning.resample_hz.unwrap_or(sampling_rate);
        self.strategy.design(&self.stages, &self.config.conditioning, rate)
    }

    /// Process one signal
    pub fn process(&self, signal: &Signal) -> BspResult<PipelineResult> {
        let start_time = Instant::now();
        let mut warnings = Vec::new();

        if let Some(tagged) = signal.modality() {
            if tagged != self.modality() {
                warn!(signal = %tagged, pipeline = %self.modality(), "modality mismatch");
                warnings.push(format!(
                    "{} signal processed by the {} pipeline",
                    tagged,
                    self.modality()
                ));
            }
        }

        let input = match self.config.conditioning.resample_hz {
            Some(rate) if signal.is_empty() => signal.derive_with_rate(Vec::new(), rate)?,
            Some(rate) => self.stages.conditioner.resample(signal, rate)?,
            None => signal.clone(),
        };
        let spec = self
            .strategy
            .design(&self.stages, &self.config.conditioning, input.sampling_rate())?;

        if input.is_empty() {
            return self.empty_result(input, spec, warnings, start_time);
        }

        let conditioned = self
            .strategy
            .apply(&self.stages, &input, &spec, &self.config.conditioning)?;
        let emphasized = self.strategy.emphasize(&self.stages, &conditioned)?;
        let detected = self.strategy.detect(&self.stages, &emphasized)?;

        let signals = StageSignals {
            input: &input,
            conditioned: &conditioned,
            emphasized: &emphasized,
        };
        let basis = self.strategy.refinement_basis(&self.stages, &signals, &spec)?;
        let refinement = self.strategy.refine(&self.stages, &basis, &detected, &spec)?;

        let events = refinement.series;
        let features = self.strategy.extract(&self.stages, &events);
        let quality = self.strategy.score(&self.stages, &basis, &input, &events);

        let mut conditions = Vec::new();
        if events.is_empty() {
            conditions.push(BspError::NoEventsDetected { samples: input.len() });
        }

        debug!(
            pipeline = %self.name,
            samples = input.len(),
            detected = detected.len(),
            events = events.len(),
            quality = quality.score,
            undefined_features = features.undefined_names().len(),
            "signal processed"
        );

        Ok(PipelineResult {
            modality: self.modality(),
            conditioned,
            filter: spec,
            detected,
            events,
            refinement: refinement.report,
            features,
            quality,
            conditions,
            warnings,
            processing_time_us: start_time.elapsed().as_micros() as u64,
        })
    }

    /// Process independent signals in parallel; each gets its own detector run
    pub fn process_batch(&self, signals: &[Signal]) -> Vec<BspResult<PipelineResult>> {
        let results: Vec<BspResult<PipelineResult>> = signals.par_iter().map(|s| self.process(s)).collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(pipeline = %self.name, signals = signals.len(), failed, "batch processed");
        results
    }

    /// No samples: nothing to filter, report an empty series
    fn empty_result(
        &self,
        input: Signal,
        spec: Arc<FilterSpec>,
        warnings: Vec<String>,
        start_time: Instant,
    ) -> BspResult<PipelineResult> {
        let refractory = self.stages.detector.config().refractory.to_samples(input.sampling_rate())?;
        let events = EventSeries::empty(input.sampling_rate(), refractory, 0)?;
        let features = self.strategy.extract(&self.stages, &events);
        let quality = self.strategy.score(&self.stages, &input, &input, &events);

        debug!(pipeline = %self.name, "empty signal");
        Ok(PipelineResult {
            modality: self.modality(),
            conditioned: input,
            filter: spec,
            detected: events.clone(),
            events,
            refinement: RefinementReport::default(),
            features,
            quality,
            conditions: vec![BspError::NoEventsDetected { samples: 0 }],
            warnings,
            processing_time_us: start_time.elapsed().as_micros() as u64,
        })
    }
}

impl PipelineBuilder {
    /// Start from the preset for `modality`
    pub fn new(modality: Modality) -> Self {
        Self::from_config(ProcessingConfig::for_modality(modality))
    }

    pub fn from_config(config: ProcessingConfig) -> Self {
        PipelineBuilder {
            name: None,
            config,
            designer: FilterDesigner::new(),
        }
    }

    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    /// Share a designer (and its cache) with other pipelines
    pub fn designer(&mut self, designer: FilterDesigner) -> &mut Self {
        self.designer = designer;
        self
    }

    pub fn filter(&mut self, request: FilterRequest) -> &mut Self {
        self.config.conditioning.filter = request;
        self
    }

    pub fn resample(&mut self, rate: f64) -> &mut Self {
        self.config.conditioning.resample_hz = Some(rate);
        self
    }

    pub fn refractory(&mut self, refractory: RefractoryPeriod) -> &mut Self {
        self.config.detector.refractory = refractory;
        self
    }

    pub fn search_back_multiplier(&mut self, multiplier: f64) -> &mut Self {
        self.config.detector.search_back_multiplier = multiplier;
        self
    }

    pub fn domains(&mut self, domains: &[FeatureDomain]) -> &mut Self {
        self.config.features.domains = domains.to_vec();
        self
    }

    /// Validate the configuration and build every stage
    pub fn build(&self) -> BspResult<Pipeline> {
        let stages = Stages::from_config(&self.config, self.designer.clone())?;
        let strategy = strategy_for(self.config.modality);
        let name = self.name.clone().unwrap_or_else(|| self.config.name.clone());

        debug!(pipeline = %name, modality = %self.config.modality, "pipeline built");
        Ok(Pipeline {
            name,
            config: self.config.clone(),
            strategy,
            stages,
        })
    }
}

impl PipelineResult {
    pub fn report(&self) -> PipelineReport {
        PipelineReport {
            modality: self.modality,
            sampling_rate: self.events.sampling_rate(),
            events: self.events.events().to_vec(),
            features: self.features.clone(),
            quality: self.quality.clone(),
            refinement: self.refinement.clone(),
        }
    }
}

impl PipelineReport {
    pub fn to_json(&self) -> BspResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BspError::SerializationError {
            message: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> BspResult<Self> {
        serde_json::from_str(json).map_err(|e| BspError::SerializationError {
            message: e.to_string(),
        })
    }
}
