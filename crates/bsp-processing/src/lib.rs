//! BSP-Processing: event detection and feature derivation for biosignals
//!
//! Filter design and conditioning, adaptive-threshold event detection,
//! event refinement, interval features and quality scoring, tied together
//! by per-modality strategies and a [`Pipeline`].

pub mod config;
pub mod detector;
pub mod dsp;
pub mod features;
pub mod filters;
pub mod pipeline;
pub mod processor;
pub mod quality;
pub mod refiner;

pub use config::{
    BaselineMethod, BaselinePlacement, BaselineRemoval, ConditioningConfig, DetectorConfig, FeatureConfig,
    FilterRequest, FrequencyBand, Polarity, ProcessingConfig, QualityConfig, RefinerConfig, RefractoryPeriod,
};
pub use detector::{DetectorState, Emphasis, EventDetector};
pub use features::FeatureExtractor;
pub use filters::{Biquad, Cutoff, FilterDesigner, FilterFamily, FilterSpec, SignalConditioner};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineReport, PipelineResult};
pub use processor::{strategy_for, ModalityStrategy, Stages};
pub use quality::QualityScorer;
pub use refiner::{EventRefiner, MergeRecord, OutlierRecord, Refinement, RefinementReport};
