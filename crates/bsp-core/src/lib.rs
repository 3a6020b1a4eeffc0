//! BSP-Core: Foundation types for physiological event analysis
//!
//! Signals, events, feature vectors and quality scores shared by the
//! processing crate and its collaborators.

pub mod error;
pub mod event;
pub mod features;
pub mod modality;
pub mod quality;
pub mod signal;

pub use error::{BspError, BspResult};
pub use event::{Event, EventFlags, EventSeries};
pub use features::{FeatureDomain, FeatureMetadata, FeatureValue, FeatureVector, UndefinedFeature};
pub use modality::{EventKind, Modality};
pub use quality::{QualityComponent, QualityLabel, QualityScore};
pub use signal::{validate_sampling_rate, Signal, SignalStats};
