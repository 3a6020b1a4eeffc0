//! Detected physiological events and ordered event series

use crate::error::{BspError, BspResult};
use crate::modality::EventKind;
use serde::{Deserialize, Serialize};

/// Annotations attached to an event by detection and refinement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFlags {
    /// Recovered by the lowered search-back threshold
    pub search_back: bool,
    /// Survivor of a refractory merge
    pub merged: bool,
    /// Preceding interval deviates from its neighbourhood
    pub interval_outlier: bool,
}

impl EventFlags {
    /// Whether refinement marked this event as doubtful
    pub fn is_suspect(&self) -> bool {
        self.merged || self.interval_outlier
    }
}

/// Single physiological event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sample index into the signal the event was found in
    pub index: usize,
    /// Event type tag
    pub kind: EventKind,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    /// Amplitude at `index` in the signal the event was located on
    pub amplitude: f64,
    pub flags: EventFlags,
}

impl Event {
    /// Create a new event, clamping confidence into [0, 1]
    pub fn new(index: usize, kind: EventKind, confidence: f64, amplitude: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Event {
            index,
            kind,
            confidence,
            amplitude,
            flags: EventFlags::default(),
        }
    }
}

/// Events ordered by strictly increasing index.
///
/// Construction checks that indices increase strictly, that consecutive
/// events are at least `refractory_samples` apart and that every index lies
/// inside the source signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEventSeries")]
pub struct EventSeries {
    events: Vec<Event>,
    sampling_rate: f64,
    refractory_samples: usize,
    signal_len: usize,
}

/// Unchecked wire form; deserialization goes through [`EventSeries::new`]
#[derive(Deserialize)]
struct RawEventSeries {
    events: Vec<Event>,
    sampling_rate: f64,
    refractory_samples: usize,
    signal_len: usize,
}

impl TryFrom<RawEventSeries> for EventSeries {
    type Error = BspError;

    fn try_from(raw: RawEventSeries) -> BspResult<Self> {
        EventSeries::new(raw.events, raw.sampling_rate, raw.refractory_samples, raw.signal_len)
    }
}

impl EventSeries {
    /// Build a validated series
    pub fn new(
        events: Vec<Event>,
        sampling_rate: f64,
        refractory_samples: usize,
        signal_len: usize,
    ) -> BspResult<Self> {
        crate::signal::validate_sampling_rate(sampling_rate)?;

        if let Some(event) = events.iter().find(|e| e.index >= signal_len) {
            return Err(BspError::InvalidEventSeries {
                reason: format!(
                    "event index {} outside signal of {} samples",
                    event.index, signal_len
                ),
            });
        }

        for pair in events.windows(2) {
            if pair[1].index <= pair[0].index {
                return Err(BspError::InvalidEventSeries {
                    reason: format!(
                        "indices not strictly increasing ({} then {})",
                        pair[0].index, pair[1].index
                    ),
                });
            }
            if pair[1].index - pair[0].index < refractory_samples {
                return Err(BspError::InvalidEventSeries {
                    reason: format!(
                        "events at {} and {} closer than refractory period of {} samples",
                        pair[0].index, pair[1].index, refractory_samples
                    ),
                });
            }
        }

        Ok(EventSeries {
            events,
            sampling_rate,
            refractory_samples,
            signal_len,
        })
    }

    /// Empty series for a signal with no detections
    pub fn empty(sampling_rate: f64, refractory_samples: usize, signal_len: usize) -> BspResult<Self> {
        Self::new(Vec::new(), sampling_rate, refractory_samples, signal_len)
    }

    /// Escalate an empty series into [`BspError::NoEventsDetected`]
    pub fn require_events(self) -> BspResult<Self> {
        if self.events.is_empty() {
            Err(BspError::NoEventsDetected {
                samples: self.signal_len,
            })
        } else {
            Ok(self)
        }
    }

    /// Restartable iterator over the buffered events
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn refractory_samples(&self) -> usize {
        self.refractory_samples
    }

    /// Length of the signal the events index into
    pub fn signal_len(&self) -> usize {
        self.signal_len
    }

    /// Event sample indices
    pub fn indices(&self) -> Vec<usize> {
        self.events.iter().map(|e| e.index).collect()
    }

    /// Inter-event intervals in seconds
    pub fn intervals(&self) -> Vec<f64> {
        self.events
            .windows(2)
            .map(|w| (w[1].index - w[0].index) as f64 / self.sampling_rate)
            .collect()
    }

    /// Mean confidence, or `None` for an empty series
    pub fn mean_confidence(&self) -> Option<f64> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.iter().map(|e| e.confidence).sum::<f64>() / self.events.len() as f64)
        }
    }

    /// Number of events flagged merged or interval-outlier
    pub fn suspect_count(&self) -> usize {
        self.events.iter().filter(|e| e.flags.is_suspect()).count()
    }
}

impl<'a> IntoIterator for &'a EventSeries {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
