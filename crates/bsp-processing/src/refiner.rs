//! Event refinement: delay correction, refractory merging, interval outliers

use crate::config::RefinerConfig;
use crate::dsp;
use crate::filters::FilterSpec;
use bsp_core::{BspError, BspResult, Event, EventSeries, Signal};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Two events closer than the refractory period were merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub kept: usize,
    pub dropped: usize,
    /// Distance between the two in samples
    pub distance: usize,
    pub refractory_samples: usize,
}

/// An event whose preceding interval deviates from its neighbourhood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierRecord {
    pub index: usize,
    pub interval_s: f64,
    pub local_mean_s: f64,
    pub local_std_s: f64,
}

/// Audit trail of one refinement pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinementReport {
    /// Delay removed from every index, in samples
    pub delay_samples: i64,
    /// Events whose index changed
    pub relocated: usize,
    pub merges: Vec<MergeRecord>,
    pub outliers: Vec<OutlierRecord>,
}

/// Refined series plus its report
#[derive(Debug, Clone)]
pub struct Refinement {
    pub series: EventSeries,
    pub report: RefinementReport,
}

#[derive(Debug, Clone)]
pub struct EventRefiner {
    config: RefinerConfig,
}

impl EventRefiner {
    pub fn new(config: RefinerConfig) -> BspResult<Self> {
        config.validate()?;
        Ok(EventRefiner { config })
    }

    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Refine `series`, discarding the report
    pub fn refine(&self, signal: &Signal, series: &EventSeries, spec: &FilterSpec) -> BspResult<EventSeries> {
        self.refine_with_report(signal, series, spec).map(|r| r.series)
    }

    /// Refine `series` against `signal`, which must share its time base with
    /// the signal the filter in `spec` was applied to before detection.
    pub fn refine_with_report(
        &self,
        signal: &Signal,
        series: &EventSeries,
        spec: &FilterSpec,
    ) -> BspResult<Refinement> {
        if signal.len() != series.signal_len() {
            return Err(BspError::InvalidEventSeries {
                reason: format!(
                    "series indexes {} samples, refinement signal has {}",
                    series.signal_len(),
                    signal.len()
                ),
            });
        }
        if (signal.sampling_rate() - series.sampling_rate()).abs() > f64::EPSILON * signal.sampling_rate() {
            return Err(BspError::InvalidEventSeries {
                reason: format!(
                    "series at {}Hz, refinement signal at {}Hz",
                    series.sampling_rate(),
                    signal.sampling_rate()
                ),
            });
        }

        let refractory = series.refractory_samples();
        let delay = spec.delay_samples().round() as i64;
        let mut report = RefinementReport {
            delay_samples: delay,
            ..RefinementReport::default()
        };

        let mut located: Vec<Event> = series
            .iter()
            .map(|event| {
                let moved = self.locate(signal, event, delay);
                if moved.index != event.index {
                    report.relocated += 1;
                }
                moved
            })
            .collect();
        located.sort_by_key(|e| e.index);

        let mut events = merge_close(located, refractory, &mut report.merges);
        self.flag_outliers(&mut events, signal.sampling_rate(), &mut report.outliers);

        debug!(
            events = events.len(),
            delay,
            relocated = report.relocated,
            merges = report.merges.len(),
            outliers = report.outliers.len(),
            "event refinement complete"
        );
        if !report.merges.is_empty() {
            warn!(merges = report.merges.len(), "events merged under the refractory rule");
        }

        let series = EventSeries::new(events, signal.sampling_rate(), refractory, signal.len())?;
        Ok(Refinement { series, report })
    }

    /// Delay-correct `event` and move it to the extremum within the correction window
    fn locate(&self, signal: &Signal, event: &Event, delay: i64) -> Event {
        let samples = signal.samples();
        let last = samples.len() as i64 - 1;
        let target = (event.index as i64 - delay).clamp(0, last);
        let half = signal.seconds_to_samples(self.config.correction_window_s) as i64;
        let lo = (target - half).max(0) as usize;
        let hi = (target + half).min(last) as usize;

        let polarity = self.config.polarity;
        let mut best = target as usize;
        for j in lo..=hi {
            let candidate = polarity.orient(samples[j]);
            let current = polarity.orient(samples[best]);
            let closer = (j as i64 - target).abs() < (best as i64 - target).abs();
            if candidate > current || (candidate == current && closer) {
                best = j;
            }
        }

        Event {
            index: best,
            amplitude: samples[best],
            ..event.clone()
        }
    }

    fn flag_outliers(&self, events: &mut [Event], sampling_rate: f64, records: &mut Vec<OutlierRecord>) {
        let intervals: Vec<f64> = events
            .windows(2)
            .map(|w| (w[1].index - w[0].index) as f64 / sampling_rate)
            .collect();
        let span = self.config.outlier_neighbourhood;

        for (k, &interval) in intervals.iter().enumerate() {
            let neighbours: Vec<f64> = intervals[k.saturating_sub(span)..(k + span + 1).min(intervals.len())]
                .iter()
                .enumerate()
                .filter(|(j, _)| j + k.saturating_sub(span) != k)
                .map(|(_, v)| *v)
                .collect();
            if neighbours.len() < 2 {
                continue;
            }

            let (Some(mean), Some(std)) = (dsp::mean(&neighbours), dsp::std_dev(&neighbours, 1)) else {
                continue;
            };
            let spread = std.max(self.config.min_std_fraction * mean);
            if (interval - mean).abs() > self.config.outlier_multiplier * spread {
                let event = &mut events[k + 1];
                event.flags.interval_outlier = true;
                records.push(OutlierRecord {
                    index: event.index,
                    interval_s: interval,
                    local_mean_s: mean,
                    local_std_s: std,
                });
            }
        }
    }
}

/// Collapse events closer than `refractory`, keeping the more confident one
fn merge_close(events: Vec<Event>, refractory: usize, records: &mut Vec<MergeRecord>) -> Vec<Event> {
    let mut merged: Vec<Event> = Vec::with_capacity(events.len());

    for event in events {
        let Some(previous) = merged.last_mut() else {
            merged.push(event);
            continue;
        };

        let distance = event.index - previous.index;
        if distance >= refractory {
            merged.push(event);
            continue;
        }

        let (kept, dropped) = if event.confidence > previous.confidence {
            let dropped = previous.index;
            let flags = previous.flags;
            *previous = event;
            previous.flags.search_back |= flags.search_back;
            (previous.index, dropped)
        } else {
            (previous.index, event.index)
        };
        previous.flags.merged = true;
        records.push(MergeRecord {
            kept,
            dropped,
            distance,
            refractory_samples: refractory,
        });
    }

    merged
}
