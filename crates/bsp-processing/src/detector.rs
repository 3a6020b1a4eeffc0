//! Adaptive-threshold event detection
//!
//! The detector scans a conditioned (and optionally emphasized) signal once,
//! left to right. Two running averages, one of accepted event peaks and one
//! of sub-threshold noise peaks, set the detection threshold. When an event
//! is overdue relative to the recent inter-event intervals, the buffered
//! noise peaks of the current gap are re-examined against a lowered
//! threshold.
//!
//! The running averages are learned from the first window that carries any
//! energy, so leading silence does not matter. When nothing is accepted for
//! two learning windows (or twice the overdue span, whichever is longer) the
//! averages are re-learned from the most recent window. A single transient
//! can therefore not hold the threshold above every later event.

use crate::config::DetectorConfig;
use crate::dsp;
use bsp_core::{BspResult, Event, EventSeries, Signal};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Samples below this fraction of the signal maximum count as silence
const ONSET_FRACTION: f64 = 1e-3;

/// Scan state of the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Below threshold, waiting for a rising crossing
    Searching,
    /// Above threshold; tracking the excursion's maximum
    Candidate { start: usize, peak: usize },
    /// Ignoring excursions until `until`
    Refractory { until: usize },
    /// Re-examining the current gap with a lowered threshold
    SearchBack,
}

/// Transform applied to the conditioned signal before detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Emphasis {
    /// Detect on the conditioned signal itself
    Identity,
    /// Root of the locally averaged squared slope
    EnergyEnvelope { window_s: f64 },
    /// Locally averaged magnitude
    RectifiedEnvelope { window_s: f64 },
    /// Positive part of the smoothed slope
    OnsetSlope { window_s: f64 },
}

impl Emphasis {
    pub fn apply(&self, signal: &Signal) -> BspResult<Signal> {
        let window = |s: f64| signal.seconds_to_samples(s).max(1);
        let samples = signal.samples();

        let emphasized = match *self {
            Emphasis::Identity => return Ok(signal.clone()),
            Emphasis::EnergyEnvelope { window_s } => {
                let energy: Vec<f64> = dsp::first_difference(samples).iter().map(|d| d * d).collect();
                dsp::moving_average(&energy, window(window_s))
                    .into_iter()
                    .map(|e| e.max(0.0).sqrt())
                    .collect()
            }
            Emphasis::RectifiedEnvelope { window_s } => {
                let rectified: Vec<f64> = samples.iter().map(|x| x.abs()).collect();
                dsp::moving_average(&rectified, window(window_s))
            }
            Emphasis::OnsetSlope { window_s } => {
                let slope = dsp::first_difference(samples);
                dsp::moving_average(&slope, window(window_s))
                    .into_iter()
                    .map(|d| d.max(0.0))
                    .collect()
            }
        };

        signal.derive(emphasized)
    }
}

/// Adaptive-threshold event detector with search-back
#[derive(Debug, Clone)]
pub struct EventDetector {
    config: DetectorConfig,
}

impl EventDetector {
    /// Create new detector; fails on out-of-range settings
    pub fn new(config: DetectorConfig) -> BspResult<Self> {
        config.validate()?;
        Ok(EventDetector { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect events. A signal without events yields an empty series; use
    /// [`EventSeries::require_events`] to escalate that case.
    pub fn detect(&self, signal: &Signal) -> BspResult<EventSeries> {
        let fs = signal.sampling_rate();
        let refractory = self.config.refractory.to_samples(fs)?;
        let n = signal.len();

        let oriented: Vec<f64> = signal
            .samples()
            .iter()
            .map(|&v| self.config.polarity.orient(v))
            .collect();

        let peak = oriented.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let onset = oriented.iter().position(|&v| v > ONSET_FRACTION * peak);
        let Some(start) = onset.filter(|_| peak > 0.0) else {
            debug!(samples = n, "no signal energy to detect events in");
            return EventSeries::empty(fs, refractory, n);
        };

        let learning = signal.seconds_to_samples(self.config.learning_window_s).max(1);
        let window = &oriented[start..(start + learning).min(n)];
        let mut scan = Scan::seed(&self.config, window, refractory, learning, start);

        for i in start.max(1)..n {
            if scan.state == DetectorState::Searching && scan.stalled(i) {
                scan.reseed(i, &oriented, signal.samples());
            }

            if scan.state == DetectorState::Searching && scan.overdue(i) {
                scan.state = DetectorState::SearchBack;
                scan.search_back(i, signal.samples());
            }

            if let DetectorState::Refractory { until } = scan.state {
                if i < until {
                    continue;
                }
                scan.state = DetectorState::Searching;
            }

            match scan.state {
                DetectorState::Searching => {
                    let (prev, cur) = (oriented[i - 1], oriented[i]);
                    if cur > scan.threshold && prev <= scan.threshold {
                        scan.state = DetectorState::Candidate { start: i, peak: i };
                    } else if i + 1 < n && cur > prev && cur >= oriented[i + 1] && cur > 0.0 {
                        scan.record_noise_peak(i, cur);
                    }
                }
                DetectorState::Candidate { start, peak } => {
                    if oriented[i] > scan.threshold {
                        if oriented[i] > oriented[peak] {
                            scan.state = DetectorState::Candidate { start, peak: i };
                        }
                    } else {
                        let threshold = scan.threshold;
                        scan.commit(peak, oriented[peak], signal.samples()[peak], threshold, false);
                    }
                }
                DetectorState::Refractory { .. } | DetectorState::SearchBack => {}
            }
        }

        if let DetectorState::Candidate { start, .. } = scan.state {
            trace!(start, "discarding excursion still open at end of signal");
        }

        let recovered = scan.events.iter().filter(|e| e.flags.search_back).count();
        debug!(
            events = scan.events.len(),
            recovered,
            threshold = scan.threshold,
            samples = n,
            "event detection complete"
        );

        EventSeries::new(scan.events, fs, refractory, n)
    }
}

/// Mutable state of one detection pass
struct Scan<'a> {
    config: &'a DetectorConfig,
    refractory: usize,
    learning: usize,
    /// Sample of the last accepted event or (re)learned window
    anchor: usize,
    state: DetectorState,
    signal_peak: f64,
    noise_peak: f64,
    threshold: f64,
    last_event: Option<usize>,
    intervals: VecDeque<usize>,
    /// Sub-threshold peaks since the last event, for search-back
    buffered: Vec<(usize, f64)>,
    /// Last event whose gap has already been searched back
    searched_gap: Option<usize>,
    events: Vec<Event>,
}

impl<'a> Scan<'a> {
    /// Initialise running averages from the first window with energy
    fn seed(config: &'a DetectorConfig, window: &[f64], refractory: usize, learning: usize, start: usize) -> Self {
        let signal_peak = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let noise_peak = dsp::mean(&window.iter().map(|v| v.abs()).collect::<Vec<_>>()).unwrap_or(0.0);

        let mut scan = Scan {
            config,
            refractory,
            learning,
            anchor: start,
            state: DetectorState::Searching,
            signal_peak,
            noise_peak,
            threshold: 0.0,
            last_event: None,
            intervals: VecDeque::with_capacity(config.interval_history),
            buffered: Vec::new(),
            searched_gap: None,
            events: Vec::new(),
        };
        scan.update_threshold();
        scan
    }

    fn update_threshold(&mut self) {
        self.threshold =
            self.noise_peak + self.config.threshold_coefficient * (self.signal_peak - self.noise_peak);
    }

    fn record_noise_peak(&mut self, index: usize, value: f64) {
        let w = self.config.peak_smoothing;
        self.noise_peak = w * value + (1.0 - w) * self.noise_peak;
        self.update_threshold();
        self.buffered.push((index, value));
    }

    fn mean_interval(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            return None;
        }
        Some(self.intervals.iter().sum::<usize>() as f64 / self.intervals.len() as f64)
    }

    fn overdue(&self, now: usize) -> bool {
        let Some(last) = self.last_event else {
            return false;
        };
        if self.searched_gap == Some(last) {
            return false;
        }
        self.mean_interval()
            .is_some_and(|mean| (now - last) as f64 > self.config.search_back_multiplier * mean)
    }

    fn stalled(&self, now: usize) -> bool {
        let span = match self.mean_interval() {
            Some(mean) => (2.0 * self.config.search_back_multiplier * mean).max(2.0 * self.learning as f64),
            None => 2.0 * self.learning as f64,
        };
        (now - self.anchor) as f64 > span
    }

    /// Re-learn both running peaks from the window before `now`, then accept
    /// the buffered peaks of the stalled stretch that clear the new threshold
    fn reseed(&mut self, now: usize, oriented: &[f64], raw: &[f64]) {
        let guard = self.last_event.map_or(self.anchor, |last| last + self.refractory);
        let lo = guard.max(now.saturating_sub(self.learning));
        self.anchor = now;
        if lo >= now {
            return;
        }

        let window = &oriented[lo..now];
        let peak = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !(peak > 0.0) {
            return;
        }
        self.signal_peak = peak;
        self.noise_peak = dsp::mean(&window.iter().map(|v| v.abs()).collect::<Vec<_>>()).unwrap_or(0.0);
        self.update_threshold();

        let threshold = self.threshold;
        let mut pending = std::mem::take(&mut self.buffered);
        pending.sort_by_key(|&(index, _)| index);

        let mut rest = Vec::new();
        let mut recovered = 0;
        for (index, value) in pending {
            let clear = self.last_event.map_or(true, |last| index >= last + self.refractory);
            if clear && index < now && value > threshold {
                self.commit(index, value, raw[index], threshold, true);
                recovered += 1;
            } else {
                rest.push((index, value));
            }
        }
        if let Some(last) = self.last_event {
            rest.retain(|&(index, _)| index >= last + self.refractory);
        }
        self.buffered = rest;
        self.anchor = now;

        debug!(at = now, threshold, recovered, "detector threshold re-learned");
        if let DetectorState::Refractory { until } = self.state {
            if now >= until {
                self.state = DetectorState::Searching;
            }
        }
    }

    fn search_back(&mut self, now: usize, raw: &[f64]) {
        let Some(last) = self.last_event else {
            self.state = DetectorState::Searching;
            return;
        };
        self.searched_gap = Some(last);

        let lowered = self.threshold * self.config.search_back_fraction;
        let earliest = last + self.refractory;
        let best = self
            .buffered
            .iter()
            .filter(|(idx, v)| *idx >= earliest && *idx < now && *v > lowered)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .copied();

        match best {
            Some((index, value)) => {
                trace!(index, value, lowered, "search-back recovered event");
                self.commit(index, value, raw[index], lowered, true);
                if let DetectorState::Refractory { until } = self.state {
                    if now >= until {
                        self.state = DetectorState::Searching;
                    }
                }
            }
            None => self.state = DetectorState::Searching,
        }
    }

    fn commit(&mut self, index: usize, value: f64, amplitude: f64, threshold: f64, recovered: bool) {
        let confidence = if value.abs() > 0.0 {
            (value - threshold) / value.abs()
        } else {
            0.0
        };

        let mut event = Event::new(index, self.config.event_kind.clone(), confidence, amplitude);
        event.flags.search_back = recovered;
        self.events.push(event);

        let w = if recovered {
            self.config.search_back_smoothing
        } else {
            self.config.peak_smoothing
        };
        self.signal_peak = w * value + (1.0 - w) * self.signal_peak;
        self.update_threshold();

        if let Some(last) = self.last_event {
            if self.intervals.len() == self.config.interval_history {
                self.intervals.pop_front();
            }
            self.intervals.push_back(index - last);
        }
        self.last_event = Some(index);
        self.anchor = index;

        let until = index + self.refractory;
        self.buffered.retain(|(idx, _)| *idx >= until);
        self.state = DetectorState::Refractory { until };
    }
}
