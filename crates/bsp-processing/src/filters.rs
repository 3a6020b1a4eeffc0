//! Digital filters for biosignal processing
//!
//! [`FilterDesigner`] turns a filter request into a [`FilterSpec`] made of
//! second-order sections; [`SignalConditioner`] applies a spec to a
//! [`Signal`] and hosts the baseline-removal and resampling steps.

use crate::config::{BaselineMethod, BaselinePlacement, BaselineRemoval, ConditioningConfig, FilterRequest};
use crate::dsp;
use bsp_core::{filter_error, BspError, BspResult, Signal};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Highest Butterworth order accepted by the designer
pub const MAX_ORDER: usize = 16;

/// Filter families supported by the framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterFamily {
    /// Butterworth lowpass filter
    Lowpass,
    /// Butterworth highpass filter
    Highpass,
    /// Butterworth bandpass filter
    Bandpass,
    /// Butterworth bandstop filter
    Bandstop,
    /// Notch filter for powerline interference
    Notch,
}

impl FilterFamily {
    fn is_band(&self) -> bool {
        matches!(self, FilterFamily::Bandpass | FilterFamily::Bandstop)
    }
}

/// Cutoff frequency or band edges in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cutoff {
    Single(f64),
    Band(f64, f64),
}

impl Cutoff {
    fn edges(&self) -> Vec<f64> {
        match *self {
            Cutoff::Single(f) => vec![f],
            Cutoff::Band(low, high) => vec![low, high],
        }
    }
}

/// Normalized biquad: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    /// Complex response at normalized angular frequency `omega` (rad/sample)
    pub fn response(&self, omega: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        num / den
    }

    /// Group delay in samples at `omega`
    pub fn group_delay(&self, omega: f64) -> f64 {
        fn poly_delay(c: [f64; 3], omega: f64) -> f64 {
            let z1 = Complex64::from_polar(1.0, -omega);
            let z2 = z1 * z1;
            let p = c[0] + z1 * c[1] + z2 * c[2];
            if p.norm() < 1e-12 {
                return 0.0;
            }
            let dp = z1 * c[1] + z2 * (2.0 * c[2]);
            (dp / p).re
        }
        poly_delay([self.b0, self.b1, self.b2], omega) - poly_delay([1.0, self.a1, self.a2], omega)
    }

    /// Gain for a constant input
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Internal state that a constant unit input would settle to
    fn steady_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        [g - self.b0, self.b2 - self.a2 * g]
    }

    fn scaled(self, gain: f64) -> Self {
        Biquad {
            b0: self.b0 * gain,
            b1: self.b1 * gain,
            b2: self.b2 * gain,
            ..self
        }
    }
}

/// Single biquad section with transposed direct form II state
#[derive(Debug, Clone)]
struct BiquadSection {
    coeffs: Biquad,
    z1: f64,
    z2: f64,
}

impl BiquadSection {
    fn new(coeffs: Biquad) -> Self {
        Self { coeffs, z1: 0.0, z2: 0.0 }
    }

    fn process_sample(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }

    /// Preload the state for a constant input of `level`
    fn settle(&mut self, level: f64) {
        let [z1, z2] = self.coeffs.steady_state();
        self.z1 = z1 * level;
        self.z2 = z2 * level;
    }
}

/// Designed filter: family, parameters and second-order sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    family: FilterFamily,
    order: usize,
    cutoff: Cutoff,
    sampling_rate: f64,
    zero_phase: bool,
    q_factor: Option<f64>,
    sections: Vec<Biquad>,
}

impl FilterSpec {
    pub fn family(&self) -> FilterFamily {
        self.family
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn cutoff(&self) -> Cutoff {
        self.cutoff
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn zero_phase(&self) -> bool {
        self.zero_phase
    }

    pub fn q_factor(&self) -> Option<f64> {
        self.q_factor
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Copy of this spec with a different zero-phase flag
    pub fn with_zero_phase(&self, zero_phase: bool) -> Self {
        FilterSpec {
            zero_phase,
            ..self.clone()
        }
    }

    /// Reflective padding used by forward-backward filtering
    pub fn padlen(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Minimum signal length [`SignalConditioner::apply`] accepts for this spec
    pub fn min_signal_len(&self) -> usize {
        if self.zero_phase {
            self.padlen() + 1
        } else {
            1
        }
    }

    fn omega(&self, freq: f64) -> f64 {
        2.0 * PI * freq / self.sampling_rate
    }

    /// Complex single-pass response at `freq` Hz
    pub fn response_at(&self, freq: f64) -> Complex64 {
        let omega = self.omega(freq);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(omega))
    }

    /// Magnitude of the applied filter at `freq` Hz; squared for zero-phase
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        let single = self.response_at(freq).norm();
        if self.zero_phase {
            single * single
        } else {
            single
        }
    }

    /// Single-pass group delay at `freq` Hz, in samples
    pub fn group_delay_at(&self, freq: f64) -> f64 {
        let omega = self.omega(freq);
        self.sections.iter().map(|s| s.group_delay(omega)).sum()
    }

    /// Frequency at which the passband delay is evaluated
    pub fn reference_frequency(&self) -> f64 {
        match (self.family, self.cutoff) {
            (FilterFamily::Highpass, _) => self.sampling_rate / 2.0,
            (FilterFamily::Bandpass, Cutoff::Band(low, high)) => {
                let fs2 = 2.0 * self.sampling_rate;
                let w0 = (prewarp(low, self.sampling_rate) * prewarp(high, self.sampling_rate)).sqrt();
                self.sampling_rate * (w0 / fs2).atan() / PI
            }
            _ => 0.0,
        }
    }

    /// Net delay in samples that applying this spec adds to a passband event
    pub fn delay_samples(&self) -> f64 {
        if self.zero_phase {
            0.0
        } else {
            self.group_delay_at(self.reference_frequency())
        }
    }
}

/// Analog frequency after bilinear prewarping
fn prewarp(freq: f64, sampling_rate: f64) -> f64 {
    2.0 * sampling_rate * (PI * freq / sampling_rate).tan()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DesignKey {
    family: FilterFamily,
    order: usize,
    edges: [u64; 2],
    sampling_rate: u64,
    q_factor: u64,
    zero_phase: bool,
}

/// Filter designer with a memo of previously designed specs.
///
/// Clones share the memo.
#[derive(Debug, Clone, Default)]
pub struct FilterDesigner {
    cache: Arc<Mutex<HashMap<DesignKey, Arc<FilterSpec>>>>,
}

impl FilterDesigner {
    /// Create new designer with an empty memo
    pub fn new() -> Self {
        Self::default()
    }

    /// Design a zero-phase filter
    pub fn design(
        &self,
        family: FilterFamily,
        order: usize,
        cutoff: Cutoff,
        sampling_rate: f64,
    ) -> BspResult<Arc<FilterSpec>> {
        self.design_inner(family, order, cutoff, sampling_rate, None, true)
    }

    /// Design a notch filter at `freq` with quality factor `q_factor`
    pub fn design_notch(&self, freq: f64, q_factor: f64, sampling_rate: f64) -> BspResult<Arc<FilterSpec>> {
        self.design_inner(FilterFamily::Notch, 2, Cutoff::Single(freq), sampling_rate, Some(q_factor), true)
    }

    /// Design the filter a configuration asks for
    pub fn design_request(&self, request: &FilterRequest, sampling_rate: f64) -> BspResult<Arc<FilterSpec>> {
        self.design_inner(
            request.family,
            request.order,
            request.cutoff,
            sampling_rate,
            request.q_factor,
            request.zero_phase,
        )
    }

    /// Number of memoized designs
    pub fn cached_designs(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn design_inner(
        &self,
        family: FilterFamily,
        order: usize,
        cutoff: Cutoff,
        sampling_rate: f64,
        q_factor: Option<f64>,
        zero_phase: bool,
    ) -> BspResult<Arc<FilterSpec>> {
        validate_design(family, order, cutoff, sampling_rate, q_factor)?;

        let edges = cutoff.edges();
        let key = DesignKey {
            family,
            order,
            edges: [edges[0].to_bits(), edges.get(1).copied().unwrap_or(0.0).to_bits()],
            sampling_rate: sampling_rate.to_bits(),
            q_factor: q_factor.unwrap_or(0.0).to_bits(),
            zero_phase,
        };

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(spec) = cache.get(&key) {
            trace!(?family, order, "filter design cache hit");
            return Ok(Arc::clone(spec));
        }

        let sections = match family {
            FilterFamily::Notch => vec![notch_section(edges[0], q_factor.unwrap_or(0.0), sampling_rate)],
            _ => butterworth_sections(family, order, cutoff, sampling_rate),
        };

        debug!(
            ?family,
            order,
            ?cutoff,
            sampling_rate,
            sections = sections.len(),
            "designed filter"
        );

        let spec = Arc::new(FilterSpec {
            family,
            order: if family == FilterFamily::Notch { 2 } else { order },
            cutoff,
            sampling_rate,
            zero_phase,
            q_factor,
            sections,
        });
        cache.insert(key, Arc::clone(&spec));
        Ok(spec)
    }
}

fn validate_design(
    family: FilterFamily,
    order: usize,
    cutoff: Cutoff,
    sampling_rate: f64,
    q_factor: Option<f64>,
) -> BspResult<()> {
    if !(sampling_rate > 0.0) || !sampling_rate.is_finite() {
        return Err(filter_error!("sampling rate must be finite and > 0, got {}", sampling_rate));
    }
    if order == 0 || order > MAX_ORDER {
        return Err(filter_error!("order must be within 1..={}, got {}", MAX_ORDER, order));
    }

    match (family.is_band(), cutoff) {
        (true, Cutoff::Band(low, high)) if !(low < high) => {
            return Err(filter_error!("band edges must be ordered, got [{}, {}]", low, high));
        }
        (true, Cutoff::Single(_)) => {
            return Err(filter_error!("{:?} filter requires a band [low, high]", family));
        }
        (false, Cutoff::Band(..)) => {
            return Err(filter_error!("{:?} filter requires a single cutoff", family));
        }
        _ => {}
    }

    let nyquist = sampling_rate / 2.0;
    for edge in cutoff.edges() {
        if !(edge > 0.0 && edge < nyquist) {
            return Err(filter_error!(
                "cutoff {}Hz must lie strictly within (0, {}Hz)",
                edge,
                nyquist
            ));
        }
    }

    if family == FilterFamily::Notch {
        match q_factor {
            Some(q) if q > 0.0 && q.is_finite() => {}
            other => return Err(filter_error!("notch filter requires a positive Q, got {:?}", other)),
        }
    }

    Ok(())
}

/// Butterworth design: analog prototype, frequency transform, bilinear
/// transform, then conjugate-pole pairing into biquads normalized to unit
/// gain at the passband reference.
fn butterworth_sections(family: FilterFamily, order: usize, cutoff: Cutoff, fs: f64) -> Vec<Biquad> {
    let fs2 = 2.0 * fs;
    let prototype: Vec<Complex64> = (0..order)
        .map(|k| Complex64::from_polar(1.0, PI * (2 * k + order + 1) as f64 / (2 * order) as f64))
        .collect();

    let (analog, w0) = match (family, cutoff) {
        (FilterFamily::Lowpass, Cutoff::Single(f)) => {
            let wc = prewarp(f, fs);
            (prototype.iter().map(|&p| p * wc).collect::<Vec<_>>(), 0.0)
        }
        (FilterFamily::Highpass, Cutoff::Single(f)) => {
            let wc = prewarp(f, fs);
            (prototype.iter().map(|&p| wc / p).collect(), 0.0)
        }
        (FilterFamily::Bandpass, Cutoff::Band(low, high)) | (FilterFamily::Bandstop, Cutoff::Band(low, high)) => {
            let (wl, wh) = (prewarp(low, fs), prewarp(high, fs));
            let bw = wh - wl;
            let w0 = (wl * wh).sqrt();
            let poles = prototype
                .iter()
                .flat_map(|&p| {
                    let a = if family == FilterFamily::Bandpass {
                        p * (bw / 2.0)
                    } else {
                        (bw / 2.0) / p
                    };
                    let d = (a * a - w0 * w0).sqrt();
                    [a + d, a - d]
                })
                .collect();
            (poles, w0)
        }
        _ => (Vec::new(), 0.0),
    };

    let digital: Vec<Complex64> = analog.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();

    // zeros of each second-order section, and the point the gain is pinned at
    let notch_angle = 2.0 * (w0 / fs2).atan();
    let (zero_poly, reference): ([f64; 3], Complex64) = match family {
        FilterFamily::Lowpass => ([1.0, 2.0, 1.0], Complex64::new(1.0, 0.0)),
        FilterFamily::Highpass => ([1.0, -2.0, 1.0], Complex64::new(-1.0, 0.0)),
        FilterFamily::Bandpass => ([1.0, 0.0, -1.0], Complex64::from_polar(1.0, notch_angle)),
        _ => ([1.0, -2.0 * notch_angle.cos(), 1.0], Complex64::new(1.0, 0.0)),
    };

    pair_conjugates(&digital)
        .into_iter()
        .map(|(p, q)| {
            let section = match q {
                Some(q) => Biquad {
                    b0: zero_poly[0],
                    b1: zero_poly[1],
                    b2: zero_poly[2],
                    a1: -(p + q).re,
                    a2: (p * q).re,
                },
                // a lone real pole only appears in odd-order low/high-pass designs
                None => {
                    let zero = if family == FilterFamily::Highpass { -1.0 } else { 1.0 };
                    Biquad {
                        b0: 1.0,
                        b1: zero,
                        b2: 0.0,
                        a1: -p.re,
                        a2: 0.0,
                    }
                }
            };
            let gain = section.response(reference.arg()).norm();
            section.scaled(1.0 / gain)
        })
        .collect()
}

/// Group poles into conjugate pairs; leftover real poles pair with each other
fn pair_conjugates(poles: &[Complex64]) -> Vec<(Complex64, Option<Complex64>)> {
    const TOL: f64 = 1e-10;
    let mut pairs: Vec<(Complex64, Option<Complex64>)> = poles
        .iter()
        .filter(|p| p.im > TOL)
        .map(|p| (*p, Some(p.conj())))
        .collect();

    let mut reals: Vec<f64> = poles.iter().filter(|p| p.im.abs() <= TOL).map(|p| p.re).collect();
    reals.sort_by(f64::total_cmp);
    for chunk in reals.chunks(2) {
        match chunk {
            [a, b] => pairs.push((Complex64::new(*a, 0.0), Some(Complex64::new(*b, 0.0)))),
            [a] => pairs.push((Complex64::new(*a, 0.0), None)),
            _ => {}
        }
    }
    pairs
}

/// Notch biquad centered at `freq` with quality factor `q`
fn notch_section(freq: f64, q: f64, fs: f64) -> Biquad {
    let omega = 2.0 * PI * freq / fs;
    let alpha = omega.sin() / (2.0 * q);
    let cos_omega = omega.cos();
    let a0 = 1.0 + alpha;

    Biquad {
        b0: 1.0 / a0,
        b1: -2.0 * cos_omega / a0,
        b2: 1.0 / a0,
        a1: -2.0 * cos_omega / a0,
        a2: (1.0 - alpha) / a0,
    }
}

/// Run `data` through the cascade, settling each section on `data[0]`
fn cascade(sections: &[Biquad], data: &[f64]) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };

    let mut stages: Vec<BiquadSection> = sections.iter().copied().map(BiquadSection::new).collect();
    let mut level = first;
    for stage in &mut stages {
        stage.settle(level);
        level *= stage.coeffs.dc_gain();
    }

    data.iter()
        .map(|&x| stages.iter_mut().fold(x, |sample, stage| stage.process_sample(sample)))
        .collect()
}

/// Odd reflection of `pad` samples about each end
fn odd_extend(data: &[f64], pad: usize) -> Vec<f64> {
    let n = data.len();
    let (first, last) = (data[0], data[n - 1]);
    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
    out.extend_from_slice(data);
    out.extend((1..=pad).map(|i| 2.0 * last - data[n - 1 - i]));
    out
}

/// Applies filter specs and the other conditioning steps to signals
#[derive(Debug, Clone, Default)]
pub struct SignalConditioner {
    designer: FilterDesigner,
}

impl SignalConditioner {
    pub fn new(designer: FilterDesigner) -> Self {
        SignalConditioner { designer }
    }

    pub fn designer(&self) -> &FilterDesigner {
        &self.designer
    }

    /// Filter `signal` with `spec`, forward-backward when the spec is zero-phase
    pub fn apply(&self, signal: &Signal, spec: &FilterSpec) -> BspResult<Signal> {
        if (spec.sampling_rate() - signal.sampling_rate()).abs() > f64::EPSILON * signal.sampling_rate() {
            return Err(filter_error!(
                "filter designed for {}Hz applied to a {}Hz signal",
                spec.sampling_rate(),
                signal.sampling_rate()
            ));
        }

        let required = spec.min_signal_len();
        if signal.len() < required {
            return Err(BspError::InsufficientSignalLength {
                required,
                actual: signal.len(),
            });
        }

        let output = if spec.zero_phase() {
            filtfilt(spec.sections(), signal.samples(), spec.padlen())
        } else {
            cascade(spec.sections(), signal.samples())
        };

        trace!(family = ?spec.family(), samples = signal.len(), "filter applied");
        signal.derive(output)
    }

    /// Remove slow drift with a high-pass filter or moving-average trend subtraction
    pub fn remove_baseline(&self, signal: &Signal, method: &BaselineMethod) -> BspResult<Signal> {
        match *method {
            BaselineMethod::Highpass { cutoff, order } => {
                let spec = self.designer.design(
                    FilterFamily::Highpass,
                    order,
                    Cutoff::Single(cutoff),
                    signal.sampling_rate(),
                )?;
                self.apply(signal, &spec)
            }
            BaselineMethod::MovingAverage { window_s } => {
                let window = signal.seconds_to_samples(window_s).max(1);
                let trend = dsp::moving_average(signal.samples(), window);
                let detrended = signal
                    .samples()
                    .iter()
                    .zip(&trend)
                    .map(|(x, t)| x - t)
                    .collect();
                signal.derive(detrended)
            }
        }
    }

    /// Resample to `target_rate` by linear interpolation; downsampling is
    /// preceded by a zero-phase anti-alias low-pass at 0.45 * target rate.
    pub fn resample(&self, signal: &Signal, target_rate: f64) -> BspResult<Signal> {
        if !(target_rate > 0.0) || !target_rate.is_finite() {
            return Err(BspError::InvalidSamplingRate { rate: target_rate });
        }
        if (target_rate - signal.sampling_rate()).abs() < f64::EPSILON {
            return Ok(signal.clone());
        }

        let source = if target_rate < signal.sampling_rate() {
            let spec = self.designer.design(
                FilterFamily::Lowpass,
                4,
                Cutoff::Single(0.45 * target_rate),
                signal.sampling_rate(),
            )?;
            self.apply(signal, &spec)?
        } else {
            signal.clone()
        };

        let n_out = (signal.len() as f64 * target_rate / signal.sampling_rate()).floor() as usize;
        let t_in: Vec<f64> = (0..source.len()).map(|i| i as f64 / source.sampling_rate()).collect();
        let t_out: Vec<f64> = (0..n_out).map(|i| i as f64 / target_rate).collect();
        let samples = dsp::interpolate_linear(&t_in, source.samples(), &t_out);

        debug!(from = signal.sampling_rate(), to = target_rate, samples = n_out, "resampled signal");
        signal.derive_with_rate(samples, target_rate)
    }

    /// Full conditioning stage: optional resample, baseline removal and the
    /// primary filter. Returns the conditioned signal and the primary spec.
    pub fn condition(&self, signal: &Signal, config: &ConditioningConfig) -> BspResult<(Signal, Arc<FilterSpec>)> {
        config.validate()?;

        let resampled = match config.resample_hz {
            Some(rate) => self.resample(signal, rate)?,
            None => signal.clone(),
        };

        let spec = self.designer.design_request(&config.filter, resampled.sampling_rate())?;
        let conditioned = self.condition_with(&resampled, &spec, config.baseline.as_ref())?;
        Ok((conditioned, spec))
    }

    /// Baseline removal and an already designed primary filter, without resampling
    pub fn condition_with(
        &self,
        signal: &Signal,
        spec: &FilterSpec,
        baseline: Option<&BaselineRemoval>,
    ) -> BspResult<Signal> {
        match baseline {
            Some(BaselineRemoval {
                method,
                placement: BaselinePlacement::BeforePrimary,
            }) => {
                let flattened = self.remove_baseline(signal, method)?;
                self.apply(&flattened, spec)
            }
            Some(BaselineRemoval {
                method,
                placement: BaselinePlacement::AfterPrimary,
            }) => {
                let filtered = self.apply(signal, spec)?;
                self.remove_baseline(&filtered, method)
            }
            None => self.apply(signal, spec),
        }
    }
}

/// Forward-backward filtering with odd padding and steady-state start
fn filtfilt(sections: &[Biquad], data: &[f64], padlen: usize) -> Vec<f64> {
    let extended = odd_extend(data, padlen);
    let mut forward = cascade(sections, &extended);
    forward.reverse();
    let mut backward = cascade(sections, &forward);
    backward.reverse();
    backward[padlen..padlen + data.len()].to_vec()
}
