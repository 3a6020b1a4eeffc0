//! Numeric helpers shared by the processing stages

use bsp_core::{BspError, BspResult};
use realfft::RealFftPlanner;
use std::f64::consts::PI;

/// Arithmetic mean; `None` for an empty slice
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        None
    } else {
        Some(data.iter().sum::<f64>() / data.len() as f64)
    }
}

/// Standard deviation with `ddof` delta degrees of freedom
pub fn std_dev(data: &[f64], ddof: usize) -> Option<f64> {
    if data.len() <= ddof {
        return None;
    }
    let m = mean(data)?;
    let ss: f64 = data.iter().map(|x| (x - m).powi(2)).sum();
    Some((ss / (data.len() - ddof) as f64).sqrt())
}

/// Sample skewness (biased, as in the usual moment definition)
pub fn skewness(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    let n = data.len() as f64;
    let m2 = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n;
    if m2 <= f64::EPSILON {
        return None;
    }
    let m3 = data.iter().map(|x| (x - m).powi(3)).sum::<f64>() / n;
    Some(m3 / m2.powf(1.5))
}

/// Excess kurtosis (normal distribution gives 0)
pub fn excess_kurtosis(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    let n = data.len() as f64;
    let m2 = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n;
    if m2 <= f64::EPSILON {
        return None;
    }
    let m4 = data.iter().map(|x| (x - m).powi(4)).sum::<f64>() / n;
    Some(m4 / (m2 * m2) - 3.0)
}

/// Pearson correlation of two equal-length slices
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let ma = mean(a)?;
    let mb = mean(b)?;
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    let denom = (va * vb).sqrt();
    if denom <= f64::EPSILON {
        None
    } else {
        Some(cov / denom)
    }
}

/// Centered moving average; the window shrinks near the edges
pub fn moving_average(data: &[f64], window: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 || window <= 1 {
        return data.to_vec();
    }

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &x in data {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + x);
    }

    let half_left = (window - 1) / 2;
    let half_right = window / 2;
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half_left);
            let end = (i + half_right + 1).min(n);
            (prefix[end] - prefix[start]) / (end - start) as f64
        })
        .collect()
}

/// First difference, with the first output held at zero
pub fn first_difference(data: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(data.len());
    if data.is_empty() {
        return out;
    }
    out.push(0.0);
    out.extend(data.windows(2).map(|w| w[1] - w[0]));
    out
}

/// Linear interpolation of `(t, y)` at `query`; `t` must be increasing.
/// Queries outside `[t[0], t[last]]` are clamped to the end values.
pub fn interpolate_linear(t: &[f64], y: &[f64], query: &[f64]) -> Vec<f64> {
    if t.is_empty() || t.len() != y.len() {
        return Vec::new();
    }

    let mut j = 0;
    query
        .iter()
        .map(|&q| {
            if q <= t[0] {
                return y[0];
            }
            if q >= t[t.len() - 1] {
                return y[y.len() - 1];
            }
            while j + 1 < t.len() && t[j + 1] < q {
                j += 1;
            }
            // queries are usually sorted; restart if not
            if t[j] > q {
                j = t.partition_point(|&v| v < q).saturating_sub(1);
            }
            let span = t[j + 1] - t[j];
            if span <= 0.0 {
                y[j]
            } else {
                y[j] + (y[j + 1] - y[j]) * (q - t[j]) / span
            }
        })
        .collect()
}

/// Remove the least-squares line from `data`
pub fn detrend_linear(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = data.iter().sum::<f64>() / nf;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &v) in data.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (v - mean_y);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    data.iter()
        .enumerate()
        .map(|(i, &v)| v - (mean_y + slope * (i as f64 - mean_x)))
        .collect()
}

/// Periodic Hann window
fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// One-sided power spectral density estimate
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
}

impl Spectrum {
    /// Trapezoidal power in `[low, high)`
    pub fn band_power(&self, low: f64, high: f64) -> f64 {
        let mut total = 0.0;
        for k in 1..self.frequencies.len() {
            let (f0, f1) = (self.frequencies[k - 1], self.frequencies[k]);
            if f0 >= low && f1 < high {
                total += 0.5 * (self.power[k - 1] + self.power[k]) * (f1 - f0);
            }
        }
        total
    }

    /// Frequency of the largest bin in `[low, high)`
    pub fn peak_frequency(&self, low: f64, high: f64) -> Option<f64> {
        self.frequencies
            .iter()
            .zip(&self.power)
            .filter(|(f, _)| **f >= low && **f < high)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(f, _)| *f)
    }
}

/// Welch periodogram: Hann windows, 50% overlap, density scaling.
///
/// Segments are `segment_len` samples; a shorter input is analysed as a
/// single segment of its own length.
pub fn welch(data: &[f64], sampling_rate: f64, segment_len: usize) -> BspResult<Spectrum> {
    let n = data.len();
    if n < 4 {
        return Err(BspError::InsufficientSignalLength { required: 4, actual: n });
    }

    let seg = segment_len.clamp(4, n);
    let hop = (seg / 2).max(1);
    let window = hann(seg);
    let window_power: f64 = window.iter().map(|w| w * w).sum();

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(seg);
    let mut input = r2c.make_input_vec();
    let mut spectrum = r2c.make_output_vec();
    let bins = spectrum.len();
    let mut accum = vec![0.0; bins];

    let mut segments = 0usize;
    let mut start = 0;
    while start + seg <= n {
        let block = detrend_constant(&data[start..start + seg]);
        for ((slot, x), w) in input.iter_mut().zip(&block).zip(&window) {
            *slot = x * w;
        }
        r2c.process(&mut input, &mut spectrum)
            .map_err(|e| BspError::InvalidSignalData {
                reason: format!("FFT failed: {}", e),
            })?;
        for (acc, c) in accum.iter_mut().zip(&spectrum) {
            *acc += c.norm_sqr();
        }
        segments += 1;
        start += hop;
    }

    let scale = 1.0 / (sampling_rate * window_power * segments as f64);
    let nyquist_bin = if seg % 2 == 0 { Some(bins - 1) } else { None };
    let power = accum
        .iter()
        .enumerate()
        .map(|(k, p)| {
            if k == 0 || Some(k) == nyquist_bin {
                p * scale
            } else {
                2.0 * p * scale
            }
        })
        .collect();

    let frequencies = (0..bins)
        .map(|k| k as f64 * sampling_rate / seg as f64)
        .collect();

    Ok(Spectrum { frequencies, power })
}

fn detrend_constant(data: &[f64]) -> Vec<f64> {
    let m = mean(data).unwrap_or(0.0);
    data.iter().map(|x| x - m).collect()
}
