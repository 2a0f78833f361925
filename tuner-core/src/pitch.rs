//! # Pitch Detection Module
//!
//! Autocorrelation pitch detection for monophonic instrument signals.
//!
//! ## Features
//! - Silence gate on peak amplitude after DC removal
//! - Hann-windowed FFT autocorrelation
//! - Lag search restricted to the configured fundamental band
//! - Parabolic interpolation for sub-sample accuracy
//!
//! Every low-confidence case (silence, no periodic structure, degenerate
//! peak geometry) yields `None` rather than an error.

use crate::config::TunerConfig;
use crate::fft::{hann_window, remove_dc_offset, Autocorrelator};

/// Denominators at or below this are treated as a flat peak.
const PARABOLA_EPSILON: f64 = 1e-12;

/// Reusable detector for windows of one fixed length.
///
/// Holds the FFT plans, window coefficients and working buffers, so a
/// session allocates once and then runs one detection per audio update.
#[derive(Debug)]
pub struct PitchDetector {
    sample_rate: f64,
    min_hz: f64,
    max_hz: f64,
    silence_threshold: f64,
    hann: Vec<f64>,
    frame: Vec<f64>,
    lags: Vec<f64>,
    autocorrelator: Autocorrelator,
}

impl PitchDetector {
    pub fn new(config: &TunerConfig) -> Self {
        let size = config.window_size;
        Self {
            sample_rate: config.sample_rate as f64,
            min_hz: config.min_hz,
            max_hz: config.max_hz,
            silence_threshold: config.silence_threshold,
            hann: hann_window(size),
            frame: vec![0.0; size],
            lags: vec![0.0; size],
            autocorrelator: Autocorrelator::new(size),
        }
    }

    pub fn window_size(&self) -> usize {
        self.frame.len()
    }

    /// Estimates the fundamental frequency of `window` in Hz.
    ///
    /// # Returns
    /// * `Some(frequency)` - Detected fundamental
    /// * `None` - Silence, noise, non-finite input, or a window whose length
    ///   differs from the configured size
    pub fn detect(&mut self, window: &[f32]) -> Option<f64> {
        if window.len() != self.frame.len() {
            tracing::debug!(
                got = window.len(),
                expected = self.frame.len(),
                "window length mismatch, skipping detection"
            );
            return None;
        }

        for (dst, &src) in self.frame.iter_mut().zip(window) {
            *dst = src as f64;
        }
        if self.frame.iter().any(|s| !s.is_finite()) {
            return None;
        }

        remove_dc_offset(&mut self.frame);
        let peak = self.frame.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        if peak < self.silence_threshold {
            return None;
        }

        for (sample, w) in self.frame.iter_mut().zip(&self.hann) {
            *sample *= w;
        }
        self.autocorrelator.process(&self.frame, &mut self.lags);

        let lag = find_period(&self.lags, self.sample_rate, self.min_hz, self.max_hz)?;
        Some(self.sample_rate / lag)
    }
}

/// Locates the pitch period, in fractional samples, in an autocorrelation
/// sequence.
///
/// Skips the descending slope that follows the lag-0 maximum, takes the
/// highest lag after the first ascent, then refines it with a parabola.
pub fn find_period(ac: &[f64], sample_rate: f64, min_hz: f64, max_hz: f64) -> Option<f64> {
    let len = ac.len();
    if len < 2 {
        return None;
    }
    // Lag bounds truncate toward zero.
    let min_lag = (sample_rate / max_hz) as usize;
    let max_lag = (len - 1).min((sample_rate / min_hz) as usize);
    if max_lag <= min_lag + 2 {
        return None;
    }

    // Walk down the slope from lag 0 until the first rise.
    let mut start = min_lag;
    while start < max_lag - 1 && ac[start + 1] - ac[start] <= 0.0 {
        start += 1;
    }
    if start >= max_lag - 1 {
        return None;
    }

    let peak = argmax(&ac[start..max_lag]) + start;
    let mut period = peak as f64;
    if peak >= 1 && peak < len - 1 {
        period += parabolic_offset(ac[peak - 1], ac[peak], ac[peak + 1]).unwrap_or(0.0);
    }

    (period > 0.0).then_some(period)
}

/// Offset of the vertex of the parabola through three equally spaced points,
/// relative to the middle one.
///
/// Returns `None` when the points are (numerically) collinear.
pub fn parabolic_offset(left: f64, center: f64, right: f64) -> Option<f64> {
    let denom = left - 2.0 * center + right;
    if denom.abs() > PARABOLA_EPSILON {
        Some(0.5 * (left - right) / denom)
    } else {
        None
    }
}

/// Index of the first maximum.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}
