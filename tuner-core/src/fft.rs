//! # Fast Fourier Transform (FFT) Module
//!
//! Signal conditioning and FFT-based autocorrelation used by the pitch
//! detector.
//!
//! ## Features
//! - DC offset removal and Hann windowing
//! - Wiener–Khinchin autocorrelation using RustFFT, O(n log n) instead of
//!   the O(n²) direct sum
//! - FFT plans and scratch space allocated once and reused per window

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
///
/// # Arguments
/// * `signal` - Signal to process (modified in-place)
pub fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f64>() / len as f64;
    for sample in signal.iter_mut() {
        *sample -= avg;
    }
}

/// Symmetric Hann window coefficients of length `n`.
///
/// Matches the usual `0.5 - 0.5 cos(2πi / (n - 1))` definition, so both
/// end points are zero.
pub fn hann_window(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let n_minus_1 = (n - 1) as f64;
            (0..n)
                .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos()))
                .collect()
        }
    }
}

/// Computes the autocorrelation of fixed-length frames via the power spectrum.
///
/// The frame is zero-padded to the next power of two at least twice its
/// length so the circular correlation equals the linear one for every lag
/// that is kept.
pub struct Autocorrelator {
    frame_len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl Autocorrelator {
    pub fn new(frame_len: usize) -> Self {
        let fft_len = (2 * frame_len).max(1).next_power_of_two();
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            frame_len,
            forward,
            inverse,
            spectrum: vec![Complex::default(); fft_len],
            scratch: vec![Complex::default(); scratch_len],
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn fft_len(&self) -> usize {
        self.spectrum.len()
    }

    /// Writes the first `frame_len` autocorrelation lags of `frame` into `out`.
    ///
    /// The inverse transform is normalised by the FFT length, so lag 0 equals
    /// the frame's energy.
    ///
    /// # Panics
    /// * If `frame` or `out` is not exactly `frame_len` long
    pub fn process(&mut self, frame: &[f64], out: &mut [f64]) {
        assert_eq!(frame.len(), self.frame_len, "frame length mismatch");
        assert_eq!(out.len(), self.frame_len, "output length mismatch");

        for (slot, &sample) in self.spectrum.iter_mut().zip(frame) {
            *slot = Complex { re: sample, im: 0.0 };
        }
        self.spectrum[self.frame_len..].fill(Complex::default());

        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        // |X(k)|² is the power spectrum; its inverse is the autocorrelation.
        for bin in self.spectrum.iter_mut() {
            *bin = Complex {
                re: bin.norm_sqr(),
                im: 0.0,
            };
        }

        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / self.spectrum.len() as f64;
        for (lag, bin) in out.iter_mut().zip(&self.spectrum) {
            *lag = bin.re * scale;
        }
    }
}

impl std::fmt::Debug for Autocorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autocorrelator")
            .field("frame_len", &self.frame_len)
            .field("fft_len", &self.spectrum.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_autocorrelation(x: &[f64]) -> Vec<f64> {
        (0..x.len())
            .map(|lag| (0..x.len() - lag).map(|i| x[i] * x[i + lag]).sum())
            .collect()
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = vec![1.5, 2.5, 3.5, 4.5];
        remove_dc_offset(&mut signal);
        assert!(signal.iter().sum::<f64>().abs() < 1e-12);
        assert_eq!(signal, vec![-1.5, -0.5, 0.5, 1.5]);
    }

    #[test]
    fn hann_window_is_symmetric_with_zero_ends() {
        let w = hann_window(9);
        assert_eq!(w[0], 0.0);
        assert!(w[8].abs() < 1e-15);
        assert!((w[4] - 1.0).abs() < 1e-15);
        for i in 0..9 {
            assert!((w[i] - w[8 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn fft_length_is_next_power_of_two_of_twice_frame() {
        assert_eq!(Autocorrelator::new(4096).fft_len(), 8192);
        assert_eq!(Autocorrelator::new(1000).fft_len(), 2048);
    }

    #[test]
    fn matches_direct_autocorrelation() {
        let frame: Vec<f64> = (0..100)
            .map(|i| (i as f64 * 0.37).sin() + 0.25 * (i as f64 * 1.3).cos())
            .collect();
        let mut ac = Autocorrelator::new(frame.len());
        let mut out = vec![0.0; frame.len()];
        ac.process(&frame, &mut out);

        let expected = direct_autocorrelation(&frame);
        for (lag, (got, want)) in out.iter().zip(&expected).enumerate() {
            assert!((got - want).abs() < 1e-9, "lag {lag}: {got} vs {want}");
        }
    }

    #[test]
    fn reuse_does_not_leak_previous_frame() {
        let mut ac = Autocorrelator::new(16);
        let mut out = vec![0.0; 16];
        ac.process(&[1.0; 16], &mut out);
        ac.process(&[0.0; 16], &mut out);
        assert!(out.iter().all(|v| v.abs() < 1e-12));
    }
}
