//! # Audio Capture Module
//!
//! Local microphone input for the tuner. Device-rate frames are forwarded
//! over a channel, resampled to the analysis rate and fed to a [`Session`]
//! in fixed-size chunks, the same way a remote client streams audio.
//!
//! ## Features
//! - Streaming linear-interpolation resampler
//! - Channel-driven feed loop, independent of the audio backend
//! - CPAL input stream with mono downmix (feature `capture`)

use crate::session::{Estimate, Session};
use crossbeam_channel::Receiver;

/// Duration of audio handed to the session per update, in milliseconds.
pub const CHUNK_MS: u32 = 50;

/// Streaming resampler using linear interpolation between neighbours.
///
/// Keeps the last input sample and the fractional read position between
/// calls, so splitting the input differently does not change the output.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Input samples advanced per output sample
    ratio: f64,
    /// Read position relative to the carried sample (or the chunk start)
    pos: f64,
    last: Option<f32>,
}

impl LinearResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            ratio: input_rate as f64 / output_rate.max(1) as f64,
            pos: 0.0,
            last: None,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Resamples `input`, appending to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if input.is_empty() {
            return;
        }
        let offset = usize::from(self.last.is_some());
        let len = input.len() + offset;
        let at = |i: usize| -> f32 {
            if i < offset {
                self.last.unwrap_or_default()
            } else {
                input[i - offset]
            }
        };

        while (self.pos as usize) + 1 < len {
            let i0 = self.pos as usize;
            let frac = (self.pos - i0 as f64) as f32;
            out.push(at(i0) * (1.0 - frac) + at(i0 + 1) * frac);
            self.pos += self.ratio;
        }

        // Re-base so the final sample becomes index 0 of the next call.
        self.pos -= (len - 1) as f64;
        self.last = Some(input[input.len() - 1]);
    }

    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.last = None;
    }
}

/// Drains device frames from `frames`, feeding a session until the channel
/// closes or `on_estimate` returns `false`.
///
/// Frames are resampled from `device_rate` to the session's analysis rate
/// and pushed in [`CHUNK_MS`] chunks.
pub fn run_feed_loop(
    session: &mut Session,
    frames: Receiver<Vec<f32>>,
    device_rate: u32,
    analysis_rate: u32,
    mut on_estimate: impl FnMut(&Estimate) -> bool,
) {
    let chunk_len = (analysis_rate * CHUNK_MS / 1000).max(1) as usize;
    let mut resampler = LinearResampler::new(device_rate, analysis_rate);
    let mut pending = Vec::with_capacity(chunk_len * 2);

    for frame in frames.iter() {
        resampler.process(&frame, &mut pending);
        let mut consumed = 0;
        while pending.len() - consumed >= chunk_len {
            let chunk = &pending[consumed..consumed + chunk_len];
            consumed += chunk_len;
            if let Some(estimate) = session.push_samples(chunk) {
                if !on_estimate(&estimate) {
                    tracing::info!("feed loop stopped by consumer");
                    return;
                }
            }
        }
        pending.drain(..consumed);
    }
    tracing::info!("audio frame channel closed");
}

#[cfg(feature = "capture")]
pub use device::start_audio_capture;

#[cfg(feature = "capture")]
mod device {
    use crate::{Error, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use crossbeam_channel::Sender;
    use tracing::{info, warn};

    fn audio_err(e: impl std::fmt::Display) -> Error {
        Error::Audio(e.to_string())
    }

    /// Starts audio capture from the default input device.
    ///
    /// Frames are downmixed to mono and sent as they arrive; a full channel
    /// drops the frame rather than blocking the audio callback.
    ///
    /// # Returns
    /// * `Ok((stream, sample_rate))` - Running stream handle and device rate
    /// * `Err(e)` - No device, no f32 input format, or stream setup failure
    pub fn start_audio_capture(sender: Sender<Vec<f32>>) -> Result<(cpal::Stream, u32)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("No input device available".into()))?;

        info!(device = %device.name().map_err(audio_err)?, "using audio input device");

        let supported = device.default_input_config().map_err(audio_err)?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(Error::Audio(format!(
                "unsupported input sample format {:?}",
                supported.sample_format()
            )));
        }
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels().max(1) as usize;
        let config: cpal::StreamConfig = supported.into();

        info!(sample_rate, channels, "selected input configuration");

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono: Vec<f32> = if channels == 1 {
                        data.to_vec()
                    } else {
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                            .collect()
                    };
                    let _ = sender.try_send(mono);
                },
                |err| warn!(error = %err, "audio input stream error"),
                None,
            )
            .map_err(audio_err)?;

        stream.play().map_err(audio_err)?;

        Ok((stream, sample_rate))
    }
}
