//! # Session Module
//!
//! Per-connection tuner state: the active tuning table, the audio ring and
//! a pitch detector. A session consumes control and audio messages strictly
//! in order and produces the JSON-serialisable replies. It owns no
//! transport; callers map their framing onto [`Inbound`].

use crate::buffer::CircularBuffer;
use crate::config::TunerConfig;
use crate::matcher::{match_note, TuningResult, TuningState};
use crate::pitch::PitchDetector;
use crate::tuning::{TuningCatalog, TuningTable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that end a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Audio payloads are little-endian f32; anything else is corrupt framing.
    #[error("audio payload of {len} bytes is not a whole number of f32 samples")]
    MisalignedAudio { len: usize },
}

/// One incoming message, already split by kind.
#[derive(Debug, Clone, Copy)]
pub enum Inbound<'a> {
    /// A structured control payload, e.g. `{"instrument":"violin"}`
    Control(&'a str),
    /// Raw little-endian f32 mono samples
    Audio(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingFirstMessage,
    Streaming,
}

#[derive(Debug, Deserialize)]
struct ControlMessage {
    instrument: Option<String>,
}

/// Reply to a control message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlAck {
    pub ok: bool,
    /// Table active after the message was applied
    pub instrument: String,
}

/// Pitch report as sent on the wire.
///
/// With no pitch the reply is just `{"freq":0}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Estimate {
    /// `freq` is always zero and serialises as the integer `0`.
    NoPitch {
        freq: u32,
    },
    Pitch {
        freq: f64,
        note: String,
        target: f64,
        cents: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<TuningState>,
    },
}

impl From<&TuningResult> for Estimate {
    fn from(result: &TuningResult) -> Self {
        match (&result.note, result.target) {
            (Some(note), Some(target)) if result.has_pitch() => Estimate::Pitch {
                freq: round_to(result.frequency, 2),
                note: note.clone(),
                target: round_to(target, 2),
                cents: result.cents.map(|c| round_to(c, 1)),
                state: result.state,
            },
            _ => Estimate::NoPitch { freq: 0 },
        }
    }
}

/// Anything a session sends back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Ack(ControlAck),
    Estimate(Estimate),
}

impl Outbound {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Decodes little-endian f32 samples into `out`, replacing its contents.
pub fn decode_samples(payload: &[u8], out: &mut Vec<f32>) -> Result<(), SessionError> {
    if payload.len() % 4 != 0 {
        return Err(SessionError::MisalignedAudio { len: payload.len() });
    }
    out.clear();
    out.extend(
        payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
    );
    Ok(())
}

/// State owned by exactly one connection.
#[derive(Debug)]
pub struct Session {
    config: Arc<TunerConfig>,
    catalog: Arc<TuningCatalog>,
    tuning: Arc<TuningTable>,
    buffer: CircularBuffer,
    detector: PitchDetector,
    phase: SessionPhase,
    decoded: Vec<f32>,
}

impl Session {
    pub fn new(config: Arc<TunerConfig>, catalog: Arc<TuningCatalog>) -> Self {
        let tuning = catalog.default_table().clone();
        Self {
            buffer: CircularBuffer::new(config.window_size),
            detector: PitchDetector::new(&config),
            tuning,
            catalog,
            config,
            phase: SessionPhase::AwaitingFirstMessage,
            decoded: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn tuning(&self) -> &TuningTable {
        &self.tuning
    }

    /// Applies one message and returns the reply, if any.
    ///
    /// Control messages are always acknowledged. Audio produces an estimate
    /// once a full window has been received, and nothing for empty payloads.
    pub fn handle(&mut self, message: Inbound<'_>) -> Result<Option<Outbound>, SessionError> {
        self.phase = SessionPhase::Streaming;
        match message {
            Inbound::Control(payload) => Ok(Some(Outbound::Ack(self.handle_control(payload)))),
            Inbound::Audio(payload) => Ok(self.handle_audio(payload)?.map(Outbound::Estimate)),
        }
    }

    /// Selects a tuning table.
    ///
    /// Unknown instrument names select the default table; payloads that are
    /// not JSON or carry no `instrument` leave the selection unchanged.
    pub fn handle_control(&mut self, payload: &str) -> ControlAck {
        match serde_json::from_str::<ControlMessage>(payload) {
            Ok(ControlMessage {
                instrument: Some(name),
            }) => {
                self.tuning = self.catalog.resolve(&name).clone();
                debug!(requested = %name, active = self.tuning.name(), "tuning selected");
            }
            Ok(ControlMessage { instrument: None }) => {
                debug!("control message without instrument");
            }
            Err(e) => {
                debug!(error = %e, "ignoring malformed control message");
            }
        }
        ControlAck {
            ok: true,
            instrument: self.tuning.name().to_string(),
        }
    }

    pub fn handle_audio(&mut self, payload: &[u8]) -> Result<Option<Estimate>, SessionError> {
        let mut decoded = std::mem::take(&mut self.decoded);
        let result = decode_samples(payload, &mut decoded).map(|()| self.push_samples(&decoded));
        self.decoded = decoded;
        result
    }

    /// Appends samples and analyses the newest window once one exists.
    pub fn push_samples(&mut self, samples: &[f32]) -> Option<Estimate> {
        self.analyze(samples).map(|result| Estimate::from(&result))
    }

    /// Like [`Session::push_samples`] but returns the unrounded result.
    pub fn analyze(&mut self, samples: &[f32]) -> Option<TuningResult> {
        if samples.is_empty() {
            return None;
        }
        self.buffer.write(samples);
        if !self.buffer.is_full() {
            return None;
        }

        let window = self.buffer.snapshot();
        let result = match self.detector.detect(&window) {
            Some(freq) => match_note(freq, &self.tuning, self.config.in_tune_cents),
            None => TuningResult::no_pitch(),
        };
        debug!(
            freq = result.frequency,
            note = result.note.as_deref().unwrap_or("-"),
            cents = ?result.cents,
            "window analysed"
        );
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let config = Arc::new(TunerConfig::default());
        let catalog = Arc::new(config.catalog().unwrap());
        Session::new(config, catalog)
    }

    fn to_bytes(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn sine(freq: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / 16_000.0).sin()) as f32)
            .collect()
    }

    #[test]
    fn starts_on_default_table_awaiting_first_message() {
        let s = session();
        assert_eq!(s.tuning().name(), "guitar");
        assert_eq!(s.phase(), SessionPhase::AwaitingFirstMessage);
    }

    #[test]
    fn control_selects_table_and_acknowledges() {
        let mut s = session();
        let reply = s.handle(Inbound::Control(r#"{"instrument":"violin"}"#)).unwrap();
        assert_eq!(
            reply,
            Some(Outbound::Ack(ControlAck {
                ok: true,
                instrument: "violin".into()
            }))
        );
        assert_eq!(s.phase(), SessionPhase::Streaming);
        assert_eq!(s.tuning().name(), "violin");
    }

    #[test]
    fn unknown_instrument_falls_back_to_default() {
        let mut s = session();
        s.handle_control(r#"{"instrument":"mandolin"}"#);
        let ack = s.handle_control(r#"{"instrument":"kazoo"}"#);
        assert_eq!(ack.instrument, "guitar");
    }

    #[test]
    fn malformed_control_keeps_selection() {
        let mut s = session();
        s.handle_control(r#"{"instrument":"violin"}"#);
        for payload in ["not json", "{", r#"{"volume":3}"#, r#"{"instrument":7}"#] {
            let ack = s.handle_control(payload);
            assert!(ack.ok);
            assert_eq!(ack.instrument, "violin", "payload {payload}");
        }
    }

    #[test]
    fn empty_audio_produces_nothing() {
        let mut s = session();
        assert_eq!(s.handle(Inbound::Audio(&[])).unwrap(), None);
    }

    #[test]
    fn misaligned_audio_is_an_error() {
        let mut s = session();
        assert_eq!(
            s.handle(Inbound::Audio(&[0, 0, 0])),
            Err(SessionError::MisalignedAudio { len: 3 })
        );
    }

    #[test]
    fn no_estimate_until_window_is_full() {
        let mut s = session();
        let signal = sine(440.0, 4096);
        let (head, tail) = signal.split_at(4000);
        assert_eq!(s.handle_audio(&to_bytes(head)).unwrap(), None);
        assert!(s.handle_audio(&to_bytes(tail)).unwrap().is_some());
    }

    #[test]
    fn silence_reports_minimal_estimate() {
        let mut s = session();
        let reply = s.handle(Inbound::Audio(&to_bytes(&vec![0.0; 4096]))).unwrap().unwrap();
        assert_eq!(reply.to_json().unwrap(), r#"{"freq":0}"#);
    }

    #[test]
    fn no_pitch_freq_is_an_integer_zero() {
        let estimate = Estimate::from(&TuningResult::no_pitch());
        assert_eq!(estimate, Estimate::NoPitch { freq: 0 });
        let json: serde_json::Value = serde_json::to_value(&estimate).unwrap();
        assert_eq!(json, serde_json::json!({ "freq": 0 }));
        assert!(json["freq"].is_u64());
    }

    #[test]
    fn pitch_estimate_serialises_all_fields() {
        let estimate = Estimate::from(&TuningResult {
            frequency: 440.01668,
            note: Some("A4".into()),
            target: Some(440.0),
            cents: Some(0.0656),
            state: Some(TuningState::InTune),
        });
        let json: serde_json::Value =
            serde_json::from_str(&Outbound::Estimate(estimate).to_json().unwrap()).unwrap();
        assert_eq!(json["freq"], 440.02);
        assert_eq!(json["note"], "A4");
        assert_eq!(json["target"], 440.0);
        assert_eq!(json["cents"], 0.1);
        assert_eq!(json["state"], "ok");
    }

    #[test]
    fn estimate_without_cents_serialises_null_and_omits_state() {
        let estimate = Estimate::from(&TuningResult {
            frequency: 100.0,
            note: Some("X".into()),
            target: Some(100.0),
            cents: None,
            state: None,
        });
        let json = Outbound::Estimate(estimate).to_json().unwrap();
        assert_eq!(json, r#"{"freq":100.0,"note":"X","target":100.0,"cents":null}"#);
    }

    #[test]
    fn ack_serialises_as_ok_object() {
        let ack = Outbound::Ack(ControlAck {
            ok: true,
            instrument: "guitar".into(),
        });
        assert_eq!(ack.to_json().unwrap(), r#"{"ok":true,"instrument":"guitar"}"#);
    }

    #[test]
    fn decode_reads_little_endian_floats() {
        let mut out = vec![9.0];
        decode_samples(&to_bytes(&[1.5, -0.25]), &mut out).unwrap();
        assert_eq!(out, vec![1.5, -0.25]);
    }
}
