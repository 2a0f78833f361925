// tuner-core/src/lib.rs

//! The core logic for the streaming instrument tuner.
//! This crate is responsible for buffering audio, pitch detection and
//! matching pitches against instrument tunings. It is completely headless
//! and contains no network code.

pub mod audio;
pub mod buffer;
pub mod config;
pub mod fft;
pub mod matcher;
pub mod pitch;
pub mod session;
pub mod tuning;

pub use buffer::CircularBuffer;
pub use config::{ConfigError, TunerConfig};
pub use matcher::{match_note, TuningResult, TuningState};
pub use pitch::PitchDetector;
pub use session::{Estimate, Inbound, Outbound, Session, SessionError};
pub use tuning::{TuningCatalog, TuningError, TuningTable};

use thiserror::Error;

/// Common result type for tuner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the tuner core
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tuning(#[from] TuningError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Audio device setup or streaming failure
    #[error("audio error: {0}")]
    Audio(String),
}
