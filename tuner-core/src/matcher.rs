//! # Note Matcher
//!
//! Maps a detected frequency onto the nearest note of a tuning table and
//! classifies the deviation.

use crate::tuning::{calculate_cents_deviation, TuningTable};
use serde::Serialize;

/// Which way a note deviates from its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TuningState {
    #[serde(rename = "ok")]
    InTune,
    #[serde(rename = "sharp")]
    Sharp,
    #[serde(rename = "flat")]
    Flat,
}

impl TuningState {
    /// `|cents| < in_tune_cents` is in tune, otherwise the sign decides.
    pub fn classify(cents: f64, in_tune_cents: f64) -> Self {
        if cents.abs() < in_tune_cents {
            TuningState::InTune
        } else if cents > 0.0 {
            TuningState::Sharp
        } else {
            TuningState::Flat
        }
    }
}

/// The outcome of matching one frequency against a table.
///
/// Only `frequency` is populated when no pitch was detected. `state` is
/// `None` whenever `cents` is.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningResult {
    /// Detected frequency in Hz, 0 when none
    pub frequency: f64,
    /// Name of the nearest note in the active table
    pub note: Option<String>,
    /// Target frequency of that note in Hz
    pub target: Option<f64>,
    /// Signed deviation from the target
    pub cents: Option<f64>,
    pub state: Option<TuningState>,
}

impl TuningResult {
    pub fn no_pitch() -> Self {
        Self {
            frequency: 0.0,
            note: None,
            target: None,
            cents: None,
            state: None,
        }
    }

    pub fn has_pitch(&self) -> bool {
        self.frequency > 0.0
    }
}

/// Finds the nearest note in `table` and how far `frequency` is from it.
///
/// A non-positive (or NaN) frequency yields a result carrying only the
/// frequency.
pub fn match_note(frequency: f64, table: &TuningTable, in_tune_cents: f64) -> TuningResult {
    if !(frequency > 0.0) {
        return TuningResult {
            frequency,
            ..TuningResult::no_pitch()
        };
    }

    let nearest = table.nearest(frequency);
    let cents = calculate_cents_deviation(frequency, nearest.frequency);

    TuningResult {
        frequency,
        note: Some(nearest.name.clone()),
        target: Some(nearest.frequency),
        cents,
        state: cents.map(|c| TuningState::classify(c, in_tune_cents)),
    }
}
