//! # Configuration Module
//!
//! Tunable analysis constants and extra tuning tables. Every field has a
//! default, so an empty TOML document yields the stock 16 kHz / 4096-sample
//! guitar tuner.

use crate::tuning::{Note, TuningCatalog, TuningError, TuningTable, DEFAULT_TUNING};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_WINDOW_SIZE: usize = 4096;
pub const DEFAULT_MIN_HZ: f64 = 60.0;
pub const DEFAULT_MAX_HZ: f64 = 1200.0;
pub const DEFAULT_IN_TUNE_CENTS: f64 = 5.0;
pub const DEFAULT_SILENCE_THRESHOLD: f64 = 1e-4;

/// Configuration loading or validation error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Tuning(#[from] TuningError),
}

/// A tuning table as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct TuningEntry {
    pub name: String,
    pub notes: Vec<Note>,
}

/// Analysis parameters shared by every session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunerConfig {
    /// Sample rate of incoming audio in Hz
    pub sample_rate: u32,
    /// Analysis window length in samples
    pub window_size: usize,
    /// Lowest fundamental searched for, in Hz
    pub min_hz: f64,
    /// Highest fundamental searched for, in Hz
    pub max_hz: f64,
    /// Deviations strictly below this many cents count as in tune
    pub in_tune_cents: f64,
    /// Peak amplitude below which a window is treated as silence
    pub silence_threshold: f64,
    /// Table selected at session start and for unknown instrument names
    pub default_tuning: String,
    /// Extra tables; a name matching a built-in replaces it
    pub tunings: Vec<TuningEntry>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_size: DEFAULT_WINDOW_SIZE,
            min_hz: DEFAULT_MIN_HZ,
            max_hz: DEFAULT_MAX_HZ,
            in_tune_cents: DEFAULT_IN_TUNE_CENTS,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            default_tuning: DEFAULT_TUNING.to_string(),
            tunings: Vec::new(),
        }
    }
}

impl TunerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks parameter ranges and that the catalog can be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.window_size < 4 {
            return Err(ConfigError::Invalid(format!(
                "window_size must be at least 4, got {}",
                self.window_size
            )));
        }
        if !(self.min_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "min_hz must be positive, got {}",
                self.min_hz
            )));
        }
        if !(self.max_hz > self.min_hz) {
            return Err(ConfigError::Invalid(format!(
                "max_hz ({}) must exceed min_hz ({})",
                self.max_hz, self.min_hz
            )));
        }
        let nyquist = self.sample_rate as f64 / 2.0;
        if self.max_hz >= nyquist {
            return Err(ConfigError::Invalid(format!(
                "max_hz ({}) must be below Nyquist ({nyquist})",
                self.max_hz
            )));
        }
        if !(self.in_tune_cents >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "in_tune_cents must be non-negative, got {}",
                self.in_tune_cents
            )));
        }
        if !(self.silence_threshold >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "silence_threshold must be non-negative, got {}",
                self.silence_threshold
            )));
        }
        self.catalog()?;
        Ok(())
    }

    /// Builds the shared catalog: built-ins plus configured tables.
    pub fn catalog(&self) -> Result<TuningCatalog, ConfigError> {
        let extra = self
            .tunings
            .iter()
            .map(|entry| TuningTable::new(entry.name.clone(), entry.notes.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TuningCatalog::builtin().with_tables(extra, &self.default_tuning)?)
    }
}
