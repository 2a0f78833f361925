//! # Instrument Tuning Module
//!
//! Named tuning tables (instrument → ordered notes with target frequencies)
//! and the catalog that sessions pick their active table from.
//!
//! ## Features
//! - Built-in guitar, violin and mandolin tables
//! - An equal-tempered chromatic table covering the detector band
//! - Cent deviation calculation
//! - Catalog lookup with fallback to a designated default table

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Name of the table a session starts with when nothing else is configured.
pub const DEFAULT_TUNING: &str = "guitar";

/// Reference pitch for the equal-tempered scale.
pub const A4_HZ: f64 = 440.0;

/// Errors raised while constructing tuning tables or catalogs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TuningError {
    #[error("tuning table '{0}' has no notes")]
    Empty(String),

    #[error("tuning table '{table}': note '{note}' has invalid target {hz} Hz")]
    InvalidTarget { table: String, note: String, hz: f64 },

    #[error("tuning table '{table}': note '{note}' appears more than once")]
    DuplicateNote { table: String, note: String },

    #[error("tuning table '{0}' is defined more than once")]
    DuplicateTable(String),

    #[error("default tuning '{0}' is not in the catalog")]
    UnknownDefault(String),
}

/// Represents a single target note with its name and frequency.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// Target frequency in Hz
    #[serde(rename = "hz")]
    pub frequency: f64,
}

impl Note {
    pub fn new(name: impl Into<String>, frequency: f64) -> Self {
        Self {
            name: name.into(),
            frequency,
        }
    }
}

/// An immutable, ordered set of target notes for one instrument.
///
/// Order is fixed at construction and decides ties in [`TuningTable::nearest`].
#[derive(Debug, Clone, PartialEq)]
pub struct TuningTable {
    name: String,
    notes: Vec<Note>,
}

impl TuningTable {
    /// Builds a table, rejecting empty tables, non-positive or non-finite
    /// targets and repeated note names.
    pub fn new(name: impl Into<String>, notes: Vec<Note>) -> Result<Self, TuningError> {
        let name = name.into();
        if notes.is_empty() {
            return Err(TuningError::Empty(name));
        }
        for (i, note) in notes.iter().enumerate() {
            if !note.frequency.is_finite() || note.frequency <= 0.0 {
                return Err(TuningError::InvalidTarget {
                    table: name,
                    note: note.name.clone(),
                    hz: note.frequency,
                });
            }
            if notes[..i].iter().any(|n| n.name == note.name) {
                return Err(TuningError::DuplicateNote {
                    table: name,
                    note: note.name.clone(),
                });
            }
        }
        Ok(Self { name, notes })
    }

    fn from_pairs(name: &str, pairs: &[(&str, f64)]) -> Result<Self, TuningError> {
        Self::new(
            name,
            pairs.iter().map(|&(n, hz)| Note::new(n, hz)).collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Looks up a note's target frequency by name.
    pub fn target(&self, note_name: &str) -> Option<f64> {
        self.notes
            .iter()
            .find(|n| n.name == note_name)
            .map(|n| n.frequency)
    }

    /// Finds the note whose target is closest to `freq`.
    ///
    /// Ties go to the note that comes first in the table.
    pub fn nearest(&self, freq: f64) -> &Note {
        // `min_by` keeps the first of several equal minima.
        self.notes
            .iter()
            .min_by(|a, b| {
                let diff_a = (a.frequency - freq).abs();
                let diff_b = (b.frequency - freq).abs();
                diff_a.total_cmp(&diff_b)
            })
            .unwrap_or(&self.notes[0]) // tables are never empty
    }
}

/// Frequency of the note `semitones` away from A4 in 12-TET.
pub fn note_frequency(semitones_from_a4: i32) -> f64 {
    A4_HZ * 2.0_f64.powf(semitones_from_a4 as f64 / 12.0)
}

/// Scientific pitch name of the note `semitones` away from A4, using sharps.
///
/// The octave number changes at C, so A4 - 10 semitones is B3 but
/// A4 - 9 is C4.
pub fn equal_tempered_name(semitones_from_a4: i32) -> String {
    const NOTE_NAMES: [&str; 12] = [
        "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
    ];
    // Offset from A0 keeps the arithmetic non-negative for the usable range.
    let from_a0 = semitones_from_a4 + 48;
    let note_index = from_a0.rem_euclid(12) as usize;
    let octave = (from_a0 + 9).div_euclid(12);
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

/// Builds the chromatic 12-TET table restricted to `[min_hz, max_hz]`.
pub fn chromatic_table(min_hz: f64, max_hz: f64) -> Result<TuningTable, TuningError> {
    let notes = (-48..=39)
        .map(|s| Note::new(equal_tempered_name(s), note_frequency(s)))
        .filter(|n| n.frequency >= min_hz && n.frequency <= max_hz)
        .collect();
    TuningTable::new("chromatic", notes)
}

/// Built-in tables in catalog order.
static BUILTIN_TABLES: Lazy<Vec<TuningTable>> = Lazy::new(|| {
    const GUITAR: [(&str, f64); 6] = [
        ("E2", 82.41),
        ("A2", 110.00),
        ("D3", 146.83),
        ("G3", 196.00),
        ("B3", 246.94),
        ("E4", 329.63),
    ];
    const VIOLIN: [(&str, f64); 4] = [
        ("G3", 196.00),
        ("D4", 293.66),
        ("A4", 440.00),
        ("E5", 659.25),
    ];

    [
        TuningTable::from_pairs("guitar", &GUITAR),
        TuningTable::from_pairs("violin", &VIOLIN),
        TuningTable::from_pairs("mandolin", &VIOLIN),
        chromatic_table(crate::config::DEFAULT_MIN_HZ, crate::config::DEFAULT_MAX_HZ),
    ]
    .into_iter()
    // The constants above are valid by construction.
    .filter_map(Result::ok)
    .collect()
});

/// Calculates the deviation from a target frequency in cents.
///
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values indicate sharpness, negative values indicate flatness
///
/// Returns `None` unless both frequencies are strictly positive.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> Option<f64> {
    if freq <= 0.0 || target_freq <= 0.0 {
        return None;
    }
    Some(1200.0 * (freq / target_freq).log2())
}

/// The read-only set of tuning tables shared by every session.
#[derive(Debug, Clone)]
pub struct TuningCatalog {
    tables: Vec<Arc<TuningTable>>,
    default_index: usize,
}

impl TuningCatalog {
    /// Builds a catalog from `tables`, with `default` as the fallback table.
    pub fn new(tables: Vec<TuningTable>, default: &str) -> Result<Self, TuningError> {
        for (i, table) in tables.iter().enumerate() {
            if tables[..i].iter().any(|t| t.name == table.name) {
                return Err(TuningError::DuplicateTable(table.name.clone()));
            }
        }
        let default_index = tables
            .iter()
            .position(|t| t.name == default)
            .ok_or_else(|| TuningError::UnknownDefault(default.to_string()))?;
        Ok(Self {
            tables: tables.into_iter().map(Arc::new).collect(),
            default_index,
        })
    }

    /// The built-in tables with guitar as the default.
    pub fn builtin() -> Self {
        Self {
            tables: BUILTIN_TABLES.iter().cloned().map(Arc::new).collect(),
            default_index: 0,
        }
    }

    /// Adds `extra` tables, replacing built-ins of the same name in place
    /// and appending the rest, then selects `default`.
    ///
    /// A name may appear only once within `extra`.
    pub fn with_tables(
        mut self,
        extra: Vec<TuningTable>,
        default: &str,
    ) -> Result<Self, TuningError> {
        for (i, table) in extra.iter().enumerate() {
            if extra[..i].iter().any(|t| t.name == table.name) {
                return Err(TuningError::DuplicateTable(table.name.clone()));
            }
        }
        for table in extra {
            match self.tables.iter().position(|t| t.name == table.name) {
                Some(i) => self.tables[i] = Arc::new(table),
                None => self.tables.push(Arc::new(table)),
            }
        }
        self.default_index = self
            .tables
            .iter()
            .position(|t| t.name == default)
            .ok_or_else(|| TuningError::UnknownDefault(default.to_string()))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TuningTable>> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Like [`TuningCatalog::get`], but unknown names fall back to the default table.
    pub fn resolve(&self, name: &str) -> &Arc<TuningTable> {
        self.get(name).unwrap_or_else(|| self.default_table())
    }

    pub fn default_table(&self) -> &Arc<TuningTable> {
        &self.tables[self.default_index]
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }
}

impl Default for TuningCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_expected_tables_in_order() {
        let catalog = TuningCatalog::builtin();
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names, ["guitar", "violin", "mandolin", "chromatic"]);
        assert_eq!(catalog.default_table().name(), DEFAULT_TUNING);
    }

    #[test]
    fn guitar_table_matches_standard_tuning() {
        let catalog = TuningCatalog::builtin();
        let guitar = catalog.get("guitar").unwrap();
        assert_eq!(guitar.notes().len(), 6);
        assert_eq!(guitar.target("E2"), Some(82.41));
        assert_eq!(guitar.target("E4"), Some(329.63));
        assert_eq!(guitar.target("A4"), None);
    }

    #[test]
    fn unknown_name_resolves_to_default() {
        let catalog = TuningCatalog::builtin();
        assert_eq!(catalog.resolve("banjo").name(), "guitar");
        assert_eq!(catalog.resolve("violin").name(), "violin");
    }

    #[test]
    fn nearest_prefers_first_entry_on_tie() {
        let table = TuningTable::new(
            "tie",
            vec![Note::new("low", 100.0), Note::new("high", 200.0)],
        )
        .unwrap();
        assert_eq!(table.nearest(150.0).name, "low");
        assert_eq!(table.nearest(151.0).name, "high");
    }

    #[test]
    fn table_construction_rejects_bad_input() {
        assert_eq!(
            TuningTable::new("empty", vec![]),
            Err(TuningError::Empty("empty".into()))
        );
        assert!(matches!(
            TuningTable::new("zero", vec![Note::new("X", 0.0)]),
            Err(TuningError::InvalidTarget { .. })
        ));
        assert!(matches!(
            TuningTable::new("nan", vec![Note::new("X", f64::NAN)]),
            Err(TuningError::InvalidTarget { .. })
        ));
        assert!(matches!(
            TuningTable::new("dup", vec![Note::new("X", 1.0), Note::new("X", 2.0)]),
            Err(TuningError::DuplicateNote { .. })
        ));
    }

    #[test]
    fn equal_tempered_names_change_octave_at_c() {
        assert_eq!(equal_tempered_name(0), "A4");
        assert_eq!(equal_tempered_name(-10), "B3");
        assert_eq!(equal_tempered_name(-9), "C4");
        assert_eq!(equal_tempered_name(-48), "A0");
        assert_eq!(equal_tempered_name(3), "C5");
    }

    #[test]
    fn chromatic_table_covers_detector_band() {
        let table = chromatic_table(60.0, 1200.0).unwrap();
        let first = &table.notes()[0];
        let last = table.notes().last().unwrap();
        assert_eq!(first.name, "B1");
        assert_eq!(last.name, "D6");
        assert!((table.target("A4").unwrap() - 440.0).abs() < 1e-9);
        assert!(table.notes().iter().all(|n| (60.0..=1200.0).contains(&n.frequency)));
    }

    #[test]
    fn cents_of_an_octave_is_exactly_1200() {
        assert_eq!(calculate_cents_deviation(880.0, 440.0), Some(1200.0));
        assert_eq!(calculate_cents_deviation(440.0, 440.0), Some(0.0));
        assert!(calculate_cents_deviation(220.0, 440.0).unwrap() < 0.0);
    }

    #[test]
    fn cents_undefined_for_non_positive_inputs() {
        assert_eq!(calculate_cents_deviation(0.0, 440.0), None);
        assert_eq!(calculate_cents_deviation(-5.0, 440.0), None);
        assert_eq!(calculate_cents_deviation(440.0, 0.0), None);
    }

    #[test]
    fn extra_tables_replace_and_append() {
        let ukulele = TuningTable::new(
            "ukulele",
            vec![
                Note::new("G4", 392.0),
                Note::new("C4", 261.63),
                Note::new("E4", 329.63),
                Note::new("A4", 440.0),
            ],
        )
        .unwrap();
        let drop_d = TuningTable::new("guitar", vec![Note::new("D2", 73.42)]).unwrap();
        let catalog = TuningCatalog::builtin()
            .with_tables(vec![ukulele, drop_d], "ukulele")
            .unwrap();
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names, ["guitar", "violin", "mandolin", "chromatic", "ukulele"]);
        assert_eq!(catalog.default_table().name(), "ukulele");
        assert_eq!(catalog.get("guitar").unwrap().target("D2"), Some(73.42));
    }

    #[test]
    fn catalog_rejects_unknown_default_and_duplicates() {
        let a = TuningTable::new("a", vec![Note::new("X", 1.0)]).unwrap();
        assert_eq!(
            TuningCatalog::new(vec![a.clone()], "b").unwrap_err(),
            TuningError::UnknownDefault("b".into())
        );
        assert_eq!(
            TuningCatalog::new(vec![a.clone(), a], "a").unwrap_err(),
            TuningError::DuplicateTable("a".into())
        );
    }

    #[test]
    fn extra_tables_with_repeated_name_are_rejected() {
        let first = TuningTable::new("ukulele", vec![Note::new("A4", 440.0)]).unwrap();
        let second = TuningTable::new("ukulele", vec![Note::new("G4", 392.0)]).unwrap();
        assert_eq!(
            TuningCatalog::builtin()
                .with_tables(vec![first, second], "guitar")
                .unwrap_err(),
            TuningError::DuplicateTable("ukulele".into())
        );
    }
}
