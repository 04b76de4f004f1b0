//! Turn hospital episode statistics into per-index-event analysis records.
//!
//! The input is a flat stream of episode rows ordered by
//! `(nhs_number, spell_id, episode_start)`, plus two clinical code
//! taxonomies (ICD-10 diagnoses and OPCS-4 procedures). One pass over the
//! stream rebuilds the patient → spell → episode hierarchy, finds index
//! events (ACS admissions and PCI procedures), and emits one feature row per
//! index event: code-group counts in a window either side of the index date,
//! and the mortality outcome.
//!
//! The pieces, in dependency order:
//!
//! - [`StringInterner`]: stable id/string mapping shared by everything.
//! - [`codes`]: the taxonomy trees and the caching [`CodeParser`].
//! - [`RowBuffer`]: the typed cursor over episode rows (CSV or in-memory).
//! - [`Episode`] / [`Spell`] / [`Patient`]: streaming builders keyed on
//!   column changes.
//! - [`acs`]: index-event detection, windowed counting and the feature
//!   table.

pub mod acs;
pub mod codes;
pub mod config;
mod counter;
mod episode;
mod intern;
mod mortality;
mod patient;
mod row;
mod spell;
mod synth;

pub use anyhow::{Context, Error};

pub use crate::{
    acs::{
        extract_records, index_spells, patient_records, spells_in_window, CauseOfDeath,
        ExtractOptions, IndexRecord, Metagroups, Presentation, RecordDoc, RecordTable, Trigger,
    },
    codes::{preprocess, ClinicalCode, CodeGroup, CodeKind, CodeParser, CodeTree, Metagroup},
    config::Config,
    counter::EventCounter,
    episode::Episode,
    intern::{StrId, StringInterner},
    mortality::Mortality,
    patient::Patient,
    row::{CsvRows, InMemoryRows, RowBuffer, RowError, Timestamp, Value},
    spell::Spell,
    synth::{synthetic_columns, synthetic_rows, write_csv, SynthOptions},
};

/// Fallible paths use anyhow throughout, except the row-buffer boundary,
/// which has its own closed [`RowError`].
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
