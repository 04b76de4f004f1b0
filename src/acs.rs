//! Index-event extraction.
//!
//! An index event is an admission whose first episode carries an ACS primary
//! diagnosis or a PCI primary procedure. For each index event this module
//! counts code-group occurrences in a window either side of the index date
//! and attaches the mortality outcome, producing one row of the feature
//! table per index event.
//!
//! The pass is a single sweep over the ordered row stream: patients are
//! consumed one block at a time and dropped as soon as their records have
//! been emitted.

use crate::codes::{CodeGroup, CodeKind, CodeParser, Metagroup};
use crate::config::CodeGroupsConfig;
use crate::counter::EventCounter;
use crate::episode::Episode;
use crate::intern::StringInterner;
use crate::patient::Patient;
use crate::row::{RowBuffer, RowError, Timestamp};
use crate::spell::Spell;
use crate::Result;
use qu::ick_use::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The configured group collections that define index events and outcomes.
#[derive(Debug, Clone)]
pub struct Metagroups {
    pub acs: Metagroup,
    pub pci: Metagroup,
    pub stemi: Metagroup,
    pub cardiac_death: Metagroup,
}

impl Metagroups {
    pub fn from_config(config: &CodeGroupsConfig, strings: &mut StringInterner) -> Self {
        Metagroups {
            acs: Metagroup::new(&config.acs, strings),
            pci: Metagroup::new(&config.pci, strings),
            stemi: Metagroup::new(&config.stemi, strings),
            cardiac_death: Metagroup::new(&config.cardiac_death, strings),
        }
    }
}

/// What qualified the admission as an index event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Trigger {
    Acs,
    Pci,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Acs => "ACS",
            Trigger::Pci => "PCI",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Presentation {
    Stemi,
    Nstemi,
}

impl Presentation {
    pub fn as_str(self) -> &'static str {
        match self {
            Presentation::Stemi => "STEMI",
            Presentation::Nstemi => "NSTEMI",
        }
    }
}

/// Mortality outcome within the after window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CauseOfDeath {
    NoDeath,
    Cardiac,
    AllCause,
}

impl CauseOfDeath {
    pub fn as_str(self) -> &'static str {
        match self {
            CauseOfDeath::NoDeath => "no_death",
            CauseOfDeath::Cardiac => "cardiac",
            CauseOfDeath::AllCause => "all_cause",
        }
    }
}

/// One extracted index event.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub nhs_number: i64,
    pub index_date: Timestamp,
    pub trigger: Trigger,
    pub presentation: Presentation,
    pub age_at_index: Option<i64>,
    pub counts: EventCounter,
    /// Seconds from index to death, when death fell inside the window.
    pub survival_time: Option<i64>,
    pub cause_of_death: CauseOfDeath,
}

fn is_index_spell(spell: &Spell, groups: &Metagroups) -> bool {
    match spell.first_episode() {
        Some(first) => {
            groups.acs.contains(&first.primary_diagnosis)
                || groups.pci.contains(&first.primary_procedure)
        }
        None => false,
    }
}

/// The spells that anchor an index event: first-episode primary diagnosis in
/// ACS, or first-episode primary procedure in PCI.
pub fn index_spells<'a>(patient: &'a Patient, groups: &Metagroups) -> Vec<&'a Spell> {
    patient
        .spells
        .iter()
        .filter(|spell| is_index_spell(spell, groups))
        .collect()
}

/// Spells starting within `window_seconds` of `index_date`: strictly before
/// for a negative window, strictly after for a positive one. A spell
/// starting exactly on the index date (the index spell itself included)
/// falls in neither window.
pub fn spells_in_window<'a>(
    spells: &'a [Spell],
    index_date: Timestamp,
    window_seconds: i64,
) -> impl Iterator<Item = &'a Spell> + 'a {
    spells.iter().filter(move |spell| {
        let offset = spell.start - index_date;
        if window_seconds < 0 {
            window_seconds <= offset && offset < 0
        } else {
            0 < offset && offset <= window_seconds
        }
    })
}

fn stemi_presentation(spell: &Spell, stemi: &Metagroup) -> Presentation {
    let any_stemi = spell
        .episodes
        .iter()
        .flat_map(Episode::all_codes)
        .any(|code| stemi.contains(code));
    if any_stemi {
        Presentation::Stemi
    } else {
        Presentation::Nstemi
    }
}

/// Every group of every code in the spell (primaries and secondaries,
/// diagnoses and procedures), once per code occurrence.
fn spell_groups(spell: &Spell) -> impl Iterator<Item = CodeGroup> + '_ {
    spell
        .episodes
        .iter()
        .flat_map(Episode::all_codes)
        .flat_map(|code| code.groups())
}

fn survival(
    patient: &Patient,
    index_date: Timestamp,
    window_seconds: i64,
    cardiac_death: &Metagroup,
) -> Result<(Option<i64>, CauseOfDeath)> {
    let Some(date_of_death) = patient.mortality.date_of_death() else {
        // Alive, or deceased with no recorded date: nothing to anchor the
        // outcome to.
        return Ok((None, CauseOfDeath::NoDeath));
    };
    let offset = date_of_death - index_date;
    ensure!(
        offset >= 0,
        "date of death {} is before index date {}",
        date_of_death,
        index_date
    );
    if offset > window_seconds {
        return Ok((None, CauseOfDeath::NoDeath));
    }
    let cardiac = patient
        .mortality
        .cause_of_death()
        .map(|cause| cardiac_death.contains(cause))
        .unwrap_or(false);
    let cause = if cardiac {
        CauseOfDeath::Cardiac
    } else {
        CauseOfDeath::AllCause
    };
    Ok((Some(offset), cause))
}

/// Build the index records for one patient.
///
/// Fails when the data violates an invariant (death before an index date);
/// the caller skips the patient and carries on.
pub fn patient_records(
    patient: &Patient,
    groups: &Metagroups,
    window_seconds: i64,
) -> Result<Vec<IndexRecord>> {
    let mut records = Vec::new();
    for spell in index_spells(patient, groups) {
        let first = match spell.first_episode() {
            Some(first) => first,
            None => continue,
        };
        let index_date = first.start;
        let trigger = if groups.pci.contains(&first.primary_procedure) {
            Trigger::Pci
        } else {
            Trigger::Acs
        };

        let mut counts = EventCounter::new();
        // The index spell contributes only its secondary diagnoses to the
        // history: the primaries describe the presentation itself, and
        // secondary procedures usually record the index procedure.
        for episode in &spell.episodes {
            for code in episode.secondaries(CodeKind::Diagnosis) {
                for group in code.groups() {
                    counts.push_before(group);
                }
            }
        }
        for other in spells_in_window(&patient.spells, index_date, -window_seconds) {
            for group in spell_groups(other) {
                counts.push_before(group);
            }
        }
        for other in spells_in_window(&patient.spells, index_date, window_seconds) {
            for group in spell_groups(other) {
                counts.push_after(group);
            }
        }

        let (survival_time, cause_of_death) =
            survival(patient, index_date, window_seconds, &groups.cardiac_death)?;

        records.push(IndexRecord {
            nhs_number: patient.nhs_number,
            index_date,
            trigger,
            presentation: stemi_presentation(spell, &groups.stemi),
            age_at_index: first.age_at_episode,
            counts,
            survival_time,
            cause_of_death,
        });
    }
    Ok(records)
}

/// The feature table, one row per index event, stored column-major the way
/// the downstream modelling code consumes it.
#[derive(Debug)]
pub struct RecordTable {
    nhs_number: Vec<i64>,
    index_date: Vec<i64>,
    /// 0 = ACS, 1 = PCI
    index_type: Vec<i64>,
    /// -1 when the age was not recorded
    age: Vec<i64>,
    stemi: Vec<i64>,
    /// -1 when there was no death inside the window
    survival_time: Vec<i64>,
    cause_of_death: Vec<CauseOfDeath>,
    /// One `<group>_before` column per group declared by the taxonomies.
    group_columns: Vec<(String, CodeGroup)>,
    before_counts: Vec<Vec<u64>>,
    /// Bleeding in the after window is the modelled outcome, so it gets its
    /// own column.
    bleeding_group: CodeGroup,
    bleeding: Vec<u64>,
}

impl RecordTable {
    pub fn new(parser: &CodeParser, strings: &mut StringInterner) -> Self {
        let mut group_columns = Vec::new();
        let mut before_counts = Vec::new();
        for name in parser.group_names() {
            group_columns.push((format!("{}_before", name), CodeGroup::new(name, strings)));
            before_counts.push(Vec::new());
        }
        RecordTable {
            nhs_number: Vec::new(),
            index_date: Vec::new(),
            index_type: Vec::new(),
            age: Vec::new(),
            stemi: Vec::new(),
            survival_time: Vec::new(),
            cause_of_death: Vec::new(),
            group_columns,
            before_counts,
            bleeding_group: CodeGroup::new("bleeding", strings),
            bleeding: Vec::new(),
        }
    }

    pub fn push(&mut self, record: &IndexRecord) {
        self.nhs_number.push(record.nhs_number);
        self.index_date.push(record.index_date.seconds());
        self.index_type
            .push(matches!(record.trigger, Trigger::Pci) as i64);
        self.age.push(record.age_at_index.unwrap_or(-1));
        self.stemi
            .push(matches!(record.presentation, Presentation::Stemi) as i64);
        self.survival_time.push(record.survival_time.unwrap_or(-1));
        self.cause_of_death.push(record.cause_of_death);
        for ((_, group), column) in self.group_columns.iter().zip(self.before_counts.iter_mut()) {
            column.push(record.counts.before(*group));
        }
        self.bleeding.push(record.counts.after(self.bleeding_group));
    }

    pub fn len(&self) -> usize {
        self.nhs_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nhs_number.is_empty()
    }

    /// Count in the named `<group>_before` column, for tests and callers
    /// that pick out single features.
    pub fn before_count(&self, column: &str, row: usize) -> Option<u64> {
        let idx = self
            .group_columns
            .iter()
            .position(|(name, _)| name == column)?;
        self.before_counts[idx].get(row).copied()
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![
            "nhs_number".to_owned(),
            "index_date".to_owned(),
            "index_type".to_owned(),
            "age".to_owned(),
            "stemi".to_owned(),
            "survival_time".to_owned(),
            "cause_of_death".to_owned(),
        ];
        names.extend(self.group_columns.iter().map(|(name, _)| name.clone()));
        names.push("bleeding".to_owned());
        names
    }

    pub fn to_csv<W: io::Write>(&self, writer: W) -> Result {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.column_names())?;
        for row in 0..self.len() {
            let mut cells = vec![
                self.nhs_number[row].to_string(),
                self.index_date[row].to_string(),
                self.index_type[row].to_string(),
                self.age[row].to_string(),
                self.stemi[row].to_string(),
                self.survival_time[row].to_string(),
                self.cause_of_death[row].as_str().to_owned(),
            ];
            cells.extend(
                self.before_counts
                    .iter()
                    .map(|column| column[row].to_string()),
            );
            cells.push(self.bleeding[row].to_string());
            writer.write_record(cells)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// A serialisable view of one index record, written out under
/// `save_records`.
#[derive(Debug, Serialize)]
pub struct RecordDoc {
    pub nhs_number: i64,
    pub index_date: i64,
    pub index_date_readable: String,
    pub presentation: &'static str,
    pub inclusion_trigger: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_at_index: Option<i64>,
    pub counts_before: BTreeMap<String, u64>,
    pub counts_after: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survival_time: Option<i64>,
    pub cause_of_death: &'static str,
}

fn named_counts(
    counts: &BTreeMap<CodeGroup, u64>,
    strings: &StringInterner,
) -> Result<BTreeMap<String, u64>> {
    counts
        .iter()
        .map(|(group, count)| Ok((group.name(strings)?.to_owned(), *count)))
        .collect()
}

impl IndexRecord {
    pub fn to_doc(&self, strings: &StringInterner) -> Result<RecordDoc> {
        Ok(RecordDoc {
            nhs_number: self.nhs_number,
            index_date: self.index_date.seconds(),
            index_date_readable: self.index_date.to_string(),
            presentation: self.presentation.as_str(),
            inclusion_trigger: self.trigger.as_str(),
            age_at_index: self.age_at_index,
            counts_before: named_counts(self.counts.counts_before(), strings)?,
            counts_after: named_counts(self.counts.counts_after(), strings)?,
            survival_time: self.survival_time,
            cause_of_death: self.cause_of_death.as_str(),
        })
    }
}

/// Knobs for [`extract_records`] that do not come from the code groups.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub window_seconds: i64,
    /// Patients between checks of the cancellation flag.
    pub cancel_interval: usize,
    /// Set by the host to abort a long scan at the next patient boundary.
    pub cancel: Arc<AtomicBool>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            window_seconds: crate::config::DEFAULT_WINDOW,
            cancel_interval: 10,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Run the whole extraction over an ordered row stream.
///
/// `on_record` sees every record as it is emitted (with the interner for
/// resolving names), so record documents can be streamed to a file without
/// holding them all in memory. Patients whose data violates an invariant are
/// logged and skipped; `NoMoreRows` ends the pass.
pub fn extract_records<B: RowBuffer>(
    rows: &mut B,
    parser: &mut CodeParser,
    strings: &mut StringInterner,
    groups: &Metagroups,
    options: &ExtractOptions,
    mut on_record: impl FnMut(&IndexRecord, &StringInterner) -> Result<()>,
) -> Result<RecordTable> {
    let mut table = RecordTable::new(parser, strings);
    let mut patients_seen = 0usize;
    loop {
        let patient = match Patient::read(rows, parser, strings) {
            Ok(patient) => patient,
            Err(RowError::NoMoreRows) => break,
            Err(e) => return Err(e).context("reading patient block"),
        };
        patients_seen += 1;
        if options.cancel_interval > 0
            && patients_seen % options.cancel_interval == 0
            && options.cancel.load(Ordering::Relaxed)
        {
            bail!("extraction cancelled by host after {} patients", patients_seen);
        }
        if patient.empty() {
            continue;
        }
        match patient_records(&patient, groups, options.window_seconds) {
            Ok(records) => {
                for record in records {
                    table.push(&record);
                    on_record(&record, strings)?;
                }
            }
            Err(e) => {
                event!(
                    Level::WARN,
                    "skipping patient {}: {}",
                    patient.nhs_number,
                    e
                );
            }
        }
    }
    event!(
        Level::INFO,
        "extracted {} records from {} patients",
        table.len(),
        patients_seen
    );
    Ok(table)
}
