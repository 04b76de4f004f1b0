//! Synthetic episode extracts.
//!
//! Generates a random, correctly-ordered episode table whose codes are drawn
//! from real taxonomies. Useful for exercising the whole pass without access
//! to patient data, and for profiling against larger inputs.

use crate::codes::{CodeKind, CodeParser};
use crate::row::{InMemoryRows, Timestamp, Value};
use crate::Result;
use rand::Rng;
use std::io;

#[derive(Debug, Clone)]
pub struct SynthOptions {
    pub patients: usize,
    /// Spells per patient, uniform on `1..=max_spells`.
    pub max_spells: usize,
    /// Episodes per spell, uniform on `1..=max_episodes`.
    pub max_episodes: usize,
    /// How many `secondary_diagnosis_<n>` / `secondary_procedure_<n>`
    /// columns the table carries.
    pub secondary_columns: usize,
    /// Fraction of patients generated with mortality data.
    pub deceased_fraction: f64,
    /// Unix timestamp the first admissions are scattered after.
    pub start: i64,
}

impl Default for SynthOptions {
    fn default() -> Self {
        SynthOptions {
            patients: 10,
            max_spells: 5,
            max_episodes: 7,
            secondary_columns: 2,
            deceased_fraction: 0.2,
            // 2010-01-01
            start: 1_262_304_000,
        }
    }
}

const DAY: i64 = 86400;

/// Generate a column-major episode table ordered by
/// `(nhs_number, spell_id, episode_start)`.
pub fn synthetic_columns<R: Rng>(
    parser: &CodeParser,
    options: &SynthOptions,
    rng: &mut R,
) -> Vec<(String, Vec<Value>)> {
    let mut columns: Vec<(String, Vec<Value>)> = vec![
        ("nhs_number".to_owned(), vec![]),
        ("spell_id".to_owned(), vec![]),
        ("spell_start".to_owned(), vec![]),
        ("spell_end".to_owned(), vec![]),
        ("age_at_episode".to_owned(), vec![]),
        ("episode_start".to_owned(), vec![]),
        ("episode_end".to_owned(), vec![]),
        ("primary_diagnosis".to_owned(), vec![]),
        ("primary_procedure".to_owned(), vec![]),
    ];
    for n in 0..options.secondary_columns {
        columns.push((format!("secondary_diagnosis_{}", n), vec![]));
    }
    for n in 0..options.secondary_columns {
        columns.push((format!("secondary_procedure_{}", n), vec![]));
    }
    columns.push(("date_of_death".to_owned(), vec![]));
    columns.push(("cause_of_death".to_owned(), vec![]));
    columns.push(("age_at_death".to_owned(), vec![]));

    fn push_row(columns: &mut [(String, Vec<Value>)], cells: Vec<Value>) {
        for (column, cell) in columns.iter_mut().zip(cells) {
            column.1.push(cell);
        }
    }

    for patient in 0..options.patients {
        let nhs_number = 100_000 + patient as i64;
        let age = rng.gen_range(40..95);
        // Admissions start at a random point in the two years after `start`.
        let mut time = options.start + rng.gen_range(0..2 * 365) * DAY;

        let deceased = rng.gen_bool(options.deceased_fraction);
        let (date_of_death, cause_of_death, age_at_death) = if deceased {
            (
                Value::from(Timestamp::new(
                    options.start + rng.gen_range(4 * 365..6 * 365) * DAY,
                )),
                Value::from(parser.random_code(CodeKind::Diagnosis, rng)),
                Value::Integer(age + 1),
            )
        } else {
            (Value::Null, Value::Null, Value::Null)
        };

        for spell in 0..rng.gen_range(1..=options.max_spells) {
            let spell_id = format!("{}-{}", nhs_number, spell);
            let spell_start = time;
            let episodes = rng.gen_range(1..=options.max_episodes);
            let spell_end = spell_start + episodes as i64 * DAY;
            for _ in 0..episodes {
                let mut cells = vec![
                    Value::Integer(nhs_number),
                    Value::Varchar(spell_id.clone()),
                    Value::from(Timestamp::new(spell_start)),
                    Value::from(Timestamp::new(spell_end)),
                    Value::Integer(age),
                    Value::from(Timestamp::new(time)),
                    Value::from(Timestamp::new(time + DAY)),
                    Value::from(parser.random_code(CodeKind::Diagnosis, rng)),
                    Value::from(parser.random_code(CodeKind::Procedure, rng)),
                ];
                for _ in 0..options.secondary_columns {
                    cells.push(secondary(parser, CodeKind::Diagnosis, rng));
                }
                for _ in 0..options.secondary_columns {
                    cells.push(secondary(parser, CodeKind::Procedure, rng));
                }
                cells.push(date_of_death.clone());
                cells.push(cause_of_death.clone());
                cells.push(age_at_death.clone());
                push_row(&mut columns, cells);
                time += DAY;
            }
            // Gap before the next admission.
            time += rng.gen_range(1..90) * DAY;
        }
    }
    columns
}

fn secondary<R: Rng>(parser: &CodeParser, kind: CodeKind, rng: &mut R) -> Value {
    if rng.gen_bool(0.5) {
        Value::from(parser.random_code(kind, rng))
    } else {
        Value::Null
    }
}

/// The same table behind the row-buffer interface.
pub fn synthetic_rows<R: Rng>(
    parser: &CodeParser,
    options: &SynthOptions,
    rng: &mut R,
) -> Result<InMemoryRows> {
    InMemoryRows::new(synthetic_columns(parser, options, rng))
}

/// Write a column-major table as CSV, with NULLs as empty cells and
/// timestamps as unix seconds.
pub fn write_csv<W: io::Write>(columns: &[(String, Vec<Value>)], writer: W) -> Result {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(columns.iter().map(|(name, _)| name.as_str()))?;
    let num_rows = columns.first().map(|(_, cells)| cells.len()).unwrap_or(0);
    for row in 0..num_rows {
        let cells = columns.iter().map(|(_, cells)| match &cells[row] {
            Value::Null => String::new(),
            Value::Varchar(s) => s.clone(),
            Value::Integer(v) => v.to_string(),
            Value::Timestamp(t) => t.seconds().to_string(),
        });
        writer.write_record(cells)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{synthetic_columns, synthetic_rows, write_csv, SynthOptions};
    use crate::codes::{CodeKind, CodeParser, CodeTree};
    use crate::intern::StringInterner;
    use crate::patient::Patient;
    use crate::row::{CsvRows, RowBuffer, RowError};
    use rand::{rngs::StdRng, SeedableRng};

    fn parser() -> CodeParser {
        let diagnoses = r#"
groups: [acs_stemi]
categories:
- name: I21
  docs: acute myocardial infarction
  index: I21
  categories:
  - name: I21.0
    docs: anterior wall
    index: I210
  - name: I21.4
    docs: subendocardial
    index: I214
    exclude: [acs_stemi]
- name: Z00
  docs: general examination
  index: Z00
  exclude: [acs_stemi]
"#;
        let procedures = r#"
groups: [pci]
categories:
- name: K43.2
  docs: balloon angioplasty
  index: K432
"#;
        CodeParser::new(
            CodeTree::from_reader(diagnoses.as_bytes()).unwrap(),
            CodeTree::from_reader(procedures.as_bytes()).unwrap(),
        )
    }

    #[test]
    fn rows_are_ordered_and_codes_parse() {
        let mut parser = parser();
        let mut strings = StringInterner::new();
        let mut rng = StdRng::seed_from_u64(5);
        let options = SynthOptions {
            patients: 6,
            ..SynthOptions::default()
        };
        let mut rows = synthetic_rows(&parser, &options, &mut rng).unwrap();

        let mut last_nhs = None;
        loop {
            let patient = match Patient::read(&mut rows, &mut parser, &mut strings) {
                Ok(patient) => patient,
                Err(RowError::NoMoreRows) => break,
                Err(e) => panic!("unexpected row error: {}", e),
            };
            // Patient blocks arrive in ascending, disjoint order.
            assert!(last_nhs < Some(patient.nhs_number));
            last_nhs = Some(patient.nhs_number);
            for spell in &patient.spells {
                for episode in &spell.episodes {
                    assert!(episode.primary_diagnosis.is_valid());
                    assert!(episode.primary_procedure.is_valid());
                }
            }
        }
        assert_eq!(last_nhs, Some(100_005));
        // Every canonical form seen maps to a memoised entry.
        assert!(parser.cache_size(CodeKind::Diagnosis) <= 3);
    }

    #[test]
    fn csv_round_trip_preserves_the_first_row() {
        let parser = parser();
        let mut rng = StdRng::seed_from_u64(11);
        let options = SynthOptions {
            patients: 2,
            ..SynthOptions::default()
        };
        let columns = synthetic_columns(&parser, &options, &mut rng);
        let mut out = Vec::new();
        write_csv(&columns, &mut out).unwrap();

        let rows = CsvRows::new(out.as_slice()).unwrap();
        assert_eq!(rows.integer("nhs_number"), Ok(100_000));
        let raw = rows.varchar("primary_diagnosis").unwrap();
        assert!(["I21.0", "I21.4", "Z00"].contains(&raw));
    }
}
