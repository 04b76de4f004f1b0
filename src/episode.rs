//! One consultant episode, read from a single row.

use crate::codes::{ClinicalCode, CodeKind, CodeParser};
use crate::intern::StringInterner;
use crate::row::{RowBuffer, RowError, Timestamp};

/// A contiguous period of care under one responsible clinician.
///
/// Secondary code lists keep their column order and may contain duplicates
/// and invalid codes; null entries are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub start: Timestamp,
    pub end: Timestamp,
    pub age_at_episode: Option<i64>,
    pub primary_diagnosis: ClinicalCode,
    pub primary_procedure: ClinicalCode,
    pub secondary_diagnoses: Vec<ClinicalCode>,
    pub secondary_procedures: Vec<ClinicalCode>,
}

/// Read one code column, mapping a NULL cell to the null code.
fn code_column<B: RowBuffer>(
    rows: &B,
    column: &str,
    kind: CodeKind,
    parser: &mut CodeParser,
    strings: &mut StringInterner,
) -> Result<ClinicalCode, RowError> {
    match rows.varchar(column) {
        Ok(raw) => Ok(parser.parse(kind, raw, strings)),
        Err(RowError::Null) => Ok(ClinicalCode::Null),
        Err(e) => Err(e),
    }
}

/// Read the block of `<prefix>0`, `<prefix>1`, ... columns.
///
/// The block ends at the first column that does not exist. Cells that are
/// NULL (or preprocess to nothing) are skipped without ending the scan, so a
/// sparse row still yields the codes it does carry.
fn secondary_codes<B: RowBuffer>(
    rows: &B,
    prefix: &str,
    kind: CodeKind,
    parser: &mut CodeParser,
    strings: &mut StringInterner,
) -> Result<Vec<ClinicalCode>, RowError> {
    let mut codes = Vec::new();
    for n in 0.. {
        let column = format!("{}{}", prefix, n);
        match code_column(rows, &column, kind, parser, strings) {
            Ok(code) => {
                if !code.is_null() {
                    codes.push(code);
                }
            }
            Err(RowError::ColumnNotFound(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(codes)
}

impl Episode {
    /// Read an episode from the current row. Does not advance the cursor.
    ///
    /// Expects `age_at_episode` (nullable), `episode_start`, `episode_end`,
    /// `primary_diagnosis` and `primary_procedure`, plus the optional
    /// `secondary_diagnosis_<n>` / `secondary_procedure_<n>` blocks.
    pub fn read<B: RowBuffer>(
        rows: &B,
        parser: &mut CodeParser,
        strings: &mut StringInterner,
    ) -> Result<Episode, RowError> {
        let age_at_episode = match rows.integer("age_at_episode") {
            Ok(age) => Some(age),
            Err(RowError::Null) => None,
            Err(e) => return Err(e),
        };
        let start = rows.timestamp("episode_start")?;
        let end = rows.timestamp("episode_end")?;
        let primary_diagnosis = code_column(
            rows,
            "primary_diagnosis",
            CodeKind::Diagnosis,
            parser,
            strings,
        )?;
        let primary_procedure = code_column(
            rows,
            "primary_procedure",
            CodeKind::Procedure,
            parser,
            strings,
        )?;
        let secondary_diagnoses = secondary_codes(
            rows,
            "secondary_diagnosis_",
            CodeKind::Diagnosis,
            parser,
            strings,
        )?;
        let secondary_procedures = secondary_codes(
            rows,
            "secondary_procedure_",
            CodeKind::Procedure,
            parser,
            strings,
        )?;
        Ok(Episode {
            start,
            end,
            age_at_episode,
            primary_diagnosis,
            primary_procedure,
            secondary_diagnoses,
            secondary_procedures,
        })
    }

    /// Every code recorded on this episode: primaries first, then the
    /// secondaries in column order.
    pub fn all_codes(&self) -> impl Iterator<Item = &ClinicalCode> + '_ {
        [&self.primary_diagnosis, &self.primary_procedure]
            .into_iter()
            .chain(&self.secondary_diagnoses)
            .chain(&self.secondary_procedures)
    }

    pub fn secondaries(&self, kind: CodeKind) -> &[ClinicalCode] {
        match kind {
            CodeKind::Diagnosis => &self.secondary_diagnoses,
            CodeKind::Procedure => &self.secondary_procedures,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Episode;
    use crate::codes::{ClinicalCode, CodeParser, CodeTree};
    use crate::intern::StringInterner;
    use crate::row::{InMemoryRows, RowError, Timestamp, Value};

    fn parser() -> CodeParser {
        let diagnoses = r#"
groups: [acs_stemi]
categories:
- name: I21.0
  docs: acute transmural infarction of anterior wall
  index: I210
- name: Z00
  docs: general examination
  index: Z00
  exclude: [acs_stemi]
"#;
        let procedures = r#"
groups: [pci]
categories:
- name: K43.2
  docs: percutaneous balloon angioplasty
  index: K432
"#;
        CodeParser::new(
            CodeTree::from_reader(diagnoses.as_bytes()).unwrap(),
            CodeTree::from_reader(procedures.as_bytes()).unwrap(),
        )
    }

    fn episode_row(columns: Vec<(&str, Value)>) -> InMemoryRows {
        InMemoryRows::new(
            columns
                .into_iter()
                .map(|(name, value)| (name.to_owned(), vec![value])),
        )
        .unwrap()
    }

    fn base_columns() -> Vec<(&'static str, Value)> {
        vec![
            ("age_at_episode", Value::Integer(65)),
            ("episode_start", Value::from(Timestamp::new(1000))),
            ("episode_end", Value::from(Timestamp::new(2000))),
            ("primary_diagnosis", Value::from("I21.0")),
            ("primary_procedure", Value::from("K43.2")),
        ]
    }

    #[test]
    fn reads_required_columns() {
        let rows = episode_row(base_columns());
        let mut parser = parser();
        let mut strings = StringInterner::new();
        let episode = Episode::read(&rows, &mut parser, &mut strings).unwrap();
        assert_eq!(episode.start, Timestamp::new(1000));
        assert_eq!(episode.end, Timestamp::new(2000));
        assert_eq!(episode.age_at_episode, Some(65));
        assert_eq!(episode.primary_diagnosis.name(&strings).unwrap(), "I21.0");
        assert_eq!(episode.primary_procedure.name(&strings).unwrap(), "K43.2");
        assert!(episode.secondary_diagnoses.is_empty());
        assert!(episode.secondary_procedures.is_empty());
    }

    #[test]
    fn null_age_and_null_codes_are_values() {
        let mut columns = base_columns();
        columns[0].1 = Value::Null;
        columns[3].1 = Value::Null;
        let rows = episode_row(columns);
        let mut parser = parser();
        let mut strings = StringInterner::new();
        let episode = Episode::read(&rows, &mut parser, &mut strings).unwrap();
        assert_eq!(episode.age_at_episode, None);
        assert!(episode.primary_diagnosis.is_null());
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let mut columns = base_columns();
        columns.remove(1);
        let rows = episode_row(columns);
        let mut parser = parser();
        let mut strings = StringInterner::new();
        assert_eq!(
            Episode::read(&rows, &mut parser, &mut strings),
            Err(RowError::ColumnNotFound("episode_start".to_owned()))
        );
    }

    #[test]
    fn secondary_scan_skips_nulls_and_stops_on_missing_column() {
        let mut columns = base_columns();
        columns.push(("secondary_diagnosis_0", Value::from("Z00")));
        columns.push(("secondary_diagnosis_1", Value::Null));
        columns.push(("secondary_diagnosis_2", Value::from("I210")));
        // no secondary_diagnosis_3 column: scan ends there
        let rows = episode_row(columns);
        let mut parser = parser();
        let mut strings = StringInterner::new();
        let episode = Episode::read(&rows, &mut parser, &mut strings).unwrap();
        let names: Vec<_> = episode
            .secondary_diagnoses
            .iter()
            .map(|code| code.name(&strings).unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["Z00", "I21.0"]);
    }

    #[test]
    fn invalid_secondaries_flow_through() {
        let mut columns = base_columns();
        columns.push(("secondary_diagnosis_0", Value::from("XYZ")));
        let rows = episode_row(columns);
        let mut parser = parser();
        let mut strings = StringInterner::new();
        let episode = Episode::read(&rows, &mut parser, &mut strings).unwrap();
        assert_eq!(episode.secondary_diagnoses.len(), 1);
        assert!(matches!(
            episode.secondary_diagnoses[0],
            ClinicalCode::Invalid { .. }
        ));
        assert_eq!(episode.secondary_diagnoses[0].groups().count(), 0);
    }
}
