//! Mortality data, read from the civil registration columns.

use crate::codes::{ClinicalCode, CodeKind, CodeParser};
use crate::intern::StringInterner;
use crate::row::{RowBuffer, RowError, Timestamp};

/// Whether (and how) a patient died.
///
/// The three source columns are constant across a patient's rows, and a
/// patient is alive exactly when all three are NULL. Any populated field
/// means deceased, with whichever details were recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum Mortality {
    Alive,
    Deceased {
        date_of_death: Option<Timestamp>,
        cause_of_death: Option<ClinicalCode>,
        age_at_death: Option<i64>,
    },
}

impl Mortality {
    /// Read `date_of_death`, `cause_of_death` and `age_at_death` from the
    /// current row. The cause is an ICD field, so it is parsed as a
    /// diagnosis.
    pub fn read<B: RowBuffer>(
        rows: &B,
        parser: &mut CodeParser,
        strings: &mut StringInterner,
    ) -> Result<Mortality, RowError> {
        let date_of_death = match rows.timestamp("date_of_death") {
            Ok(date) => Some(date),
            Err(RowError::Null) => None,
            Err(e) => return Err(e),
        };
        let age_at_death = match rows.integer("age_at_death") {
            Ok(age) => Some(age),
            Err(RowError::Null) => None,
            Err(e) => return Err(e),
        };
        let cause_raw = match rows.varchar("cause_of_death") {
            Ok(raw) => Some(raw),
            Err(RowError::Null) => None,
            Err(e) => return Err(e),
        };
        if date_of_death.is_none() && age_at_death.is_none() && cause_raw.is_none() {
            return Ok(Mortality::Alive);
        }
        let cause_of_death =
            cause_raw.map(|raw| parser.parse(CodeKind::Diagnosis, raw, strings));
        Ok(Mortality::Deceased {
            date_of_death,
            cause_of_death,
            age_at_death,
        })
    }

    pub fn alive(&self) -> bool {
        matches!(self, Mortality::Alive)
    }

    pub fn date_of_death(&self) -> Option<Timestamp> {
        match self {
            Mortality::Alive => None,
            Mortality::Deceased { date_of_death, .. } => *date_of_death,
        }
    }

    pub fn cause_of_death(&self) -> Option<&ClinicalCode> {
        match self {
            Mortality::Alive => None,
            Mortality::Deceased { cause_of_death, .. } => cause_of_death.as_ref(),
        }
    }

    pub fn age_at_death(&self) -> Option<i64> {
        match self {
            Mortality::Alive => None,
            Mortality::Deceased { age_at_death, .. } => *age_at_death,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Mortality;
    use crate::codes::{CodeParser, CodeTree};
    use crate::intern::StringInterner;
    use crate::row::{InMemoryRows, Timestamp, Value};

    fn parser() -> CodeParser {
        let diagnoses = r#"
groups: [cardiac_death]
categories:
- name: I21.0
  docs: acute transmural infarction of anterior wall
  index: I210
"#;
        let procedures = "groups: []\ncategories: []\n";
        CodeParser::new(
            CodeTree::from_reader(diagnoses.as_bytes()).unwrap(),
            CodeTree::from_reader(procedures.as_bytes()).unwrap(),
        )
    }

    fn mortality_row(
        date: Value,
        cause: Value,
        age: Value,
    ) -> InMemoryRows {
        InMemoryRows::new([
            ("date_of_death".to_owned(), vec![date]),
            ("cause_of_death".to_owned(), vec![cause]),
            ("age_at_death".to_owned(), vec![age]),
        ])
        .unwrap()
    }

    #[test]
    fn all_null_means_alive() {
        let rows = mortality_row(Value::Null, Value::Null, Value::Null);
        let mut parser = parser();
        let mut strings = StringInterner::new();
        let mortality = Mortality::read(&rows, &mut parser, &mut strings).unwrap();
        assert!(mortality.alive());
        assert_eq!(mortality.date_of_death(), None);
    }

    #[test]
    fn any_populated_field_means_deceased() {
        let rows = mortality_row(
            Value::from(Timestamp::new(86400)),
            Value::from("I21.0"),
            Value::Integer(80),
        );
        let mut parser = parser();
        let mut strings = StringInterner::new();
        let mortality = Mortality::read(&rows, &mut parser, &mut strings).unwrap();
        assert!(!mortality.alive());
        assert_eq!(mortality.date_of_death(), Some(Timestamp::new(86400)));
        assert_eq!(mortality.age_at_death(), Some(80));
        let cause = mortality.cause_of_death().unwrap();
        assert_eq!(cause.name(&strings).unwrap(), "I21.0");
    }

    #[test]
    fn partial_fields_keep_the_gaps() {
        let rows = mortality_row(Value::Null, Value::Null, Value::Integer(91));
        let mut parser = parser();
        let mut strings = StringInterner::new();
        let mortality = Mortality::read(&rows, &mut parser, &mut strings).unwrap();
        assert!(!mortality.alive());
        assert_eq!(mortality.date_of_death(), None);
        assert_eq!(mortality.cause_of_death(), None);
        assert_eq!(mortality.age_at_death(), Some(91));
    }
}
