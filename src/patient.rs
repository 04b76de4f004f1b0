//! One patient, read from a contiguous block of rows.

use crate::codes::CodeParser;
use crate::intern::StringInterner;
use crate::mortality::Mortality;
use crate::row::{RowBuffer, RowError};
use crate::spell::Spell;

/// All of a patient's spells together with their mortality data.
///
/// The input stream must be ordered by `(nhs_number, spell_id,
/// episode_start)`; the builders only detect key *changes*, so an unordered
/// stream silently splits patients and spells. That precondition belongs to
/// whoever produced the extract.
#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub nhs_number: i64,
    pub spells: Vec<Spell>,
    pub mortality: Mortality,
}

impl Patient {
    /// Read the block of rows sharing the current row's `nhs_number`.
    ///
    /// Mortality comes from the first row of the block (the columns are
    /// constant within a patient). On return the cursor sits on the first
    /// row of the next patient, or the stream is exhausted. Reading from an
    /// exhausted buffer returns `Err(NoMoreRows)`, which is the pass's
    /// normal termination signal.
    pub fn read<B: RowBuffer>(
        rows: &mut B,
        parser: &mut CodeParser,
        strings: &mut StringInterner,
    ) -> Result<Patient, RowError> {
        let nhs_number = rows.integer("nhs_number")?;
        let mortality = Mortality::read(rows, parser, strings)?;
        let mut spells = Vec::new();
        loop {
            let spell = Spell::read(rows, parser, strings)?;
            // A spell block always yields at least one episode; keep the
            // check anyway so an empty spell can never reach the windowing
            // stage.
            if !spell.episodes.is_empty() {
                spells.push(spell);
            }
            match rows.integer("nhs_number") {
                Ok(n) if n == nhs_number => {}
                Ok(_) | Err(RowError::NoMoreRows) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(Patient {
            nhs_number,
            spells,
            mortality,
        })
    }

    pub fn empty(&self) -> bool {
        self.spells.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::Patient;
    use crate::codes::{CodeParser, CodeTree};
    use crate::intern::StringInterner;
    use crate::row::{InMemoryRows, RowError, Timestamp, Value};
    use std::collections::BTreeSet;

    fn parser() -> CodeParser {
        let diagnoses = r#"
groups: []
categories:
- name: I21.0
  docs: acute transmural infarction of anterior wall
  index: I210
- name: Z00
  docs: general examination
  index: Z00
"#;
        let procedures = r#"
groups: []
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

    fn varchars(cells: &[Option<&str>]) -> Vec<Value> {
        cells
            .iter()
            .map(|cell| match cell {
                Some(s) => Value::from(*s),
                None => Value::Null,
            })
            .collect()
    }

    /// Four rows: patient 1 with spells A (two episodes) and B, then
    /// patient 2 with spell C.
    fn patient_rows() -> InMemoryRows {
        let n = 4;
        InMemoryRows::new([
            (
                "nhs_number".to_owned(),
                vec![
                    Value::Integer(1),
                    Value::Integer(1),
                    Value::Integer(1),
                    Value::Integer(2),
                ],
            ),
            (
                "spell_id".to_owned(),
                varchars(&[Some("A"), Some("A"), Some("B"), Some("C")]),
            ),
            (
                "spell_start".to_owned(),
                vec![
                    Value::from(Timestamp::new(100)),
                    Value::from(Timestamp::new(100)),
                    Value::from(Timestamp::new(5000)),
                    Value::from(Timestamp::new(900)),
                ],
            ),
            (
                "spell_end".to_owned(),
                vec![Value::from(Timestamp::new(9000)); n],
            ),
            ("age_at_episode".to_owned(), vec![Value::Integer(62); n]),
            (
                "episode_start".to_owned(),
                vec![
                    Value::from(Timestamp::new(100)),
                    Value::from(Timestamp::new(200)),
                    Value::from(Timestamp::new(5000)),
                    Value::from(Timestamp::new(900)),
                ],
            ),
            (
                "episode_end".to_owned(),
                vec![Value::from(Timestamp::new(8000)); n],
            ),
            (
                "primary_diagnosis".to_owned(),
                varchars(&[Some("I21.0"), None, Some("Z00"), Some("I21.0")]),
            ),
            (
                "primary_procedure".to_owned(),
                varchars(&[None, Some("K43.2"), None, None]),
            ),
            ("date_of_death".to_owned(), vec![Value::Null; n]),
            ("cause_of_death".to_owned(), vec![Value::Null; n]),
            ("age_at_death".to_owned(), vec![Value::Null; n]),
        ])
        .unwrap()
    }

    #[test]
    fn rebuilds_the_patient_spell_episode_hierarchy() {
        let mut rows = patient_rows();
        let mut parser = parser();
        let mut strings = StringInterner::new();

        let first = Patient::read(&mut rows, &mut parser, &mut strings).unwrap();
        assert_eq!(first.nhs_number, 1);
        assert!(first.mortality.alive());
        assert_eq!(first.spells.len(), 2);
        assert_eq!(first.spells[0].id, "A");
        assert_eq!(first.spells[0].episodes.len(), 2);
        assert_eq!(first.spells[1].id, "B");
        assert_eq!(first.spells[1].episodes.len(), 1);

        let second = Patient::read(&mut rows, &mut parser, &mut strings).unwrap();
        assert_eq!(second.nhs_number, 2);
        assert_eq!(second.spells.len(), 1);
        assert_eq!(second.spells[0].id, "C");

        assert_eq!(
            Patient::read(&mut rows, &mut parser, &mut strings),
            Err(RowError::NoMoreRows)
        );
    }

    #[test]
    fn spell_ids_are_unique_within_a_patient() {
        let mut rows = patient_rows();
        let mut parser = parser();
        let mut strings = StringInterner::new();
        while let Ok(patient) = Patient::read(&mut rows, &mut parser, &mut strings) {
            let ids: BTreeSet<_> = patient.spells.iter().map(|s| s.id.clone()).collect();
            assert_eq!(ids.len(), patient.spells.len());
        }
    }

    #[test]
    fn empty_stream_is_no_more_rows() {
        let mut rows = InMemoryRows::new([("nhs_number".to_owned(), vec![])]).unwrap();
        let mut parser = parser();
        let mut strings = StringInterner::new();
        assert_eq!(
            Patient::read(&mut rows, &mut parser, &mut strings),
            Err(RowError::NoMoreRows)
        );
    }
}
