//! Typed, cursor-style access to a stream of episode rows.
//!
//! The extraction pass is written against the [`RowBuffer`] trait so the same
//! code runs over a real extract ([`CsvRows`]) and over in-memory fixtures
//! ([`InMemoryRows`]). A buffer is always positioned on exactly one current
//! row; `fetch_next_row` advances it, and [`RowError::NoMoreRows`] is the
//! normal end-of-stream signal.

use crate::Result;
use chrono::NaiveDateTime;
use qu::ick_use::*;
use std::collections::BTreeMap;
use std::{fmt, fs, io, ops, path::Path};
use thiserror::Error;

/// The ways a typed column read (or a cursor step) can fail.
///
/// `Null` is recoverable wherever the data model allows a missing value;
/// `NoMoreRows` is ordinary termination. The other two are schema problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("value is null")]
    Null,
    #[error("column '{0}' not found")]
    ColumnNotFound(String),
    #[error("column '{0}' has the wrong type")]
    WrongType(String),
    #[error("no more rows")]
    NoMoreRows,
}

/// An absolute time, stored as unix seconds (the source system's convention).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(unix_seconds: i64) -> Self {
        Timestamp(unix_seconds)
    }

    pub fn seconds(self) -> i64 {
        self.0
    }
}

/// The offset between two timestamps, in seconds.
impl ops::Sub for Timestamp {
    type Output = i64;
    fn sub(self, rhs: Timestamp) -> i64 {
        self.0 - rhs.0
    }
}

impl ops::Add<i64> for Timestamp {
    type Output = Timestamp;
    fn add(self, offset_seconds: i64) -> Timestamp {
        Timestamp(self.0 + offset_seconds)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match chrono::DateTime::from_timestamp(self.0, 0) {
            Some(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "timestamp({})", self.0),
        }
    }
}

/// Read rows one at a time through typed, named columns.
///
/// Reads never consume the row; the cursor only moves on `fetch_next_row`.
/// A SQL-NULL (or empty) cell reads as `Err(RowError::Null)`.
pub trait RowBuffer {
    fn varchar(&self, column: &str) -> Result<&str, RowError>;
    fn integer(&self, column: &str) -> Result<i64, RowError>;
    fn timestamp(&self, column: &str) -> Result<Timestamp, RowError>;

    /// Advance to the next row. `Err(NoMoreRows)` leaves the buffer
    /// exhausted; every later read also returns `NoMoreRows`.
    fn fetch_next_row(&mut self) -> Result<(), RowError>;
}

/// One typed cell of an in-memory table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Varchar(String),
    Integer(i64),
    Timestamp(Timestamp),
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Varchar(s.to_owned())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Integer(v)
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Value {
        Value::Timestamp(t)
    }
}

/// A column-major in-memory table behind the [`RowBuffer`] interface.
///
/// Used by the tests and by the synthetic data generator.
#[derive(Debug)]
pub struct InMemoryRows {
    columns: BTreeMap<String, Vec<Value>>,
    num_rows: usize,
    row: usize,
    exhausted: bool,
}

impl InMemoryRows {
    /// All columns must have the same number of rows. A table with zero rows
    /// constructs in the exhausted state.
    pub fn new(columns: impl IntoIterator<Item = (String, Vec<Value>)>) -> Result<Self> {
        let columns: BTreeMap<_, _> = columns.into_iter().collect();
        let num_rows = columns.values().next().map(Vec::len).unwrap_or(0);
        for (name, cells) in &columns {
            ensure!(
                cells.len() == num_rows,
                "column '{}' has {} rows, expected {}",
                name,
                cells.len(),
                num_rows
            );
        }
        Ok(InMemoryRows {
            columns,
            num_rows,
            row: 0,
            exhausted: num_rows == 0,
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys().map(String::as_str)
    }

    fn cell(&self, column: &str) -> Result<&Value, RowError> {
        if self.exhausted {
            return Err(RowError::NoMoreRows);
        }
        let cells = self
            .columns
            .get(column)
            .ok_or_else(|| RowError::ColumnNotFound(column.to_owned()))?;
        Ok(&cells[self.row])
    }
}

impl RowBuffer for InMemoryRows {
    fn varchar(&self, column: &str) -> Result<&str, RowError> {
        match self.cell(column)? {
            Value::Varchar(s) => Ok(s),
            Value::Null => Err(RowError::Null),
            _ => Err(RowError::WrongType(column.to_owned())),
        }
    }

    fn integer(&self, column: &str) -> Result<i64, RowError> {
        match self.cell(column)? {
            Value::Integer(v) => Ok(*v),
            Value::Null => Err(RowError::Null),
            _ => Err(RowError::WrongType(column.to_owned())),
        }
    }

    fn timestamp(&self, column: &str) -> Result<Timestamp, RowError> {
        match self.cell(column)? {
            Value::Timestamp(t) => Ok(*t),
            Value::Null => Err(RowError::Null),
            _ => Err(RowError::WrongType(column.to_owned())),
        }
    }

    fn fetch_next_row(&mut self) -> Result<(), RowError> {
        if self.exhausted {
            return Err(RowError::NoMoreRows);
        }
        self.row += 1;
        if self.row == self.num_rows {
            self.exhausted = true;
            return Err(RowError::NoMoreRows);
        }
        Ok(())
    }
}

/// A CSV extract behind the [`RowBuffer`] interface.
///
/// Cells are untyped text, so the typed readers parse on demand: an empty
/// cell is NULL, an unparseable cell is `WrongType`. Timestamps accept unix
/// seconds or `YYYY-mm-dd HH:MM:SS`.
pub struct CsvRows<R: io::Read> {
    reader: csv::Reader<R>,
    header: BTreeMap<String, usize>,
    current: csv::StringRecord,
    exhausted: bool,
}

impl CsvRows<fs::File> {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path)
            .with_context(|| format!("opening episode extract \"{}\"", path.display()))?;
        Self::new(file)
    }
}

impl<R: io::Read> CsvRows<R> {
    /// Read the header and position the cursor on the first row.
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let header = reader
            .headers()
            .context("reading extract header")?
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_owned(), idx))
            .collect();
        let mut this = CsvRows {
            reader,
            header,
            current: csv::StringRecord::new(),
            exhausted: false,
        };
        // Load the first row; an empty extract starts exhausted.
        match this.advance() {
            Ok(()) => {}
            Err(RowError::NoMoreRows) => this.exhausted = true,
            Err(e) => return Err(e).context("reading first row of extract"),
        }
        Ok(this)
    }

    fn advance(&mut self) -> Result<(), RowError> {
        match self.reader.read_record(&mut self.current) {
            Ok(true) => Ok(()),
            Ok(false) => Err(RowError::NoMoreRows),
            // A malformed record means the cells cannot be trusted; surface
            // it as a typing problem on the whole row.
            Err(e) => Err(RowError::WrongType(format!("malformed record: {}", e))),
        }
    }

    fn cell(&self, column: &str) -> Result<&str, RowError> {
        if self.exhausted {
            return Err(RowError::NoMoreRows);
        }
        let idx = self
            .header
            .get(column)
            .ok_or_else(|| RowError::ColumnNotFound(column.to_owned()))?;
        match self.current.get(*idx) {
            Some("") | None => Err(RowError::Null),
            Some(cell) => Ok(cell),
        }
    }
}

impl<R: io::Read> RowBuffer for CsvRows<R> {
    fn varchar(&self, column: &str) -> Result<&str, RowError> {
        self.cell(column)
    }

    fn integer(&self, column: &str) -> Result<i64, RowError> {
        let cell = self.cell(column)?;
        cell.parse()
            .map_err(|_| RowError::WrongType(column.to_owned()))
    }

    fn timestamp(&self, column: &str) -> Result<Timestamp, RowError> {
        let cell = self.cell(column)?;
        if let Ok(seconds) = cell.parse::<i64>() {
            return Ok(Timestamp::new(seconds));
        }
        NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S")
            .map(|datetime| Timestamp::new(datetime.and_utc().timestamp()))
            .map_err(|_| RowError::WrongType(column.to_owned()))
    }

    fn fetch_next_row(&mut self) -> Result<(), RowError> {
        if self.exhausted {
            return Err(RowError::NoMoreRows);
        }
        match self.advance() {
            Err(RowError::NoMoreRows) => {
                self.exhausted = true;
                Err(RowError::NoMoreRows)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CsvRows, InMemoryRows, RowBuffer, RowError, Timestamp, Value};

    fn two_rows() -> InMemoryRows {
        InMemoryRows::new([
            (
                "nhs_number".to_owned(),
                vec![Value::Integer(1), Value::Integer(2)],
            ),
            (
                "spell_id".to_owned(),
                vec![Value::from("A"), Value::Null],
            ),
            (
                "spell_start".to_owned(),
                vec![
                    Value::from(Timestamp::new(100)),
                    Value::from(Timestamp::new(200)),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn typed_reads_and_nulls() {
        let rows = two_rows();
        assert_eq!(
            rows.column_names().collect::<Vec<_>>(),
            vec!["nhs_number", "spell_id", "spell_start"]
        );
        assert_eq!(rows.integer("nhs_number"), Ok(1));
        assert_eq!(rows.varchar("spell_id"), Ok("A"));
        assert_eq!(rows.timestamp("spell_start"), Ok(Timestamp::new(100)));
        assert_eq!(
            rows.varchar("nhs_number"),
            Err(RowError::WrongType("nhs_number".to_owned()))
        );
        assert_eq!(
            rows.integer("no_such_column"),
            Err(RowError::ColumnNotFound("no_such_column".to_owned()))
        );
    }

    #[test]
    fn cursor_protocol() {
        let mut rows = two_rows();
        rows.fetch_next_row().unwrap();
        assert_eq!(rows.integer("nhs_number"), Ok(2));
        assert_eq!(rows.varchar("spell_id"), Err(RowError::Null));
        assert_eq!(rows.fetch_next_row(), Err(RowError::NoMoreRows));
        // Exhausted buffers keep reporting NoMoreRows on every operation.
        assert_eq!(rows.integer("nhs_number"), Err(RowError::NoMoreRows));
        assert_eq!(rows.fetch_next_row(), Err(RowError::NoMoreRows));
    }

    #[test]
    fn empty_table_starts_exhausted() {
        let rows = InMemoryRows::new([("nhs_number".to_owned(), vec![])]).unwrap();
        assert_eq!(rows.integer("nhs_number"), Err(RowError::NoMoreRows));
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let result = InMemoryRows::new([
            ("a".to_owned(), vec![Value::Integer(1)]),
            ("b".to_owned(), vec![]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn csv_reads_types_on_demand() {
        let data = "\
nhs_number,primary_diagnosis,episode_start
1,I21.0,1262304000
1,,2010-01-02 00:00:00
";
        let mut rows = CsvRows::new(data.as_bytes()).unwrap();
        assert_eq!(rows.integer("nhs_number"), Ok(1));
        assert_eq!(rows.varchar("primary_diagnosis"), Ok("I21.0"));
        assert_eq!(
            rows.integer("primary_diagnosis"),
            Err(RowError::WrongType("primary_diagnosis".to_owned()))
        );
        assert_eq!(
            rows.timestamp("episode_start"),
            Ok(Timestamp::new(1262304000))
        );
        rows.fetch_next_row().unwrap();
        assert_eq!(rows.varchar("primary_diagnosis"), Err(RowError::Null));
        // 2010-01-02 is one day after the first row's timestamp.
        assert_eq!(
            rows.timestamp("episode_start"),
            Ok(Timestamp::new(1262304000 + 86400))
        );
        assert_eq!(rows.fetch_next_row(), Err(RowError::NoMoreRows));
    }

    #[test]
    fn timestamps_order_and_subtract() {
        let a = Timestamp::new(100);
        let b = Timestamp::new(350);
        assert!(a < b);
        assert_eq!(b - a, 250);
        assert_eq!(a + 250, b);
        assert_eq!(Timestamp::new(0).to_string(), "1970-01-01 00:00:00");
    }
}
