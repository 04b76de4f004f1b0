//! One hospital spell, read from a contiguous block of rows.

use crate::codes::CodeParser;
use crate::episode::Episode;
use crate::intern::StringInterner;
use crate::row::{RowBuffer, RowError, Timestamp};

/// A contiguous hospital stay: one or more episodes sharing a `spell_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spell {
    pub id: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub episodes: Vec<Episode>,
}

impl Spell {
    /// Read the block of rows sharing the current row's `spell_id`.
    ///
    /// On return the cursor sits on the first row of the next block, or the
    /// stream is exhausted; either way the spell itself is complete. The
    /// caller identifies the end of the stream by its own next read.
    pub fn read<B: RowBuffer>(
        rows: &mut B,
        parser: &mut CodeParser,
        strings: &mut StringInterner,
    ) -> Result<Spell, RowError> {
        let id = rows.varchar("spell_id")?.to_owned();
        let start = rows.timestamp("spell_start")?;
        let end = rows.timestamp("spell_end")?;
        let mut episodes = Vec::new();
        loop {
            episodes.push(Episode::read(rows, parser, strings)?);
            match rows.fetch_next_row() {
                Ok(()) => {}
                Err(RowError::NoMoreRows) => break,
                Err(e) => return Err(e),
            }
            if rows.varchar("spell_id")? != id {
                break;
            }
        }
        Ok(Spell {
            id,
            start,
            end,
            episodes,
        })
    }

    pub fn first_episode(&self) -> Option<&Episode> {
        self.episodes.first()
    }
}
