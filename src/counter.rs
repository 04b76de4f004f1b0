//! Occurrence counts of code groups either side of an index event.

use crate::codes::CodeGroup;
use std::collections::BTreeMap;

/// Group occurrence counts, split into before/after the index date.
///
/// Counting is by occurrence: the same group reached through several codes,
/// episodes or spells increments once per code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCounter {
    before: BTreeMap<CodeGroup, u64>,
    after: BTreeMap<CodeGroup, u64>,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_before(&mut self, group: CodeGroup) {
        *self.before.entry(group).or_insert(0) += 1;
    }

    pub fn push_after(&mut self, group: CodeGroup) {
        *self.after.entry(group).or_insert(0) += 1;
    }

    pub fn counts_before(&self) -> &BTreeMap<CodeGroup, u64> {
        &self.before
    }

    pub fn counts_after(&self) -> &BTreeMap<CodeGroup, u64> {
        &self.after
    }

    /// Count for `group` before the index; zero when never pushed.
    pub fn before(&self, group: CodeGroup) -> u64 {
        self.before.get(&group).copied().unwrap_or(0)
    }

    pub fn after(&self, group: CodeGroup) -> u64 {
        self.after.get(&group).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::EventCounter;
    use crate::codes::CodeGroup;
    use crate::intern::StringInterner;

    #[test]
    fn counts_occurrences() {
        let mut strings = StringInterner::new();
        let bleeding = CodeGroup::new("bleeding", &mut strings);
        let acs = CodeGroup::new("acs_stemi", &mut strings);
        let mut counter = EventCounter::new();
        counter.push_before(bleeding);
        counter.push_before(bleeding);
        counter.push_after(acs);
        assert_eq!(counter.before(bleeding), 2);
        assert_eq!(counter.after(bleeding), 0);
        assert_eq!(counter.after(acs), 1);
        assert_eq!(counter.counts_before().len(), 1);
    }
}
