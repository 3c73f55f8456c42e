//! Occurrence table shared by the per-file deltas and the global aggregate.

use std::collections::HashMap;

/// Per-function counters. `definition_site` is written at most once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    pub occurrences: u64,
    pub definition_site: Option<String>,
}

impl FunctionRecord {
    fn absorb(&mut self, other: &FunctionRecord) {
        self.occurrences += other.occurrences;
        if self.definition_site.is_none() {
            self.definition_site = other.definition_site.clone();
        }
    }
}

/// Function name (`name()`) to record, iterated in first-observation order.
#[derive(Debug, Default, Clone)]
pub struct OccurrenceTable {
    entries: Vec<(String, FunctionRecord)>,
    index: HashMap<String, usize>,
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_function_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => chars.all(is_identifier_char),
        _ => false,
    }
}

pub fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

pub fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Table key for a bare function name.
pub fn function_key(name: &str) -> String {
    format!("{}()", name)
}

impl OccurrenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FunctionRecord> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FunctionRecord)> {
        self.entries
            .iter()
            .map(|(key, record)| (key.as_str(), record))
    }

    /// Counts one call site. Names outside the identifier grammar are dropped.
    pub fn record_call(&mut self, name: &str) {
        if !is_valid_function_name(name) {
            return;
        }
        self.entry(function_key(name)).occurrences += 1;
    }

    /// Records where `name` was defined unless a site is already known.
    pub fn record_definition(&mut self, name: &str, site: String) {
        if !is_valid_function_name(name) {
            return;
        }
        let record = self.entry(function_key(name));
        if record.definition_site.is_none() {
            record.definition_site = Some(site);
        }
    }

    /// Sums occurrences key by key and fills definition sites that are still empty.
    pub fn merge(&mut self, other: &OccurrenceTable) {
        for (key, record) in &other.entries {
            self.entry(key.clone()).absorb(record);
        }
    }

    fn entry(&mut self, key: String) -> &mut FunctionRecord {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.index.insert(key.clone(), slot);
                self.entries.push((key, FunctionRecord::default()));
                slot
            }
        };
        &mut self.entries[slot].1
    }
}

impl PartialEq for OccurrenceTable {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, record)| other.get(key) == Some(record))
    }
}

impl Eq for OccurrenceTable {}
