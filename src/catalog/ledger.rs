use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};

use crate::db::KeyValueStore;
use crate::models::TestRecord;

/// Storage key of the results ledger.
pub const RESULTS_KEY: &str = "testResults";

/// Per-sign recall statistics, one record per catalog template.
///
/// Records of deleted templates are pruned on the next catalog sync.
pub struct ResultsLedger {
    records: Vec<TestRecord>,
    backend: Arc<dyn KeyValueStore>,
}

impl ResultsLedger {
    /// Loads saved records and aligns them with `catalog_names`.
    pub fn load<'a, I>(backend: Arc<dyn KeyValueStore>, catalog_names: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let records = match backend.load(RESULTS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to decode '{RESULTS_KEY}'"))?,
            None => Vec::new(),
        };

        let mut ledger = Self { records, backend };
        ledger.sync_with_catalog(catalog_names);
        info!("Loaded {} test records", ledger.records.len());
        Ok(ledger)
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn get(&self, name: &str) -> Option<&TestRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Rebuilds the record list in catalog order: existing records are kept,
    /// missing ones created, records without a template dropped.
    pub fn sync_with_catalog<'a, I>(&mut self, catalog_names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let synced: Vec<TestRecord> = catalog_names
            .into_iter()
            .map(|name| {
                self.get(name)
                    .cloned()
                    .unwrap_or_else(|| TestRecord::new(name))
            })
            .collect();

        if synced != self.records {
            self.records = synced;
            self.persist();
        }
    }

    /// Appends one test resolution for `name`, creating its record if needed.
    pub fn record_outcome(&mut self, name: &str, correct: bool, at: DateTime<Utc>) -> TestRecord {
        let position = match self.records.iter().position(|r| r.name == name) {
            Some(position) => position,
            None => {
                self.records.push(TestRecord::new(name));
                self.records.len() - 1
            }
        };

        self.records[position].record(correct, at);
        let updated = self.records[position].clone();
        self.persist();
        updated
    }

    /// Zeroes every record.
    pub fn reset(&mut self) {
        for record in &mut self.records {
            record.reset();
        }
        self.persist();
    }

    fn persist(&self) {
        let result = serde_json::to_vec(&self.records)
            .context("failed to encode test records")
            .and_then(|bytes| self.backend.save(RESULTS_KEY, bytes));
        if let Err(err) = result {
            error!("Failed to persist results ledger: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn stored(backend: &MemoryStore) -> Vec<TestRecord> {
        let bytes = backend.load(RESULTS_KEY).unwrap().unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn load_creates_records_for_every_template() {
        let backend = MemoryStore::new();
        let ledger = ResultsLedger::load(Arc::new(backend.clone()), ["A", "B"]).unwrap();
        assert_eq!(ledger.records().len(), 2);
        assert_eq!(ledger.get("B"), Some(&TestRecord::new("B")));
        assert_eq!(stored(&backend).len(), 2);
    }

    #[test]
    fn outcomes_update_counts_and_persist() {
        let backend = MemoryStore::new();
        let mut ledger = ResultsLedger::load(Arc::new(backend.clone()), ["A"]).unwrap();
        let now = Utc::now();

        ledger.record_outcome("A", true, now);
        let record = ledger.record_outcome("A", false, now);

        assert_eq!((record.tested, record.correct), (2, 1));
        assert_eq!(record.accuracy, 50.0);
        assert_eq!(stored(&backend)[0], record);
    }

    #[test]
    fn unknown_name_gets_a_record_lazily() {
        let mut ledger = ResultsLedger::load(Arc::new(MemoryStore::new()), []).unwrap();
        ledger.record_outcome("late", true, Utc::now());
        assert_eq!(ledger.get("late").unwrap().accuracy, 100.0);
    }

    #[test]
    fn sync_keeps_history_and_prunes_deleted() {
        let backend = MemoryStore::new();
        let mut ledger = ResultsLedger::load(Arc::new(backend.clone()), ["A", "B"]).unwrap();
        ledger.record_outcome("A", true, Utc::now());

        ledger.sync_with_catalog(["B", "A", "C"]);
        let names: Vec<&str> = ledger.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert_eq!(ledger.get("A").unwrap().tested, 1);

        ledger.sync_with_catalog(["C"]);
        assert!(ledger.get("A").is_none());
        assert_eq!(stored(&backend).len(), 1);
    }

    #[test]
    fn reset_zeroes_all_records() {
        let mut ledger = ResultsLedger::load(Arc::new(MemoryStore::new()), ["A", "B"]).unwrap();
        ledger.record_outcome("A", true, Utc::now());
        ledger.reset();
        assert!(ledger.records().iter().all(|r| r.tested == 0 && r.last_tested.is_none()));
    }
}
