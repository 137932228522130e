//! Run reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::SourceTag;
use crate::staging::StagingTable;

/// Counters for one staging table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    /// Unmapped rows read.
    pub processed: usize,
    /// Rows whose upsert inserted a new canonical row.
    pub created: usize,
    /// Rows whose upsert matched an existing canonical row.
    pub matched: usize,
    /// Rows skipped on a mapping error; they stay unmapped.
    pub failed: usize,
    /// Rows whose record was attached to its parent this run.
    pub parents_linked: usize,
    /// Parents never synced, or refused as cycles.
    pub parents_unresolved: usize,
    /// Links and index relations inserted.
    pub relations_created: usize,
    /// Relations whose target row is missing or unmapped.
    pub relations_unresolved: usize,
}

impl TableReport {
    fn add(&mut self, other: &Self) {
        self.processed += other.processed;
        self.created += other.created;
        self.matched += other.matched;
        self.failed += other.failed;
        self.parents_linked += other.parents_linked;
        self.parents_unresolved += other.parents_unresolved;
        self.relations_created += other.relations_created;
        self.relations_unresolved += other.relations_unresolved;
    }
}

/// Result of one source run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Identifies the run in logs.
    pub run_id: Uuid,
    /// The source that was run.
    pub source: SourceTag,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub finished_at: DateTime<Utc>,
    /// True if the run stopped at a batch boundary before reading every row.
    pub cancelled: bool,
    /// Per-table counters.
    pub tables: BTreeMap<StagingTable, TableReport>,
}

impl SyncReport {
    pub(crate) fn start(source: SourceTag) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            source,
            started_at: now,
            finished_at: now,
            cancelled: false,
            tables: BTreeMap::new(),
        }
    }

    pub(crate) fn table_mut(&mut self, table: StagingTable) -> &mut TableReport {
        self.tables.entry(table).or_default()
    }

    /// Counters summed over every table.
    #[must_use]
    pub fn totals(&self) -> TableReport {
        let mut total = TableReport::default();
        for table in self.tables.values() {
            total.add(table);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_tables() {
        let mut report = SyncReport::start(SourceTag::Twitter);
        report.table_mut(StagingTable::TwitterUsers).created = 2;
        report.table_mut(StagingTable::TwitterTweets).created = 3;
        report.table_mut(StagingTable::TwitterTweets).failed = 1;

        let totals = report.totals();
        assert_eq!(totals.created, 5);
        assert_eq!(totals.failed, 1);
    }

    #[test]
    fn report_serializes_tables_by_name() {
        let mut report = SyncReport::start(SourceTag::Github);
        report.table_mut(StagingTable::GithubUsers).processed = 1;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["source"], "github");
        assert_eq!(json["tables"]["github_users"]["processed"], 1);
    }
}
