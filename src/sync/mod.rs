//! The generic sync runner.
//!
//! One run maps every unmapped staging row of one source:
//!
//! 1. each table in the mapper's order is read in keyset-paginated batches;
//!    every row is mapped, upserted and written back,
//! 2. parents are resolved for the rows mapped in this run (and for earlier
//!    children of newly mapped parents), see [`hierarchy`],
//! 3. the relations the rows implied are inserted.
//!
//! A row that fails to map is logged, counted and left unmapped. Storage
//! errors abort the run.

mod hierarchy;
mod report;
mod scheduler;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::config::SyncConfig;
use crate::error::{GraphError, GraphResult, MappingError};
use crate::index_entry::IndexEntryId;
use crate::link::{IndexRelation, IndexRole, Link};
use crate::mapping::{
    CanonicalInsert, ExtensionProbe, MapContext, MapperRegistry, MetadataProbe, RelationIntent, SourceMapper,
};
use crate::predicate::Predicate;
use crate::record::{ChildType, RecordId, SourceTag};
use crate::staging::{CanonicalRef, StagingRef, StagingRow, StagingTable};
use crate::storage::{GraphStores, StorageError};

pub use report::{SyncReport, TableReport};
pub use scheduler::SyncScheduler;

/// Cooperative cancellation flag, checked at batch boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A staging row mapped in the current run, waiting for passes 2 and 3.
#[derive(Debug)]
struct PendingRow {
    staging: StagingRef,
    parent_external_id: Option<String>,
    canonical: CanonicalRef,
    child_type: Option<ChildType>,
    position: Option<i64>,
    relations: Vec<RelationIntent>,
}

/// Staging refs written back in the current run.
type WriteBack = HashMap<StagingRef, CanonicalRef>;

/// Runs source mappers against a set of stores.
pub struct SyncEngine {
    stores: GraphStores,
    registry: MapperRegistry,
    probe: Arc<dyn MetadataProbe>,
    config: SyncConfig,
}

impl SyncEngine {
    /// An engine with every built-in mapper and the extension-based probe.
    #[must_use]
    pub fn new(stores: GraphStores, config: SyncConfig) -> Self {
        Self {
            stores,
            registry: MapperRegistry::with_builtin(),
            probe: Arc::new(ExtensionProbe),
            config,
        }
    }

    /// Replaces the mapper registry.
    #[must_use]
    pub fn with_registry(mut self, registry: MapperRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the metadata probe used to classify media.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn MetadataProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// The stores this engine writes to.
    #[must_use]
    pub fn stores(&self) -> &GraphStores {
        &self.stores
    }

    /// Registered sources.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceTag> {
        self.registry.sources()
    }

    /// Runs every registered source one after another.
    pub fn run_all(&self, cancel: &CancellationToken) -> GraphResult<Vec<SyncReport>> {
        self.sources()
            .into_iter()
            .map(|source| self.run_source(source, cancel))
            .collect()
    }

    /// Maps every unmapped staging row of `source`.
    ///
    /// # Errors
    /// Storage failures abort the run. Rows that fail to map do not; they
    /// are counted in the report.
    pub fn run_source(&self, source: SourceTag, cancel: &CancellationToken) -> GraphResult<SyncReport> {
        let mapper = self
            .registry
            .get(source)
            .ok_or_else(|| GraphError::internal(format!("no mapper registered for {source}")))?;

        let mut report = SyncReport::start(source);
        let span = info_span!("sync", source = %source, run_id = %report.run_id);
        let _guard = span.enter();
        info!("sync run started");

        let ctx = MapContext::new(self.probe.as_ref());
        let mut written = WriteBack::new();
        let mut pending = Vec::new();

        'tables: for &table in mapper.tables() {
            let mut cursor: Option<String> = None;
            loop {
                if cancel.is_cancelled() {
                    warn!(table = %table, "sync run cancelled");
                    report.cancelled = true;
                    break 'tables;
                }
                let batch = self
                    .stores
                    .staging
                    .find_unmapped(table, cursor.as_deref(), self.config.batch_size)?;
                let Some(last) = batch.last() else {
                    break;
                };
                cursor = Some(last.external_id.clone());
                debug!(table = %table, rows = batch.len(), "mapping batch");

                for row in &batch {
                    if let Some(row) = self.map_one(mapper.as_ref(), row, &ctx, &written, &mut report)? {
                        written.insert(row.staging.clone(), row.canonical);
                        pending.push(row);
                    }
                }
                if batch.len() < self.config.batch_size {
                    break;
                }
            }
        }

        hierarchy::link_parents(self, mapper.as_ref(), &ctx, &written, &pending, &mut report)?;
        self.apply_relations(&written, &pending, &mut report)?;

        report.finished_at = Utc::now();
        let totals = report.totals();
        info!(
            processed = totals.processed,
            created = totals.created,
            matched = totals.matched,
            failed = totals.failed,
            parents_linked = totals.parents_linked,
            relations_created = totals.relations_created,
            cancelled = report.cancelled,
            "sync run finished"
        );
        Ok(report)
    }

    /// Pass 1 for one row. `Ok(None)` means the row was skipped.
    fn map_one(
        &self,
        mapper: &dyn SourceMapper,
        row: &StagingRow,
        ctx: &MapContext<'_>,
        written: &WriteBack,
        report: &mut SyncReport,
    ) -> GraphResult<Option<PendingRow>> {
        let table = row.table();
        report.table_mut(table).processed += 1;

        let mapped = match mapper.map_row(row, ctx) {
            Ok(mapped) => mapped,
            Err(e) => {
                warn!(table = %table, external_id = %row.external_id, error = %e, "skipping row");
                report.table_mut(table).failed += 1;
                return Ok(None);
            }
        };

        let (canonical, created) = match self.apply_insert(&mapped.insert, written) {
            Ok(applied) => applied,
            Err(e) if is_row_error(&e) => {
                warn!(table = %table, external_id = %row.external_id, error = %e, "skipping row");
                report.table_mut(table).failed += 1;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.stores.staging.set_canonical(table, &row.external_id, canonical)?;
        let counts = report.table_mut(table);
        if created {
            counts.created += 1;
        } else {
            counts.matched += 1;
        }
        debug!(table = %table, external_id = %row.external_id, canonical = %canonical, created, "row mapped");

        Ok(Some(PendingRow {
            staging: StagingRef::new(table, row.external_id.as_str()),
            parent_external_id: row.parent_external_id.clone(),
            canonical,
            child_type: mapped.child_type,
            position: mapped.position,
            relations: mapped.relations,
        }))
    }

    /// Upserts the canonical row. Returns its ref and whether it was new.
    fn apply_insert(&self, insert: &CanonicalInsert, written: &WriteBack) -> GraphResult<(CanonicalRef, bool)> {
        match insert {
            CanonicalInsert::Record(draft) => {
                let upserted = self.stores.records.upsert_by_natural_key(draft)?;
                Ok((CanonicalRef::Record(upserted.id), upserted.created))
            }
            CanonicalInsert::IndexEntry(draft) => {
                let upserted = self.stores.index_entries.upsert_by_natural_key(draft)?;
                Ok((CanonicalRef::IndexEntry(upserted.id), upserted.created))
            }
            CanonicalInsert::Media { draft, owner } => {
                let owner_id = self
                    .resolve(written, owner)?
                    .and_then(CanonicalRef::record_id)
                    .ok_or_else(|| MappingError::UnmappedOwner {
                        url: draft.url.clone(),
                        owner: owner.to_string(),
                    })?;
                let upserted = self.stores.media.upsert_by_url(draft, owner_id)?;
                if upserted.changed || (upserted.created && draft.alt_text.is_some()) {
                    self.stores.records.invalidate_embedding(owner_id)?;
                }
                Ok((CanonicalRef::Media(upserted.id), upserted.created))
            }
        }
    }

    /// The canonical ref of a staging row, from this run's write-back or
    /// from the staging store.
    fn resolve(&self, written: &WriteBack, staging: &StagingRef) -> GraphResult<Option<CanonicalRef>> {
        if let Some(canonical) = written.get(staging) {
            return Ok(Some(*canonical));
        }
        Ok(self
            .stores
            .staging
            .get(staging.table, &staging.external_id)?
            .and_then(|row| row.canonical))
    }

    /// Pass 3: links, index relations and owned media.
    fn apply_relations(&self, written: &WriteBack, pending: &[PendingRow], report: &mut SyncReport) -> GraphResult<()> {
        for row in pending {
            let CanonicalRef::Record(record) = row.canonical else {
                continue;
            };
            for intent in &row.relations {
                match self.apply_relation(record, intent, written)? {
                    Some(true) => report.table_mut(row.staging.table).relations_created += 1,
                    Some(false) => {}
                    None => {
                        debug!(staging = %row.staging, ?intent, "relation target unresolved");
                        report.table_mut(row.staging.table).relations_unresolved += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// `Some(created)` when the relation exists afterwards, `None` when its
    /// target could not be resolved.
    fn apply_relation(&self, record: RecordId, intent: &RelationIntent, written: &WriteBack) -> GraphResult<Option<bool>> {
        let stores = &self.stores;
        match intent {
            RelationIntent::Link { predicate, target } => {
                let Some(predicate) = Predicate::by_slug(predicate) else {
                    warn!(predicate, "unknown predicate");
                    return Ok(None);
                };
                let Some(target) = self.resolve(written, target)?.and_then(CanonicalRef::record_id) else {
                    return Ok(None);
                };
                // Both rows collapsed onto one record.
                if target == record {
                    return Ok(Some(false));
                }
                let inserted = stores.links.insert_link(Link::new(record, target, predicate))?;
                if inserted {
                    stores.records.invalidate_embedding(record)?;
                    stores.records.invalidate_embedding(target)?;
                }
                Ok(Some(inserted))
            }
            RelationIntent::IndexEntry { role, entry } => {
                let Some(entry) = self.resolve(written, entry)?.and_then(CanonicalRef::index_entry_id) else {
                    return Ok(None);
                };
                self.relate_index(record, entry, *role)
            }
            RelationIntent::IndexKey { role, draft } => {
                let entry = match stores.index_entries.upsert_by_natural_key(draft) {
                    Ok(upserted) => upserted.id,
                    Err(StorageError::InvalidRow(reason)) => {
                        warn!(name = %draft.name, %reason, "skipping index entry");
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                };
                self.relate_index(record, entry, *role)
            }
            RelationIntent::Media { draft } => {
                let upserted = stores.media.upsert_by_url(draft, record)?;
                if upserted.changed || (upserted.created && draft.alt_text.is_some()) {
                    stores.records.invalidate_embedding(record)?;
                }
                Ok(Some(upserted.created))
            }
        }
    }

    fn relate_index(
        &self,
        record: RecordId,
        entry: IndexEntryId,
        role: IndexRole,
    ) -> GraphResult<Option<bool>> {
        let inserted = self
            .stores
            .links
            .insert_index_relation(IndexRelation::new(record, entry, role))?;
        if inserted {
            self.stores.records.invalidate_embedding(record)?;
        }
        Ok(Some(inserted))
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Errors that fail one row rather than the run.
fn is_row_error(e: &GraphError) -> bool {
    matches!(
        e,
        GraphError::Mapping(_) | GraphError::Validation(_) | GraphError::Storage(StorageError::InvalidRow(_))
    )
}

/// Unmapped rows per table, for reporting what a cancelled or failing run
/// left behind.
pub fn unmapped_counts(stores: &GraphStores, tables: &[StagingTable]) -> GraphResult<Vec<(StagingTable, usize)>> {
    tables
        .iter()
        .map(|&table| Ok((table, stores.staging.count_unmapped(table)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::sources::{browser_history, github, lightroom};
    use crate::staging::StagingPayload;

    fn visit(id: &str, url: &str) -> StagingRow {
        StagingRow::new(
            id,
            StagingPayload::BrowserHistory(browser_history::Visit {
                url: url.to_string(),
                title: Some(format!("Page {id}")),
                ..browser_history::Visit::default()
            }),
        )
    }

    fn engine(stores: &GraphStores, batch_size: usize) -> SyncEngine {
        SyncEngine::new(
            stores.clone(),
            SyncConfig {
                batch_size,
                ..SyncConfig::default()
            },
        )
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn failed_rows_stay_unmapped_and_do_not_stall_pagination() {
        let stores = GraphStores::in_memory();
        stores.staging.upsert_row(visit("a", "chrome://flags")).unwrap();
        stores.staging.upsert_row(visit("b", "https://example.com/b")).unwrap();
        stores.staging.upsert_row(visit("c", "about:blank")).unwrap();
        stores.staging.upsert_row(visit("d", "https://example.com/d")).unwrap();

        let report = engine(&stores, 1)
            .run_source(SourceTag::BrowserHistory, &CancellationToken::new())
            .unwrap();
        let counts = report.tables[&StagingTable::BrowserHistory];
        assert_eq!(counts.processed, 4);
        assert_eq!(counts.created, 2);
        assert_eq!(counts.failed, 2);
        assert_eq!(stores.staging.count_unmapped(StagingTable::BrowserHistory).unwrap(), 2);
    }

    #[test]
    fn cancelled_run_maps_nothing() {
        let stores = GraphStores::in_memory();
        stores.staging.upsert_row(visit("a", "https://example.com/a")).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let report = engine(&stores, 10).run_source(SourceTag::BrowserHistory, &token).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.totals().processed, 0);
        let left = unmapped_counts(&stores, &[StagingTable::BrowserHistory]).unwrap();
        assert_eq!(left, vec![(StagingTable::BrowserHistory, 1)]);
    }

    #[test]
    fn unregistered_source_is_an_error() {
        let stores = GraphStores::in_memory();
        let engine = engine(&stores, 10).with_registry(MapperRegistry::new());
        let err = engine.run_source(SourceTag::Github, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, GraphError::Internal { .. }));
    }

    #[test]
    fn owner_relation_resolves_across_tables() {
        let stores = GraphStores::in_memory();
        stores
            .staging
            .upsert_row(StagingRow::new(
                "u1",
                StagingPayload::GithubUsers(github::User {
                    login: "octocat".to_string(),
                    ..github::User::default()
                }),
            ))
            .unwrap();
        stores
            .staging
            .upsert_row(StagingRow::new(
                "r1",
                StagingPayload::GithubRepositories(github::Repository {
                    name: "hello".to_string(),
                    full_name: Some("octocat/hello".to_string()),
                    owner_id: Some("u1".to_string()),
                    topics: vec!["demo".to_string()],
                    ..github::Repository::default()
                }),
            ))
            .unwrap();

        let report = engine(&stores, 10)
            .run_source(SourceTag::Github, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.tables[&StagingTable::GithubRepositories].relations_created, 2);
        assert_eq!(stores.links.index_relation_count().unwrap(), 2);
        assert_eq!(stores.index_entries.count().unwrap(), 2);
    }

    #[test]
    fn owned_media_invalidates_its_record() {
        let stores = GraphStores::in_memory();
        stores
            .staging
            .upsert_row(StagingRow::new(
                "img1",
                StagingPayload::LightroomImages(lightroom::Image {
                    url: "https://photos.example.com/fog.jpg".to_string(),
                    caption: Some("Fog".to_string()),
                    ..lightroom::Image::default()
                }),
            ))
            .unwrap();
        let engine = engine(&stores, 10);
        engine.run_source(SourceTag::Lightroom, &CancellationToken::new()).unwrap();

        let record = stores.records.list().unwrap().remove(0);
        assert!(record.text_embedding.is_none());
        assert_eq!(stores.media.for_record(record.id).unwrap().len(), 1);
    }
}
