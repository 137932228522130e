//! In-memory storage backend.
//!
//! This module provides thread-safe in-memory implementations of the storage traits.
//! It is intended for embedded usage, tests, and as a reference implementation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use chrono::Utc;

use crate::index_entry::{IndexEntry, IndexEntryDraft, IndexEntryId, IndexEntryKey};
use crate::link::{IndexRelation, Link};
use crate::media::{Media, MediaDraft, MediaId};
use crate::record::{validate_rating, ChildType, Record, RecordDraft, RecordId, RecordKey};
use crate::staging::{CanonicalRef, StagingRef, StagingRow, StagingTable};
use crate::storage::traits::{
    IndexEntryStore, LinkStore, MediaStore, RecordStore, RepointStats, StagingStore, StorageError,
    Upserted,
};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct RecordState {
    last_id: u64,
    by_id: BTreeMap<RecordId, Record>,
    by_key: HashMap<RecordKey, RecordId>,
}

impl RecordState {
    fn next_id(&mut self) -> RecordId {
        self.last_id += 1;
        RecordId::new(self.last_id)
    }

    /// Fails if a sibling of `id` under `parent` already uses `order_key`.
    fn check_sibling_key(
        &self,
        id: RecordId,
        parent: Option<RecordId>,
        order_key: Option<&str>,
    ) -> Result<(), StorageError> {
        let (Some(parent), Some(key)) = (parent, order_key) else {
            return Ok(());
        };
        let clash = self
            .by_id
            .values()
            .any(|r| r.id != id && r.parent_id == Some(parent) && r.order_key.as_deref() == Some(key));
        if clash {
            return Err(StorageError::DuplicateKey(format!(
                "order key {key:?} already used under parent {parent}"
            )));
        }
        Ok(())
    }

    fn index_url(&mut self, record: &Record) {
        if let Some(url) = record.url.as_ref() {
            self.by_key
                .entry(RecordKey::Url { url: url.clone() })
                .or_insert(record.id);
        }
    }
}

/// Thread-safe in-memory record store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<RecordState>,
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn upsert_by_natural_key(&self, draft: &RecordDraft) -> Result<Upserted<RecordId>, StorageError> {
        validate_rating(draft.rating).map_err(|e| StorageError::InvalidRow(e.to_string()))?;
        let now = Utc::now();
        let mut state = self.state.write().map_err(|_| lock_err("record.upsert"))?;

        if let Some(id) = state.by_key.get(&draft.key).copied() {
            let record = state
                .by_id
                .get_mut(&id)
                .ok_or_else(|| StorageError::BackendError(format!("dangling record key -> {id}")))?;
            let changed = record.apply_draft(draft, now);
            let record = record.clone();
            state.index_url(&record);
            return Ok(Upserted::matched(id, changed));
        }

        let id = state.next_id();
        let record = Record::from_draft(id, draft, now);
        state.by_key.insert(draft.key.clone(), id);
        state.index_url(&record);
        state.by_id.insert(id, record);
        Ok(Upserted::created(id))
    }

    fn get(&self, id: RecordId) -> Result<Option<Record>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("record.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn find_by_key(&self, key: &RecordKey) -> Result<Option<Record>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("record.find_by_key"))?;
        Ok(state.by_key.get(key).and_then(|id| state.by_id.get(id)).cloned())
    }

    fn update(&self, record: Record) -> Result<(), StorageError> {
        validate_rating(record.rating).map_err(|e| StorageError::InvalidRow(e.to_string()))?;
        let mut state = self.state.write().map_err(|_| lock_err("record.update"))?;
        if !state.by_id.contains_key(&record.id) {
            return Err(StorageError::RecordNotFound(record.id));
        }
        if record.parent_id == Some(record.id) {
            return Err(StorageError::InvalidRow(format!("record {} cannot parent itself", record.id)));
        }
        state.check_sibling_key(record.id, record.parent_id, record.order_key.as_deref())?;
        state.index_url(&record);
        state.by_id.insert(record.id, record);
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<Record, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("record.delete"))?;
        let record = state.by_id.remove(&id).ok_or(StorageError::RecordNotFound(id))?;
        state.by_key.retain(|_, owner| *owner != id);
        for child in state.by_id.values_mut().filter(|r| r.parent_id == Some(id)) {
            child.parent_id = None;
            child.child_type = None;
            child.order_key = None;
        }
        Ok(record)
    }

    fn children(&self, parent: RecordId) -> Result<Vec<Record>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("record.children"))?;
        let mut out: Vec<Record> = state
            .by_id
            .values()
            .filter(|r| r.parent_id == Some(parent))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.order_key.cmp(&b.order_key).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn set_parent(
        &self,
        id: RecordId,
        parent: Option<RecordId>,
        child_type: Option<ChildType>,
        order_key: Option<String>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("record.set_parent"))?;
        if let Some(parent) = parent {
            if parent == id {
                return Err(StorageError::InvalidRow(format!("record {id} cannot parent itself")));
            }
            if !state.by_id.contains_key(&parent) {
                return Err(StorageError::RecordNotFound(parent));
            }
        }
        state.check_sibling_key(id, parent, order_key.as_deref())?;
        let record = state.by_id.get_mut(&id).ok_or(StorageError::RecordNotFound(id))?;
        record.parent_id = parent;
        record.child_type = parent.and(child_type);
        record.order_key = parent.and(order_key);
        record.record_updated_at = Utc::now();
        Ok(())
    }

    fn redirect_keys(&self, from: RecordId, to: RecordId) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("record.redirect_keys"))?;
        if !state.by_id.contains_key(&to) {
            return Err(StorageError::RecordNotFound(to));
        }
        let mut moved = 0;
        for owner in state.by_key.values_mut().filter(|owner| **owner == from) {
            *owner = to;
            moved += 1;
        }
        Ok(moved)
    }

    fn invalidate_embedding(&self, id: RecordId) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("record.invalidate_embedding"))?;
        let record = state.by_id.get_mut(&id).ok_or(StorageError::RecordNotFound(id))?;
        Ok(record.text_embedding.take().is_some())
    }

    fn set_embedding(&self, id: RecordId, embedding: Vec<f32>) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("record.set_embedding"))?;
        let record = state.by_id.get_mut(&id).ok_or(StorageError::RecordNotFound(id))?;
        record.text_embedding = Some(embedding);
        Ok(())
    }

    fn find_stale(&self, limit: usize) -> Result<Vec<Record>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("record.find_stale"))?;
        Ok(state
            .by_id
            .values()
            .filter(|r| r.text_embedding.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    fn list(&self) -> Result<Vec<Record>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("record.list"))?;
        Ok(state.by_id.values().cloned().collect())
    }

    fn count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("record.count"))?;
        Ok(state.by_id.len())
    }
}

#[derive(Debug, Default)]
struct LinkState {
    links: BTreeSet<Link>,
    relations: BTreeSet<IndexRelation>,
}

/// Thread-safe in-memory link and index-relation store.
#[derive(Debug, Default)]
pub struct InMemoryLinkStore {
    state: RwLock<LinkState>,
}

impl InMemoryLinkStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinkStore for InMemoryLinkStore {
    fn insert_link(&self, link: Link) -> Result<bool, StorageError> {
        if link.is_self_loop() {
            return Err(StorageError::InvalidRow(format!("self-loop link {link}")));
        }
        let mut state = self.state.write().map_err(|_| lock_err("link.insert"))?;
        Ok(state.links.insert(link))
    }

    fn insert_index_relation(&self, relation: IndexRelation) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("index_relation.insert"))?;
        Ok(state.relations.insert(relation))
    }

    fn links_from(&self, id: RecordId) -> Result<Vec<Link>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("link.links_from"))?;
        Ok(state.links.iter().filter(|l| l.source_id == id).copied().collect())
    }

    fn links_to(&self, id: RecordId) -> Result<Vec<Link>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("link.links_to"))?;
        Ok(state.links.iter().filter(|l| l.target_id == id).copied().collect())
    }

    fn index_relations(&self, record: RecordId) -> Result<Vec<IndexRelation>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("index_relation.for_record"))?;
        Ok(state
            .relations
            .iter()
            .filter(|r| r.record_id == record)
            .copied()
            .collect())
    }

    fn repoint_links(&self, from: RecordId, to: RecordId) -> Result<RepointStats, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("link.repoint"))?;
        let affected: Vec<Link> = state
            .links
            .iter()
            .filter(|l| l.source_id == from || l.target_id == from)
            .copied()
            .collect();

        let mut stats = RepointStats::default();
        for link in affected {
            state.links.remove(&link);
            let moved = link.repointed(from, to);
            if !moved.is_self_loop() && state.links.insert(moved) {
                stats.moved += 1;
            } else {
                stats.dropped += 1;
            }
        }
        Ok(stats)
    }

    fn repoint_index_relations(&self, from: RecordId, to: RecordId) -> Result<RepointStats, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("index_relation.repoint"))?;
        let affected: Vec<IndexRelation> = state
            .relations
            .iter()
            .filter(|r| r.record_id == from)
            .copied()
            .collect();

        let mut stats = RepointStats::default();
        for relation in affected {
            state.relations.remove(&relation);
            let moved = IndexRelation::new(to, relation.index_entry_id, relation.role);
            if state.relations.insert(moved) {
                stats.moved += 1;
            } else {
                stats.dropped += 1;
            }
        }
        Ok(stats)
    }

    fn link_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("link.count"))?;
        Ok(state.links.len())
    }

    fn index_relation_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("index_relation.count"))?;
        Ok(state.relations.len())
    }
}

#[derive(Debug, Default)]
struct IndexEntryState {
    last_id: u64,
    by_id: BTreeMap<IndexEntryId, IndexEntry>,
    by_key: HashMap<IndexEntryKey, IndexEntryId>,
}

/// Thread-safe in-memory index entry store.
#[derive(Debug, Default)]
pub struct InMemoryIndexEntryStore {
    state: RwLock<IndexEntryState>,
}

impl InMemoryIndexEntryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexEntryStore for InMemoryIndexEntryStore {
    fn upsert_by_natural_key(&self, draft: &IndexEntryDraft) -> Result<Upserted<IndexEntryId>, StorageError> {
        let key = draft.key().map_err(|e| StorageError::InvalidRow(e.to_string()))?;
        let now = Utc::now();
        let mut state = self.state.write().map_err(|_| lock_err("index_entry.upsert"))?;

        if let Some(id) = state.by_key.get(&key).copied() {
            let entry = state
                .by_id
                .get_mut(&id)
                .ok_or_else(|| StorageError::BackendError(format!("dangling index entry key -> {id}")))?;
            entry.absorb(draft, now);
            return Ok(Upserted::matched(id, false));
        }

        state.last_id += 1;
        let id = IndexEntryId::new(state.last_id);
        state.by_key.insert(key, id);
        state.by_id.insert(id, IndexEntry::from_draft(id, draft, now));
        Ok(Upserted::created(id))
    }

    fn get(&self, id: IndexEntryId) -> Result<Option<IndexEntry>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("index_entry.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn find_by_key(&self, key: &IndexEntryKey) -> Result<Option<IndexEntry>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("index_entry.find_by_key"))?;
        Ok(state.by_key.get(key).and_then(|id| state.by_id.get(id)).cloned())
    }

    fn list(&self) -> Result<Vec<IndexEntry>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("index_entry.list"))?;
        Ok(state.by_id.values().cloned().collect())
    }

    fn count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("index_entry.count"))?;
        Ok(state.by_id.len())
    }
}

#[derive(Debug, Default)]
struct MediaState {
    last_id: u64,
    by_id: BTreeMap<MediaId, Media>,
    by_url: HashMap<String, MediaId>,
}

/// Thread-safe in-memory media store.
#[derive(Debug, Default)]
pub struct InMemoryMediaStore {
    state: RwLock<MediaState>,
}

impl InMemoryMediaStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaStore for InMemoryMediaStore {
    fn upsert_by_url(&self, draft: &MediaDraft, owner: RecordId) -> Result<Upserted<MediaId>, StorageError> {
        if draft.url.is_empty() {
            return Err(StorageError::InvalidRow("media url is empty".to_string()));
        }
        let now = Utc::now();
        let mut state = self.state.write().map_err(|_| lock_err("media.upsert"))?;

        if let Some(id) = state.by_url.get(&draft.url).copied() {
            let media = state
                .by_id
                .get_mut(&id)
                .ok_or_else(|| StorageError::BackendError(format!("dangling media url -> {id}")))?;
            let alt_changed = media.absorb(draft, now);
            return Ok(Upserted::matched(id, alt_changed));
        }

        state.last_id += 1;
        let id = MediaId::new(state.last_id);
        state.by_url.insert(draft.url.clone(), id);
        state.by_id.insert(id, Media::from_draft(id, draft, owner, now));
        Ok(Upserted::created(id))
    }

    fn get(&self, id: MediaId) -> Result<Option<Media>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("media.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn find_by_url(&self, url: &str) -> Result<Option<Media>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("media.find_by_url"))?;
        Ok(state.by_url.get(url).and_then(|id| state.by_id.get(id)).cloned())
    }

    fn for_record(&self, record: RecordId) -> Result<Vec<Media>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("media.for_record"))?;
        Ok(state
            .by_id
            .values()
            .filter(|m| m.record_id == record)
            .cloned()
            .collect())
    }

    fn repoint_owner(&self, from: RecordId, to: RecordId) -> Result<usize, StorageError> {
        let now = Utc::now();
        let mut state = self.state.write().map_err(|_| lock_err("media.repoint_owner"))?;
        let mut moved = 0;
        for media in state.by_id.values_mut().filter(|m| m.record_id == from) {
            media.record_id = to;
            media.updated_at = now;
            moved += 1;
        }
        Ok(moved)
    }

    fn count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("media.count"))?;
        Ok(state.by_id.len())
    }
}

#[derive(Debug, Default)]
struct StagingState {
    rows: BTreeMap<(StagingTable, String), StagingRow>,
}

impl StagingState {
    fn table_rows(&self, table: StagingTable) -> impl Iterator<Item = &StagingRow> {
        self.rows
            .range((table, String::new())..)
            .take_while(move |((t, _), _)| *t == table)
            .map(|(_, row)| row)
    }
}

/// Thread-safe in-memory staging store.
#[derive(Debug, Default)]
pub struct InMemoryStagingStore {
    state: RwLock<StagingState>,
}

impl InMemoryStagingStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StagingStore for InMemoryStagingStore {
    fn upsert_row(&self, mut row: StagingRow) -> Result<(), StorageError> {
        if row.external_id.is_empty() {
            return Err(StorageError::InvalidRow(format!("{} row without external id", row.table())));
        }
        let mut state = self.state.write().map_err(|_| lock_err("staging.upsert"))?;
        let key = (row.table(), row.external_id.clone());
        if row.canonical.is_none() {
            row.canonical = state.rows.get(&key).and_then(|existing| existing.canonical);
        }
        state.rows.insert(key, row);
        Ok(())
    }

    fn get(&self, table: StagingTable, external_id: &str) -> Result<Option<StagingRow>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("staging.get"))?;
        Ok(state.rows.get(&(table, external_id.to_string())).cloned())
    }

    fn find_unmapped(
        &self,
        table: StagingTable,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StagingRow>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("staging.find_unmapped"))?;
        let start = match after {
            Some(after) => Bound::Excluded((table, after.to_string())),
            None => Bound::Included((table, String::new())),
        };
        Ok(state
            .rows
            .range((start, Bound::Unbounded))
            .take_while(|((t, _), _)| *t == table)
            .map(|(_, row)| row)
            .filter(|row| !row.is_mapped())
            .take(limit)
            .cloned()
            .collect())
    }

    fn set_canonical(
        &self,
        table: StagingTable,
        external_id: &str,
        canonical: CanonicalRef,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("staging.set_canonical"))?;
        let row = state
            .rows
            .get_mut(&(table, external_id.to_string()))
            .ok_or_else(|| StorageError::StagingRowNotFound(StagingRef::new(table, external_id)))?;
        row.canonical = Some(canonical);
        Ok(())
    }

    fn find_children(&self, table: StagingTable, parent: &str) -> Result<Vec<StagingRow>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("staging.find_children"))?;
        Ok(state
            .table_rows(table)
            .filter(|row| row.parent_external_id.as_deref() == Some(parent))
            .cloned()
            .collect())
    }

    fn repoint_canonical(&self, from: CanonicalRef, to: CanonicalRef) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("staging.repoint_canonical"))?;
        let mut moved = 0;
        for row in state.rows.values_mut().filter(|row| row.canonical == Some(from)) {
            row.canonical = Some(to);
            moved += 1;
        }
        Ok(moved)
    }

    fn count(&self, table: StagingTable) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("staging.count"))?;
        Ok(state.table_rows(table).count())
    }

    fn count_unmapped(&self, table: StagingTable) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("staging.count_unmapped"))?;
        Ok(state.table_rows(table).filter(|row| !row.is_mapped()).count())
    }
}

/// Convenience bundle of in-memory stores.
#[derive(Debug, Default)]
pub struct InMemoryStores {
    /// Record store.
    pub records: InMemoryRecordStore,
    /// Link and index-relation store.
    pub links: InMemoryLinkStore,
    /// Index entry store.
    pub index_entries: InMemoryIndexEntryStore,
    /// Media store.
    pub media: InMemoryMediaStore,
    /// Staging store.
    pub staging: InMemoryStagingStore,
}

impl InMemoryStores {
    /// Create a new bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
