//! Abstract storage traits for the record graph.
//!
//! Mappers and the merge transaction only ever talk to these traits, so the
//! same logic runs against the in-memory backend in tests and against a
//! relational backend in production. Every write that can race between
//! concurrent mappers is an upsert on a natural key or a conflict-ignoring
//! insert; backends must make each call atomic.

use thiserror::Error;

use crate::index_entry::{IndexEntry, IndexEntryDraft, IndexEntryId, IndexEntryKey};
use crate::link::{IndexRelation, Link};
use crate::media::{Media, MediaDraft, MediaId};
use crate::record::{ChildType, Record, RecordDraft, RecordId, RecordKey};
use crate::staging::{CanonicalRef, StagingRef, StagingRow, StagingTable};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record not found.
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    /// Index entry not found.
    #[error("Index entry not found: {0}")]
    IndexEntryNotFound(IndexEntryId),

    /// Media not found.
    #[error("Media not found: {0}")]
    MediaNotFound(MediaId),

    /// Staging row not found.
    #[error("Staging row not found: {0}")]
    StagingRowNotFound(StagingRef),

    /// A uniqueness constraint was violated.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// A row failed a store-level integrity check.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Outcome of an upsert on a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted<Id> {
    /// Id of the inserted or matched row.
    pub id: Id,
    /// True if a new row was inserted.
    pub created: bool,
    /// True if an existing row was modified. For media this means the alt
    /// text changed, which makes the owner's embedding stale.
    pub changed: bool,
}

impl<Id> Upserted<Id> {
    /// A freshly inserted row.
    pub const fn created(id: Id) -> Self {
        Self {
            id,
            created: true,
            changed: false,
        }
    }

    /// A matched existing row.
    pub const fn matched(id: Id, changed: bool) -> Self {
        Self {
            id,
            created: false,
            changed,
        }
    }
}

/// What repointing edges from one record to another did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepointStats {
    /// Edges moved onto the new record.
    pub moved: usize,
    /// Edges dropped because they became self-loops or duplicates.
    pub dropped: usize,
}

/// Storage trait for canonical records.
pub trait RecordStore: Send + Sync {
    /// Inserts the draft, or refreshes the record that already owns
    /// `draft.key`.
    fn upsert_by_natural_key(&self, draft: &RecordDraft) -> Result<Upserted<RecordId>, StorageError>;

    /// Get a record by id.
    fn get(&self, id: RecordId) -> Result<Option<Record>, StorageError>;

    /// Get the record that owns a natural key.
    fn find_by_key(&self, key: &RecordKey) -> Result<Option<Record>, StorageError>;

    /// Replace an existing record. Enforces sibling order-key uniqueness.
    fn update(&self, record: Record) -> Result<(), StorageError>;

    /// Delete a record, returning it.
    fn delete(&self, id: RecordId) -> Result<Record, StorageError>;

    /// Children of `parent`, ordered by order key.
    fn children(&self, parent: RecordId) -> Result<Vec<Record>, StorageError>;

    /// Set or clear a record's parent edge.
    ///
    /// # Errors
    /// - `RecordNotFound` if either record is missing
    /// - `DuplicateKey` if a sibling already uses `order_key`
    fn set_parent(
        &self,
        id: RecordId,
        parent: Option<RecordId>,
        child_type: Option<ChildType>,
        order_key: Option<String>,
    ) -> Result<(), StorageError>;

    /// Move every natural key owned by `from` onto `to`, so later upserts
    /// on those keys land on the surviving record.
    fn redirect_keys(&self, from: RecordId, to: RecordId) -> Result<usize, StorageError>;

    /// Mark a record's embedding stale. Returns false if it already was.
    fn invalidate_embedding(&self, id: RecordId) -> Result<bool, StorageError>;

    /// Store a freshly computed embedding.
    fn set_embedding(&self, id: RecordId, embedding: Vec<f32>) -> Result<(), StorageError>;

    /// Records whose embedding is stale, lowest id first.
    fn find_stale(&self, limit: usize) -> Result<Vec<Record>, StorageError>;

    /// All records, lowest id first.
    fn list(&self) -> Result<Vec<Record>, StorageError>;

    /// Number of records.
    fn count(&self) -> Result<usize, StorageError>;
}

/// Storage trait for links and index relations.
pub trait LinkStore: Send + Sync {
    /// Insert a link unless the same triple exists. Returns true if inserted.
    fn insert_link(&self, link: Link) -> Result<bool, StorageError>;

    /// Insert an index relation unless it exists. Returns true if inserted.
    fn insert_index_relation(&self, relation: IndexRelation) -> Result<bool, StorageError>;

    /// Links whose source is `id`.
    fn links_from(&self, id: RecordId) -> Result<Vec<Link>, StorageError>;

    /// Links whose target is `id`.
    fn links_to(&self, id: RecordId) -> Result<Vec<Link>, StorageError>;

    /// Index relations of a record.
    fn index_relations(&self, record: RecordId) -> Result<Vec<IndexRelation>, StorageError>;

    /// Rewrite every link endpoint `from` to `to`, dropping self-loops and
    /// duplicates.
    fn repoint_links(&self, from: RecordId, to: RecordId) -> Result<RepointStats, StorageError>;

    /// Rewrite every index relation of `from` onto `to`, dropping duplicates.
    fn repoint_index_relations(&self, from: RecordId, to: RecordId) -> Result<RepointStats, StorageError>;

    /// Number of links.
    fn link_count(&self) -> Result<usize, StorageError>;

    /// Number of index relations.
    fn index_relation_count(&self) -> Result<usize, StorageError>;
}

/// Storage trait for index entries.
pub trait IndexEntryStore: Send + Sync {
    /// Inserts the draft, or refreshes the entry owning its
    /// `(main_type, name, sense)` key.
    fn upsert_by_natural_key(&self, draft: &IndexEntryDraft) -> Result<Upserted<IndexEntryId>, StorageError>;

    /// Get an entry by id.
    fn get(&self, id: IndexEntryId) -> Result<Option<IndexEntry>, StorageError>;

    /// Get the entry owning a natural key.
    fn find_by_key(&self, key: &IndexEntryKey) -> Result<Option<IndexEntry>, StorageError>;

    /// All entries, lowest id first.
    fn list(&self) -> Result<Vec<IndexEntry>, StorageError>;

    /// Number of entries.
    fn count(&self) -> Result<usize, StorageError>;
}

/// Storage trait for media.
pub trait MediaStore: Send + Sync {
    /// Inserts the draft owned by `owner`, or refreshes the media row with
    /// the same url. `changed` reports an alt-text change.
    fn upsert_by_url(&self, draft: &MediaDraft, owner: RecordId) -> Result<Upserted<MediaId>, StorageError>;

    /// Get media by id.
    fn get(&self, id: MediaId) -> Result<Option<Media>, StorageError>;

    /// Get media by url.
    fn find_by_url(&self, url: &str) -> Result<Option<Media>, StorageError>;

    /// Media owned by a record.
    fn for_record(&self, record: RecordId) -> Result<Vec<Media>, StorageError>;

    /// Move ownership of every media row from `from` to `to`.
    fn repoint_owner(&self, from: RecordId, to: RecordId) -> Result<usize, StorageError>;

    /// Number of media rows.
    fn count(&self) -> Result<usize, StorageError>;
}

/// Storage trait for staging tables.
pub trait StagingStore: Send + Sync {
    /// Insert or replace a row keyed by `(table, external_id)`. An existing
    /// canonical ref is kept when the incoming row has none, so re-syncing
    /// upstream data never un-maps a row.
    fn upsert_row(&self, row: StagingRow) -> Result<(), StorageError>;

    /// Get a row.
    fn get(&self, table: StagingTable, external_id: &str) -> Result<Option<StagingRow>, StorageError>;

    /// Unmapped rows ordered by external id, starting after `after`.
    fn find_unmapped(
        &self,
        table: StagingTable,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StagingRow>, StorageError>;

    /// Write back the canonical ref of a row.
    fn set_canonical(
        &self,
        table: StagingTable,
        external_id: &str,
        canonical: CanonicalRef,
    ) -> Result<(), StorageError>;

    /// Rows whose `parent_external_id` is `parent`.
    fn find_children(&self, table: StagingTable, parent: &str) -> Result<Vec<StagingRow>, StorageError>;

    /// Point every row mapped onto `from` at `to` instead.
    fn repoint_canonical(&self, from: CanonicalRef, to: CanonicalRef) -> Result<usize, StorageError>;

    /// Number of rows in a table.
    fn count(&self, table: StagingTable) -> Result<usize, StorageError>;

    /// Number of unmapped rows in a table.
    fn count_unmapped(&self, table: StagingTable) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_record_store_object_safe(_: &dyn RecordStore) {}
    fn _assert_link_store_object_safe(_: &dyn LinkStore) {}
    fn _assert_index_entry_store_object_safe(_: &dyn IndexEntryStore) {}
    fn _assert_media_store_object_safe(_: &dyn MediaStore) {}
    fn _assert_staging_store_object_safe(_: &dyn StagingStore) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::RecordNotFound(RecordId::new(4));
        assert!(err.to_string().contains("Record not found: 4"));

        let err = StorageError::StagingRowNotFound(StagingRef::new(StagingTable::GithubUsers, "octocat"));
        assert!(err.to_string().contains("github_users/octocat"));

        let err = StorageError::BackendError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn upserted_constructors() {
        let u = Upserted::created(RecordId::new(1));
        assert!(u.created && !u.changed);
        let u = Upserted::matched(RecordId::new(1), true);
        assert!(!u.created && u.changed);
    }
}
