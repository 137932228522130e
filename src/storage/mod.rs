//! Storage traits and the in-memory backend.
//!
//! [`GraphStores`] is the explicitly constructed store handle passed to the
//! sync runner and the merge transaction; there is no process-wide
//! connection.

mod memory;
mod traits;

use std::sync::Arc;

pub use memory::{
    InMemoryIndexEntryStore, InMemoryLinkStore, InMemoryMediaStore, InMemoryRecordStore,
    InMemoryStagingStore, InMemoryStores,
};
pub use traits::{
    IndexEntryStore, LinkStore, MediaStore, RecordStore, RepointStats, StagingStore, StorageError,
    Upserted,
};

/// Handle to every store the engine writes to.
#[derive(Clone)]
pub struct GraphStores {
    /// Canonical records.
    pub records: Arc<dyn RecordStore>,
    /// Record links and index relations.
    pub links: Arc<dyn LinkStore>,
    /// Canonical index entries.
    pub index_entries: Arc<dyn IndexEntryStore>,
    /// Media rows.
    pub media: Arc<dyn MediaStore>,
    /// Source-native staging rows.
    pub staging: Arc<dyn StagingStore>,
}

impl GraphStores {
    /// Fresh, empty in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        InMemoryStores::default().into()
    }
}

impl From<InMemoryStores> for GraphStores {
    fn from(stores: InMemoryStores) -> Self {
        Self {
            records: Arc::new(stores.records),
            links: Arc::new(stores.links),
            index_entries: Arc::new(stores.index_entries),
            media: Arc::new(stores.media),
            staging: Arc::new(stores.staging),
        }
    }
}

impl std::fmt::Debug for GraphStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStores").finish_non_exhaustive()
    }
}
