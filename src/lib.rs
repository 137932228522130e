//! # Commonplace - record graph sync and entity resolution
//!
//! Commonplace maintains a personal knowledge graph assembled from external
//! services. Raw rows land in per-source staging tables; this crate turns
//! them into canonical records, index entries, media, links and a parent
//! hierarchy, and keeps that graph consistent when duplicates are merged.
//!
//! ## Core Concepts
//!
//! - **Record**: the central node, one per thing worth remembering
//! - **Index entry**: a shared, deduplicated label (person, topic, domain)
//! - **Mapper**: a pure function from one staging row to one canonical insert
//!   plus the relations that row implies
//! - **Order key**: a fractional string key that keeps siblings ordered
//!   without renumbering
//! - **Merge**: folds a source record into a target and repoints every
//!   reference in one transaction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use commonplace::{CancellationToken, GraphStores, SourceTag, SyncConfig, SyncEngine};
//!
//! let stores = GraphStores::in_memory();
//! stores.staging.upsert_row(row)?;
//!
//! let engine = SyncEngine::new(stores, SyncConfig::default());
//! let report = engine.run_source(SourceTag::Readwise, &CancellationToken::new())?;
//! println!("{} rows processed", report.totals().processed);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod ids;

// Core graph types
pub mod error;
pub mod index_entry;
pub mod link;
pub mod media;
pub mod order_key;
pub mod predicate;
pub mod record;
pub mod staging;

// Storage and configuration
pub mod config;
pub mod storage;

// Sync pipeline
pub mod mapping;
pub mod sync;

// Graph maintenance
pub mod duplicates;
pub mod embedding;
pub mod merge;
pub mod seriation;
pub mod text;

// Re-export primary types at crate root for convenience
pub use config::{DuplicateConfig, EngineConfig, SyncConfig};
pub use duplicates::{DuplicateCandidate, DuplicateDetector};
pub use embedding::{LexicalEmbedder, TextEmbedder};
pub use error::{GraphError, GraphResult, MappingError, MergeError, ValidationError};
pub use index_entry::{IndexEntry, IndexEntryDraft, IndexEntryId, IndexMainType};
pub use link::{IndexRelation, IndexRole, Link};
pub use media::{Media, MediaDraft, MediaId, MediaType};
pub use predicate::{Predicate, PredicateId};
pub use record::{ChildType, Record, RecordDraft, RecordId, RecordType, SourceTag};
pub use staging::{CanonicalRef, StagingPayload, StagingRef, StagingRow, StagingTable};

pub use mapping::{MapContext, MappedRow, MapperRegistry, SourceMapper};
pub use merge::{apply_merge, merge_records, MergeReport};
pub use seriation::{seriate, Embedded};
pub use storage::{GraphStores, StorageError};
pub use sync::{CancellationToken, SyncEngine, SyncReport, SyncScheduler, TableReport};
