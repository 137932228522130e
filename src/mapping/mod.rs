//! The staging→canonical mapping contract.
//!
//! Each external source implements [`SourceMapper`]: a deterministic, pure
//! function from one staging row to one canonical insert plus the relations
//! that row implies. Mappers never touch a store. The sync runner applies
//! their output through upserts, writes the canonical ref back onto the
//! staging row, and resolves hierarchy and relations afterwards.

pub mod probe;
pub mod sources;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::MappingError;
use crate::index_entry::{IndexEntryDraft, IndexMainType};
use crate::link::IndexRole;
use crate::media::{MediaDraft, MediaFormat};
use crate::record::{non_empty, ChildType, RecordDraft, SourceTag};
use crate::staging::{StagingRef, StagingRow, StagingTable};

pub use probe::{classify_media, ExtensionProbe, MetadataProbe};

/// The canonical row a staging row maps onto.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalInsert {
    /// Upsert a record on its natural key.
    Record(RecordDraft),
    /// Upsert an index entry on its normalized key.
    IndexEntry(IndexEntryDraft),
    /// Media owned by the record another staging row maps onto.
    Media {
        /// The media row.
        draft: MediaDraft,
        /// Staging row whose record owns the media.
        owner: StagingRef,
    },
}

/// A relation implied by a staging row, applied after every table of the
/// source has been mapped.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum RelationIntent {
    /// Link from this row's record to the record of another staged row.
    Link {
        predicate: &'static str,
        target: StagingRef,
    },
    /// Index relation to the entry another staged row maps onto.
    IndexEntry { role: IndexRole, entry: StagingRef },
    /// Index relation to an entry upserted here by natural key (tags, author
    /// strings and other names with no staging row of their own).
    IndexKey { role: IndexRole, draft: IndexEntryDraft },
    /// Media owned by this row's record.
    Media { draft: MediaDraft },
}

/// Everything a mapper derives from one staging row.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    /// The row's own canonical upsert.
    pub insert: CanonicalInsert,
    /// Links, index relations and media hanging off the row.
    pub relations: Vec<RelationIntent>,
    /// Relation to the parent row, used when the row has a parent.
    pub child_type: Option<ChildType>,
    /// Source-reported position among siblings; ties and `None` fall back to
    /// external id order.
    pub position: Option<i64>,
}

impl MappedRow {
    /// A row with no relations and no hierarchy information.
    #[must_use]
    pub fn new(insert: CanonicalInsert) -> Self {
        Self {
            insert,
            relations: Vec::new(),
            child_type: None,
            position: None,
        }
    }

    /// Adds a relation.
    #[must_use]
    pub fn relate(mut self, intent: RelationIntent) -> Self {
        self.relations.push(intent);
        self
    }

    /// Adds several relations.
    #[must_use]
    pub fn relate_all(mut self, intents: impl IntoIterator<Item = RelationIntent>) -> Self {
        self.relations.extend(intents);
        self
    }

    /// Sets how the row hangs under its parent.
    #[must_use]
    pub fn child(mut self, child_type: ChildType, position: Option<i64>) -> Self {
        self.child_type = Some(child_type);
        self.position = position;
        self
    }
}

/// Per-run collaborators handed to mappers.
#[derive(Clone, Copy)]
pub struct MapContext<'a> {
    probe: &'a dyn MetadataProbe,
}

impl<'a> MapContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(probe: &'a dyn MetadataProbe) -> Self {
        Self { probe }
    }

    /// Classifies a media url; see [`classify_media`].
    pub fn classify(&self, url: &str, reported_mime: Option<&str>) -> Result<MediaFormat, MappingError> {
        classify_media(self.probe, url, reported_mime)
    }
}

impl std::fmt::Debug for MapContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapContext").finish_non_exhaustive()
    }
}

/// Per-source mapping rules.
pub trait SourceMapper: Send + Sync {
    /// The source this mapper handles.
    fn source(&self) -> SourceTag;

    /// Tables in processing order: index entries, then records, then media.
    fn tables(&self) -> &'static [StagingTable];

    /// Maps one staging row.
    ///
    /// # Errors
    /// A `MappingError` skips the row; it stays unmapped for the next run.
    fn map_row(&self, row: &StagingRow, ctx: &MapContext<'_>) -> Result<MappedRow, MappingError>;
}

/// Source → mapper dispatch table.
#[derive(Clone, Default)]
pub struct MapperRegistry {
    mappers: BTreeMap<SourceTag, Arc<dyn SourceMapper>>,
}

impl MapperRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in source registered.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(sources::airtable::AirtableMapper));
        registry.register(Arc::new(sources::github::GithubMapper));
        registry.register(Arc::new(sources::readwise::ReadwiseMapper));
        registry.register(Arc::new(sources::browser_history::BrowserHistoryMapper));
        registry.register(Arc::new(sources::twitter::TwitterMapper));
        registry.register(Arc::new(sources::lightroom::LightroomMapper));
        registry
    }

    /// Registers a mapper, replacing any previous one for the same source.
    pub fn register(&mut self, mapper: Arc<dyn SourceMapper>) {
        self.mappers.insert(mapper.source(), mapper);
    }

    /// The mapper for `source`.
    #[must_use]
    pub fn get(&self, source: SourceTag) -> Option<Arc<dyn SourceMapper>> {
        self.mappers.get(&source).cloned()
    }

    /// Registered sources in a stable order.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceTag> {
        self.mappers.keys().copied().collect()
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}

/// Returns the trimmed value, or `MissingField` when absent or blank.
pub(crate) fn require<'a>(
    row: &StagingRow,
    field: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, MappingError> {
    non_empty(value)
        .map(str::trim)
        .ok_or_else(|| MappingError::MissingField {
            table: row.table(),
            external_id: row.external_id.clone(),
            field,
        })
}

/// The error for a row handed to the wrong mapper.
pub(crate) fn unexpected(source: SourceTag, row: &StagingRow) -> MappingError {
    MappingError::UnexpectedPayload {
        expected: source.to_string(),
        actual: row.table(),
    }
}

/// Tag relations for free-form names, skipping blanks.
pub(crate) fn tag_relations<'a>(
    source: SourceTag,
    tags: impl IntoIterator<Item = &'a String>,
) -> Vec<RelationIntent> {
    tags.into_iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| RelationIntent::IndexKey {
            role: IndexRole::Tag,
            draft: IndexEntryDraft::new(source, IndexMainType::Category, t.as_str()),
        })
        .collect()
}
