//! Typed edges of the record graph.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::index_entry::IndexEntryId;
use crate::predicate::{Predicate, PredicateId};
use crate::record::RecordId;

/// Directed record→record edge. The whole triple is the natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    /// Subject end.
    pub source_id: RecordId,
    /// Object end.
    pub target_id: RecordId,
    /// Edge type; see [`Predicate`].
    pub predicate_id: PredicateId,
}

impl Link {
    /// Creates a link.
    #[must_use]
    pub const fn new(source_id: RecordId, target_id: RecordId, predicate: &Predicate) -> Self {
        Self {
            source_id,
            target_id,
            predicate_id: predicate.id,
        }
    }

    /// True if both ends are the same record.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }

    /// Returns the link with `from` replaced by `to` on either end.
    #[must_use]
    pub fn repointed(self, from: RecordId, to: RecordId) -> Self {
        let swap = |id: RecordId| if id == from { to } else { id };
        Self {
            source_id: swap(self.source_id),
            target_id: swap(self.target_id),
            predicate_id: self.predicate_id,
        }
    }

    /// The other end of the link as seen from `id`.
    #[must_use]
    pub fn other_end(&self, id: RecordId) -> RecordId {
        if self.source_id == id {
            self.target_id
        } else {
            self.source_id
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = Predicate::by_id(self.predicate_id).map_or("?", |p| p.slug);
        write!(f, "{} -[{}]-> {}", self.source_id, slug, self.target_id)
    }
}

/// Role an index entry plays for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexRole {
    /// Author, artist or owner.
    Creator,
    /// Curated topical space.
    Space,
    /// Form of the work: book, essay, talk.
    Format,
    /// Free-form tag or keyword.
    Tag,
    /// What the record is about.
    Subject,
}

/// Record↔index-entry junction. The whole triple is the natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexRelation {
    /// The classified record.
    pub record_id: RecordId,
    /// The entry it is filed under.
    pub index_entry_id: IndexEntryId,
    /// How the entry relates to the record.
    pub role: IndexRole,
}

impl IndexRelation {
    /// Creates a relation.
    #[must_use]
    pub const fn new(record_id: RecordId, index_entry_id: IndexEntryId, role: IndexRole) -> Self {
        Self {
            record_id,
            index_entry_id,
            role,
        }
    }
}
