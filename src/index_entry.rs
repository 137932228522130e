//! Index entries: normalized, reusable referents.
//!
//! Creators, spaces, tags and formats from every source resolve onto index
//! entries, so the same person appearing in Airtable, GitHub and Twitter
//! collapses to one node.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::integer_id;
use crate::record::{non_empty, SourceTag};

integer_id! {
    /// Store-assigned identifier of an index entry.
    IndexEntryId
}

/// What kind of referent an index entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMainType {
    /// A person or organization.
    Entity,
    /// A topic, space or tag.
    Category,
    /// A medium or form (book, essay, photograph).
    Format,
}

impl fmt::Display for IndexMainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => f.write_str("entity"),
            Self::Category => f.write_str("category"),
            Self::Format => f.write_str("format"),
        }
    }
}

/// Natural uniqueness key: `(main_type, name, sense)`.
///
/// Names compare case-insensitively with collapsed whitespace, so "Ursula K.
/// Le Guin" from one source and "ursula k.  le guin" from another are the
/// same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexEntryKey {
    /// Entry category.
    pub main_type: IndexMainType,
    /// Normalized name.
    pub name: String,
    /// Normalized disambiguator, if any.
    pub sense: Option<String>,
}

impl IndexEntryKey {
    /// Builds a normalized key.
    pub fn new(
        main_type: IndexMainType,
        name: &str,
        sense: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "index_entry.name".to_string(),
            });
        }
        Ok(Self {
            main_type,
            name,
            sense: non_empty(sense).map(normalize_name),
        })
    }
}

fn normalize_name(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A canonical index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Store-assigned identifier.
    pub id: IndexEntryId,
    /// Entry category.
    pub main_type: IndexMainType,
    /// Display name as first seen.
    pub name: String,
    /// Disambiguator for entries that share a name, e.g. a creator's
    /// best-known work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sense: Option<String>,
    /// Abbreviated display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Homepage or profile url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Avatar or cover image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Sources that have produced this entry, in first-seen order.
    #[serde(default)]
    pub sources: Vec<SourceTag>,
    /// When the row was first stored.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl IndexEntry {
    /// Builds a fresh entry from a draft.
    #[must_use]
    pub fn from_draft(id: IndexEntryId, draft: &IndexEntryDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            main_type: draft.main_type,
            name: draft.name.clone(),
            sense: draft.sense.clone(),
            short_name: draft.short_name.clone(),
            notes: draft.notes.clone(),
            url: draft.url.clone(),
            image_url: draft.image_url.clone(),
            sources: vec![draft.source],
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds a matching draft into this entry.
    ///
    /// Existing values win; the draft only fills gaps. Always bumps
    /// `updated_at`, which is the "timestamp refresh" of a re-run.
    pub fn absorb(&mut self, draft: &IndexEntryDraft, now: DateTime<Utc>) {
        fill(&mut self.short_name, &draft.short_name);
        fill(&mut self.notes, &draft.notes);
        fill(&mut self.url, &draft.url);
        fill(&mut self.image_url, &draft.image_url);
        if !self.sources.contains(&draft.source) {
            self.sources.push(draft.source);
        }
        self.updated_at = now;
    }

    /// The natural key of this entry.
    pub fn key(&self) -> Result<IndexEntryKey, ValidationError> {
        IndexEntryKey::new(self.main_type, &self.name, self.sense.as_deref())
    }
}

fn fill(slot: &mut Option<String>, incoming: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(incoming);
    }
}

/// Fields a mapper wants an index entry to have.
///
/// Field meanings follow [`IndexEntry`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntryDraft {
    pub source: SourceTag,
    pub main_type: IndexMainType,
    pub name: String,
    pub sense: Option<String>,
    pub short_name: Option<String>,
    pub notes: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

impl IndexEntryDraft {
    /// Starts a draft with just a name.
    #[must_use]
    pub fn new(source: SourceTag, main_type: IndexMainType, name: impl Into<String>) -> Self {
        Self {
            source,
            main_type,
            name: name.into().trim().to_string(),
            sense: None,
            short_name: None,
            notes: None,
            url: None,
            image_url: None,
        }
    }

    /// Sets the disambiguating sense.
    #[must_use]
    pub fn sense(mut self, sense: Option<&str>) -> Self {
        self.sense = non_empty(sense).map(|s| s.trim().to_string());
        self
    }

    /// Sets the notes.
    #[must_use]
    pub fn notes(mut self, notes: Option<&str>) -> Self {
        self.notes = non_empty(notes).map(|s| s.trim().to_string());
        self
    }

    /// Sets the canonical url.
    #[must_use]
    pub fn url(mut self, url: Option<&str>) -> Self {
        self.url = non_empty(url).map(|s| s.trim().to_string());
        self
    }

    /// Sets the avatar/cover image url.
    #[must_use]
    pub fn image_url(mut self, url: Option<&str>) -> Self {
        self.image_url = non_empty(url).map(|s| s.trim().to_string());
        self
    }

    /// Sets the short name.
    #[must_use]
    pub fn short_name(mut self, short_name: Option<&str>) -> Self {
        self.short_name = non_empty(short_name).map(|s| s.trim().to_string());
        self
    }

    /// The natural key this draft upserts on.
    pub fn key(&self) -> Result<IndexEntryKey, ValidationError> {
        IndexEntryKey::new(self.main_type, &self.name, self.sense.as_deref())
    }
}
