//! Canonical records.
//!
//! A [`Record`] is the unit of content in the knowledge graph. Mappers never
//! build records directly: they produce a [`RecordDraft`], and the store
//! either inserts it or folds it into the record that already owns the same
//! natural key.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::integer_id;
use crate::staging::StagingTable;

integer_id! {
    /// Store-assigned identifier of a canonical record.
    RecordId
}

/// Highest allowed curation rating.
pub const MAX_RATING: u8 = 3;

/// Closed set of record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// A made thing: repository, photograph, post.
    Artifact,
    /// A visited or saved web page.
    Bookmark,
    /// A long-form text: article, book, paper.
    Document,
    /// A fragment taken from another record: highlight, quote, note.
    Extract,
    /// A person or organization promoted to a full record.
    Entity,
    /// An idea or topic.
    Concept,
    /// Something that happened.
    Event,
    /// A location.
    Place,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Artifact => "artifact",
            Self::Bookmark => "bookmark",
            Self::Document => "document",
            Self::Extract => "extract",
            Self::Entity => "entity",
            Self::Concept => "concept",
            Self::Event => "event",
            Self::Place => "place",
        };
        f.write_str(s)
    }
}

/// External systems that contribute records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// The curated Airtable base.
    Airtable,
    /// Starred repositories and their owners.
    Github,
    /// Reader documents and highlights.
    Readwise,
    /// Visited pages exported from the browser.
    BrowserHistory,
    /// Liked and bookmarked tweets.
    Twitter,
    /// Photos from the Lightroom catalog.
    Lightroom,
    /// Created or edited by hand in the curation UI.
    Manual,
}

impl SourceTag {
    /// All sources that have a staging mapper.
    pub const SYNCED: [Self; 6] = [
        Self::Airtable,
        Self::Github,
        Self::Readwise,
        Self::BrowserHistory,
        Self::Twitter,
        Self::Lightroom,
    ];

    /// Snake-case name used in logs, config and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Airtable => "airtable",
            Self::Github => "github",
            Self::Readwise => "readwise",
            Self::BrowserHistory => "browser_history",
            Self::Twitter => "twitter",
            Self::Lightroom => "lightroom",
            Self::Manual => "manual",
        }
    }

    /// Parses the snake-case name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        [Self::Manual]
            .into_iter()
            .chain(Self::SYNCED)
            .find(|tag| tag.as_str() == s)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a child record relates to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildType {
    /// A chapter, section or other structural piece.
    PartOf,
    /// A highlight or quotation lifted from the parent.
    ExcerptOf,
    /// A reply in a thread.
    ReplyTo,
    /// An edited or re-published copy.
    VersionOf,
}

/// Natural key a record draft is upserted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKey {
    /// Records with a url collapse across sources.
    Url { url: String },
    /// Records without a url are keyed by the staging row that produced them.
    Origin {
        /// Staging table of the originating row.
        table: StagingTable,
        /// Upstream identifier of the originating row.
        external_id: String,
    },
}

/// A canonical content node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Kind of content node.
    pub record_type: RecordType,

    /// Display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Short description, usually from the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Full text, when the source has it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Curator notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Caption or alt text of the record's primary media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_caption: Option<String>,
    /// Canonical url. Records sharing a url are the same record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Curator rating, 0 to 3.
    pub rating: u8,
    /// Hidden from public views.
    pub is_private: bool,
    /// Reviewed by a curator. Survives merges as an OR.
    pub is_curated: bool,

    /// Every source that has contributed to this record.
    #[serde(default)]
    pub sources: BTreeSet<SourceTag>,

    /// Containing record, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RecordId>,
    /// Relation to the parent. Set only together with `parent_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_type: Option<ChildType>,
    /// Position among siblings, compared bytewise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_key: Option<String>,

    /// `None` means stale: the embedding worker must recompute it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,

    /// When the row was first stored.
    pub record_created_at: DateTime<Utc>,
    /// When any stored field last changed.
    pub record_updated_at: DateTime<Utc>,
    /// When the content itself was published or created upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_created_at: Option<DateTime<Utc>>,
    /// When the content was last edited upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_updated_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates an empty record of the given type.
    #[must_use]
    pub fn new(id: RecordId, record_type: RecordType, now: DateTime<Utc>) -> Self {
        Self {
            id,
            record_type,
            title: None,
            summary: None,
            content: None,
            notes: None,
            media_caption: None,
            url: None,
            rating: 0,
            is_private: false,
            is_curated: false,
            sources: BTreeSet::new(),
            parent_id: None,
            child_type: None,
            order_key: None,
            text_embedding: None,
            record_created_at: now,
            record_updated_at: now,
            content_created_at: None,
            content_updated_at: None,
        }
    }

    /// Builds a fresh record from a mapper draft.
    #[must_use]
    pub fn from_draft(id: RecordId, draft: &RecordDraft, now: DateTime<Utc>) -> Self {
        let mut record = Self::new(id, draft.record_type, now);
        record.title = draft.title.clone();
        record.summary = draft.summary.clone();
        record.content = draft.content.clone();
        record.notes = draft.notes.clone();
        record.media_caption = draft.media_caption.clone();
        record.url = draft.url.clone();
        record.rating = draft.rating;
        record.is_private = draft.is_private;
        record.sources.insert(draft.source);
        record.content_created_at = draft.content_created_at;
        record.content_updated_at = draft.content_updated_at;
        record
    }

    /// Refreshes this record from a re-run draft.
    ///
    /// Source-reported fields are overwritten when the draft carries a value;
    /// curation state (`rating`, `is_curated`, hierarchy) is left alone. The
    /// embedding is cleared only if semantic text actually changed, so a
    /// no-op re-run keeps the vector. Returns whether anything changed.
    pub fn apply_draft(&mut self, draft: &RecordDraft, now: DateTime<Utc>) -> bool {
        let mut semantic = false;
        semantic |= refresh(&mut self.title, draft.title.as_deref());
        semantic |= refresh(&mut self.summary, draft.summary.as_deref());
        semantic |= refresh(&mut self.content, draft.content.as_deref());
        semantic |= refresh(&mut self.notes, draft.notes.as_deref());
        semantic |= refresh(&mut self.media_caption, draft.media_caption.as_deref());

        let mut changed = semantic;
        changed |= refresh(&mut self.url, draft.url.as_deref());
        changed |= self.sources.insert(draft.source);

        if draft.is_private && !self.is_private {
            self.is_private = true;
            changed = true;
        }
        if draft.content_created_at.is_some() && self.content_created_at != draft.content_created_at {
            self.content_created_at = draft.content_created_at;
            changed = true;
        }
        if draft.content_updated_at.is_some() && self.content_updated_at != draft.content_updated_at {
            self.content_updated_at = draft.content_updated_at;
            changed = true;
        }

        if semantic {
            self.text_embedding = None;
        }
        if changed {
            self.record_updated_at = now;
        }
        changed
    }

    /// Marks the embedding stale.
    pub fn invalidate_embedding(&mut self) {
        self.text_embedding = None;
    }

    /// Returns the embedding, if one has been computed.
    #[must_use]
    pub fn embedding(&self) -> Option<&[f32]> {
        self.text_embedding.as_deref()
    }

    /// Text used for trigram comparison: title, else summary, else the start
    /// of the content.
    #[must_use]
    pub fn comparable_text(&self) -> Option<&str> {
        const CONTENT_PREFIX_CHARS: usize = 200;

        non_empty(self.title.as_deref())
            .or_else(|| non_empty(self.summary.as_deref()))
            .or_else(|| {
                non_empty(self.content.as_deref()).map(|c| match c.char_indices().nth(CONTENT_PREFIX_CHARS) {
                    Some((idx, _)) => &c[..idx],
                    None => c,
                })
            })
    }

    /// Short human label used in logs and neighbour text.
    #[must_use]
    pub fn label(&self) -> String {
        non_empty(self.title.as_deref())
            .or_else(|| non_empty(self.url.as_deref()))
            .map_or_else(|| format!("{} #{}", self.record_type, self.id), str::to_string)
    }
}

fn refresh(slot: &mut Option<String>, incoming: Option<&str>) -> bool {
    match incoming {
        Some(value) if slot.as_deref() != Some(value) => {
            *slot = Some(value.to_string());
            true
        }
        _ => false,
    }
}

pub(crate) fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Fields a mapper wants a record to have.
///
/// Field meanings follow [`Record`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub key: RecordKey,
    pub source: SourceTag,
    pub record_type: RecordType,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub notes: Option<String>,
    pub media_caption: Option<String>,
    pub url: Option<String>,
    pub rating: u8,
    pub is_private: bool,
    pub content_created_at: Option<DateTime<Utc>>,
    pub content_updated_at: Option<DateTime<Utc>>,
}

impl RecordDraft {
    /// Starts a draft. The natural key is the url when one is set later via
    /// [`RecordDraft::url`], otherwise the staging origin.
    #[must_use]
    pub fn new(
        source: SourceTag,
        record_type: RecordType,
        table: StagingTable,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            key: RecordKey::Origin {
                table,
                external_id: external_id.into(),
            },
            source,
            record_type,
            title: None,
            summary: None,
            content: None,
            notes: None,
            media_caption: None,
            url: None,
            rating: 0,
            is_private: false,
            content_created_at: None,
            content_updated_at: None,
        }
    }

    /// Sets the url and re-keys the draft on it. Blank urls are ignored.
    #[must_use]
    pub fn url(mut self, url: Option<&str>) -> Self {
        if let Some(url) = non_empty(url) {
            let url = url.trim().to_string();
            self.key = RecordKey::Url { url: url.clone() };
            self.url = Some(url);
        }
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: Option<&str>) -> Self {
        self.title = clean(title);
        self
    }

    /// Sets the summary.
    #[must_use]
    pub fn summary(mut self, summary: Option<&str>) -> Self {
        self.summary = clean(summary);
        self
    }

    /// Sets the body content.
    #[must_use]
    pub fn content(mut self, content: Option<&str>) -> Self {
        self.content = clean(content);
        self
    }

    /// Sets the notes.
    #[must_use]
    pub fn notes(mut self, notes: Option<&str>) -> Self {
        self.notes = clean(notes);
        self
    }

    /// Sets the media caption.
    #[must_use]
    pub fn media_caption(mut self, caption: Option<&str>) -> Self {
        self.media_caption = clean(caption);
        self
    }

    /// Sets the content timestamps reported by the source.
    #[must_use]
    pub fn content_dates(
        mut self,
        created: Option<DateTime<Utc>>,
        updated: Option<DateTime<Utc>>,
    ) -> Self {
        self.content_created_at = created;
        self.content_updated_at = updated;
        self
    }

    /// Marks the draft private.
    #[must_use]
    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    /// Sets the rating.
    pub fn rating(mut self, rating: u8) -> Result<Self, ValidationError> {
        validate_rating(rating)?;
        self.rating = rating;
        Ok(self)
    }
}

fn clean(s: Option<&str>) -> Option<String> {
    non_empty(s).map(|s| s.trim().to_string())
}

/// Checks that a rating is within `0..=MAX_RATING`.
pub fn validate_rating(rating: u8) -> Result<(), ValidationError> {
    if rating > MAX_RATING {
        return Err(ValidationError::RatingOutOfRange { value: rating });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> RecordDraft {
        RecordDraft::new(SourceTag::Readwise, RecordType::Document, StagingTable::ReadwiseDocuments, "doc-1")
            .title(Some("  On Exactitude in Science "))
            .content(Some("The art of cartography attained such perfection"))
    }

    #[test]
    fn draft_keys_on_url_when_present() {
        let d = draft();
        assert!(matches!(d.key, RecordKey::Origin { .. }));
        assert_eq!(d.title.as_deref(), Some("On Exactitude in Science"));

        let d = d.url(Some("https://example.com/borges"));
        assert_eq!(
            d.key,
            RecordKey::Url { url: "https://example.com/borges".to_string() }
        );

        let d = draft().url(Some("   "));
        assert!(d.url.is_none());
        assert!(matches!(d.key, RecordKey::Origin { .. }));
    }

    #[test]
    fn rating_is_validated() {
        assert!(draft().rating(3).is_ok());
        assert_eq!(
            draft().rating(4).unwrap_err(),
            ValidationError::RatingOutOfRange { value: 4 }
        );
    }

    #[test]
    fn apply_draft_keeps_embedding_when_nothing_changed() {
        let now = Utc::now();
        let d = draft();
        let mut record = Record::from_draft(RecordId::new(1), &d, now);
        record.text_embedding = Some(vec![1.0, 0.0]);

        assert!(!record.apply_draft(&d, now));
        assert!(record.text_embedding.is_some());
    }

    #[test]
    fn apply_draft_clears_embedding_on_text_change() {
        let now = Utc::now();
        let mut record = Record::from_draft(RecordId::new(1), &draft(), now);
        record.text_embedding = Some(vec![1.0, 0.0]);

        let changed = draft().notes(Some("reread this"));
        assert!(record.apply_draft(&changed, now));
        assert!(record.text_embedding.is_none());
        assert_eq!(record.notes.as_deref(), Some("reread this"));
    }

    #[test]
    fn apply_draft_unions_sources_without_touching_text() {
        let now = Utc::now();
        let mut record = Record::from_draft(RecordId::new(1), &draft(), now);
        record.text_embedding = Some(vec![0.5]);

        let mut other = draft();
        other.source = SourceTag::BrowserHistory;
        assert!(record.apply_draft(&other, now));
        assert_eq!(record.sources.len(), 2);
        assert!(record.text_embedding.is_some());
    }

    #[test]
    fn comparable_text_falls_back_to_content_prefix() {
        let now = Utc::now();
        let mut record = Record::new(RecordId::new(3), RecordType::Extract, now);
        assert!(record.comparable_text().is_none());

        record.content = Some("x".repeat(500));
        assert_eq!(record.comparable_text().map(str::len), Some(200));

        record.title = Some("Title".to_string());
        assert_eq!(record.comparable_text(), Some("Title"));
    }

    #[test]
    fn source_tag_round_trips_through_name() {
        for tag in SourceTag::SYNCED {
            assert_eq!(SourceTag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(SourceTag::parse("manual"), Some(SourceTag::Manual));
        assert_eq!(SourceTag::parse("myspace"), None);
    }
}
