//! Staging rows: source-native data awaiting resolution.
//!
//! External sync jobs write one row per upstream object. A row starts with
//! `canonical == None`; the mapper fills it in once the canonical insert has
//! been applied. That write-back is what makes mapping idempotent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::index_entry::IndexEntryId;
use crate::mapping::sources::{airtable, browser_history, github, lightroom, readwise, twitter};
use crate::media::MediaId;
use crate::record::{RecordId, SourceTag};

/// Which canonical table a staging table resolves into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalKind {
    /// [`crate::record::Record`]
    Record,
    /// [`crate::index_entry::IndexEntry`]
    IndexEntry,
    /// [`crate::media::Media`]
    Media,
}

/// Pointer from a staging row to the canonical row it was mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CanonicalRef {
    /// Mapped onto a record.
    Record(RecordId),
    /// Mapped onto an index entry.
    IndexEntry(IndexEntryId),
    /// Mapped onto a media row.
    Media(MediaId),
}

impl CanonicalRef {
    /// The canonical table this ref points into.
    #[must_use]
    pub const fn kind(self) -> CanonicalKind {
        match self {
            Self::Record(_) => CanonicalKind::Record,
            Self::IndexEntry(_) => CanonicalKind::IndexEntry,
            Self::Media(_) => CanonicalKind::Media,
        }
    }

    /// The record id, if this ref points at a record.
    #[must_use]
    pub const fn record_id(self) -> Option<RecordId> {
        match self {
            Self::Record(id) => Some(id),
            _ => None,
        }
    }

    /// The index entry id, if this ref points at an index entry.
    #[must_use]
    pub const fn index_entry_id(self) -> Option<IndexEntryId> {
        match self {
            Self::IndexEntry(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for CanonicalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(id) => write!(f, "record:{id}"),
            Self::IndexEntry(id) => write!(f, "index_entry:{id}"),
            Self::Media(id) => write!(f, "media:{id}"),
        }
    }
}

/// Every staging table the engine knows about.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingTable {
    AirtableCreators,
    AirtableSpaces,
    AirtableFormats,
    AirtableExtracts,
    AirtableAttachments,
    GithubUsers,
    GithubRepositories,
    ReadwiseDocuments,
    BrowserHistory,
    TwitterUsers,
    TwitterTweets,
    TwitterMedia,
    LightroomImages,
}

impl StagingTable {
    /// Table name as used in logs and snapshots.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AirtableCreators => "airtable_creators",
            Self::AirtableSpaces => "airtable_spaces",
            Self::AirtableFormats => "airtable_formats",
            Self::AirtableExtracts => "airtable_extracts",
            Self::AirtableAttachments => "airtable_attachments",
            Self::GithubUsers => "github_users",
            Self::GithubRepositories => "github_repositories",
            Self::ReadwiseDocuments => "readwise_documents",
            Self::BrowserHistory => "browser_history",
            Self::TwitterUsers => "twitter_users",
            Self::TwitterTweets => "twitter_tweets",
            Self::TwitterMedia => "twitter_media",
            Self::LightroomImages => "lightroom_images",
        }
    }

    /// The external source that owns this table.
    #[must_use]
    pub const fn source(self) -> SourceTag {
        match self {
            Self::AirtableCreators
            | Self::AirtableSpaces
            | Self::AirtableFormats
            | Self::AirtableExtracts
            | Self::AirtableAttachments => SourceTag::Airtable,
            Self::GithubUsers | Self::GithubRepositories => SourceTag::Github,
            Self::ReadwiseDocuments => SourceTag::Readwise,
            Self::BrowserHistory => SourceTag::BrowserHistory,
            Self::TwitterUsers | Self::TwitterTweets | Self::TwitterMedia => SourceTag::Twitter,
            Self::LightroomImages => SourceTag::Lightroom,
        }
    }

    /// The canonical table rows of this table resolve into.
    #[must_use]
    pub const fn canonical_kind(self) -> CanonicalKind {
        match self {
            Self::AirtableCreators
            | Self::AirtableSpaces
            | Self::AirtableFormats
            | Self::GithubUsers
            | Self::TwitterUsers => CanonicalKind::IndexEntry,
            Self::AirtableAttachments | Self::TwitterMedia => CanonicalKind::Media,
            Self::AirtableExtracts
            | Self::GithubRepositories
            | Self::ReadwiseDocuments
            | Self::BrowserHistory
            | Self::TwitterTweets
            | Self::LightroomImages => CanonicalKind::Record,
        }
    }
}

impl fmt::Display for StagingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-native fields, one variant per staging table.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum StagingPayload {
    AirtableCreators(airtable::Creator),
    AirtableSpaces(airtable::Space),
    AirtableFormats(airtable::Format),
    AirtableExtracts(airtable::Extract),
    AirtableAttachments(airtable::Attachment),
    GithubUsers(github::User),
    GithubRepositories(github::Repository),
    ReadwiseDocuments(readwise::Document),
    BrowserHistory(browser_history::Visit),
    TwitterUsers(twitter::User),
    TwitterTweets(twitter::Tweet),
    TwitterMedia(twitter::TweetMedia),
    LightroomImages(lightroom::Image),
}

impl StagingPayload {
    /// The table this payload belongs to.
    #[must_use]
    pub const fn table(&self) -> StagingTable {
        match self {
            Self::AirtableCreators(_) => StagingTable::AirtableCreators,
            Self::AirtableSpaces(_) => StagingTable::AirtableSpaces,
            Self::AirtableFormats(_) => StagingTable::AirtableFormats,
            Self::AirtableExtracts(_) => StagingTable::AirtableExtracts,
            Self::AirtableAttachments(_) => StagingTable::AirtableAttachments,
            Self::GithubUsers(_) => StagingTable::GithubUsers,
            Self::GithubRepositories(_) => StagingTable::GithubRepositories,
            Self::ReadwiseDocuments(_) => StagingTable::ReadwiseDocuments,
            Self::BrowserHistory(_) => StagingTable::BrowserHistory,
            Self::TwitterUsers(_) => StagingTable::TwitterUsers,
            Self::TwitterTweets(_) => StagingTable::TwitterTweets,
            Self::TwitterMedia(_) => StagingTable::TwitterMedia,
            Self::LightroomImages(_) => StagingTable::LightroomImages,
        }
    }
}

/// One row of a staging table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRow {
    /// Immutable, source-defined id. Unique within its table.
    pub external_id: String,

    /// External id of the parent row in the same table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_external_id: Option<String>,

    /// Canonical row this staging row was mapped onto; `None` = not yet mapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<CanonicalRef>,

    /// Source-native fields.
    pub payload: StagingPayload,
}

impl StagingRow {
    /// Creates an unmapped row.
    #[must_use]
    pub fn new(external_id: impl Into<String>, payload: StagingPayload) -> Self {
        Self {
            external_id: external_id.into(),
            parent_external_id: None,
            canonical: None,
            payload,
        }
    }

    /// Sets the parent row's external id.
    #[must_use]
    pub fn with_parent(mut self, parent_external_id: impl Into<String>) -> Self {
        self.parent_external_id = Some(parent_external_id.into());
        self
    }

    /// The table this row lives in.
    #[must_use]
    pub const fn table(&self) -> StagingTable {
        self.payload.table()
    }

    /// True once the row has been written back.
    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        self.canonical.is_some()
    }
}

/// Address of a staging row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagingRef {
    /// Table the row lives in.
    pub table: StagingTable,
    /// Source-defined id within that table.
    pub external_id: String,
}

impl StagingRef {
    /// Creates a staging address.
    #[must_use]
    pub fn new(table: StagingTable, external_id: impl Into<String>) -> Self {
        Self {
            table,
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for StagingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.external_id)
    }
}
