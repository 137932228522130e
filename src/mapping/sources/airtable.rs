//! Airtable: the hand-curated base of extracts, creators, spaces and formats.
//!
//! Creators, spaces and formats become index entries. Extracts become
//! `extract` records that point back at them, and attachments become media
//! owned by their extract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::index_entry::{IndexEntryDraft, IndexMainType};
use crate::link::IndexRole;
use crate::mapping::{require, unexpected, CanonicalInsert, MapContext, MappedRow, RelationIntent, SourceMapper};
use crate::media::MediaDraft;
use crate::predicate::slugs;
use crate::record::{ChildType, RecordDraft, RecordType, SourceTag};
use crate::staging::{StagingPayload, StagingRef, StagingRow, StagingTable};

/// A person or organization credited on extracts.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Creator {
    pub name: String,
    /// Best-known work; disambiguates creators who share a name.
    pub primary_project: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
}

/// A topical space extracts are filed under.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Space {
    pub name: String,
    pub full_name: Option<String>,
    pub notes: Option<String>,
}

/// The form of an extract's source (book, essay, talk, ...).
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Format {
    pub name: String,
}

/// A curated passage. A parent extract is carried on the staging row.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extract {
    pub title: Option<String>,
    pub content: Option<String>,
    pub notes: Option<String>,
    pub source_url: Option<String>,
    pub michelin_stars: u8,
    pub is_private: bool,
    pub publication_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub creator_ids: Vec<String>,
    pub space_ids: Vec<String>,
    pub format_id: Option<String>,
    /// Other extracts this one is connected to.
    pub connection_ids: Vec<String>,
}

/// A file attached to an extract.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub extract_id: String,
    pub url: String,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Mapper for the Airtable base.
#[derive(Debug, Default, Clone, Copy)]
pub struct AirtableMapper;

impl AirtableMapper {
    fn creator(row: &StagingRow, creator: &Creator) -> Result<MappedRow, MappingError> {
        let name = require(row, "name", Some(creator.name.as_str()))?;
        let draft = IndexEntryDraft::new(SourceTag::Airtable, IndexMainType::Entity, name)
            .sense(creator.primary_project.as_deref())
            .url(creator.website.as_deref())
            .notes(creator.notes.as_deref());
        draft.key()?;
        Ok(MappedRow::new(CanonicalInsert::IndexEntry(draft)))
    }

    fn space(row: &StagingRow, space: &Space) -> Result<MappedRow, MappingError> {
        let short = require(row, "name", Some(space.name.as_str()))?;
        let name = space
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(short);
        let draft = IndexEntryDraft::new(SourceTag::Airtable, IndexMainType::Category, name)
            .short_name((name != short).then_some(short))
            .notes(space.notes.as_deref());
        Ok(MappedRow::new(CanonicalInsert::IndexEntry(draft)))
    }

    fn format(row: &StagingRow, format: &Format) -> Result<MappedRow, MappingError> {
        let name = require(row, "name", Some(format.name.as_str()))?;
        let draft = IndexEntryDraft::new(SourceTag::Airtable, IndexMainType::Format, name);
        Ok(MappedRow::new(CanonicalInsert::IndexEntry(draft)))
    }

    fn extract(row: &StagingRow, extract: &Extract) -> Result<MappedRow, MappingError> {
        if extract.title.is_none() && extract.content.is_none() {
            require(row, "content", None)?;
        }

        let draft = RecordDraft::new(
            SourceTag::Airtable,
            RecordType::Extract,
            StagingTable::AirtableExtracts,
            &row.external_id,
        )
        .title(extract.title.as_deref())
        .content(extract.content.as_deref())
        .notes(extract.notes.as_deref())
        .url(extract.source_url.as_deref())
        .private(extract.is_private)
        .content_dates(extract.publication_date, extract.last_updated)
        .rating(extract.michelin_stars)?;

        let entry = |table, role, id: &String| RelationIntent::IndexEntry {
            role,
            entry: StagingRef::new(table, id.as_str()),
        };
        let creators = extract
            .creator_ids
            .iter()
            .map(|id| entry(StagingTable::AirtableCreators, IndexRole::Creator, id));
        let spaces = extract
            .space_ids
            .iter()
            .map(|id| entry(StagingTable::AirtableSpaces, IndexRole::Space, id));
        let format = extract
            .format_id
            .iter()
            .map(|id| entry(StagingTable::AirtableFormats, IndexRole::Format, id));
        let connections = extract
            .connection_ids
            .iter()
            .filter(|id| **id != row.external_id)
            .map(|id| RelationIntent::Link {
                predicate: slugs::RELATED_TO,
                target: StagingRef::new(StagingTable::AirtableExtracts, id.as_str()),
            });

        Ok(MappedRow::new(CanonicalInsert::Record(draft))
            .relate_all(creators.chain(spaces).chain(format).chain(connections))
            .child(ChildType::PartOf, None))
    }

    fn attachment(row: &StagingRow, attachment: &Attachment, ctx: &MapContext<'_>) -> Result<MappedRow, MappingError> {
        let url = require(row, "url", Some(attachment.url.as_str()))?;
        let owner = require(row, "extract_id", Some(attachment.extract_id.as_str()))?;
        let format = ctx.classify(url, attachment.mime_type.as_deref())?;
        let draft = MediaDraft::new(url, format).dimensions(attachment.width, attachment.height);
        Ok(MappedRow::new(CanonicalInsert::Media {
            draft,
            owner: StagingRef::new(StagingTable::AirtableExtracts, owner),
        }))
    }
}

impl SourceMapper for AirtableMapper {
    fn source(&self) -> SourceTag {
        SourceTag::Airtable
    }

    fn tables(&self) -> &'static [StagingTable] {
        &[
            StagingTable::AirtableCreators,
            StagingTable::AirtableSpaces,
            StagingTable::AirtableFormats,
            StagingTable::AirtableExtracts,
            StagingTable::AirtableAttachments,
        ]
    }

    fn map_row(&self, row: &StagingRow, ctx: &MapContext<'_>) -> Result<MappedRow, MappingError> {
        match &row.payload {
            StagingPayload::AirtableCreators(c) => Self::creator(row, c),
            StagingPayload::AirtableSpaces(s) => Self::space(row, s),
            StagingPayload::AirtableFormats(f) => Self::format(row, f),
            StagingPayload::AirtableExtracts(e) => Self::extract(row, e),
            StagingPayload::AirtableAttachments(a) => Self::attachment(row, a, ctx),
            _ => Err(unexpected(self.source(), row)),
        }
    }
}
