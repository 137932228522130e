//! Readwise: saved documents and the highlights taken from them.
//!
//! Both live in one staging table. Highlights and notes carry their
//! document as staging parent and become `extract` records hanging under it
//! with `excerpt_of`, ordered by their location in the document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MappingError;
use crate::index_entry::{IndexEntryDraft, IndexMainType};
use crate::link::IndexRole;
use crate::mapping::{
    require, tag_relations, unexpected, CanonicalInsert, MapContext, MappedRow, RelationIntent, SourceMapper,
};
use crate::media::MediaDraft;
use crate::record::{non_empty, ChildType, RecordDraft, RecordType, SourceTag};
use crate::staging::{StagingPayload, StagingRow, StagingTable};

/// A Readwise document, highlight or note.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    /// `article`, `book`, `pdf`, `tweet`, `highlight`, `note`, ...
    pub category: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub source_url: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub notes: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    /// Position of a highlight within its document.
    pub location: Option<i64>,
    pub published_date: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    /// True for highlights and notes, which are excerpts of a document.
    #[must_use]
    pub fn is_excerpt(&self) -> bool {
        matches!(self.category.trim(), "highlight" | "note")
    }
}

/// Mapper for Readwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadwiseMapper;

impl SourceMapper for ReadwiseMapper {
    fn source(&self) -> SourceTag {
        SourceTag::Readwise
    }

    fn tables(&self) -> &'static [StagingTable] {
        &[StagingTable::ReadwiseDocuments]
    }

    fn map_row(&self, row: &StagingRow, ctx: &MapContext<'_>) -> Result<MappedRow, MappingError> {
        let StagingPayload::ReadwiseDocuments(doc) = &row.payload else {
            return Err(unexpected(self.source(), row));
        };
        require(row, "category", Some(doc.category.as_str()))?;
        if non_empty(doc.title.as_deref()).is_none() && non_empty(doc.content.as_deref()).is_none() {
            require(row, "content", None)?;
        }

        let excerpt = doc.is_excerpt();
        let record_type = if excerpt { RecordType::Extract } else { RecordType::Document };
        let mut draft = RecordDraft::new(SourceTag::Readwise, record_type, StagingTable::ReadwiseDocuments, &row.external_id)
            .title(doc.title.as_deref())
            .summary(doc.summary.as_deref())
            .content(doc.content.as_deref())
            .notes(doc.notes.as_deref())
            .content_dates(doc.published_date, doc.updated_at);
        // Highlights share their document's source url; keying them on it
        // would fold every highlight into the document.
        if !excerpt {
            draft = draft.url(doc.source_url.as_deref());
        }

        let mut mapped = MappedRow::new(CanonicalInsert::Record(draft));
        if excerpt {
            mapped = mapped.child(ChildType::ExcerptOf, doc.location);
        }

        if let Some(author) = non_empty(doc.author.as_deref()) {
            mapped = mapped.relate(RelationIntent::IndexKey {
                role: IndexRole::Creator,
                draft: IndexEntryDraft::new(SourceTag::Readwise, IndexMainType::Entity, author),
            });
        }
        mapped = mapped.relate_all(tag_relations(SourceTag::Readwise, &doc.tags));

        if let Some(image) = non_empty(doc.image_url.as_deref()) {
            match ctx.classify(image, None) {
                Ok(format) => {
                    let alt = doc.title.as_deref().map(|t| format!("Cover of {}", t.trim()));
                    mapped = mapped.relate(RelationIntent::Media {
                        draft: MediaDraft::new(image, format).alt_text(alt.as_deref()),
                    });
                }
                Err(e) => debug!(external_id = %row.external_id, error = %e, "skipping cover image"),
            }
        }

        Ok(mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ExtensionProbe;
    use crate::record::RecordKey;

    fn map(row: &StagingRow) -> Result<MappedRow, MappingError> {
        ReadwiseMapper.map_row(row, &MapContext::new(&ExtensionProbe))
    }

    fn article() -> Document {
        Document {
            category: "article".to_string(),
            title: Some("How to Do Great Work".to_string()),
            author: Some("Paul Graham".to_string()),
            source_url: Some("https://paulgraham.com/greatwork.html".to_string()),
            image_url: Some("https://covers.example.com/greatwork.jpg".to_string()),
            tags: vec!["work".to_string()],
            ..Document::default()
        }
    }

    #[test]
    fn document_maps_with_author_tags_and_cover() {
        let row = StagingRow::new("d1", StagingPayload::ReadwiseDocuments(article()));
        let mapped = map(&row).unwrap();
        let CanonicalInsert::Record(draft) = &mapped.insert else {
            panic!("expected record");
        };
        assert_eq!(draft.record_type, RecordType::Document);
        assert!(matches!(draft.key, RecordKey::Url { .. }));
        assert!(mapped.child_type.is_none());
        assert_eq!(mapped.relations.len(), 3);

        let media = mapped.relations.iter().find_map(|r| match r {
            RelationIntent::Media { draft } => Some(draft),
            _ => None,
        });
        assert_eq!(media.unwrap().alt_text.as_deref(), Some("Cover of How to Do Great Work"));
    }

    #[test]
    fn highlight_is_an_excerpt_keyed_by_origin() {
        let doc = Document {
            category: "highlight".to_string(),
            content: Some("The way to figure out what to work on is by working.".to_string()),
            source_url: Some("https://paulgraham.com/greatwork.html".to_string()),
            location: Some(120),
            ..Document::default()
        };
        let row = StagingRow::new("h1", StagingPayload::ReadwiseDocuments(doc)).with_parent("d1");
        let mapped = map(&row).unwrap();
        let CanonicalInsert::Record(draft) = &mapped.insert else {
            panic!("expected record");
        };
        assert_eq!(draft.record_type, RecordType::Extract);
        assert!(matches!(draft.key, RecordKey::Origin { .. }));
        assert_eq!(mapped.child_type, Some(ChildType::ExcerptOf));
        assert_eq!(mapped.position, Some(120));
    }

    #[test]
    fn unclassifiable_cover_is_skipped_not_fatal() {
        let doc = Document {
            image_url: Some("https://covers.example.com/opaque".to_string()),
            ..article()
        };
        let row = StagingRow::new("d2", StagingPayload::ReadwiseDocuments(doc));
        let mapped = map(&row).unwrap();
        assert!(!mapped
            .relations
            .iter()
            .any(|r| matches!(r, RelationIntent::Media { .. })));
    }

    #[test]
    fn empty_document_fails() {
        let doc = Document {
            category: "article".to_string(),
            ..Document::default()
        };
        let row = StagingRow::new("d3", StagingPayload::ReadwiseDocuments(doc));
        assert!(matches!(map(&row), Err(MappingError::MissingField { field: "content", .. })));
    }
}
