//! Lightroom: published photographs.
//!
//! Each image becomes an `artifact` record that owns the image itself as
//! media. Keywords become tags and the camera body becomes a format entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::index_entry::{IndexEntryDraft, IndexMainType};
use crate::link::IndexRole;
use crate::mapping::{
    require, tag_relations, unexpected, CanonicalInsert, MapContext, MappedRow, RelationIntent, SourceMapper,
};
use crate::media::MediaDraft;
use crate::record::{non_empty, RecordDraft, RecordType, SourceTag};
use crate::staging::{StagingPayload, StagingRow, StagingTable};

/// A catalogued image.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub url: String,
    pub mime_type: Option<String>,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub keywords: Vec<String>,
    pub camera: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub captured_at: Option<DateTime<Utc>>,
    pub edited_at: Option<DateTime<Utc>>,
}

/// Mapper for Lightroom.
#[derive(Debug, Default, Clone, Copy)]
pub struct LightroomMapper;

impl SourceMapper for LightroomMapper {
    fn source(&self) -> SourceTag {
        SourceTag::Lightroom
    }

    fn tables(&self) -> &'static [StagingTable] {
        &[StagingTable::LightroomImages]
    }

    fn map_row(&self, row: &StagingRow, ctx: &MapContext<'_>) -> Result<MappedRow, MappingError> {
        let StagingPayload::LightroomImages(image) = &row.payload else {
            return Err(unexpected(self.source(), row));
        };

        let url = require(row, "url", Some(image.url.as_str()))?;
        // Without a media row the record would be an empty shell.
        let format = ctx.classify(url, image.mime_type.as_deref())?;

        let draft = RecordDraft::new(SourceTag::Lightroom, RecordType::Artifact, StagingTable::LightroomImages, &row.external_id)
            .title(image.title.as_deref())
            .media_caption(image.caption.as_deref())
            .content_dates(image.captured_at, image.edited_at);

        let media = MediaDraft::new(url, format)
            .alt_text(image.caption.as_deref().or(image.title.as_deref()))
            .dimensions(image.width, image.height);

        let mut mapped = MappedRow::new(CanonicalInsert::Record(draft))
            .relate(RelationIntent::Media { draft: media })
            .relate_all(tag_relations(SourceTag::Lightroom, &image.keywords));
        if let Some(camera) = non_empty(image.camera.as_deref()) {
            mapped = mapped.relate(RelationIntent::IndexKey {
                role: IndexRole::Format,
                draft: IndexEntryDraft::new(SourceTag::Lightroom, IndexMainType::Format, camera),
            });
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
        LightroomMapper.map_row(row, &MapContext::new(&ExtensionProbe))
    }

    #[test]
    fn image_owns_its_media_and_tags() {
        let row = StagingRow::new(
            "img1",
            StagingPayload::LightroomImages(Image {
                url: "https://photos.example.com/2024/fog.jpg".to_string(),
                caption: Some("Fog over the bay".to_string()),
                keywords: vec!["fog".to_string(), "sf".to_string()],
                camera: Some("Fujifilm X100V".to_string()),
                ..Image::default()
            }),
        );
        let mapped = map(&row).unwrap();
        let CanonicalInsert::Record(draft) = &mapped.insert else {
            panic!("expected record");
        };
        assert_eq!(draft.media_caption.as_deref(), Some("Fog over the bay"));
        assert!(matches!(draft.key, RecordKey::Origin { .. }));
        // media + 2 keywords + camera
        assert_eq!(mapped.relations.len(), 4);
    }

    #[test]
    fn unclassifiable_image_fails_the_row() {
        let row = StagingRow::new(
            "img2",
            StagingPayload::LightroomImages(Image {
                url: "https://photos.example.com/raw/123".to_string(),
                ..Image::default()
            }),
        );
        assert!(matches!(map(&row), Err(MappingError::MetadataUnavailable { .. })));
    }
}
