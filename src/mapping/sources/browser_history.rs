//! Browser history: visited pages become bookmarks, keyed by url.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::mapping::{require, unexpected, CanonicalInsert, MapContext, MappedRow, SourceMapper};
use crate::record::{RecordDraft, RecordType, SourceTag};
use crate::staging::{StagingPayload, StagingRow, StagingTable};

/// One history entry, aggregated per url.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Visit {
    pub url: String,
    pub title: Option<String>,
    pub visit_count: u32,
    pub first_visited_at: Option<DateTime<Utc>>,
    pub last_visited_at: Option<DateTime<Utc>>,
}

/// Mapper for browser history.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserHistoryMapper;

impl SourceMapper for BrowserHistoryMapper {
    fn source(&self) -> SourceTag {
        SourceTag::BrowserHistory
    }

    fn tables(&self) -> &'static [StagingTable] {
        &[StagingTable::BrowserHistory]
    }

    fn map_row(&self, row: &StagingRow, _ctx: &MapContext<'_>) -> Result<MappedRow, MappingError> {
        let StagingPayload::BrowserHistory(visit) = &row.payload else {
            return Err(unexpected(self.source(), row));
        };

        let url = require(row, "url", Some(visit.url.as_str()))?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(MappingError::InvalidValue {
                table: row.table(),
                external_id: row.external_id.clone(),
                field: "url",
                reason: "only http(s) pages are bookmarked".to_string(),
            });
        }

        let draft = RecordDraft::new(
            SourceTag::BrowserHistory,
            RecordType::Bookmark,
            StagingTable::BrowserHistory,
            &row.external_id,
        )
        .url(Some(url))
        .title(visit.title.as_deref())
        .content_dates(visit.first_visited_at, visit.last_visited_at);

        Ok(MappedRow::new(CanonicalInsert::Record(draft)))
    }
}
