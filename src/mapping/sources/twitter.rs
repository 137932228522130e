//! Twitter: liked and bookmarked tweets, their authors and attached media.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::index_entry::{IndexEntryDraft, IndexMainType};
use crate::link::IndexRole;
use crate::mapping::{require, unexpected, CanonicalInsert, MapContext, MappedRow, RelationIntent, SourceMapper};
use crate::media::MediaDraft;
use crate::predicate::slugs;
use crate::record::{non_empty, ChildType, RecordDraft, RecordType, SourceTag};
use crate::staging::{StagingPayload, StagingRef, StagingRow, StagingTable};

/// A Twitter account.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub username: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
}

/// A tweet. A replied-to tweet is carried as the staging parent.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tweet {
    pub text: String,
    /// External id of the author in `twitter_users`.
    pub author_id: Option<String>,
    pub url: Option<String>,
    pub quoted_tweet_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Media attached to a tweet.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweetMedia {
    pub tweet_id: String,
    pub url: String,
    /// `photo`, `video` or `animated_gif`.
    pub kind: Option<String>,
    pub alt_text: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Mapper for Twitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TwitterMapper;

impl TwitterMapper {
    fn user(row: &StagingRow, user: &User) -> Result<MappedRow, MappingError> {
        let username = require(row, "username", Some(user.username.as_str()))?;
        let handle = format!("@{}", username.trim_start_matches('@'));
        let name = non_empty(user.display_name.as_deref()).unwrap_or(handle.as_str());
        let profile = format!("https://twitter.com/{}", username.trim_start_matches('@'));
        let draft = IndexEntryDraft::new(SourceTag::Twitter, IndexMainType::Entity, name)
            .short_name(Some(handle.as_str()))
            .url(Some(profile.as_str()))
            .image_url(user.avatar_url.as_deref())
            .notes(user.description.as_deref());
        Ok(MappedRow::new(CanonicalInsert::IndexEntry(draft)))
    }

    fn tweet(row: &StagingRow, tweet: &Tweet) -> Result<MappedRow, MappingError> {
        let text = require(row, "text", Some(tweet.text.as_str()))?;
        let draft = RecordDraft::new(SourceTag::Twitter, RecordType::Artifact, StagingTable::TwitterTweets, &row.external_id)
            .content(Some(text))
            .url(tweet.url.as_deref())
            .content_dates(tweet.created_at, None);

        let author = tweet.author_id.iter().map(|id| RelationIntent::IndexEntry {
            role: IndexRole::Creator,
            entry: StagingRef::new(StagingTable::TwitterUsers, id.as_str()),
        });
        let quoted = tweet
            .quoted_tweet_id
            .iter()
            .filter(|id| **id != row.external_id)
            .map(|id| RelationIntent::Link {
                predicate: slugs::QUOTES,
                target: StagingRef::new(StagingTable::TwitterTweets, id.as_str()),
            });

        Ok(MappedRow::new(CanonicalInsert::Record(draft))
            .relate_all(author.chain(quoted))
            .child(ChildType::ReplyTo, None))
    }

    fn media(row: &StagingRow, media: &TweetMedia, ctx: &MapContext<'_>) -> Result<MappedRow, MappingError> {
        let url = require(row, "url", Some(media.url.as_str()))?;
        let owner = require(row, "tweet_id", Some(media.tweet_id.as_str()))?;
        let mime = match media.kind.as_deref().map(str::trim) {
            None | Some("") => None,
            Some("photo") => Some("image/jpeg"),
            Some("video" | "animated_gif") => Some("video/mp4"),
            Some(other) => {
                return Err(MappingError::InvalidValue {
                    table: row.table(),
                    external_id: row.external_id.clone(),
                    field: "kind",
                    reason: format!("unknown media kind '{other}'"),
                })
            }
        };
        let format = ctx.classify(url, mime)?;
        let draft = MediaDraft::new(url, format)
            .alt_text(media.alt_text.as_deref())
            .dimensions(media.width, media.height);
        Ok(MappedRow::new(CanonicalInsert::Media {
            draft,
            owner: StagingRef::new(StagingTable::TwitterTweets, owner),
        }))
    }
}

impl SourceMapper for TwitterMapper {
    fn source(&self) -> SourceTag {
        SourceTag::Twitter
    }

    fn tables(&self) -> &'static [StagingTable] {
        &[StagingTable::TwitterUsers, StagingTable::TwitterTweets, StagingTable::TwitterMedia]
    }

    fn map_row(&self, row: &StagingRow, ctx: &MapContext<'_>) -> Result<MappedRow, MappingError> {
        match &row.payload {
            StagingPayload::TwitterUsers(u) => Self::user(row, u),
            StagingPayload::TwitterTweets(t) => Self::tweet(row, t),
            StagingPayload::TwitterMedia(m) => Self::media(row, m, ctx),
            _ => Err(unexpected(self.source(), row)),
        }
    }
}
