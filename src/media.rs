//! Media assets owned by records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::integer_id;
use crate::record::{non_empty, RecordId};

integer_id! {
    /// Store-assigned identifier of a media row.
    MediaId
}

/// Top-level media type (the part of a MIME type before the slash).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Text,
    Application,
    Unknown,
}

impl MediaType {
    /// Parses the type half of a MIME string.
    #[must_use]
    pub fn from_mime_type(mime: &str) -> Self {
        let top = mime.split('/').next().unwrap_or_default().trim();
        match top.to_ascii_lowercase().as_str() {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "text" => Self::Text,
            "application" => Self::Application,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
            Self::Application => "application",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classified MIME information for a media url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    /// MIME type, e.g. `image`.
    pub media_type: MediaType,
    /// MIME subtype, e.g. `jpeg` or `mp4`.
    pub format: String,
}

impl MediaFormat {
    /// Parses a full MIME string such as `image/jpeg; charset=binary`.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next()?.trim();
        let (top, sub) = essence.split_once('/')?;
        if top.is_empty() || sub.is_empty() {
            return None;
        }
        Some(Self {
            media_type: MediaType::from_mime_type(top),
            format: sub.to_ascii_lowercase(),
        })
    }

    /// Guesses the format from a url's file extension.
    #[must_use]
    pub fn from_url_extension(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next()?;
        let file = path.rsplit('/').next()?;
        let (_, ext) = file.rsplit_once('.')?;
        let (media_type, format) = match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => (MediaType::Image, "jpeg"),
            "png" => (MediaType::Image, "png"),
            "gif" => (MediaType::Image, "gif"),
            "webp" => (MediaType::Image, "webp"),
            "heic" => (MediaType::Image, "heic"),
            "svg" => (MediaType::Image, "svg+xml"),
            "mp4" => (MediaType::Video, "mp4"),
            "mov" => (MediaType::Video, "quicktime"),
            "webm" => (MediaType::Video, "webm"),
            "mp3" => (MediaType::Audio, "mpeg"),
            "m4a" => (MediaType::Audio, "mp4"),
            "wav" => (MediaType::Audio, "wav"),
            "txt" => (MediaType::Text, "plain"),
            "md" => (MediaType::Text, "markdown"),
            "html" | "htm" => (MediaType::Text, "html"),
            "pdf" => (MediaType::Application, "pdf"),
            "epub" => (MediaType::Application, "epub+zip"),
            _ => return None,
        };
        Some(Self {
            media_type,
            format: format.to_string(),
        })
    }
}

/// A canonical media row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Store-assigned identifier.
    pub id: MediaId,
    /// Unique location of the asset.
    pub url: String,
    /// MIME type.
    pub media_type: MediaType,
    /// MIME subtype.
    pub format: String,
    /// Description of the asset. Feeds the owner's embedded text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    /// Pixel width, for images and video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height, for images and video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Owning record.
    pub record_id: RecordId,
    /// When the row was first stored.
    pub created_at: DateTime<Utc>,
    /// When the row was last refreshed.
    pub updated_at: DateTime<Utc>,
}

impl Media {
    /// Builds a fresh media row.
    #[must_use]
    pub fn from_draft(id: MediaId, draft: &MediaDraft, owner: RecordId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            url: draft.url.clone(),
            media_type: draft.format.media_type,
            format: draft.format.format.clone(),
            alt_text: draft.alt_text.clone(),
            width: draft.width,
            height: draft.height,
            record_id: owner,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refreshes from a re-run draft. The owner never changes on refresh.
    /// Returns true if the alt text changed, which makes the owner's
    /// embedding stale.
    pub fn absorb(&mut self, draft: &MediaDraft, now: DateTime<Utc>) -> bool {
        let alt_changed = draft.alt_text.is_some() && draft.alt_text != self.alt_text;
        if alt_changed {
            self.alt_text.clone_from(&draft.alt_text);
        }
        self.media_type = draft.format.media_type;
        self.format.clone_from(&draft.format.format);
        self.width = draft.width.or(self.width);
        self.height = draft.height.or(self.height);
        self.updated_at = now;
        alt_changed
    }
}

/// Fields a mapper wants a media row to have. Upserted on `url`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDraft {
    pub url: String,
    pub format: MediaFormat,
    pub alt_text: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaDraft {
    /// Starts a draft.
    #[must_use]
    pub fn new(url: impl Into<String>, format: MediaFormat) -> Self {
        Self {
            url: url.into().trim().to_string(),
            format,
            alt_text: None,
            width: None,
            height: None,
        }
    }

    /// Sets the alt text.
    #[must_use]
    pub fn alt_text(mut self, alt: Option<&str>) -> Self {
        self.alt_text = non_empty(alt).map(|s| s.trim().to_string());
        self
    }

    /// Sets pixel dimensions.
    #[must_use]
    pub fn dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}
