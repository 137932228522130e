//! Media classification.
//!
//! Some sources hand over bare CDN urls with no MIME type. Classifying those
//! needs a metadata lookup (a HEAD request in production), which is an
//! external collaborator and may fail; failures are per-row mapping errors.

use crate::error::MappingError;
use crate::media::MediaFormat;

/// Looks up the MIME type of a media url.
pub trait MetadataProbe: Send + Sync {
    /// Classifies `url`.
    ///
    /// # Errors
    /// `MappingError::MetadataUnavailable` when the url cannot be classified.
    fn classify(&self, url: &str) -> Result<MediaFormat, MappingError>;
}

/// Offline probe that only trusts the url's file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionProbe;

impl MetadataProbe for ExtensionProbe {
    fn classify(&self, url: &str) -> Result<MediaFormat, MappingError> {
        MediaFormat::from_url_extension(url).ok_or_else(|| MappingError::MetadataUnavailable {
            url: url.to_string(),
            reason: "no recognizable file extension".to_string(),
        })
    }
}

/// Classifies a url, preferring a MIME type the source already reported.
pub fn classify_media(
    probe: &dyn MetadataProbe,
    url: &str,
    reported_mime: Option<&str>,
) -> Result<MediaFormat, MappingError> {
    match reported_mime.and_then(MediaFormat::from_mime) {
        Some(format) => Ok(format),
        None => probe.classify(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;

    #[test]
    fn reported_mime_wins_over_extension() {
        let f = classify_media(&ExtensionProbe, "https://x/a.png", Some("video/mp4")).unwrap();
        assert_eq!(f.media_type, MediaType::Video);
    }

    #[test]
    fn bare_urls_are_unavailable() {
        let err = classify_media(&ExtensionProbe, "https://pbs.example.com/media/Fx1", None).unwrap_err();
        assert!(matches!(err, MappingError::MetadataUnavailable { .. }));

        let err = classify_media(&ExtensionProbe, "https://x/y", Some("garbage")).unwrap_err();
        assert!(matches!(err, MappingError::MetadataUnavailable { .. }));
    }
}
