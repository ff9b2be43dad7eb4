//! Inline image marker handling
//!
//! Responders embed generated charts in text as `IMAGE_DATA:<base64>`. The
//! payload runs from the marker to the end of the text (or the next marker).

use crate::images::{ImageError, ImageStore};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub const IMAGE_MARKER: &str = "IMAGE_DATA:";

/// Format used for persisted marker payloads
pub const MARKER_IMAGE_EXTENSION: &str = "png";

/// Text split around the first marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerSplit<'a> {
    /// Everything before the marker, untrimmed
    pub before: &'a str,
    /// Trimmed payload following the marker
    pub payload: &'a str,
}

pub fn split_marker(text: &str) -> Option<MarkerSplit<'_>> {
    let (before, rest) = text.split_once(IMAGE_MARKER)?;
    let payload = rest.split(IMAGE_MARKER).next().unwrap_or_default().trim();
    Some(MarkerSplit { before, payload })
}

/// Visible portion of an answer. Text without a marker is returned as-is.
pub fn strip_marker(text: &str) -> &str {
    match split_marker(text) {
        Some(split) => split.before.trim(),
        None => text,
    }
}

pub fn decode_payload(payload: &str) -> Result<Vec<u8>, ImageError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ImageError::EmptyPayload);
    }
    Ok(BASE64.decode(compact)?)
}

/// Decode a marker payload and store it, returning the image reference
pub async fn persist_payload(store: &dyn ImageStore, payload: &str) -> Result<String, ImageError> {
    let bytes = decode_payload(payload)?;
    store.save(&bytes, MARKER_IMAGE_EXTENSION).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::testing::MemoryImageStore;

    #[test]
    fn test_split_marker() {
        let split = split_marker("Here is the chart\nIMAGE_DATA: aGVsbG8= \n").unwrap();
        assert_eq!(split.before, "Here is the chart\n");
        assert_eq!(split.payload, "aGVsbG8=");

        assert_eq!(split_marker("no image here"), None);
    }

    #[test]
    fn test_split_marker_stops_at_second_marker() {
        let split = split_marker("a IMAGE_DATA:Zmlyc3Q= IMAGE_DATA:c2Vjb25k").unwrap();
        assert_eq!(split.payload, "Zmlyc3Q=");
    }

    #[test]
    fn test_strip_marker() {
        assert_eq!(strip_marker("  Answer text  IMAGE_DATA:abc"), "Answer text");
        assert_eq!(strip_marker("IMAGE_DATA:abc"), "");
        assert_eq!(strip_marker("  plain answer "), "  plain answer ");
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload("aGVs\nbG8=").unwrap(), b"hello");
        assert!(matches!(decode_payload("  "), Err(ImageError::EmptyPayload)));
        assert!(matches!(decode_payload("not*base64"), Err(ImageError::Decode(_))));
    }

    #[tokio::test]
    async fn test_persist_payload() {
        let store = MemoryImageStore::new();
        let path = persist_payload(&store, "aGVsbG8=").await.unwrap();

        assert_eq!(path, "/images/mem-0.png");
        assert_eq!(store.saved(), vec![(path, b"hello".to_vec())]);
    }
}
