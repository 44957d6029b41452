//! Content classification of acquired files

use super::AcquiredArtifact;
use crate::http_utils::normalize_content_type;
use std::fmt;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Leading bytes read for signature sniffing
const SNIFF_BYTES: usize = 32;

/// Delivery category of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCategory {
    /// Still image
    Image,
    /// GIF and similar
    AnimatedImage,
    /// Video container
    Video,
    /// Anything else
    Document,
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::AnimatedImage => "animated_image",
            Self::Video => "video",
            Self::Document => "document",
        };
        f.write_str(name)
    }
}

/// Category implied by a declared MIME type, if recognized
fn from_declared(declared: &str) -> Option<ContentCategory> {
    match normalize_content_type(declared).as_str() {
        "image/gif" => Some(ContentCategory::AnimatedImage),
        "image/jpeg" | "image/jpg" | "image/pjpeg" | "image/png" | "image/webp" => {
            Some(ContentCategory::Image)
        }
        ct if ct.starts_with("video/") => Some(ContentCategory::Video),
        _ => None,
    }
}

/// Category implied by the file signature, if recognized
fn from_signature(head: &[u8]) -> Option<ContentCategory> {
    if head.starts_with(&[0xFF, 0xD8, 0xFF])
        || head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
        || (head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP")
    {
        return Some(ContentCategory::Image);
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some(ContentCategory::AnimatedImage);
    }
    if (head.len() >= 8 && &head[4..8] == b"ftyp") || head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(ContentCategory::Video);
    }
    None
}

/// Classify from a declared type and the file's leading bytes.
///
/// The declared type wins when recognized, then the signature, then
/// `Document`.
#[must_use]
pub fn classify_parts(declared: Option<&str>, head: &[u8]) -> ContentCategory {
    declared
        .and_then(from_declared)
        .or_else(|| from_signature(head))
        .unwrap_or(ContentCategory::Document)
}

/// Classify an acquired artifact, reading its first bytes when needed.
pub async fn classify(artifact: &AcquiredArtifact) -> ContentCategory {
    if let Some(category) = artifact.declared_type().and_then(from_declared) {
        return category;
    }

    let mut head = [0u8; SNIFF_BYTES];
    let read = match tokio::fs::File::open(artifact.path()).await {
        Ok(mut file) => file.read(&mut head).await.unwrap_or(0),
        Err(e) => {
            debug!(path = %artifact.path().display(), error = %e, "Cannot open artifact for sniffing");
            0
        }
    };
    classify_parts(None, &head[..read])
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const MP4: &[u8] = b"\x00\x00\x00\x18ftypmp42";

    #[test]
    fn test_declared_type_wins() {
        assert_eq!(classify_parts(Some("image/gif"), JPEG), ContentCategory::AnimatedImage);
        assert_eq!(classify_parts(Some("image/png"), b""), ContentCategory::Image);
        assert_eq!(classify_parts(Some("video/webm; codecs=vp9"), b""), ContentCategory::Video);
    }

    #[test]
    fn test_sniffing_when_declared_type_unhelpful() {
        assert_eq!(classify_parts(Some("application/octet-stream"), JPEG), ContentCategory::Image);
        assert_eq!(classify_parts(None, b"GIF89a\x01\x00"), ContentCategory::AnimatedImage);
        assert_eq!(classify_parts(None, MP4), ContentCategory::Video);
        assert_eq!(classify_parts(None, &[0x1A, 0x45, 0xDF, 0xA3, 0x01]), ContentCategory::Video);
        assert_eq!(classify_parts(None, b"RIFF\x00\x00\x00\x00WEBPVP8 "), ContentCategory::Image);
    }

    #[test]
    fn test_unknown_is_document() {
        assert_eq!(classify_parts(None, b"%PDF-1.7"), ContentCategory::Document);
        assert_eq!(classify_parts(Some("application/zip"), b""), ContentCategory::Document);
    }

    #[tokio::test]
    async fn test_classify_reads_file_head() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob");
        std::fs::write(&path, MP4).expect("write");
        let artifact = AcquiredArtifact::new(dir, path, None, MP4.len() as u64, "test");

        assert_eq!(classify(&artifact).await, ContentCategory::Video);
        artifact.release();
    }
}
