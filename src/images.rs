//! Image storage and inlining
//!
//! Generated and uploaded images live in a flat directory served at
//! `/images`. Before a question goes to the supervisor, a reference to a
//! locally stored image is replaced by a `data:` URL so the responders can
//! see it without reaching back into this server.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// URL prefix under which stored images are served
pub const IMAGE_URL_PREFIX: &str = "/images";

/// Media types that are inlined with their own type; anything else is sent as PNG
const INLINE_SUBTYPES: &[&str] = &["jpeg", "png", "gif", "webp"];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image payload is empty")]
    EmptyPayload,

    #[error("Invalid base64 image payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Image I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image reference: {0}")]
    InvalidReference(String),
}

/// Where image bytes are kept
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store bytes and return the reference clients use to fetch them
    async fn save(&self, bytes: &[u8], extension: &str) -> Result<String, ImageError>;

    /// Load bytes for a reference previously returned by `save`
    async fn load(&self, reference: &str) -> Result<Vec<u8>, ImageError>;
}

/// Filesystem-backed image store
pub struct DiskImageStore {
    dir: PathBuf,
}

impl DiskImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ImageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Only the final path component is honored, so references cannot
    /// escape the image directory.
    fn resolve(&self, reference: &str) -> Result<PathBuf, ImageError> {
        let name = Path::new(reference)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ImageError::InvalidReference(reference.to_string()))?;
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, bytes: &[u8], extension: &str) -> Result<String, ImageError> {
        let name = format!("{}.{}", Uuid::new_v4(), sanitize_extension(extension));
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        tracing::debug!(name = %name, size = bytes.len(), "Stored image");
        Ok(format!("{IMAGE_URL_PREFIX}/{name}"))
    }

    async fn load(&self, reference: &str) -> Result<Vec<u8>, ImageError> {
        let path = self.resolve(reference)?;
        Ok(tokio::fs::read(path).await?)
    }
}

fn sanitize_extension(extension: &str) -> String {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        "png".to_string()
    } else {
        ext
    }
}

/// Path of a reference that points back at this server, if it does
fn local_path(reference: &str) -> Option<String> {
    match reqwest::Url::parse(reference) {
        Ok(url) => match url.host_str() {
            Some("localhost" | "127.0.0.1") => Some(url.path().to_string()),
            _ => None,
        },
        // No scheme: a bare path like /images/abc.png
        Err(_) => Some(reference.to_string()),
    }
}

fn media_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_().as_str() == "image")
        .map(|mime| mime.subtype().as_str().to_string())
        .filter(|subtype| INLINE_SUBTYPES.contains(&subtype.as_str()))
        .map_or_else(|| "image/png".to_string(), |subtype| format!("image/{subtype}"))
}

/// Replace a local image reference with a `data:` URL.
///
/// Remote references, and local ones that cannot be read, are passed
/// through unchanged.
pub async fn inline_reference(store: &dyn ImageStore, reference: &str) -> String {
    let Some(path) = local_path(reference) else {
        return reference.to_string();
    };
    match store.load(&path).await {
        Ok(bytes) => format!("data:{};base64,{}", media_type_for(&path), BASE64.encode(bytes)),
        Err(e) => {
            tracing::warn!(reference = %reference, error = %e, "Could not inline image, passing reference through");
            reference.to_string()
        }
    }
}
