//! Uploaded source files

use std::path::Path;
use std::sync::Arc;

/// An uploaded image: immutable bytes plus the name and media type it came with.
///
/// Cloning is cheap, the bytes are shared.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    mime_type: String,
    data: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Build a source from raw bytes, sniffing the media type from magic numbers
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        let mime_type = detect_mime(&data);
        Self::new(name, mime_type, data)
    }

    /// Read a file from disk
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the upload surface should accept this file (`image/*`)
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// File name up to its first `.`
    pub fn base_name(&self) -> &str {
        self.name.split('.').next().unwrap_or_default()
    }
}

/// Detect MIME type from file bytes.
///
/// `infer` covers the common image containers; `tree_magic_mini` catches the rest.
pub fn detect_mime(data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }
    tree_magic_mini::from_u8(data).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn test_detect_png() {
        let source = SourceFile::from_bytes("photo.png", PNG_MAGIC.to_vec());
        assert_eq!(source.mime_type(), "image/png");
        assert!(source.is_image());
        assert_eq!(source.size(), PNG_MAGIC.len());
    }

    #[test]
    fn test_text_is_not_image() {
        let source = SourceFile::from_bytes("notes.txt", b"just some notes".to_vec());
        assert!(!source.is_image());
    }

    #[test]
    fn test_base_name_stops_at_first_dot() {
        let source = SourceFile::new("archive.v2.png", "image/png", Vec::new());
        assert_eq!(source.base_name(), "archive");

        let source = SourceFile::new("logo.webp", "image/webp", Vec::new());
        assert_eq!(source.base_name(), "logo");
    }
}
