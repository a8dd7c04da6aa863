//! Download naming and writing converted files to disk

use crate::error::Result;
use crate::image::TargetFormat;
use crate::registry::FileRecord;
use crate::source::SourceFile;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<suggested>.<ext>` when the AI named the file, else `converted_<base>.<ext>`
pub fn file_name(suggested_name: Option<&str>, source: &SourceFile, format: TargetFormat) -> String {
    match suggested_name {
        Some(name) => format!("{}.{}", name, format.extension()),
        None => format!("converted_{}.{}", source.base_name(), format.extension()),
    }
}

/// Download name for a record, `None` until it has converted output
pub fn download_name(record: &FileRecord) -> Option<String> {
    let converted = record.converted.as_ref()?;
    Some(file_name(record.suggested_name(), &record.source, converted.format))
}

/// Write a record's converted output into `dir`.
///
/// Existing files are never overwritten: a `-1`, `-2`, ... suffix is added to
/// the stem instead. Returns `None` when the record has nothing to download.
pub async fn save(record: &FileRecord, dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let (Some(name), Some(converted)) = (download_name(record), record.converted.as_ref()) else {
        return Ok(None);
    };

    let path = available_path(dir.as_ref(), &name).await;
    tokio::fs::write(&path, &converted.data).await?;
    info!("💾 Saved {} ({} bytes)", path.display(), converted.size());
    Ok(Some(path))
}

async fn available_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }

    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{}-{}.{}", stem, n, ext));
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::Caption;
    use crate::preview::PreviewHandle;
    use crate::registry::{ConvertedImage, RecordStatus};
    use tempfile::TempDir;

    fn record(name: &str, format: TargetFormat, caption: Option<Caption>, converted: bool) -> FileRecord {
        let mut record = FileRecord::new(
            SourceFile::new(name, "image/png", b"src".to_vec()),
            PreviewHandle::new(1),
            format,
        );
        if converted {
            record.status = RecordStatus::Completed;
            record.converted = Some(ConvertedImage::new(format, b"out".to_vec()));
            record.caption = caption;
        }
        record
    }

    #[test]
    fn test_name_from_caption() {
        let caption = Caption {
            description: "صورة منزل".to_string(),
            suggested_name: "modern-house-exterior".to_string(),
        };
        let record = record("photo.png", TargetFormat::Jpeg, Some(caption), true);
        assert_eq!(download_name(&record).unwrap(), "modern-house-exterior.jpeg");
    }

    #[test]
    fn test_name_without_caption() {
        let record = record("logo.webp", TargetFormat::Webp, None, true);
        assert_eq!(download_name(&record).unwrap(), "converted_logo.webp");
    }

    #[test]
    fn test_no_name_before_conversion() {
        let record = record("photo.png", TargetFormat::Png, None, false);
        assert!(download_name(&record).is_none());
    }

    #[test]
    fn test_extension_follows_encoded_format() {
        let mut record = record("photo.png", TargetFormat::Png, None, true);
        record.target_format = TargetFormat::Webp;
        assert_eq!(download_name(&record).unwrap(), "converted_photo.png");
    }

    #[tokio::test]
    async fn test_save_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let record = record("logo.webp", TargetFormat::Webp, None, true);

        let first = save(&record, dir.path()).await.unwrap().unwrap();
        let second = save(&record, dir.path()).await.unwrap().unwrap();

        assert_eq!(first.file_name().unwrap(), "converted_logo.webp");
        assert_eq!(second.file_name().unwrap(), "converted_logo-1.webp");
        assert_eq!(std::fs::read(&second).unwrap(), b"out");
    }

    #[tokio::test]
    async fn test_save_skips_unconverted() {
        let dir = TempDir::new().unwrap();
        let record = record("photo.png", TargetFormat::Png, None, false);
        assert!(save(&record, dir.path()).await.unwrap().is_none());
    }
}
