//! snapconvert - image format conversion with AI captioning
//!
//! Uploaded images become records in a [`FileStore`]. The [`FilePipeline`]
//! converts one record to PNG, JPEG or WEBP and asks a [`Captioner`] for a
//! short description and an SEO-friendly file name; the [`BatchController`]
//! runs the pipeline over every idle record, one at a time.

pub mod batch;
pub mod caption;
pub mod download;
pub mod encoding;
pub mod error;
pub mod image;
pub mod metrics;
pub mod pipeline;
pub mod preview;
pub mod registry;
pub mod source;

pub use batch::{BatchController, BatchReport};
pub use caption::{Caption, CaptionConfig, Captioner, GeminiCaptioner, NoCaptions};
pub use crate::image::{ImageCodec, NativeCodec, Quality, TargetFormat};
pub use error::{ConversionError, MediaError, Result};
pub use pipeline::FilePipeline;
pub use preview::{PreviewHandle, PreviewProvider, ThumbnailPreviews};
pub use registry::{FileRecord, FileStore, RecordId, RecordStatus, Registry};
pub use source::SourceFile;
