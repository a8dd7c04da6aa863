//! Image codec adapter: decode a source image and re-encode it in a target format

use crate::error::ConversionError;
use crate::source::SourceFile;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

/// Formats a record can be converted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Png,
    #[default]
    Jpeg,
    Webp,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 3] = [TargetFormat::Png, TargetFormat::Jpeg, TargetFormat::Webp];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Webp => "webp",
        }
    }

    /// Download file extension
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            TargetFormat::Png => "image/png",
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Webp => "image/webp",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(TargetFormat::Png),
            "jpg" | "jpeg" => Ok(TargetFormat::Jpeg),
            "webp" => Ok(TargetFormat::Webp),
            other => Err(ConversionError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Compression quality for lossy formats, 0.0 to 1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quality(f32);

impl Quality {
    pub const DEFAULT: Quality = Quality(0.92);

    pub fn new(value: f32) -> Result<Self, ConversionError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConversionError::InvalidQuality(value))
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    /// Quality on the 0-100 scale the encoders take
    pub fn percent(&self) -> f32 {
        self.0 * 100.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for Quality {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s.trim().parse().map_err(|_| ConversionError::InvalidQuality(f32::NAN))?;
        Self::new(value)
    }
}

/// Decode-then-re-encode conversion.
///
/// Implementations are synchronous and CPU-bound; the pipeline runs them on a
/// blocking thread.
pub trait ImageCodec: Send + Sync {
    fn convert(&self, source: &SourceFile, format: TargetFormat, quality: Quality) -> Result<Vec<u8>, ConversionError>;
}

/// Codec backed by the `image` crate, with libwebp for lossy WEBP
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCodec;

impl NativeCodec {
    pub fn new() -> Self {
        Self
    }

    /// Decode any format the `image` crate understands
    pub fn decode(data: &[u8]) -> Result<DynamicImage, ConversionError> {
        image::load_from_memory(data).map_err(|e| ConversionError::Decode(e.to_string()))
    }

    /// Encode a decoded image in the target format
    pub fn encode(img: &DynamicImage, format: TargetFormat, quality: Quality) -> Result<Vec<u8>, ConversionError> {
        match format {
            TargetFormat::Png => {
                let mut buffer = Vec::new();
                img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                    .map_err(|e| ConversionError::Encode(format!("PNG: {}", e)))?;
                Ok(buffer)
            }
            TargetFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = img.to_rgb8();
                let mut buffer = Vec::new();
                let q = quality.percent().round().clamp(1.0, 100.0) as u8;
                JpegEncoder::new_with_quality(&mut buffer, q)
                    .encode_image(&rgb)
                    .map_err(|e| ConversionError::Encode(format!("JPEG: {}", e)))?;
                Ok(buffer)
            }
            TargetFormat::Webp => {
                let rgba = img.to_rgba8();
                let (width, height) = rgba.dimensions();
                if width == 0 || height == 0 {
                    return Err(ConversionError::Encode("WEBP: empty image".to_string()));
                }
                let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
                let webp_data = encoder
                    .encode_simple(false, quality.percent())
                    .map_err(|e| ConversionError::Encode(format!("WEBP: {:?}", e)))?;
                Ok(webp_data.to_vec())
            }
        }
    }
}

impl ImageCodec for NativeCodec {
    fn convert(&self, source: &SourceFile, format: TargetFormat, quality: Quality) -> Result<Vec<u8>, ConversionError> {
        let img = Self::decode(source.data())?;
        Self::encode(&img, format, quality)
    }
}
