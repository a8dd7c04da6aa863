//! Preview handles
//!
//! A preview is a display-only resource created when a file is uploaded and
//! released when its record is removed. Providers own the backing resource;
//! records only hold the handle.

use crate::source::SourceFile;
use fast_image_resize as fr;
use fr::images::Image as FrImage;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Opaque reference to a preview resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewHandle(u64);

impl PreviewHandle {
    /// For providers: wrap a provider-assigned id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

pub trait PreviewProvider: Send + Sync {
    /// Create a preview for a freshly uploaded file. Never fails: a preview
    /// without content is still a handle that must be released.
    fn acquire(&self, source: &SourceFile) -> PreviewHandle;

    /// Release a preview. Returns false if the handle was not live.
    fn release(&self, handle: PreviewHandle) -> bool;
}

/// In-memory PNG thumbnails
pub struct ThumbnailPreviews {
    max_dimension: u32,
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Option<Arc<[u8]>>>>,
}

impl ThumbnailPreviews {
    pub const DEFAULT_MAX_DIMENSION: u32 = 128;

    pub fn new() -> Self {
        Self::with_max_dimension(Self::DEFAULT_MAX_DIMENSION)
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Thumbnail bytes for a live handle, `None` if released or undecodable
    pub fn thumbnail(&self, handle: PreviewHandle) -> Option<Arc<[u8]>> {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.get(&handle.0).cloned().flatten()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn render(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        let rgba = image::load_from_memory(data).map_err(|e| e.to_string())?.to_rgba8();
        let (width, height) = rgba.dimensions();
        let (dst_width, dst_height) = fit_within(width, height, self.max_dimension);

        let rgba = if (dst_width, dst_height) == (width, height) {
            rgba
        } else {
            let src_image = FrImage::from_vec_u8(width, height, rgba.into_raw(), fr::PixelType::U8x4)
                .map_err(|e| format!("Failed to create source image: {:?}", e))?;
            let mut dst_image = FrImage::new(dst_width, dst_height, src_image.pixel_type());

            let mut resizer = fr::Resizer::new();
            resizer
                .resize(&src_image, &mut dst_image, None)
                .map_err(|e| format!("Resize failed: {:?}", e))?;

            RgbaImage::from_raw(dst_width, dst_height, dst_image.buffer().to_vec())
                .ok_or_else(|| "Failed to create image from resized data".to_string())?
        };

        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(rgba)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| e.to_string())?;
        Ok(buffer)
    }
}

impl Default for ThumbnailPreviews {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewProvider for ThumbnailPreviews {
    fn acquire(&self, source: &SourceFile) -> PreviewHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let thumbnail = match self.render(source.data()) {
            Ok(png) => Some(Arc::from(png)),
            Err(e) => {
                debug!("No thumbnail for {}: {}", source.name(), e);
                None
            }
        };

        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, thumbnail);
        PreviewHandle::new(id)
    }

    fn release(&self, handle: PreviewHandle) -> bool {
        let removed = self
            .live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.0)
            .is_some();
        if !removed {
            warn!("Preview {} released twice or never acquired", handle.0);
        }
        removed
    }
}

/// Scale (width, height) down to fit a square box, keeping aspect ratio
fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width.max(1), height.max(1));
    }
    let scale = max_dimension as f64 / width.max(height) as f64;
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}
