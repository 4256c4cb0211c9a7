use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use super::{CropOptions, HexColor, TransformError, TransformOptions};

pub const DEFAULT_RESIZE_WIDTH: u32 = 600;
pub const TINT_INTENSITY: f64 = 0.3;
pub const JPEG_QUALITY: u8 = 85;

/// Output of a full pipeline run.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// JPEG bytes.
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

pub fn decode(data: &[u8]) -> Result<DynamicImage, TransformError> {
    image::load_from_memory(data).map_err(TransformError::Decode)
}

/// Height that keeps the aspect ratio of `(orig_w, orig_h)` at `width`.
pub fn scaled_height(width: u32, orig_w: u32, orig_h: u32) -> u32 {
    if orig_w == 0 {
        return orig_h.max(1);
    }
    let h = (width as f64 * orig_h as f64 / orig_w as f64).round();
    (h as u32).max(1)
}

/// Scales to `width`, falling back to [`DEFAULT_RESIZE_WIDTH`] when the
/// requested width is missing, non-positive or out of range.
pub fn resize(img: &DynamicImage, width: Option<i64>) -> DynamicImage {
    let width = width
        .and_then(|w| u32::try_from(w).ok())
        .filter(|w| *w > 0)
        .unwrap_or(DEFAULT_RESIZE_WIDTH);

    let (orig_w, orig_h) = img.dimensions();
    let height = scaled_height(width, orig_w, orig_h);
    img.resize_exact(width, height, FilterType::Triangle)
}

/// Crops to the intersection of `rect` and the image bounds.
///
/// Returns `None` when the intersection is empty, in which case the caller
/// keeps the input unchanged.
pub fn crop(img: &DynamicImage, rect: &CropOptions) -> Option<DynamicImage> {
    if rect.width <= 0 || rect.height <= 0 {
        return None;
    }

    let (img_w, img_h) = (img.width() as i64, img.height() as i64);
    let x1 = rect.x.max(0);
    let y1 = rect.y.max(0);
    let x2 = rect.x.saturating_add(rect.width).min(img_w);
    let y2 = rect.y.saturating_add(rect.height).min(img_h);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(img.crop_imm(x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
}

fn blend(orig: u8, tint: u8, intensity: f64) -> u8 {
    let value = (orig as f64 / 255.0) * (1.0 - intensity) + (tint as f64 / 255.0) * intensity;
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Blends every pixel toward `color` by `intensity`. Alpha is untouched.
pub fn tint(img: &DynamicImage, color: HexColor, intensity: f64) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    for px in rgba.pixels_mut() {
        let [r, g, b, a] = px.0;
        px.0 = [
            blend(r, color.r, intensity),
            blend(g, color.g, intensity),
            blend(b, color.b, intensity),
            a,
        ];
    }
    DynamicImage::ImageRgba8(rgba)
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, TransformError> {
    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(TransformError::Encode)?;
    Ok(buf)
}

/// Runs the optional stages in fixed order: resize, crop, tint.
pub fn apply(img: DynamicImage, options: &TransformOptions) -> DynamicImage {
    let mut img = img;

    if let Some(resize_opts) = &options.resize {
        img = resize(&img, resize_opts.width);
        debug!(width = img.width(), height = img.height(), "Applied resize");
    }

    if let Some(rect) = &options.crop {
        match crop(&img, rect) {
            Some(cropped) => {
                img = cropped;
                debug!(x = rect.x, y = rect.y, width = img.width(), height = img.height(), "Applied crop");
            }
            None => debug!(?rect, "Crop rectangle empty after clamping, skipping"),
        }
    }

    if let Some(raw) = &options.tint {
        match raw.parse::<HexColor>() {
            Ok(color) => {
                img = tint(&img, color, TINT_INTENSITY);
                debug!(%color, "Applied tint");
            }
            Err(e) => warn!(error = %e, "Skipping tint stage"),
        }
    }

    img
}

/// Decode, transform and re-encode `data` as JPEG.
pub fn process(data: &[u8], options: &TransformOptions) -> Result<ProcessedImage, TransformError> {
    let img = decode(data)?;
    let img = apply(img, options);
    let (width, height) = img.dimensions();
    let data = encode_jpeg(&img, JPEG_QUALITY)?;

    Ok(ProcessedImage {
        data: Bytes::from(data),
        width,
        height,
    })
}
