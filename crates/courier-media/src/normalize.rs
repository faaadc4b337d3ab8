//! Format normalization — re-encodes webp stickers as JPEG so the
//! receiving client can render them. Anything else passes through.

use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Normalize an acquired file to a web-displayable format.
///
/// Webp files are flattened onto a white background, re-encoded as JPEG
/// next to the original, and the original removed best-effort. Conversion
/// failure falls back to the original file unchanged.
pub fn normalize(path: &Path) -> PathBuf {
    let is_webp = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("webp"));
    if !is_webp {
        return path.to_path_buf();
    }

    let jpg_path = path.with_extension("jpg");
    match convert_to_jpeg(path, &jpg_path) {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("failed to remove {} after conversion: {e}", path.display());
            }
            info!("converted {} to {}", path.display(), jpg_path.display());
            jpg_path
        }
        Err(e) => {
            error!("failed to convert {}: {e}", path.display());
            path.to_path_buf()
        }
    }
}

fn convert_to_jpeg(src: &Path, dst: &Path) -> Result<(), image::ImageError> {
    let rgba = image::open(src)?.to_rgba8();
    let (width, height) = rgba.dimensions();

    // Flatten alpha onto white — JPEG has no transparency.
    let mut flat = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let a = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a)) / 255) as u8;
        flat.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }

    flat.save(dst)
}
