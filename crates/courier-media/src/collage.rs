//! Collage composition — lays a burst of images out into a single
//! two-column grid, preserving input order left-to-right, top-to-bottom.

use chrono::Utc;
use courier_core::error::CourierError;
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::info;

const COLS: u32 = 2;

/// Compose the given images into one grid image in `dir`.
///
/// Cell size is the maximum width/height over all inputs; each image is
/// downscaled to fit its cell (aspect ratio preserved, never upscaled)
/// and pasted at its row-major position on a white background.
///
/// Calling this with zero paths is a programmer error and is the one
/// failure in the media pipeline that is raised instead of degraded.
pub fn compose(dir: &Path, paths: &[PathBuf]) -> Result<PathBuf, CourierError> {
    if paths.is_empty() {
        return Err(CourierError::InvalidInput(
            "no images to compose".to_string(),
        ));
    }

    let stamp = Utc::now().timestamp_millis();

    // Degenerate single-image case: a direct copy, no grid.
    if let [only] = paths {
        let ext = only
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_lowercase();
        let out = dir.join(format!("collage_{stamp}.{ext}"));
        std::fs::copy(only, &out)?;
        return Ok(out);
    }

    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let img = image::open(path)
            .map_err(|e| CourierError::Media(format!("failed to open {}: {e}", path.display())))?
            .to_rgb8();
        images.push(img);
    }

    let cell_w = images.iter().map(RgbImage::width).max().unwrap_or(1);
    let cell_h = images.iter().map(RgbImage::height).max().unwrap_or(1);
    let rows = (images.len() as u32).div_ceil(COLS);

    let mut canvas = RgbImage::from_pixel(cell_w * COLS, cell_h * rows, Rgb([255, 255, 255]));

    for (idx, img) in images.iter().enumerate() {
        let scale = f64::min(
            1.0,
            f64::min(
                f64::from(cell_w) / f64::from(img.width()),
                f64::from(cell_h) / f64::from(img.height()),
            ),
        );
        let x = i64::from(idx as u32 % COLS * cell_w);
        let y = i64::from(idx as u32 / COLS * cell_h);

        if scale < 1.0 {
            let w = ((f64::from(img.width()) * scale) as u32).max(1);
            let h = ((f64::from(img.height()) * scale) as u32).max(1);
            let scaled = imageops::resize(img, w, h, FilterType::Lanczos3);
            imageops::replace(&mut canvas, &scaled, x, y);
        } else {
            imageops::replace(&mut canvas, img, x, y);
        }
    }

    let out = dir.join(format!("collage_{stamp}.jpg"));
    canvas
        .save(&out)
        .map_err(|e| CourierError::Media(format!("failed to save collage: {e}")))?;

    info!("composed collage of {} images at {}", paths.len(), out.display());
    Ok(out)
}
