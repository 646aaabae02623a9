use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use eyre::WrapErr;
use image::{ImageFormat, Rgb, RgbImage};
use tracing::debug;

use super::contour::BoundingBox;
use crate::error::{PackerError, Result};

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Outline `bbox` in place, `thickness` pixels wide, growing inward.
pub fn draw_box(img: &mut RgbImage, bbox: BoundingBox, thickness: u32) {
    let (w, h) = img.dimensions();
    let x1 = (bbox.x + bbox.width).min(w);
    let y1 = (bbox.y + bbox.height).min(h);
    for y in bbox.y.min(h)..y1 {
        for x in bbox.x.min(w)..x1 {
            let edge = x < bbox.x + thickness
                || y < bbox.y + thickness
                || x + thickness >= x1
                || y + thickness >= y1;
            if edge {
                img.put_pixel(x, y, GREEN);
            }
        }
    }
}

/// `<dir>/<prefix>_<YYYYMMDDHHMMSS>.png`
pub fn snapshot_path(dir: &Path, prefix: &str, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("{prefix}_{}.png", at.format("%Y%m%d%H%M%S")))
}

/// Write `img` as PNG, creating `dir` if needed.
pub fn save_snapshot(
    img: &RgbImage,
    dir: &Path,
    prefix: &str,
    at: DateTime<Local>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .map_err(|e| eyre::Report::new(PackerError::Io(e.to_string())))
        .wrap_err_with(|| format!("creating {}", dir.display()))?;
    let path = snapshot_path(dir, prefix, at);
    img.save_with_format(&path, ImageFormat::Png)
        .map_err(|e| eyre::Report::new(PackerError::Io(e.to_string())))
        .wrap_err_with(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), "snapshot written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn box_outline_is_two_pixels() {
        let mut img = RgbImage::new(10, 10);
        draw_box(
            &mut img,
            BoundingBox {
                x: 2,
                y: 2,
                width: 6,
                height: 6,
            },
            2,
        );
        assert_eq!(*img.get_pixel(2, 2), GREEN);
        assert_eq!(*img.get_pixel(3, 5), GREEN);
        assert_eq!(*img.get_pixel(7, 7), GREEN);
        assert_eq!(img.get_pixel(4, 4).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 1).0, [0, 0, 0]);
    }

    #[test]
    fn path_carries_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let p = snapshot_path(Path::new("imgs"), "front", at);
        assert_eq!(p, Path::new("imgs").join("front_20240309140507.png"));
    }
}
