//! Pixel-level stages of the extraction pipeline.
//!
//! Masks are `GrayImage`s holding 0 or 255. Border handling follows the usual
//! machine-vision defaults: smoothing reflects about the edge pixel, and
//! morphology ignores pixels outside the image.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// `dst = saturate(|src * gain + offset|)` per channel.
pub fn adjust_contrast(img: &RgbImage, gain: f64, offset: f64) -> RgbImage {
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = (v as f64 * gain + offset).abs().round().clamp(0.0, 255.0) as u8;
    }
    let mut out = img.clone();
    for p in out.pixels_mut() {
        for c in &mut p.0 {
            *c = lut[*c as usize];
        }
    }
    out
}

/// Normalized 1-D Gaussian taps for an odd `ksize`, with sigma derived from
/// the size. Small kernels use the fixed binomial tables.
pub fn gaussian_kernel(ksize: usize) -> Vec<f32> {
    match ksize {
        0 | 1 => vec![1.0],
        3 => vec![0.25, 0.5, 0.25],
        5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        k => {
            let sigma = 0.3 * ((k as f64 - 1.0) * 0.5 - 1.0) + 0.8;
            let half = (k / 2) as f64;
            let taps: Vec<f64> = (0..k)
                .map(|i| {
                    let x = i as f64 - half;
                    (-(x * x) / (2.0 * sigma * sigma)).exp()
                })
                .collect();
            let sum: f64 = taps.iter().sum();
            taps.into_iter().map(|t| (t / sum) as f32).collect()
        }
    }
}

/// Reflect-101 index: `-1 -> 1`, `n -> n - 2`.
#[inline]
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i as usize
}

/// Separable Gaussian smoothing per channel.
pub fn gaussian_blur(img: &RgbImage, ksize: usize) -> RgbImage {
    let kernel = gaussian_kernel(ksize);
    if kernel.len() == 1 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let half = (kernel.len() / 2) as isize;
    let src = img.as_raw();

    let mut tmp = vec![0f32; wu * hu * 3];
    for y in 0..hu {
        for x in 0..wu {
            let mut acc = [0f32; 3];
            for (k, &t) in kernel.iter().enumerate() {
                let xx = reflect(x as isize + k as isize - half, wu);
                let idx = (y * wu + xx) * 3;
                for c in 0..3 {
                    acc[c] += t * f32::from(src[idx + c]);
                }
            }
            tmp[(y * wu + x) * 3..(y * wu + x) * 3 + 3].copy_from_slice(&acc);
        }
    }

    let mut out = RgbImage::new(w, h);
    for y in 0..hu {
        for x in 0..wu {
            let mut acc = [0f32; 3];
            for (k, &t) in kernel.iter().enumerate() {
                let yy = reflect(y as isize + k as isize - half, hu);
                let idx = (yy * wu + x) * 3;
                for c in 0..3 {
                    acc[c] += t * tmp[idx + c];
                }
            }
            let px = acc.map(|v| v.round().clamp(0.0, 255.0) as u8);
            out.put_pixel(x as u32, y as u32, Rgb(px));
        }
    }
    out
}

/// Pixel bounds `[x0, x1) x [y0, y1)` of a fractional window.
pub fn roi_bounds(width: u32, height: u32, start: f64, end: f64) -> (u32, u32, u32, u32) {
    let at = |n: u32, f: f64| ((f64::from(n) * f) as u32).min(n);
    (at(width, start), at(height, start), at(width, end), at(height, end))
}

/// BT.601 luma.
pub fn to_gray(img: &RgbImage) -> GrayImage {
    let (w, h) = img.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        let l = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
        Luma([l.round().clamp(0.0, 255.0) as u8])
    })
}

/// 255 where `v > thresh`, else 0.
pub fn threshold(gray: &GrayImage, thresh: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] > thresh { 255 } else { 0 };
    }
    out
}

/// One pass of a 1-D min/max filter along rows or columns.
fn morph_pass(mask: &GrayImage, radius: usize, horizontal: bool, erode: bool) -> GrayImage {
    let (w, h) = mask.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let src = mask.as_raw();
    let mut out = GrayImage::new(w, h);
    let dst: &mut [u8] = &mut out;
    for y in 0..hu {
        for x in 0..wu {
            let (pos, len) = if horizontal { (x, wu) } else { (y, hu) };
            let lo = pos.saturating_sub(radius);
            let hi = (pos + radius).min(len - 1);
            let mut v = if erode { 255u8 } else { 0u8 };
            for q in lo..=hi {
                let s = if horizontal {
                    src[y * wu + q]
                } else {
                    src[q * wu + x]
                };
                v = if erode { v.min(s) } else { v.max(s) };
            }
            dst[y * wu + x] = v;
        }
    }
    out
}

/// Erosion with a `ksize` x `ksize` square, repeated `iterations` times.
pub fn erode(mask: &GrayImage, ksize: usize, iterations: usize) -> GrayImage {
    repeat_square(mask, ksize, iterations, true)
}

/// Dilation with a `ksize` x `ksize` square, repeated `iterations` times.
pub fn dilate(mask: &GrayImage, ksize: usize, iterations: usize) -> GrayImage {
    repeat_square(mask, ksize, iterations, false)
}

fn repeat_square(mask: &GrayImage, ksize: usize, iterations: usize, erode: bool) -> GrayImage {
    let radius = ksize / 2;
    let mut cur = mask.clone();
    if radius == 0 || mask.width() == 0 || mask.height() == 0 {
        return cur;
    }
    for _ in 0..iterations {
        cur = morph_pass(&cur, radius, true, erode);
        cur = morph_pass(&cur, radius, false, erode);
    }
    cur
}

/// Opening (erode then dilate) removes speckle smaller than the kernel.
pub fn open(mask: &GrayImage, ksize: usize, iterations: usize) -> GrayImage {
    dilate(&erode(mask, ksize, iterations), ksize, iterations)
}

/// Closing (dilate then erode) fills gaps smaller than the kernel.
pub fn close(mask: &GrayImage, ksize: usize, iterations: usize) -> GrayImage {
    erode(&dilate(mask, ksize, iterations), ksize, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> GrayImage {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        GrayImage::from_fn(w, h, |x, y| {
            Luma([if rows[y as usize].as_bytes()[x as usize] == b'#' { 255 } else { 0 }])
        })
    }

    fn count(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == 255).count()
    }

    #[test]
    fn kernel_sums_to_one() {
        for k in [1, 3, 5, 7, 9] {
            let s: f32 = gaussian_kernel(k).iter().sum();
            assert!((s - 1.0).abs() < 1e-5, "k={k} sum={s}");
        }
    }

    #[test]
    fn reflect_101_indices() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(-2, 5), 2);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(6, 5), 2);
    }

    #[test]
    fn opening_drops_speckle_keeps_block() {
        let mask = mask_from(&[
            "#.........",
            "..........",
            "...####...",
            "...####...",
            "...####...",
            "...####...",
            "..........",
        ]);
        let opened = open(&mask, 3, 1);
        assert_eq!(opened.get_pixel(0, 0).0[0], 0);
        assert_eq!(count(&opened), 16);
    }

    #[test]
    fn closing_fills_one_pixel_gap() {
        let mask = mask_from(&[
            "..........",
            ".########.",
            ".###.####.",
            ".########.",
            "..........",
        ]);
        let closed = close(&mask, 3, 1);
        assert_eq!(closed.get_pixel(4, 2).0[0], 255);
    }

    #[test]
    fn contrast_saturates() {
        let img = RgbImage::from_pixel(1, 1, Rgb([250, 20, 0]));
        let out = adjust_contrast(&img, 1.5, 50.0);
        assert_eq!(out.get_pixel(0, 0).0, [255, 80, 50]);
    }
}
