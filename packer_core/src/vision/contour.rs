//! Outer contours of binary blobs.
//!
//! Blobs are 8-connected components found by flood fill. Each blob's outer
//! boundary is traced with Moore-neighbour tracing starting from its first
//! pixel in raster order; holes are not traced.

use std::collections::VecDeque;

use image::GrayImage;
use serde::Serialize;

/// Axis-aligned box in pixel coordinates, inclusive of both edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
}

impl Contour {
    /// Polygon area through the pixel centres (shoelace formula).
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut twice = 0i64;
        for i in 0..n {
            let (x0, y0) = self.points[i];
            let (x1, y1) = self.points[(i + 1) % n];
            twice += i64::from(x0) * i64::from(y1) - i64::from(x1) * i64::from(y0);
        }
        twice.unsigned_abs() as f64 / 2.0
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let (mut x0, mut y0) = (i32::MAX, i32::MAX);
        let (mut x1, mut y1) = (i32::MIN, i32::MIN);
        for &(x, y) in &self.points {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        if self.points.is_empty() {
            return BoundingBox {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            };
        }
        BoundingBox {
            x: x0.max(0) as u32,
            y: y0.max(0) as u32,
            width: (x1 - x0 + 1) as u32,
            height: (y1 - y0 + 1) as u32,
        }
    }
}

// Clockwise with y pointing down, starting west.
const DIRS: [(i32, i32); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

struct Mask<'a> {
    data: &'a [u8],
    w: i32,
    h: i32,
}

impl Mask<'_> {
    fn on(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.w && y < self.h && self.data[(y * self.w + x) as usize] != 0
    }
}

fn dir_index(dx: i32, dy: i32) -> usize {
    DIRS.iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or(0)
}

fn trace_boundary(mask: &Mask<'_>, start: (i32, i32)) -> Vec<(i32, i32)> {
    let mut points = vec![start];
    let mut cur = start;
    let mut back = (start.0 - 1, start.1);
    let mut second: Option<(i32, i32)> = None;
    let limit = 4 * (mask.w as usize) * (mask.h as usize) + 8;

    for _ in 0..limit {
        let from = dir_index(back.0 - cur.0, back.1 - cur.1);
        let mut found = None;
        for k in 1..=8 {
            let d = (from + k) % 8;
            let p = (cur.0 + DIRS[d].0, cur.1 + DIRS[d].1);
            if mask.on(p.0, p.1) {
                let b = (d + 7) % 8;
                found = Some((p, (cur.0 + DIRS[b].0, cur.1 + DIRS[b].1)));
                break;
            }
        }
        let Some((next, nb)) = found else {
            break; // isolated pixel
        };
        if cur == start {
            match second {
                Some(s) if s == next => break,
                None => second = Some(next),
                Some(_) => {}
            }
        }
        points.push(next);
        back = nb;
        cur = next;
    }
    if points.len() > 1 && points.last() == Some(&start) {
        points.pop();
    }
    points
}

/// Outer contour of every 8-connected blob in `mask` (non-zero = foreground).
pub fn external_contours(mask: &GrayImage) -> Vec<Contour> {
    let (w, h) = (mask.width() as i32, mask.height() as i32);
    let m = Mask {
        data: mask.as_raw(),
        w,
        h,
    };
    let mut seen = vec![false; (w * h) as usize];
    let mut out = Vec::new();
    let mut queue = VecDeque::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if seen[idx] || !m.on(x, y) {
                continue;
            }
            out.push(Contour {
                points: trace_boundary(&m, (x, y)),
            });
            seen[idx] = true;
            queue.push_back((x, y));
            while let Some((cx, cy)) = queue.pop_front() {
                for (dx, dy) in DIRS {
                    let (nx, ny) = (cx + dx, cy + dy);
                    if m.on(nx, ny) {
                        let ni = (ny * w + nx) as usize;
                        if !seen[ni] {
                            seen[ni] = true;
                            queue.push_back((nx, ny));
                        }
                    }
                }
            }
        }
    }
    out
}
