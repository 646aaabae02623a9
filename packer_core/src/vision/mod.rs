//! Object outline extraction from a single camera frame.
//!
//! [`DimensionExtractor::extract`] runs the fixed chain
//! contrast → blur → ROI crop → gray → threshold → open → close → largest
//! outer contour, and converts the contour's bounding box to centimeters with
//! a per-camera [`CameraCalibration`].

pub mod contour;
pub mod filters;
pub mod snapshot;

use image::RgbImage;
use image::imageops;
use packer_traits::Frame;
use serde::Serialize;
use tracing::{debug, trace};

pub use contour::{BoundingBox, Contour, external_contours};

use crate::error::{PackerError, Result, VisionFailure};
use crate::util::round1;

/// Tunables of the extraction chain.
#[derive(Debug, Clone)]
pub struct VisionParams {
    pub contrast_gain: f64,
    pub contrast_offset: f64,
    pub blur_kernel: usize,
    pub roi_start: f64,
    pub roi_end: f64,
    pub threshold: u8,
    pub morph_kernel: usize,
    pub morph_iterations: usize,
    pub min_area_px: f64,
}

impl Default for VisionParams {
    fn default() -> Self {
        Self {
            contrast_gain: 1.5,
            contrast_offset: 50.0,
            blur_kernel: 5,
            roi_start: 0.2,
            roi_end: 0.8,
            threshold: 200,
            morph_kernel: 7,
            morph_iterations: 2,
            min_area_px: 5000.0,
        }
    }
}

/// Pixel-to-centimeter conversion for one camera.
///
/// Axis `a` is the bounding-box width, `b` its height. Offsets are added to
/// the scaled value before rounding to one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraCalibration {
    pub ratio_cm_per_px: f64,
    pub offset_a_cm: f64,
    pub offset_b_cm: f64,
}

impl CameraCalibration {
    pub fn new(ratio_cm_per_px: f64) -> Self {
        Self {
            ratio_cm_per_px,
            offset_a_cm: 0.0,
            offset_b_cm: 0.0,
        }
    }

    pub fn raw_cm(&self, px: u32) -> f64 {
        f64::from(px) * self.ratio_cm_per_px
    }

    /// Corrected `(a, b)` in centimeters for a box of `width_px` x `height_px`.
    pub fn to_cm(&self, width_px: u32, height_px: u32) -> (f64, f64) {
        (
            round1(self.raw_cm(width_px) + self.offset_a_cm),
            round1(self.raw_cm(height_px) + self.offset_b_cm),
        )
    }
}

/// What one successful extraction found.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Box within the ROI, in ROI pixel coordinates.
    pub bbox: BoundingBox,
    pub area_px: f64,
    pub dim_a_cm: f64,
    pub dim_b_cm: f64,
    pub raw_a_cm: f64,
    pub raw_b_cm: f64,
    /// The ROI after contrast and blur, with the box drawn in.
    pub annotated: RgbImage,
}

fn failure(v: VisionFailure) -> eyre::Report {
    eyre::Report::new(PackerError::Vision(v))
}

#[derive(Debug, Clone, Default)]
pub struct DimensionExtractor {
    params: VisionParams,
}

impl DimensionExtractor {
    pub fn new(params: VisionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &VisionParams {
        &self.params
    }

    pub fn extract(&self, frame: &Frame, cal: &CameraCalibration) -> Result<Extraction> {
        let p = &self.params;
        let img = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone()).ok_or_else(
            || {
                failure(VisionFailure::BadFrame(format!(
                    "{}x{} frame with {} bytes",
                    frame.width,
                    frame.height,
                    frame.rgb.len()
                )))
            },
        )?;

        let contrasted = filters::adjust_contrast(&img, p.contrast_gain, p.contrast_offset);
        let blurred = filters::gaussian_blur(&contrasted, p.blur_kernel);
        let (x0, y0, x1, y1) =
            filters::roi_bounds(frame.width, frame.height, p.roi_start, p.roi_end);
        if x1 <= x0 || y1 <= y0 {
            return Err(failure(VisionFailure::BadFrame(format!(
                "empty region of interest in {}x{} frame",
                frame.width, frame.height
            ))));
        }
        let roi = imageops::crop_imm(&blurred, x0, y0, x1 - x0, y1 - y0).to_image();

        let gray = filters::to_gray(&roi);
        let mask = filters::threshold(&gray, p.threshold);
        let mask = filters::open(&mask, p.morph_kernel, p.morph_iterations);
        let mask = filters::close(&mask, p.morph_kernel, p.morph_iterations);

        let contours = external_contours(&mask);
        trace!(contours = contours.len(), "contours traced");
        let largest = contours
            .iter()
            .map(|c| (c.area(), c))
            .fold(None::<(f64, &Contour)>, |best, (area, c)| match best {
                Some((a, _)) if a >= area => best,
                _ => Some((area, c)),
            });
        let Some((area, contour)) = largest else {
            return Err(failure(VisionFailure::NoContour));
        };
        if area < p.min_area_px {
            return Err(failure(VisionFailure::ContourTooSmall {
                area,
                min: p.min_area_px,
            }));
        }

        let bbox = contour.bounding_box();
        let (dim_a_cm, dim_b_cm) = cal.to_cm(bbox.width, bbox.height);
        let mut annotated = roi;
        snapshot::draw_box(&mut annotated, bbox, 2);
        debug!(
            area_px = area,
            width_px = bbox.width,
            height_px = bbox.height,
            dim_a_cm,
            dim_b_cm,
            "object extracted"
        );
        Ok(Extraction {
            bbox,
            area_px: area,
            dim_a_cm,
            dim_b_cm,
            raw_a_cm: cal.raw_cm(bbox.width),
            raw_b_cm: cal.raw_cm(bbox.height),
            annotated,
        })
    }
}
