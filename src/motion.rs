//! Frame-differencing ball candidate for frames where the detector saw no
//! ball. Any moving blob in the area range qualifies.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};

use crate::bbox::{BBox, Ltwh};
use crate::config::MotionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionCandidate {
    pub x: f32,
    pub y: f32,
    pub bbox: BBox<Ltwh>,
    pub frame: u64,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct MotionDetector {
    config: MotionConfig,
    last: Option<GrayImage>,
}

fn blur(gray: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return gray.clone();
    }

    let (w, h) = gray.dimensions();
    let f = ImageBuffer::<Luma<f32>, Vec<f32>>::from_fn(w, h, |x, y| {
        Luma([gray.get_pixel(x, y)[0] as f32])
    });
    let blurred = imageproc::filter::gaussian_blur_f32(&f, sigma);

    GrayImage::from_fn(w, h, |x, y| {
        Luma([blurred.get_pixel(x, y)[0].round().clamp(0.0, 255.0) as u8])
    })
}

/// `|a - b| > threshold` as a 0/255 mask.
fn diff_mask(a: &GrayImage, b: &GrayImage, threshold: u8) -> GrayImage {
    let (w, h) = a.dimensions();

    GrayImage::from_fn(w, h, |x, y| {
        let d = a.get_pixel(x, y)[0].abs_diff(b.get_pixel(x, y)[0]);
        Luma([if d > threshold { 255 } else { 0 }])
    })
}

/// Shoelace area of the polygon through the contour's pixel centres.
fn contour_area(contour: &Contour<i32>) -> f32 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }

    let mut acc = 0i64;
    for (i, p) in pts.iter().enumerate() {
        let q = &pts[(i + 1) % pts.len()];
        acc += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }

    (acc.abs() as f32) / 2.0
}

fn bounding_rect(contour: &Contour<i32>) -> Option<BBox<Ltwh>> {
    let xs = contour.points.iter().map(|p| p.x);
    let ys = contour.points.iter().map(|p| p.y);
    let (x0, x1) = (xs.clone().min()?, xs.max()?);
    let (y0, y1) = (ys.clone().min()?, ys.max()?);

    Some(BBox::ltwh(
        x0 as f32,
        y0 as f32,
        (x1 - x0 + 1) as f32,
        (y1 - y0 + 1) as f32,
    ))
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self { config, last: None }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    #[inline]
    pub fn has_history(&self) -> bool {
        self.last.is_some()
    }

    /// Compares `gray` against the previous frame and remembers it for the
    /// next call. The first frame (or a resolution change) only primes the
    /// history.
    pub fn detect(&mut self, frame: u64, gray: &GrayImage) -> Option<MotionCandidate> {
        let current = blur(gray, self.config.blur_sigma);

        let previous = match self.last.replace(current) {
            Some(prev) if prev.dimensions() == gray.dimensions() => prev,
            _ => return None,
        };

        let current = self.last.as_ref()?;
        let mask = diff_mask(&previous, current, self.config.diff_threshold);

        let (min_area, max_area) = (self.config.min_area, self.config.max_area);
        let mut best: Option<BBox<Ltwh>> = None;

        for contour in find_contours::<i32>(&mask) {
            if contour.border_type != BorderType::Outer || contour.parent.is_some() {
                continue;
            }

            let area = contour_area(&contour);
            if area < min_area || area > max_area {
                continue;
            }

            if let Some(rect) = bounding_rect(&contour) {
                // first largest wins
                if best.map_or(true, |b| rect.area() > b.area()) {
                    best = Some(rect);
                }
            }
        }

        best.map(|rect| MotionCandidate {
            x: rect.left() + rect.width() / 2.0,
            y: rect.top() + rect.height() / 2.0,
            bbox: rect,
            frame,
            confidence: self.config.confidence,
        })
    }
}
