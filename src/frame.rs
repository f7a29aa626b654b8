use base64::Engine;
use image::{GrayImage, RgbImage};
use std::borrow::Cow;

use crate::config::EnhanceConfig;
use crate::error::Error;

const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// One decoded video frame, numbered within its session
pub struct Frame {
    pub id: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(id: u64, image: RgbImage) -> Self {
        Self { id, image }
    }

    /// Like `new`, but an image without pixels is an `ImageDecode` error.
    pub fn try_new(id: u64, image: RgbImage) -> Result<Self, Error> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::ImageDecode("image has no pixels".into()));
        }

        Ok(Self { id, image })
    }

    /// Decodes an encoded image (JPEG, PNG, ...).
    pub fn decode(id: u64, bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Err(Error::ImageDecode("empty image".into()));
        }

        Self::try_new(id, image::load_from_memory(bytes)?.to_rgb8())
    }

    /// Decodes base64 image data, with or without a `data:image/...;base64,` prefix.
    pub fn from_data_url(id: u64, data: &str) -> Result<Self, Error> {
        let payload = data.rsplit(',').next().unwrap_or(data).trim();
        let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;

        Self::decode(id, &bytes)
    }

    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[inline]
    pub fn gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }

    /// The image the detector sees: sharpened, then `alpha * v + beta`.
    pub fn enhanced(&self, config: &EnhanceConfig) -> Cow<'_, RgbImage> {
        if !config.enabled {
            return Cow::Borrowed(&self.image);
        }

        let mut out = if config.sharpen {
            sharpen(&self.image)
        } else {
            self.image.clone()
        };

        for px in out.pixels_mut() {
            for c in px.0.iter_mut() {
                *c = (config.alpha * *c as f32 + config.beta).round().clamp(0.0, 255.0) as u8;
            }
        }

        Cow::Owned(out)
    }
}

/// 3x3 sharpen; the one pixel border keeps its source values.
fn sharpen(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    if w < 3 || h < 3 {
        return image.clone();
    }

    let mut out: RgbImage = image::imageops::filter3x3(image, &SHARPEN_KERNEL);

    for x in 0..w {
        out.put_pixel(x, 0, *image.get_pixel(x, 0));
        out.put_pixel(x, h - 1, *image.get_pixel(x, h - 1));
    }

    for y in 0..h {
        out.put_pixel(0, y, *image.get_pixel(0, y));
        out.put_pixel(w - 1, y, *image.get_pixel(w - 1, y));
    }

    out
}
