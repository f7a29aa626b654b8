use crate::bbox::BBox;
use crate::config::DecoderConfig;
use crate::detection::RawDetection;
use crate::error::Error;

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::prelude::*;

/// Anything that turns an image into raw, pixel-space detections.
pub trait Detector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, Error>;

    fn name(&self) -> &str;
}

/// Neural network runtime behind a YOLO-style head.
pub trait InferenceModel {
    /// `(width, height)` the model expects.
    fn input_size(&self) -> (u32, u32);

    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<Array3<f32>, Error>;
}

/// Turns YOLO head output into per-class suppressed detections
#[derive(Debug, Clone, Default)]
pub struct YoloDecoder {
    config: DecoderConfig,
}

impl YoloDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes the first batch of `output`.
    ///
    /// Rows are `[cx, cy, w, h, score_0, ..]`, in model input pixels unless
    /// the config says normalized. With `transposed` the layout is
    /// `[batch, 4 + classes, preds]`.
    pub fn decode(
        &self,
        output: ArrayView3<'_, f32>,
        input_size: (u32, u32),
        frame_size: (u32, u32),
    ) -> Result<Vec<RawDetection>, Error> {
        if output.shape()[0] == 0 {
            return Ok(Vec::new());
        }

        let batch = output.index_axis(Axis(0), 0);
        let preds = if self.config.transposed {
            batch.reversed_axes()
        } else {
            batch
        };

        let pred_size = preds.shape()[1];
        if pred_size < 5 {
            return Err(Error::detector(format!(
                "prediction rows of size {} carry no class scores",
                pred_size
            )));
        }

        let (in_w, in_h) = (input_size.0 as f32, input_size.1 as f32);
        let (fw, fh) = (frame_size.0 as f32, frame_size.1 as f32);
        let (sx, sy) = if self.config.normalized {
            (fw, fh)
        } else {
            (fw / in_w, fh / in_h)
        };

        let nclasses = pred_size - 4;
        let mut bboxes: Vec<Vec<RawDetection>> = (0..nclasses).map(|_| vec![]).collect();

        for row in preds.outer_iter() {
            let (cx, cy, w, h) = (row[0] * sx, row[1] * sy, row[2] * sx, row[3] * sy);

            let mut class_index = -1;
            let mut confidence = 0.0;

            for (idx, val) in row.iter().skip(4).copied().enumerate() {
                if val > confidence {
                    class_index = idx as i32;
                    confidence = val;
                }
            }

            if class_index > -1 && confidence >= self.config.min_confidence {
                bboxes[class_index as usize].push(RawDetection::new(
                    class_index,
                    confidence,
                    BBox::xywh(cx, cy, w, h).as_ltrb(),
                ));
            }
        }

        let mut results = Vec::new();

        for mut dets in bboxes.into_iter() {
            if dets.len() <= 1 {
                results.append(&mut dets);
                continue;
            }

            let indices = self.non_maximum_supression(&mut dets);

            results.extend(
                dets.drain(..)
                    .enumerate()
                    .filter_map(|(idx, item)| indices.contains(&idx).then_some(item)),
            );
        }

        Ok(results)
    }

    fn non_maximum_supression(&self, dets: &mut [RawDetection]) -> Vec<usize> {
        dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut retain: Vec<_> = (0..dets.len() as i32).collect();
        for idx in 0..dets.len() - 1 {
            if retain[idx] != -1 {
                for r in retain[idx + 1..].iter_mut() {
                    if *r != -1 {
                        let iou = dets[idx].iou(&dets[*r as usize]);
                        if iou > self.config.nms_iou {
                            *r = -1;
                        }
                    }
                }
            }
        }

        retain
            .into_iter()
            .filter(|&x| x > -1)
            .map(|x| x as usize)
            .collect()
    }
}

/// Resizes the image into a `[1, 3, H, W]` RGB tensor scaled to `0..1`.
pub fn to_tensor(image: &RgbImage, (w, h): (u32, u32)) -> Array4<f32> {
    let resized;
    let src = if image.dimensions() == (w, h) {
        image
    } else {
        resized = image::imageops::resize(image, w, h, FilterType::Triangle);
        &resized
    };

    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        src.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

pub struct YoloDetector<M: InferenceModel> {
    model: M,
    decoder: YoloDecoder,
    name: String,
}

impl<M: InferenceModel> YoloDetector<M> {
    pub fn new<S: Into<String>>(name: S, model: M, config: DecoderConfig) -> Self {
        Self {
            model,
            decoder: YoloDecoder::new(config),
            name: name.into(),
        }
    }

    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: InferenceModel> Detector for YoloDetector<M> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, Error> {
        let (fw, fh) = image.dimensions();
        if fw == 0 || fh == 0 {
            return Err(Error::ImageDecode("image has no pixels".into()));
        }

        let input_size = self.model.input_size();
        let tensor = to_tensor(image, input_size);
        let output = self.model.run(tensor.view())?;

        self.decoder.decode(output.view(), input_size, (fw, fh))
    }

    #[inline]
    fn name(&self) -> &str {
        &self.name
    }
}
