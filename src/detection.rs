use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::label::Label;

/// Detector output before class mapping and gating, in source-image pixels
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    #[serde(rename = "c")]
    pub class: i32,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BBox<Ltrb>,
}

impl RawDetection {
    pub fn new(class: i32, confidence: f32, bbox: BBox<Ltrb>) -> Self {
        Self {
            class,
            confidence,
            bbox,
        }
    }

    #[inline]
    pub fn iou(&self, other: &RawDetection) -> f32 {
        self.bbox.iou(&other.bbox)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub label: Label,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BBox<Ltrb>,
    #[serde(default)]
    pub synthetic: bool,
}

impl Detection {
    pub fn new(label: Label, confidence: f32, bbox: BBox<Ltrb>) -> Self {
        Self {
            label,
            confidence,
            bbox,
            synthetic: false,
        }
    }

    pub fn synthetic(label: Label, confidence: f32, bbox: BBox<Ltrb>) -> Self {
        Self {
            label,
            confidence,
            bbox,
            synthetic: true,
        }
    }

    #[inline(always)]
    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }
}

/// First detection carrying `label`, in input order.
pub fn first_with(detections: &[Detection], label: Label) -> Option<&Detection> {
    detections.iter().find(|d| d.label == label)
}
