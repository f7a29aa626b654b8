use std::collections::HashMap;

use crate::config::GateConfig;
use crate::detection::{Detection, RawDetection};
use crate::error::Error;
use crate::label::{ClassMap, Label};

/// Per-label minimum confidence filter
#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    thresholds: HashMap<Label, f32>,
    fallback: f32,
    class_map: ClassMap,
}

impl ConfidenceGate {
    pub fn new(config: &GateConfig, class_map: ClassMap) -> Result<Self, Error> {
        let mut thresholds = HashMap::with_capacity(config.thresholds.len());

        for (name, threshold) in &config.thresholds {
            thresholds.insert(name.parse::<Label>()?, *threshold);
        }

        Ok(Self {
            thresholds,
            fallback: config.fallback,
            class_map,
        })
    }

    #[inline]
    pub fn threshold(&self, label: Label) -> f32 {
        self.thresholds.get(&label).copied().unwrap_or(self.fallback)
    }

    #[inline]
    pub fn passes(&self, det: &Detection) -> bool {
        det.confidence >= self.threshold(det.label)
    }

    #[inline]
    pub fn class_map(&self) -> &ClassMap {
        &self.class_map
    }

    /// Keeps detections at or above their label's threshold, preserving order.
    pub fn filter(&self, mut detections: Vec<Detection>) -> Vec<Detection> {
        detections.retain(|d| self.passes(d));
        detections
    }

    /// Maps raw detector output to labelled detections clamped into a
    /// `width x height` image, then filters them.
    ///
    /// Unknown class ids and boxes that collapse to nothing after clamping are
    /// dropped.
    pub fn apply(&self, raw: &[RawDetection], width: u32, height: u32) -> Vec<Detection> {
        let (fw, fh) = (width as f32, height as f32);

        let labelled = raw
            .iter()
            .filter_map(|r| {
                let label = match self.class_map.label(r.class) {
                    Some(label) => label,
                    None => {
                        log::debug!("dropping detection with unknown class id {}", r.class);
                        return None;
                    }
                };

                let bbox = r.bbox.clamped(fw, fh);
                if !bbox.is_valid() {
                    log::debug!("dropping degenerate {} box {:?}", label, r.bbox);
                    return None;
                }

                Some(Detection::new(label, r.confidence, bbox))
            })
            .collect();

        self.filter(labelled)
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        let config = GateConfig::default();

        Self {
            thresholds: config
                .thresholds
                .iter()
                .filter_map(|(name, t)| Some((name.parse().ok()?, *t)))
                .collect(),
            fallback: config.fallback,
            class_map: ClassMap::default(),
        }
    }
}
