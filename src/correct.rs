//! Geometric relabelling of detector output.
//!
//! The detector mixes up net mesh and players of similar scale and sometimes
//! misses the rim entirely. Three passes run in order:
//!
//! 1. flat player boxes overlapping the backboard or hoop become `net`,
//!    unless the box is large relative to the backboard;
//! 2. tall, large net boxes far from both become `player`;
//! 3. a missing hoop is synthesized from the net (or backboard) geometry.
//!
//! Reference boxes are the first detected backboard and the first
//! non-synthetic hoop, so running the corrector over its own output changes
//! nothing.

use crate::bbox::{BBox, Ltrb};
use crate::config::CorrectionConfig;
use crate::detection::{first_with, Detection};
use crate::label::Label;

#[derive(Debug, Clone, Default)]
pub struct LabelCorrector {
    config: CorrectionConfig,
}

/// Width, height and aspect ratio, each side at least one pixel.
#[inline]
fn dims(bbox: &BBox<Ltrb>) -> (f32, f32, f32) {
    let w = bbox.width().max(1.0);
    let h = bbox.height().max(1.0);

    (w, h, w / h)
}

impl LabelCorrector {
    pub fn new(config: CorrectionConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    pub fn apply(&self, mut detections: Vec<Detection>, width: u32, height: u32) -> Vec<Detection> {
        let backboard = first_with(&detections, Label::Backboard).map(|d| d.bbox);
        let hoop = detections
            .iter()
            .find(|d| d.label == Label::Hoop && !d.synthetic)
            .map(|d| d.bbox);

        self.players_to_net(&mut detections, backboard.as_ref(), hoop.as_ref());
        self.nets_to_player(&mut detections, backboard.as_ref(), hoop.as_ref());

        if first_with(&detections, Label::Hoop).is_none() {
            if let Some(synth) = self.synthesize_hoop(&detections, width, height) {
                detections.push(synth);
            }
        }

        detections
    }

    fn players_to_net(
        &self,
        detections: &mut [Detection],
        backboard: Option<&BBox<Ltrb>>,
        hoop: Option<&BBox<Ltrb>>,
    ) {
        let cfg = &self.config;

        for det in detections.iter_mut().filter(|d| d.label == Label::Player) {
            let (w, h, aspect) = dims(&det.bbox);
            if aspect <= cfg.player_to_net_min_aspect {
                continue;
            }

            let near_backboard =
                backboard.map_or(false, |bb| det.bbox.iou(bb) > cfg.player_to_net_backboard_iou);
            let near_hoop = hoop.map_or(false, |ho| det.bbox.iou(ho) > cfg.player_to_net_hoop_iou);

            if !(near_backboard || near_hoop) {
                continue;
            }

            let flip = match backboard {
                None => true,
                Some(bb) => w * h < cfg.player_max_backboard_area_ratio * bb.area(),
            };

            if flip {
                log::debug!("relabel player -> net {:?}", det.bbox);
                det.label = Label::Net;
            }
        }
    }

    fn nets_to_player(
        &self,
        detections: &mut [Detection],
        backboard: Option<&BBox<Ltrb>>,
        hoop: Option<&BBox<Ltrb>>,
    ) {
        let cfg = &self.config;

        for det in detections.iter_mut().filter(|d| d.label == Label::Net) {
            let (w, h, aspect) = dims(&det.bbox);

            let far_backboard =
                backboard.map_or(true, |bb| det.bbox.iou(bb) < cfg.net_to_player_backboard_iou);
            let far_hoop = hoop.map_or(true, |ho| det.bbox.iou(ho) < cfg.net_to_player_hoop_iou);

            if aspect < cfg.net_to_player_max_aspect
                && w * h > cfg.net_to_player_min_area
                && far_backboard
                && far_hoop
            {
                log::debug!("relabel net -> player {:?}", det.bbox);
                det.label = Label::Player;
            }
        }
    }

    /// Rim box centred on the net (else backboard), top edge on its top edge.
    fn synthesize_hoop(&self, detections: &[Detection], width: u32, height: u32) -> Option<Detection> {
        let cfg = &self.config;
        let source = first_with(detections, Label::Net)
            .or_else(|| first_with(detections, Label::Backboard))?;

        let (w, _, _) = dims(&source.bbox);
        let (cx, _) = source.bbox.center();
        let rim_w = cfg.hoop_min_width.max(cfg.hoop_width_ratio * w);
        let top = source.bbox.top();

        let bbox = BBox::ltrb(
            cx - rim_w / 2.0,
            top,
            cx + rim_w / 2.0,
            top + cfg.hoop_height,
        )
        .clamped(width as f32, height as f32);

        if !bbox.is_valid() {
            return None;
        }

        log::debug!("synthesized hoop {:?} from {}", bbox, source.label);

        Some(Detection::synthetic(Label::Hoop, cfg.hoop_confidence, bbox))
    }
}
