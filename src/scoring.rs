use serde_derive::Serialize;

use crate::bbox::{BBox, Ltrb};
use crate::config::ScoringConfig;

/// Region just under the rim the ball passes through on a make.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ScoringZone(pub BBox<Ltrb>);

impl ScoringZone {
    /// Middle half of the hoop width, `depth` pixels down from its bottom edge.
    pub fn from_hoop(hoop: &BBox<Ltrb>, depth: f32) -> Self {
        let quarter = hoop.width() / 4.0;

        ScoringZone(BBox::ltrb(
            hoop.left() + quarter,
            hoop.bottom(),
            hoop.right() - quarter,
            hoop.bottom() + depth,
        ))
    }

    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.0.contains(x, y)
    }

    /// Any of the last `lookback` points strictly inside the zone.
    pub fn entered_by(&self, path: &[(f32, f32)], lookback: usize) -> bool {
        let start = path.len().saturating_sub(lookback);

        path[start..].iter().any(|&(x, y)| self.contains(x, y))
    }
}

/// Latches once the ball path enters the current hoop's zone.
#[derive(Debug, Clone, Default)]
pub struct ShotScorer {
    config: ScoringConfig,
    made: bool,
}

impl ShotScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            made: false,
        }
    }

    #[inline]
    pub fn made(&self) -> bool {
        self.made
    }

    pub fn update(&mut self, hoop: Option<&BBox<Ltrb>>, path: &[(f32, f32)]) -> bool {
        if self.made {
            return true;
        }

        if let Some(hoop) = hoop {
            let zone = ScoringZone::from_hoop(hoop, self.config.zone_depth);
            if zone.entered_by(path, self.config.lookback) {
                log::info!("shot made, zone {:?}", zone.0);
                self.made = true;
            }
        }

        self.made
    }
}
