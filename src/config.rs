//! Tuned constants of the pipeline, loadable from JSON.
//!
//! Every value defaults to the number the detector was calibrated with, so a
//! config file only needs to name what it overrides.

use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Error;
use crate::label::Label;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum confidence per label name, merged over the defaults
    #[serde(deserialize_with = "merge_thresholds")]
    pub thresholds: BTreeMap<String, f32>,
    /// Used for labels missing from `thresholds`
    pub fallback: f32,
}

fn merge_thresholds<'de, D>(deserializer: D) -> Result<BTreeMap<String, f32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let overrides = <BTreeMap<String, f32> as serde::Deserialize>::deserialize(deserializer)?;
    let mut thresholds = GateConfig::default().thresholds;
    thresholds.extend(overrides);

    Ok(thresholds)
}

impl Default for GateConfig {
    fn default() -> Self {
        let thresholds = [
            (Label::Basketball, 0.36),
            (Label::Hoop, 0.68),
            (Label::Backboard, 0.65),
            (Label::Player, 0.45),
            (Label::Net, 0.25),
        ]
        .iter()
        .map(|(l, t)| (l.as_str().to_string(), *t))
        .collect();

        Self {
            thresholds,
            fallback: 0.25,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CorrectionConfig {
    pub player_to_net_min_aspect: f32,
    pub player_to_net_backboard_iou: f32,
    pub player_to_net_hoop_iou: f32,
    /// A player box at least this fraction of the backboard area stays a player
    pub player_max_backboard_area_ratio: f32,

    pub net_to_player_max_aspect: f32,
    pub net_to_player_min_area: f32,
    pub net_to_player_backboard_iou: f32,
    pub net_to_player_hoop_iou: f32,

    pub hoop_min_width: f32,
    pub hoop_width_ratio: f32,
    pub hoop_height: f32,
    pub hoop_confidence: f32,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            player_to_net_min_aspect: 1.3,
            player_to_net_backboard_iou: 0.15,
            player_to_net_hoop_iou: 0.08,
            player_max_backboard_area_ratio: 0.35,

            net_to_player_max_aspect: 0.9,
            net_to_player_min_area: 3200.0,
            net_to_player_backboard_iou: 0.05,
            net_to_player_hoop_iou: 0.03,

            hoop_min_width: 40.0,
            hoop_width_ratio: 0.55,
            hoop_height: 8.0,
            hoop_confidence: 0.51,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    pub process_noise: f32,
    pub measurement_noise: f32,
    pub initial_covariance: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            process_noise: 1e-2,
            measurement_noise: 1e-1,
            initial_covariance: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    pub min_area: f32,
    pub max_area: f32,
    /// Gaussian sigma, a 7x7 kernel worth of smoothing
    pub blur_sigma: f32,
    pub diff_threshold: u8,
    pub confidence: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_area: 30.0,
            max_area: 5000.0,
            blur_sigma: 1.4,
            diff_threshold: 20,
            confidence: 0.5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EnhanceConfig {
    pub enabled: bool,
    pub sharpen: bool,
    pub alpha: f32,
    pub beta: f32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sharpen: true,
            alpha: 1.3,
            beta: 15.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DecoderConfig {
    pub min_confidence: f32,
    pub nms_iou: f32,
    /// `[batch, 4 + classes, preds]` instead of `[batch, preds, 4 + classes]`
    pub transposed: bool,
    /// Box coordinates are normalized 0-1 rather than model-input pixels
    pub normalized: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            nms_iou: 0.45,
            transposed: true,
            normalized: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub zone_depth: f32,
    pub lookback: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            zone_depth: 40.0,
            lookback: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub gate: GateConfig,
    pub correction: CorrectionConfig,
    pub filter: FilterConfig,
    pub motion: MotionConfig,
    pub enhance: EnhanceConfig,
    pub decoder: DecoderConfig,
    pub scoring: ScoringConfig,
    /// Number of detector instances allowed to run at once
    pub pool_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            correction: CorrectionConfig::default(),
            filter: FilterConfig::default(),
            motion: MotionConfig::default(),
            enhance: EnhanceConfig::default(),
            decoder: DecoderConfig::default(),
            scoring: ScoringConfig::default(),
            pool_size: 1,
        }
    }
}

impl TrackerConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (name, threshold) in &self.gate.thresholds {
            name.parse::<Label>()?;

            if !(0.0..=1.0).contains(threshold) {
                return Err(Error::config(format!(
                    "threshold for `{}` out of range: {}",
                    name, threshold
                )));
            }
        }

        if self.motion.min_area > self.motion.max_area {
            return Err(Error::config("motion.min_area exceeds motion.max_area"));
        }

        if self.pool_size == 0 {
            return Err(Error::config("pool_size must be at least 1"));
        }

        Ok(())
    }
}
