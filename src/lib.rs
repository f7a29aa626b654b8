pub mod annotation;
pub mod bbox;
pub mod config;
pub mod correct;
pub mod detection;
pub mod detector;
pub mod error;
pub mod filter;
pub mod frame;
pub mod gate;
pub mod label;
pub mod motion;
pub mod pool;
pub mod scoring;
pub mod session;
pub mod tracker;

#[cfg(test)]
mod test_utils;

pub use config::TrackerConfig;
pub use correct::LabelCorrector;
pub use detection::{Detection, RawDetection};
pub use detector::{Detector, InferenceModel, YoloDecoder, YoloDetector};
pub use error::{Error, Result};
pub use filter::PositionFilter;
pub use frame::Frame;
pub use gate::ConfidenceGate;
pub use label::{ClassMap, Label};
pub use motion::{MotionCandidate, MotionDetector};
pub use session::{FrameReport, Pipeline, Session};
pub use tracker::ShotTracker;
