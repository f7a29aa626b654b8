use serde_derive::Serialize;

use crate::bbox::{BBox, Ltrb};
use crate::config::TrackerConfig;
use crate::correct::LabelCorrector;
use crate::detection::{first_with, Detection, RawDetection};
use crate::detector::Detector;
use crate::error::Error;
use crate::filter::PositionFilter;
use crate::frame::Frame;
use crate::gate::ConfidenceGate;
use crate::label::{ClassMap, Label};
use crate::motion::MotionDetector;
use crate::scoring::ShotScorer;

/// Stateless per-frame stages shared by every session.
#[derive(Debug, Clone)]
pub struct Pipeline {
    gate: ConfidenceGate,
    corrector: LabelCorrector,
    config: TrackerConfig,
}

impl Pipeline {
    pub fn new(config: TrackerConfig, class_map: ClassMap) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            gate: ConfidenceGate::new(&config.gate, class_map)?,
            corrector: LabelCorrector::new(config.correction.clone()),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn gate(&self) -> &ConfidenceGate {
        &self.gate
    }

    /// Gate, then correct.
    pub fn detections(&self, raw: &[RawDetection], width: u32, height: u32) -> Vec<Detection> {
        let gated = self.gate.apply(raw, width, height);
        self.corrector.apply(gated, width, height)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        let config = TrackerConfig::default();

        Self {
            gate: ConfidenceGate::default(),
            corrector: LabelCorrector::new(config.correction.clone()),
            config,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ObjectReport {
    pub label: Label,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "box")]
    pub bbox: BBox<Ltrb>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl From<&Detection> for ObjectReport {
    fn from(det: &Detection) -> Self {
        let (x, y) = det.center();

        Self {
            label: det.label,
            confidence: (det.confidence * 1000.0).round() / 1000.0,
            x,
            y,
            bbox: det.bbox,
            synthetic: det.synthetic,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BallSource {
    Detector,
    Motion,
    /// No observation this frame, the filter coasted
    Predicted,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct BallEstimate {
    pub x: f32,
    pub y: f32,
    pub source: BallSource,
}

#[derive(Serialize, Debug, Clone)]
pub struct FrameReport {
    #[serde(rename = "frameIndex")]
    pub frame_index: u64,
    pub objects: Vec<ObjectReport>,
    pub ball_path: Vec<(f32, f32)>,
    pub ball: BallEstimate,
    pub shot_made: bool,
}

/// Tracking state of one uploaded video.
///
/// A new upload gets a new `Session`; nothing carries over.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    frames: u64,
    filter: PositionFilter<f32>,
    motion: MotionDetector,
    scorer: ShotScorer,
    ball_path: Vec<(f32, f32)>,
}

impl Session {
    pub fn new<S: Into<String>>(id: S, config: &TrackerConfig) -> Self {
        Self {
            id: id.into(),
            frames: 0,
            filter: PositionFilter::new(&config.filter),
            motion: MotionDetector::new(config.motion.clone()),
            scorer: ShotScorer::new(config.scoring.clone()),
            ball_path: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Index the next ingested frame gets.
    #[inline]
    pub fn next_frame_index(&self) -> u64 {
        self.frames
    }

    #[inline]
    pub fn ball_path(&self) -> &[(f32, f32)] {
        &self.ball_path
    }

    #[inline]
    pub fn shot_made(&self) -> bool {
        self.scorer.made()
    }

    #[inline]
    pub fn filter(&self) -> &PositionFilter<f32> {
        &self.filter
    }

    /// Runs `detector` on the enhanced frame and ingests the result.
    pub fn process<D: Detector + ?Sized>(
        &mut self,
        pipeline: &Pipeline,
        detector: &mut D,
        frame: &Frame,
    ) -> Result<FrameReport, Error> {
        let raw = detector.detect(&frame.enhanced(&pipeline.config.enhance));
        self.ingest(pipeline, frame, raw)
    }

    /// Advances the session by one frame given the detector's outcome.
    ///
    /// A detector error still advances the filter (predict only) and the
    /// path before being returned. An image that cannot be used at all
    /// (`ImageDecode`) leaves the session untouched.
    pub fn ingest(
        &mut self,
        pipeline: &Pipeline,
        frame: &Frame,
        raw: Result<Vec<RawDetection>, Error>,
    ) -> Result<FrameReport, Error> {
        let (width, height) = frame.dims();
        if width == 0 || height == 0 {
            return Err(Error::ImageDecode("image has no pixels".into()));
        }

        let raw = match raw {
            Err(err @ Error::ImageDecode(_)) => return Err(err),
            other => other,
        };

        let frame_index = self.frames;
        self.frames += 1;

        let candidate = self.motion.detect(frame_index, &frame.gray());

        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("session {}: detector failed on frame {}: {}", self.id, frame_index, err);
                self.advance(None);
                return Err(err);
            }
        };

        let detections = pipeline.detections(&raw, width, height);

        let ball = detections
            .iter()
            .filter(|d| d.label == Label::Basketball)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        let observed = match (ball, candidate) {
            (Some(ball), _) => Some((ball.center(), BallSource::Detector)),
            (None, Some(c)) => {
                log::debug!("session {}: motion candidate at ({}, {})", self.id, c.x, c.y);
                Some(((c.x, c.y), BallSource::Motion))
            }
            (None, None) => None,
        };

        let (x, y) = self.advance(observed.map(|(p, _)| p));
        let source = observed.map_or(BallSource::Predicted, |(_, s)| s);

        let hoop = first_with(&detections, Label::Hoop).map(|d| d.bbox);
        let shot_made = self.scorer.update(hoop.as_ref(), &self.ball_path);

        Ok(FrameReport {
            frame_index,
            objects: detections.iter().map(ObjectReport::from).collect(),
            ball_path: self.ball_path.clone(),
            ball: BallEstimate { x, y, source },
            shot_made,
        })
    }

    fn advance(&mut self, observation: Option<(f32, f32)>) -> (f32, f32) {
        let p = self.filter.step(observation);
        self.ball_path.push((p.x, p.y));

        (p.x, p.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::solid;
    use approx::assert_abs_diff_eq;

    fn frame(id: u64) -> Frame {
        Frame::new(id, solid(320, 240, [0, 0, 0]))
    }

    fn ball(x: f32, y: f32, confidence: f32) -> RawDetection {
        RawDetection::new(0, confidence, BBox::ltrb(x - 5.0, y - 5.0, x + 5.0, y + 5.0))
    }

    #[test]
    fn report_carries_corrected_objects() {
        let pipeline = Pipeline::default();
        let mut session = Session::new("a", pipeline.config());

        let raw = vec![
            ball(50.0, 60.0, 0.8),
            RawDetection::new(2, 0.4, BBox::ltrb(100.0, 50.0, 180.0, 90.0)),
            RawDetection::new(1, 0.3, BBox::ltrb(100.0, 40.0, 180.0, 50.0)),
        ];

        let report = session.ingest(&pipeline, &frame(0), Ok(raw)).unwrap();

        // low hoop gated out, then synthesized from the net
        let labels: Vec<_> = report.objects.iter().map(|o| o.label).collect();
        assert_eq!(labels, vec![Label::Basketball, Label::Net, Label::Hoop]);
        assert!(report.objects[2].synthetic);

        assert_eq!(report.frame_index, 0);
        assert_eq!(report.ball.source, BallSource::Detector);
        assert_eq!(report.ball_path, vec![(50.0, 60.0)]);
    }

    #[test]
    fn highest_confidence_ball_is_observed() {
        let pipeline = Pipeline::default();
        let mut session = Session::new("a", pipeline.config());

        let raw = vec![ball(20.0, 20.0, 0.5), ball(200.0, 100.0, 0.9)];
        let report = session.ingest(&pipeline, &frame(0), Ok(raw)).unwrap();

        assert_eq!((report.ball.x, report.ball.y), (200.0, 100.0));
    }

    #[test]
    fn detector_error_coasts_and_records() {
        let pipeline = Pipeline::default();
        let mut session = Session::new("a", pipeline.config());

        session.ingest(&pipeline, &frame(0), Ok(vec![ball(40.0, 40.0, 0.9)])).unwrap();
        let err = session.ingest(&pipeline, &frame(1), Err(Error::detector("backend down")));

        assert!(matches!(err, Err(Error::Detector(_))));
        assert_eq!(session.ball_path().len(), 2);
        assert_eq!(session.next_frame_index(), 2);
        assert_abs_diff_eq!(session.ball_path()[1].0, 40.0, epsilon = 1e-4);
    }

    #[test]
    fn pixelless_frame_leaves_session_untouched() {
        let pipeline = Pipeline::default();
        let mut session = Session::new("a", pipeline.config());

        let empty = Frame::new(0, image::RgbImage::new(0, 0));
        assert!(matches!(
            session.ingest(&pipeline, &empty, Ok(vec![])),
            Err(Error::ImageDecode(_))
        ));

        assert!(session.ball_path().is_empty());
        assert_eq!(session.next_frame_index(), 0);
    }

    #[test]
    fn decode_error_from_detector_is_not_a_frame() {
        let pipeline = Pipeline::default();
        let mut session = Session::new("a", pipeline.config());

        session.ingest(&pipeline, &frame(0), Ok(vec![ball(40.0, 40.0, 0.9)])).unwrap();
        let err = session.ingest(&pipeline, &frame(1), Err(Error::ImageDecode("bad".into())));

        assert!(matches!(err, Err(Error::ImageDecode(_))));
        assert_eq!(session.ball_path().len(), 1);
        assert_eq!(session.next_frame_index(), 1);
    }

    #[test]
    fn motion_candidate_used_without_ball() {
        let pipeline = Pipeline::default();
        let mut session = Session::new("a", pipeline.config());

        session.ingest(&pipeline, &frame(0), Ok(vec![])).unwrap();

        let mut moved = solid(320, 240, [0, 0, 0]);
        for y in 100..114 {
            for x in 150..164 {
                moved.put_pixel(x, y, image::Rgb([255, 255, 255]));
            }
        }

        let report = session
            .ingest(&pipeline, &Frame::new(1, moved), Ok(vec![]))
            .unwrap();

        assert_eq!(report.ball.source, BallSource::Motion);
        assert_abs_diff_eq!(report.ball.x, 157.0, epsilon = 1.0);
        assert_abs_diff_eq!(report.ball.y, 107.0, epsilon = 1.0);
    }

    #[test]
    fn nothing_observed_predicts() {
        let pipeline = Pipeline::default();
        let mut session = Session::new("a", pipeline.config());

        let report = session.ingest(&pipeline, &frame(0), Ok(vec![])).unwrap();
        assert_eq!(report.ball.source, BallSource::Predicted);
        assert_eq!((report.ball.x, report.ball.y), (0.0, 0.0));
        assert!(report.objects.is_empty());
    }

    #[test]
    fn confidence_rounded_and_synthetic_omitted() {
        let det = Detection::new(Label::Basketball, 0.87654, BBox::ltrb(0.0, 0.0, 10.0, 20.0));
        let json = serde_json::to_value(ObjectReport::from(&det)).unwrap();

        assert_eq!(json["label"], "basketball");
        assert_abs_diff_eq!(json["confidence"].as_f64().unwrap(), 0.877, epsilon = 1e-6);
        assert_eq!(json["x"], 5.0);
        assert_eq!(json["y"], 10.0);
        assert_eq!(json["box"], serde_json::json!([0.0, 0.0, 10.0, 20.0]));
        assert!(json.get("synthetic").is_none());
    }
}
