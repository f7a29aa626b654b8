//! Dataset artifacts written next to extracted frames: YOLO label files,
//! the skipped-frame log and the active detector pointer.

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::bbox::{BBox, Ltrb};
use crate::detection::Detection;
use crate::error::Error;
use crate::label::ClassMap;

/// One `class_id xc yc w h` line, coordinates normalized to `0..1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloLabel {
    pub class_id: i32,
    pub xc: f32,
    pub yc: f32,
    pub w: f32,
    pub h: f32,
}

#[inline]
fn unit(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

impl YoloLabel {
    pub fn new(class_id: i32, xc: f32, yc: f32, w: f32, h: f32) -> Self {
        Self {
            class_id,
            xc: unit(xc),
            yc: unit(yc),
            w: unit(w),
            h: unit(h),
        }
    }

    /// `None` when the label has no class id in `class_map` or the image is empty.
    pub fn from_detection(
        det: &Detection,
        class_map: &ClassMap,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let class_id = class_map.class_id(det.label)?;
        let (fw, fh) = (width as f32, height as f32);
        let b = det.bbox.as_xywh();

        Some(Self::new(
            class_id,
            b.cx() / fw,
            b.cy() / fh,
            b.width() / fw,
            b.height() / fh,
        ))
    }

    /// Pixel box in a `width x height` image.
    pub fn to_bbox(&self, width: u32, height: u32) -> BBox<Ltrb> {
        let (fw, fh) = (width as f32, height as f32);
        BBox::xywh(self.xc * fw, self.yc * fh, self.w * fw, self.h * fh).as_ltrb()
    }

    /// The same box after rotating the image clockwise by `degrees`.
    /// Angles other than 90, 180 and 270 leave it unchanged.
    pub fn rotated(&self, degrees: i32) -> Self {
        let (xc, yc, w, h) = (self.xc, self.yc, self.w, self.h);

        let (xc, yc, w, h) = match degrees.rem_euclid(360) {
            90 => (yc, 1.0 - xc, h, w),
            180 => (1.0 - xc, 1.0 - yc, w, h),
            270 => (1.0 - yc, xc, h, w),
            _ => (xc, yc, w, h),
        };

        Self::new(self.class_id, xc, yc, w, h)
    }
}

impl fmt::Display for YoloLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.xc, self.yc, self.w, self.h
        )
    }
}

impl FromStr for YoloLabel {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        let [cid, xc, yc, w, h] = parts[..] else {
            return Err(Error::Annotation(format!(
                "expected 5 fields, got {}: `{}`",
                parts.len(),
                line
            )));
        };

        let num = |s: &str| {
            s.parse::<f32>()
                .map_err(|_| Error::Annotation(format!("bad number `{}` in `{}`", s, line)))
        };

        let class_id = cid
            .parse::<i32>()
            .map_err(|_| Error::Annotation(format!("bad class id `{}` in `{}`", cid, line)))?;

        Ok(Self::new(class_id, num(xc)?, num(yc)?, num(w)?, num(h)?))
    }
}

pub fn write_label_file<P: AsRef<Path>>(path: P, labels: &[YoloLabel]) -> Result<(), Error> {
    let mut text = labels
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join("\n");

    if !labels.is_empty() {
        text.push('\n');
    }

    fs::write(path, text)?;
    Ok(())
}

/// Blank lines are skipped; any malformed line fails the whole file.
pub fn read_label_file<P: AsRef<Path>>(path: P) -> Result<Vec<YoloLabel>, Error> {
    fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::parse)
        .collect()
}

/// Rotates every line of a label file in place.
pub fn rotate_label_file<P: AsRef<Path>>(path: P, degrees: i32) -> Result<(), Error> {
    let path = path.as_ref();
    let labels: Vec<_> = read_label_file(path)?
        .into_iter()
        .map(|l| l.rotated(degrees))
        .collect();

    write_label_file(path, &labels)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SkipEntry {
    pub frame: String,
    pub reason: String,
    #[serde(default)]
    pub details: Vec<String>,
}

/// JSON array of frames left out of the dataset
pub struct SkipLog;

impl SkipLog {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<SkipEntry>, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn append<P: AsRef<Path>>(path: P, entry: SkipEntry) -> Result<(), Error> {
        let path = path.as_ref();
        let mut entries = Self::read(path)?;

        log::info!("skipped frame {}: {}", entry.frame, entry.reason);
        entries.push(entry);

        fs::write(path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

/// Which exported model the detector should load
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectorActivation {
    pub model_url: String,
    #[serde(default = "default_imgsz")]
    pub imgsz: u32,
    #[serde(default = "default_profile")]
    pub profile: String,
    pub updated_at: DateTime<Utc>,
}

fn default_imgsz() -> u32 {
    640
}

fn default_profile() -> String {
    "basketball".into()
}

impl DetectorActivation {
    pub fn new<S: Into<String>>(model_url: S, imgsz: u32, profile: &str) -> Self {
        Self {
            model_url: model_url.into(),
            imgsz,
            profile: profile.trim().to_lowercase(),
            updated_at: Utc::now(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Label;
    use approx::assert_abs_diff_eq;

    #[test]
    fn label_from_detection() {
        let det = Detection::new(Label::Hoop, 0.9, BBox::ltrb(100.0, 50.0, 200.0, 70.0));
        let label = YoloLabel::from_detection(&det, &ClassMap::default(), 400, 200).unwrap();

        assert_eq!(label.to_string(), "1 0.375000 0.300000 0.250000 0.100000");
        assert_abs_diff_eq!(label.to_bbox(400, 200).left(), 100.0, epsilon = 1e-3);
    }

    #[test]
    fn label_without_class_id_is_skipped() {
        let map = ClassMap::new(vec![Some(Label::Basketball)]);
        let det = Detection::new(Label::Player, 0.9, BBox::ltrb(0.0, 0.0, 10.0, 10.0));

        assert!(YoloLabel::from_detection(&det, &map, 100, 100).is_none());
    }

    #[test]
    fn parse_clamps_and_rejects() {
        let label: YoloLabel = "2 1.5 0.5 0.25 -0.1".parse().unwrap();
        assert_eq!(label, YoloLabel::new(2, 1.0, 0.5, 0.25, 0.0));

        assert!(matches!("2 0.5 0.5".parse::<YoloLabel>(), Err(Error::Annotation(_))));
        assert!(matches!("x 0.5 0.5 0.1 0.1".parse::<YoloLabel>(), Err(Error::Annotation(_))));
        assert!(matches!("0 0.5 nan? 0.1 0.1".parse::<YoloLabel>(), Err(Error::Annotation(_))));
    }

    #[test]
    fn rotations() {
        let l = YoloLabel::new(0, 0.2, 0.3, 0.1, 0.4);

        let close = |a: YoloLabel, b: [f32; 4]| {
            for (x, y) in [a.xc, a.yc, a.w, a.h].iter().zip(b) {
                assert_abs_diff_eq!(*x, y, epsilon = 1e-6);
            }
        };

        close(l.rotated(90), [0.3, 0.8, 0.4, 0.1]);
        close(l.rotated(180), [0.8, 0.7, 0.1, 0.4]);
        close(l.rotated(270), [0.7, 0.2, 0.4, 0.1]);
        assert_eq!(l.rotated(45), l);
        assert_eq!(l.rotated(-90), l.rotated(270));
    }

    #[test]
    fn label_file_round_trip_and_rotate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame_0001.txt");
        let labels = vec![
            YoloLabel::new(0, 0.5, 0.5, 0.1, 0.1),
            YoloLabel::new(3, 0.25, 0.75, 0.5, 0.2),
        ];

        write_label_file(&path, &labels).unwrap();
        assert_eq!(read_label_file(&path).unwrap(), labels);

        rotate_label_file(&path, 180).unwrap();
        let rotated = read_label_file(&path).unwrap();
        assert_abs_diff_eq!(rotated[1].xc, 0.75, epsilon = 1e-6);
        assert_abs_diff_eq!(rotated[1].yc, 0.25, epsilon = 1e-6);

        write_label_file(&path, &[]).unwrap();
        assert!(read_label_file(&path).unwrap().is_empty());
    }

    #[test]
    fn skip_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skipped_frames.json");

        assert!(SkipLog::read(&path).unwrap().is_empty());

        for (frame, reason) in [("f1.jpg", "low_confidence"), ("f2.jpg", "missing_labels")] {
            SkipLog::append(
                &path,
                SkipEntry {
                    frame: frame.into(),
                    reason: reason.into(),
                    details: vec!["hoop".into()],
                },
            )
            .unwrap();
        }

        let entries = SkipLog::read(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].frame, "f2.jpg");
        assert_eq!(entries[1].reason, "missing_labels");
    }

    #[test]
    fn activation_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("active_detector.json");

        let active = DetectorActivation::new("/static/models/basketball_best.onnx", 640, " Basketball ");
        active.save(&path).unwrap();

        let loaded = DetectorActivation::load(&path).unwrap();
        assert_eq!(loaded, active);
        assert_eq!(loaded.profile, "basketball");

        std::fs::write(
            &path,
            r#"{"model_url": "/m.onnx", "updated_at": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let loaded = DetectorActivation::load(&path).unwrap();
        assert_eq!(loaded.imgsz, 640);
        assert_eq!(loaded.profile, "basketball");
    }
}
