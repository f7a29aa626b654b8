//! Replays a video through a tracking session and writes an annotated copy.
//!
//! `video <in.mp4> [detections.dets]`, where the optional detections file has
//! one `frame_idx: [{"c":0,"p":0.9,"box":[x1,y1,x2,y2]}, ...]` line per frame.
//! Without it the session runs on motion fallback alone.

use std::io::BufRead;

use hooptrack::{Frame, FrameReport, Pipeline, RawDetection, Session};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio,
};

type BoxError = Box<dyn std::error::Error>;

pub struct VideoWriter {
    writer: Option<videoio::VideoWriter>,
    size: Option<(i32, i32)>,
    out_file: String,
}

impl VideoWriter {
    pub fn new<S: ToString>(out_file: S) -> Self {
        Self {
            writer: None,
            size: None,
            out_file: out_file.to_string(),
        }
    }

    pub fn release(&mut self) -> opencv::Result<()> {
        if let Some(mut w) = self.writer.take() {
            w.release()?;
        }
        Ok(())
    }

    fn reinit(&mut self, size: (i32, i32)) -> opencv::Result<()> {
        self.release()?;

        self.size = Some(size);
        self.writer = Some(videoio::VideoWriter::new(
            &self.out_file,
            videoio::VideoWriter::fourcc(b'X' as _, b'V' as _, b'I' as _, b'D' as _)?,
            24.0,
            core::Size::new(size.0, size.1),
            true,
        )?);
        Ok(())
    }

    pub fn feed(&mut self, m: &Mat) -> opencv::Result<()> {
        let size = (m.cols(), m.rows());

        if self.writer.is_none() || self.size != Some(size) {
            self.reinit(size)?;
        }

        match self.writer.as_mut() {
            Some(w) => w.write(m),
            None => Ok(()),
        }
    }
}

fn to_rgb(bgr: &Mat) -> Result<image::RgbImage, BoxError> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    let (w, h) = (rgb.cols() as u32, rgb.rows() as u32);
    image::RgbImage::from_raw(w, h, rgb.data_bytes()?.to_vec())
        .ok_or_else(|| "frame buffer size mismatch".into())
}

fn draw(frame: &mut Mat, report: &FrameReport) -> opencv::Result<()> {
    for obj in &report.objects {
        let b = obj.bbox;
        let rect = core::Rect::new(
            b.left() as i32,
            b.top() as i32,
            b.width() as i32,
            b.height() as i32,
        );
        let color = if obj.synthetic {
            core::Scalar::new(255.0, 100.0, 100.0, 255.0)
        } else {
            core::Scalar::new(0.0, 255.0, 255.0, 255.0)
        };

        imgproc::rectangle(frame, rect, color, 1, imgproc::LINE_8, 0)?;
        imgproc::put_text(
            frame,
            obj.label.as_str(),
            core::Point::new(b.left() as i32, b.top() as i32 - 5),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            1,
            imgproc::LINE_AA,
            false,
        )?;
    }

    for pair in report.ball_path.windows(2) {
        imgproc::line(
            frame,
            core::Point::new(pair[0].0 as i32, pair[0].1 as i32),
            core::Point::new(pair[1].0 as i32, pair[1].1 as i32),
            core::Scalar::new(0.0, 255.0, 0.0, 255.0),
            2,
            imgproc::LINE_8,
            0,
        )?;
    }

    let status = if report.shot_made { "scored" } else { "" };
    imgproc::put_text(
        frame,
        &format!("{} {}", report.frame_index, status),
        core::Point::new(10, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.9,
        core::Scalar::new(255.0, 255.0, 0.0, 255.0),
        1,
        imgproc::LINE_AA,
        false,
    )?;

    Ok(())
}

fn parse_dets(line: &str) -> Result<Vec<RawDetection>, BoxError> {
    match line.find(':') {
        Some(idx) => Ok(serde_json::from_str(&line[idx + 1..])?),
        None => Ok(Vec::new()),
    }
}

fn main() -> Result<(), BoxError> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let in_file_name = args.next().ok_or("expected video file name")?;
    let mut dets = match args.next() {
        Some(path) => Some(std::io::BufReader::new(std::fs::File::open(path)?).lines()),
        None => None,
    };

    let mut cam = videoio::VideoCapture::from_file(&in_file_name, videoio::CAP_ANY)?;
    if !videoio::VideoCapture::is_opened(&cam)? {
        return Err(format!("unable to open {}", in_file_name).into());
    }

    let total = cam.get(videoio::CAP_PROP_FRAME_COUNT)? as i32;
    log::info!("{}: {} frames", in_file_name, total);

    let pipeline = Pipeline::default();
    let mut session = Session::new(in_file_name.clone(), pipeline.config());
    let mut writer = VideoWriter::new("out.avi");
    let mut mat = Mat::default();

    loop {
        if !cam.read(&mut mat)? || mat.cols() == 0 || mat.rows() == 0 {
            break;
        }

        let raw = match dets.as_mut().map(|lines| lines.next()) {
            Some(Some(line)) => parse_dets(&line?)?,
            Some(None) => break,
            None => Vec::new(),
        };

        let frame = Frame::new(session.next_frame_index(), to_rgb(&mat)?);
        let report = session.ingest(&pipeline, &frame, Ok(raw))?;

        draw(&mut mat, &report)?;
        writer.feed(&mat)?;
    }

    log::info!(
        "finished, {} points, shot made: {}",
        session.ball_path().len(),
        session.shot_made()
    );

    writer.release()?;

    Ok(())
}
