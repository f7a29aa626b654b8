use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::detector::Detector;
use crate::error::Error;
use crate::frame::Frame;
use crate::label::ClassMap;
use crate::pool::DetectorPool;
use crate::session::{FrameReport, Pipeline, Session};

/// Sessions keyed by id, sharing one pipeline and detector pool.
///
/// Frames of one session are processed in order; different sessions only
/// contend for detectors.
pub struct ShotTracker<D> {
    pipeline: Pipeline,
    pool: DetectorPool<D>,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl<D: Detector> ShotTracker<D> {
    /// With no detectors every frame falls back to motion only.
    pub fn new(config: TrackerConfig, class_map: ClassMap, detectors: Vec<D>) -> Result<Self, Error> {
        if !detectors.is_empty() && detectors.len() != config.pool_size {
            log::warn!(
                "pool_size is {} but {} detectors were given",
                config.pool_size,
                detectors.len()
            );
        }

        Ok(Self {
            pipeline: Pipeline::new(config, class_map)?,
            pool: DetectorPool::new(detectors),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Upload hook: starts `id` over with a fresh session.
    pub fn reset(&self, id: &str) {
        let session = Session::new(id, self.pipeline.config());

        if self
            .sessions
            .lock()
            .insert(id.to_string(), Arc::new(Mutex::new(session)))
            .is_some()
        {
            log::info!("session {} reset", id);
        } else {
            log::info!("session {} created", id);
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }

    fn session(&self, id: &str) -> Result<Arc<Mutex<Session>>, Error> {
        self.sessions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownSession(id.to_string()))
    }

    /// Decodes an encoded image and processes it as the session's next frame.
    pub fn process(&self, id: &str, bytes: &[u8]) -> Result<FrameReport, Error> {
        let session = self.session(id)?;
        let mut session = session.lock();
        let frame = Frame::decode(session.next_frame_index(), bytes)?;

        self.run(&mut session, &frame)
    }

    pub fn process_data_url(&self, id: &str, data: &str) -> Result<FrameReport, Error> {
        let session = self.session(id)?;
        let mut session = session.lock();
        let frame = Frame::from_data_url(session.next_frame_index(), data)?;

        self.run(&mut session, &frame)
    }

    pub fn process_image(&self, id: &str, image: image::RgbImage) -> Result<FrameReport, Error> {
        let session = self.session(id)?;
        let mut session = session.lock();
        let frame = Frame::try_new(session.next_frame_index(), image)?;

        self.run(&mut session, &frame)
    }

    pub fn ball_path(&self, id: &str) -> Result<Vec<(f32, f32)>, Error> {
        Ok(self.session(id)?.lock().ball_path().to_vec())
    }

    fn run(&self, session: &mut Session, frame: &Frame) -> Result<FrameReport, Error> {
        match self.pool.checkout() {
            Some(mut detector) => session.process(&self.pipeline, &mut *detector, frame),
            None => session.ingest(&self.pipeline, frame, Ok(Vec::new())),
        }
    }
}
