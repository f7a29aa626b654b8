use parking_lot::{Condvar, Mutex};
use std::ops::{Deref, DerefMut};

/// Fixed set of detector instances shared between callers.
///
/// The inference runtimes behind a detector are generally not safe to call
/// concurrently, so each instance is handed to one caller at a time. A pool of
/// one serializes every inference.
pub struct DetectorPool<D> {
    idle: Mutex<Vec<D>>,
    available: Condvar,
    size: usize,
}

pub struct PooledDetector<'a, D> {
    pool: &'a DetectorPool<D>,
    detector: Option<D>,
}

impl<D> DetectorPool<D> {
    pub fn new(detectors: Vec<D>) -> Self {
        let size = detectors.len();

        Self {
            idle: Mutex::new(detectors),
            available: Condvar::new(),
            size,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Blocks until a detector is free. Returns `None` for an empty pool.
    pub fn checkout(&self) -> Option<PooledDetector<'_, D>> {
        if self.size == 0 {
            return None;
        }

        let mut idle = self.idle.lock();
        while idle.is_empty() {
            log::debug!("all {} detectors busy, waiting", self.size);
            self.available.wait(&mut idle);
        }

        let detector = idle.pop();

        Some(PooledDetector {
            pool: self,
            detector,
        })
    }

    pub fn try_checkout(&self) -> Option<PooledDetector<'_, D>> {
        let detector = self.idle.lock().pop()?;

        Some(PooledDetector {
            pool: self,
            detector: Some(detector),
        })
    }

    fn release(&self, detector: D) {
        self.idle.lock().push(detector);
        self.available.notify_one();
    }
}

impl<D> Deref for PooledDetector<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        // only taken in drop
        match &self.detector {
            Some(d) => d,
            None => unreachable!(),
        }
    }
}

impl<D> DerefMut for PooledDetector<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        match &mut self.detector {
            Some(d) => d,
            None => unreachable!(),
        }
    }
}

impl<D> Drop for PooledDetector<'_, D> {
    fn drop(&mut self) {
        if let Some(detector) = self.detector.take() {
            self.pool.release(detector);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_returns_detector_on_drop() {
        let pool = DetectorPool::new(vec![1u32, 2]);
        assert_eq!(pool.idle(), 2);

        {
            let a = pool.checkout().unwrap();
            let _b = pool.checkout().unwrap();
            assert_eq!(*a, 2);
            assert_eq!(pool.idle(), 0);
            assert!(pool.try_checkout().is_none());
        }

        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn empty_pool_never_blocks() {
        let pool = DetectorPool::<u32>::new(Vec::new());
        assert!(pool.checkout().is_none());
    }

    #[test]
    fn single_detector_serializes_callers() {
        let pool = Arc::new(DetectorPool::new(vec![0usize]));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                let inside = inside.clone();
                let peak = peak.clone();

                thread::spawn(move || {
                    for _ in 0..5 {
                        let mut det = pool.checkout().unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        *det += 1;
                        thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(*pool.checkout().unwrap(), 20);
    }
}
