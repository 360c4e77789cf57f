//! Fixed-capacity frame ring shared between the capture thread and readers.
//!
//! The oldest frame is evicted when the ring is full. Readers get snapshots;
//! they never hold the lock while processing frames.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use image::RgbImage;

use super::{CaptureError, Frame};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceStatus {
    Running,
    Failed(String),
    Stopped,
}

#[derive(Debug)]
struct Ring {
    frames: VecDeque<Frame>,
    capacity: usize,
    next_index: u64,
    status: SourceStatus,
}

impl Ring {
    fn oldest_index(&self) -> u64 {
        self.frames.front().map_or(self.next_index, |f| f.index)
    }

    fn check_failed(&self) -> Result<(), CaptureError> {
        match &self.status {
            SourceStatus::Failed(reason) => Err(CaptureError::SourceFailed(reason.clone())),
            _ => Ok(()),
        }
    }
}

/// Handle to the shared ring. Clones refer to the same frames.
#[derive(Debug, Clone)]
pub struct FrameStore {
    inner: Arc<(Mutex<Ring>, Condvar)>,
}

impl FrameStore {
    /// Creates an empty store.
    ///
    /// # Panics
    /// Panics if capacity is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "FrameStore capacity must be greater than 0");
        Self {
            inner: Arc::new((
                Mutex::new(Ring {
                    frames: VecDeque::with_capacity(capacity),
                    capacity,
                    next_index: 0,
                    status: SourceStatus::Running,
                }),
                Condvar::new(),
            )),
        }
    }

    fn ring(&self) -> MutexGuard<'_, Ring> {
        // A panicking writer cannot leave the ring half-updated, so the data
        // behind a poisoned lock is still consistent.
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores a new frame and wakes waiting readers. Returns its index.
    pub fn push(&self, image: RgbImage) -> u64 {
        let mut ring = self.ring();
        let index = ring.next_index;
        if ring.frames.len() >= ring.capacity {
            ring.frames.pop_front();
        }
        ring.frames.push_back(Frame {
            index,
            captured_at: Instant::now(),
            image: Arc::new(image),
        });
        ring.next_index += 1;
        drop(ring);
        self.inner.1.notify_all();
        index
    }

    /// Index the next pushed frame will get.
    pub fn next_index(&self) -> u64 {
        self.ring().next_index
    }

    pub fn len(&self) -> usize {
        self.ring().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring().frames.is_empty()
    }

    /// Most recent frame, `None` before the first one arrives.
    pub fn latest(&self) -> Result<Option<Frame>, CaptureError> {
        let ring = self.ring();
        ring.check_failed()?;
        Ok(ring.frames.back().cloned())
    }

    /// Every retained frame with index `>= index`, oldest first.
    ///
    /// The result is a snapshot; call again with the returned
    /// [`FramesSince::resume_index`] to continue. Fails with `FrameExpired`
    /// when `index` has already been evicted.
    pub fn since(&self, index: u64) -> Result<FramesSince, CaptureError> {
        let ring = self.ring();
        ring.check_failed()?;

        let oldest = ring.oldest_index();
        if index < oldest {
            return Err(CaptureError::FrameExpired {
                requested: index,
                oldest,
            });
        }

        let frames: Vec<Frame> = ring
            .frames
            .iter()
            .filter(|f| f.index >= index)
            .cloned()
            .collect();
        let resume = index.max(ring.next_index);
        Ok(FramesSince {
            frames: frames.into_iter(),
            resume,
        })
    }

    /// Oldest index still retained (or the next index when empty).
    pub fn oldest_index(&self) -> u64 {
        self.ring().oldest_index()
    }

    /// Blocks until a frame with sequence index at or after `index` exists.
    ///
    /// Returns `Ok(false)` on timeout. A stopped source with nothing new
    /// returns `SourceStopped` at once.
    pub fn wait_for_frame_after(&self, index: u64, timeout: Duration) -> Result<bool, CaptureError> {
        let deadline = Instant::now() + timeout;
        let mut ring = self.ring();
        loop {
            ring.check_failed()?;
            if ring.next_index > index {
                return Ok(true);
            }
            if ring.status == SourceStatus::Stopped {
                return Err(CaptureError::SourceStopped);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            ring = self
                .inner
                .1
                .wait_timeout(ring, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Marks the source as dead. Every later read fails with `SourceFailed`.
    pub fn fail(&self, reason: impl Into<String>) {
        self.ring().status = SourceStatus::Failed(reason.into());
        self.inner.1.notify_all();
    }

    /// Marks the source as finished without error.
    pub fn close(&self) {
        let mut ring = self.ring();
        if ring.status == SourceStatus::Running {
            ring.status = SourceStatus::Stopped;
        }
        drop(ring);
        self.inner.1.notify_all();
    }
}

/// Snapshot returned by [`FrameStore::since`].
#[derive(Debug)]
pub struct FramesSince {
    frames: std::vec::IntoIter<Frame>,
    resume: u64,
}

impl FramesSince {
    /// Index to pass to the next `since` call.
    pub fn resume_index(&self) -> u64 {
        self.resume
    }
}

impl Iterator for FramesSince {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.frames.next()
    }
}
