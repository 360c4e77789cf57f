//! Capture thread: pulls frames from the device at a fixed rate into the store.

use std::sync::mpsc::sync_channel;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{error, info, warn};

use super::{CaptureError, FrameStore};
use crate::cancel::CancelToken;

/// A source of decoded frames.
pub trait VideoDevice {
    /// Blocks for the next frame.
    ///
    /// `CaptureError::Decode` marks a single bad frame; any other error means
    /// the device is gone.
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

#[derive(Debug, Clone, Copy)]
pub struct SourceSettings {
    pub fps: u32,
    /// Consecutive decode failures tolerated before giving up
    pub max_decode_failures: u32,
}

/// Running capture thread.
pub struct FrameSource {
    store: FrameStore,
    handle: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Opens the device on a dedicated thread and starts capturing.
    ///
    /// The device is created by `open` on the capture thread itself, so it
    /// does not need to be `Send`. Open failures are returned here.
    pub fn spawn<D, F>(
        open: F,
        store: FrameStore,
        settings: SourceSettings,
        cancel: CancelToken,
    ) -> Result<Self, CaptureError>
    where
        D: VideoDevice,
        F: FnOnce() -> Result<D, CaptureError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = sync_channel::<Result<(), CaptureError>>(1);
        let writer = store.clone();

        let handle = thread::Builder::new()
            .name("frame-source".to_string())
            .spawn(move || {
                let device = match open() {
                    Ok(device) => {
                        let _ = ready_tx.send(Ok(()));
                        device
                    }
                    Err(e) => {
                        writer.fail(e.to_string());
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                capture_loop(device, &writer, settings, &cancel);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CaptureError::SourceFailed(
                    "capture thread exited during open".to_string(),
                ));
            }
        }

        info!("Frame source started at {} fps", settings.fps);
        Ok(Self {
            store,
            handle: Some(handle),
        })
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    /// Waits for the capture thread to exit. Cancel the token first.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Frame source thread panicked");
            }
        }
    }
}

fn capture_loop<D: VideoDevice>(
    mut device: D,
    store: &FrameStore,
    settings: SourceSettings,
    cancel: &CancelToken,
) {
    let period = Duration::from_secs_f64(1.0 / f64::from(settings.fps.max(1)));
    let mut next_due = Instant::now();
    let mut decode_failures = 0u32;

    while !cancel.is_cancelled() {
        match device.read_frame() {
            Ok(image) => {
                decode_failures = 0;
                store.push(image);
            }
            Err(CaptureError::Decode(e)) => {
                decode_failures += 1;
                warn!("Skipping undecodable frame ({} in a row): {}", decode_failures, e);
                if decode_failures >= settings.max_decode_failures {
                    let reason = format!("{} consecutive undecodable frames", decode_failures);
                    error!("Frame source giving up: {}", reason);
                    store.fail(reason);
                    return;
                }
            }
            Err(e) => {
                error!("Frame source failed: {}", e);
                store.fail(e.to_string());
                return;
            }
        }

        next_due += period;
        let now = Instant::now();
        if next_due > now {
            thread::sleep(next_due - now);
        } else {
            next_due = now;
        }
    }

    info!("Frame source stopped");
    store.close();
}
