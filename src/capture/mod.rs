//! Continuous frame ingestion from the capture card.
//!
//! This module provides:
//! - `Frame`, a decoded and cropped picture with its sequence index
//! - `FrameStore`, the bounded single-writer / multi-reader ring
//! - `FrameSource`, the capture thread feeding the store
//! - `V4lCamera`, the V4L2 MJPG device behind the `VideoDevice` trait

pub mod frame;
pub mod source;
pub mod store;
pub mod v4l2;

pub use frame::{crop_to, Frame};
pub use source::{FrameSource, SourceSettings, VideoDevice};
pub use store::{FrameStore, FramesSince};
pub use v4l2::V4lCamera;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video device {device}: {source}")]
    DeviceOpen {
        device: String,
        #[source]
        source: std::io::Error,
    },
    #[error("video device error: {0}")]
    Device(#[from] std::io::Error),
    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("captured frame is {width}x{height}, too small for the configured crop")]
    Geometry { width: u32, height: u32 },
    #[error("frame {requested} expired (oldest retained is {oldest})")]
    FrameExpired { requested: u64, oldest: u64 },
    #[error("frame source failed: {0}")]
    SourceFailed(String),
    #[error("frame source stopped")]
    SourceStopped,
}
