use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use image::{ImageFormat, RgbImage};

use super::{crop_to, CaptureError, VideoDevice};
use crate::config::{CropRect, VideoConfig};

/// Driver buffers queued for streaming.
const STREAM_BUFFERS: u32 = 4;

/// V4L2 capture card streaming MJPG.
pub struct V4lCamera {
    // Keeps the file descriptor open for the stream.
    _device: Device,
    stream: MmapStream<'static>,
    crop: CropRect,
}

impl V4lCamera {
    /// Opens and configures the device. `config.device` is a path or an index.
    pub fn open(config: &VideoConfig) -> Result<Self, CaptureError> {
        let device = match config.device.parse::<usize>() {
            Ok(index) => Device::new(index),
            Err(_) => Device::with_path(&config.device),
        }
        .map_err(|source| CaptureError::DeviceOpen {
            device: config.device.clone(),
            source,
        })?;

        let mut format = device.format()?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = FourCC::new(b"MJPG");
        let actual = device.set_format(&format)?;

        let fourcc = actual.fourcc.str().unwrap_or("????").to_string();
        info!(
            "Format negotiated: {}x{} {}",
            actual.width, actual.height, fourcc
        );
        if actual.fourcc != FourCC::new(b"MJPG") {
            return Err(CaptureError::DeviceOpen {
                device: config.device.clone(),
                source: std::io::Error::other(format!("device refused MJPG (got {})", fourcc)),
            });
        }
        if actual.width != config.width || actual.height != config.height {
            warn!(
                "Camera did not accept requested resolution. Using {}x{} instead of {}x{}",
                actual.width, actual.height, config.width, config.height
            );
        }

        let params = device.set_params(&Parameters::with_fps(config.fps))?;
        info!(
            "Frame interval: {}/{} s",
            params.interval.numerator, params.interval.denominator
        );

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, STREAM_BUFFERS)?;

        Ok(Self {
            _device: device,
            stream,
            crop: config.crop,
        })
    }
}

impl VideoDevice for V4lCamera {
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        let (buf, meta) = self.stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        let decoded = image::load_from_memory_with_format(&buf[..used], ImageFormat::Jpeg)?;
        crop_to(&decoded.to_rgb8(), &self.crop)
    }
}
