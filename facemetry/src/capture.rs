//! Local webcam capture behind the [`FrameSource`] trait.
//!
//! The device is an exclusively-owned resource for the duration of a single
//! request: each capture opens the device, reads exactly one frame and drops
//! every handle before returning, on success and failure alike. Concurrent
//! captures are serialized by the caller (see `AppState::capture_gate`).

use async_trait::async_trait;
use image::RgbImage;

use crate::errors::Result;

/// A source of single frames, typically a webcam.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Acquire the device, read one frame, release the device.
    async fn capture_frame(&self) -> Result<RgbImage>;
}

#[cfg(feature = "camera")]
pub use v4l_source::V4lFrameSource;

#[cfg(feature = "camera")]
mod v4l_source {
    use std::path::{Path, PathBuf};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use image::RgbImage;
    use v4l::buffer::Type;
    use v4l::io::mmap::Stream;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;
    use v4l::{Device, Format, FourCC};

    use super::FrameSource;
    use crate::errors::{Error, Result};

    /// V4L2-backed frame source. Holds only the device path; the device
    /// itself is opened per capture.
    pub struct V4lFrameSource {
        device: PathBuf,
    }

    impl V4lFrameSource {
        pub fn new(device: PathBuf) -> Self {
            Self { device }
        }
    }

    #[async_trait]
    impl FrameSource for V4lFrameSource {
        async fn capture_frame(&self) -> Result<RgbImage> {
            let device = self.device.clone();
            tokio::task::spawn_blocking(move || read_one_frame(&device))
                .await
                .map_err(|e| Error::Other(anyhow!("capture task failed: {e}")))?
        }
    }

    /// Open the device, negotiate a pixel format, read one frame.
    /// All handles are dropped on return, releasing the device on every
    /// exit path.
    fn read_one_frame(device: &Path) -> Result<RgbImage> {
        let dev = Device::with_path(device).map_err(|e| Error::CameraUnavailable { detail: e.to_string() })?;

        let mut fmt = dev.format().map_err(|e| Error::CameraUnavailable { detail: e.to_string() })?;
        // Prefer RGB, fall back to YUYV, else accept whatever the device has
        let desired = Format::new(fmt.width, fmt.height, FourCC::new(b"RGB3"));
        fmt = dev.set_format(&desired).unwrap_or(fmt);
        if fmt.fourcc != FourCC::new(b"RGB3") {
            let yuyv = Format::new(fmt.width, fmt.height, FourCC::new(b"YUYV"));
            fmt = dev.set_format(&yuyv).unwrap_or(fmt);
        }

        let mut stream =
            Stream::with_buffers(&dev, Type::VideoCapture, 4).map_err(|e| Error::CameraUnavailable { detail: e.to_string() })?;

        let (data, meta) = stream.next().map_err(|e| Error::CaptureFailed { detail: e.to_string() })?;
        tracing::debug!(
            width = fmt.width,
            height = fmt.height,
            fourcc = ?fmt.fourcc,
            sequence = meta.sequence,
            len = data.len(),
            "captured frame"
        );

        let rgb = convert_to_rgb(fmt.fourcc, fmt.width, fmt.height, data)?;
        frame_from_raw(fmt.width, fmt.height, rgb)
    }

    fn convert_to_rgb(fourcc: FourCC, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
        match fourcc {
            f if f == FourCC::new(b"RGB3") => Ok(data.to_vec()),
            f if f == FourCC::new(b"YUYV") => yuyv_to_rgb(width, height, data),
            f if f == FourCC::new(b"GREY") => grey_to_rgb(width, height, data),
            other => Err(Error::CaptureFailed {
                detail: format!("unsupported pixel format {other:?}"),
            }),
        }
    }

    fn frame_from_raw(width: u32, height: u32, mut rgb: Vec<u8>) -> Result<RgbImage> {
        let expected = (width * height * 3) as usize;
        if rgb.len() < expected {
            return Err(Error::CaptureFailed {
                detail: format!("short frame buffer: got {}, expected {expected}", rgb.len()),
            });
        }
        rgb.truncate(expected);
        RgbImage::from_raw(width, height, rgb).ok_or_else(|| Error::CaptureFailed {
            detail: "failed to build frame buffer".to_string(),
        })
    }

    fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
        let expected = (width * height * 2) as usize;
        if data.len() < expected {
            return Err(Error::CaptureFailed {
                detail: "short YUYV buffer".to_string(),
            });
        }
        let mut out = Vec::with_capacity((width * height * 3) as usize);
        for chunk in data[..expected].chunks_exact(4) {
            let y0 = chunk[0] as f32;
            let u = chunk[1] as f32 - 128.0;
            let y1 = chunk[2] as f32;
            let v = chunk[3] as f32 - 128.0;
            for &y in &[y0, y1] {
                out.push(clamp_channel(y + 1.402 * v));
                out.push(clamp_channel(y - 0.344136 * u - 0.714136 * v));
                out.push(clamp_channel(y + 1.772 * u));
            }
        }
        Ok(out)
    }

    fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
        let expected = (width * height) as usize;
        if data.len() < expected {
            return Err(Error::CaptureFailed {
                detail: "short GREY buffer".to_string(),
            });
        }
        let mut out = Vec::with_capacity(expected * 3);
        for &y in &data[..expected] {
            out.extend_from_slice(&[y, y, y]);
        }
        Ok(out)
    }

    fn clamp_channel(v: f32) -> u8 {
        v.clamp(0.0, 255.0) as u8
    }

}
