//! V4L2 camera source.
//!
//! Captures frames from a local V4L2 device node (e.g. /dev/video0). The
//! device is opened and streamed from `connect` until `disconnect`. YUYV and
//! RGB3 captures are converted to packed RGB before they reach a detector.

use anyhow::{anyhow, bail, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CameraConfig, SourceStats, VideoSource};
use crate::frame::Frame;

pub struct V4l2Source {
    config: CameraConfig,
    state: Option<DeviceState>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
    format: PixelFormat,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(anyhow!("v4l2 device path must not be empty"));
        }
        Ok(Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            frame_count: 0,
            format: PixelFormat::Yuyv,
        })
    }

    fn open(&mut self) -> Result<DeviceState> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(&self.config.url)
            .with_context(|| format!("open v4l2 device {}", self.config.url))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"YUYV");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.url,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera not supported: {} delivers unsupported pixel format {}",
                self.config.url,
                format.fourcc
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.url,
                    err
                );
            }
        }

        ensure_negotiated_size(&self.config, format.width, format.height)?;
        self.active_width = format.width;
        self.active_height = format.height;

        DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
    }
}

/// The driver may silently pick another size; activity thresholds only hold
/// for the configured one.
fn ensure_negotiated_size(config: &CameraConfig, width: u32, height: u32) -> Result<()> {
    if width != config.width || height != config.height {
        bail!(
            "camera not supported: {} negotiated {}x{}, configured {}x{}",
            config.url,
            width,
            height,
            config.width,
            config.height
        );
    }
    Ok(())
}

impl VideoSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        self.state = Some(self.open()?);

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.config.url,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.config.url);
        }
    }

    fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .context("capture v4l2 frame")?;

        let rgb = normalize_to_rgb(buf, self.active_width, self.active_height, self.format)?;
        self.frame_count += 1;

        Ok(Frame::new(rgb, self.active_width, self.active_height))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
