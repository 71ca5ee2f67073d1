//! Camera frame sources.
//!
//! This module provides the sources that feed the detection loop:
//! - Synthetic camera (`stub://` URLs) for demos and tests
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! A source is acquired once when a detection session starts (`connect`) and
//! released once when it stops (`disconnect`). Between the two it reports
//! readiness; the pipeline skips cycles until the source is ready and
//! produces frames with non-zero dimensions.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Video source collaborator driven by the detection loop.
pub trait VideoSource: Send {
    /// Acquire the capture device.
    fn connect(&mut self) -> Result<()>;

    /// Release the capture device. Safe to call when not connected.
    fn disconnect(&mut self);

    /// True once the source can deliver frames.
    fn is_ready(&self) -> bool;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Capture statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// `stub://name` for a synthetic camera, otherwise a device path such as `/dev/video0`.
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Camera source selected from the configured URL.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Ok(Self {
                    backend: CameraBackend::V4l2(V4l2Source::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                anyhow::bail!(
                    "camera not supported: {} requires the ingest-v4l2 feature",
                    config.url
                )
            }
        }
    }
}

impl VideoSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.connect(),
        }
    }

    fn disconnect(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.disconnect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.disconnect(),
        }
    }

    fn is_ready(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_ready(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.is_ready(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.next_frame(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.stats(),
        }
    }
}
