//! Synthetic camera for `stub://` URLs.
//!
//! Produces RGB frames of the configured size with a drifting pattern. An
//! optional start-up delay keeps the source "not ready" for a while after
//! connecting, the way a real camera takes time to deliver its first frame.

use anyhow::{bail, Result};
use std::time::{Duration, Instant};

use super::{CameraConfig, SourceStats, VideoSource};
use crate::frame::Frame;

pub struct SyntheticSource {
    config: CameraConfig,
    connected_at: Option<Instant>,
    startup_delay: Duration,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected_at: None,
            startup_delay: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Stay not-ready for `delay` after `connect`.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut pixels = vec![0u8; width * height * 3];
        let shift = self.frame_count as usize;
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = i % width.max(1);
            let y = i / width.max(1);
            px[0] = ((x + shift) % 256) as u8;
            px[1] = (y % 256) as u8;
            px[2] = ((x + y + shift) % 256) as u8;
        }
        pixels
    }
}

impl VideoSource for SyntheticSource {
    /// Synthetic sources connect instantly.
    fn connect(&mut self) -> Result<()> {
        self.connected_at = Some(Instant::now());
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected_at.take().is_some() {
            log::info!("SyntheticSource: disconnected from {}", self.config.url);
        }
    }

    fn is_ready(&self) -> bool {
        self.connected_at
            .is_some_and(|at| at.elapsed() >= self.startup_delay)
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.connected_at.is_none() {
            bail!("synthetic camera {} is not connected", self.config.url);
        }
        let pixels = self.generate_pixels();
        self.frame_count += 1;
        Ok(Frame::new(pixels, self.config.width, self.config.height))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            url: "stub://test".to_string(),
            target_fps: 30,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn produces_rgb_frames_after_connect() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config());
        assert!(!source.is_ready());
        assert!(source.next_frame().is_err());

        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.byte_len(), 64 * 48 * 3);
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn startup_delay_holds_readiness() -> Result<()> {
        let mut source =
            SyntheticSource::new(stub_config()).with_startup_delay(Duration::from_secs(3600));
        source.connect()?;
        assert!(!source.is_ready());
        Ok(())
    }

    #[test]
    fn zero_sized_config_produces_empty_frames() -> Result<()> {
        let mut source = SyntheticSource::new(CameraConfig {
            width: 0,
            ..stub_config()
        });
        source.connect()?;
        let frame = source.next_frame()?;
        assert!(frame.dimensions().is_empty());
        assert_eq!(frame.byte_len(), 0);
        Ok(())
    }
}
