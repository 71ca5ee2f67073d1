use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::FrameView;

const DEMO_CYCLE: u64 = 60;

/// Stub backend for demos and tests. Ignores pixels.
///
/// The default script is a synthetic scene: a person walks across the frame,
/// sits down low in the frame, then steps close to the camera, next to a cup
/// and a dog. Every 20th frame is empty.
pub struct StubBackend {
    script: Script,
    frame_count: u64,
    delay: Option<Duration>,
}

enum Script {
    Demo,
    Frames(Vec<Vec<RawDetection>>),
    Fail(String),
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: Script::Demo,
            frame_count: 0,
            delay: None,
        }
    }

    /// Replay `frames` in order, wrapping around at the end.
    pub fn scripted(frames: Vec<Vec<RawDetection>>) -> Self {
        Self {
            script: Script::Frames(frames),
            frame_count: 0,
            delay: None,
        }
    }

    /// Backend whose every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            script: Script::Fail(message.into()),
            frame_count: 0,
            delay: None,
        }
    }

    /// Sleep this long inside every `detect` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn frames_seen(&self) -> u64 {
        self.frame_count
    }

    fn demo_scene(&self, frame: FrameView<'_>) -> Vec<RawDetection> {
        let n = self.frame_count % DEMO_CYCLE;
        if n % 20 == 19 {
            return Vec::new();
        }

        let max_x = frame.width().saturating_sub(120) as f32;
        let person = match n {
            0..=29 => BoundingBox::new((40.0 + n as f32 * 25.0).min(max_x), 120.0, 120.0, 260.0),
            30..=44 => BoundingBox::new(400.0, 300.0, 140.0, 170.0),
            _ => BoundingBox::new(200.0, 60.0, 220.0, 380.0),
        };

        vec![
            RawDetection::new("person", 0.87, person),
            RawDetection::new("cup", 0.83, BoundingBox::new(500.0, 360.0, 60.0, 80.0)),
            RawDetection::new("dog", 0.66, BoundingBox::new(20.0, 380.0, 90.0, 70.0)),
        ]
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: FrameView<'_>) -> Result<Vec<RawDetection>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let out = match &self.script {
            Script::Demo => self.demo_scene(frame),
            Script::Frames(frames) if frames.is_empty() => Vec::new(),
            Script::Frames(frames) => {
                let idx = (self.frame_count % frames.len() as u64) as usize;
                frames[idx].clone()
            }
            Script::Fail(message) => return Err(anyhow!("{}", message)),
        };

        self.frame_count += 1;
        Ok(out)
    }
}
