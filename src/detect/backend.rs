use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::FrameView;

/// Detector backend trait.
///
/// Backends are black boxes: a frame goes in, labelled boxes in frame pixel
/// coordinates come out. Label strings follow the COCO naming used by the
/// allow-list (`"person"`, `"cell phone"`, ...).
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// May block for as long as inference takes. The pipeline bounds the call
    /// with a timeout from the outside.
    fn detect(&mut self, frame: FrameView<'_>) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: FrameView<'_>) -> Result<Vec<RawDetection>> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
