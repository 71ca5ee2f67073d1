#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::coco;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::FrameView;

const DEFAULT_MIN_SCORE: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 20;

/// Output tensor positions of an SSD detection graph.
#[derive(Clone, Copy, Debug)]
pub struct SsdOutputs {
    pub boxes: usize,
    pub classes: usize,
    pub scores: usize,
}

impl Default for SsdOutputs {
    /// Layout of the ONNX model zoo `ssd_mobilenet_v1` export.
    fn default() -> Self {
        Self {
            boxes: 0,
            classes: 1,
            scores: 2,
        }
    }
}

/// Tract-based backend for COCO SSD object detection.
///
/// Loads a local ONNX model taking a `uint8[1, H, W, 3]` image and producing
/// normalized `[ymin, xmin, ymax, xmax]` boxes with COCO class ids. Boxes are
/// returned in frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    outputs: SsdOutputs,
    min_score: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for a fixed frame size.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            outputs: SsdOutputs::default(),
            min_score: DEFAULT_MIN_SCORE,
            max_detections: DEFAULT_MAX_DETECTIONS,
        })
    }

    /// Override the default score threshold.
    pub fn with_threshold(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    pub fn with_outputs(mut self, outputs: SsdOutputs) -> Self {
        self.outputs = outputs;
        self
    }

    fn build_input(&self, frame: FrameView<'_>) -> Result<Tensor> {
        let (width, height) = (frame.width(), frame.height());
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        let pixels = frame.pixels();
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let input = tract_ndarray::Array4::from_shape_vec(
            (1, height as usize, width as usize, 3),
            pixels.to_vec(),
        )
        .context("failed to shape input tensor")?;
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<RawDetection>> {
        let output = |idx: usize| {
            outputs
                .get(idx)
                .ok_or_else(|| anyhow!("model produced no output #{}", idx))
        };
        let boxes = output(self.outputs.boxes)?
            .to_array_view::<f32>()
            .context("box tensor was not f32")?;
        let classes = output(self.outputs.classes)?
            .to_array_view::<f32>()
            .context("class tensor was not f32")?;
        let scores = output(self.outputs.scores)?
            .to_array_view::<f32>()
            .context("score tensor was not f32")?;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let frame_w = self.width as f32;
        let frame_h = self.height as f32;

        let mut out = Vec::new();
        for (i, (&class_id, &score)) in classes.iter().zip(scores.iter()).enumerate() {
            if out.len() >= self.max_detections {
                break;
            }
            if score < self.min_score {
                continue;
            }
            let Some(corners) = boxes.get(i * 4..i * 4 + 4) else {
                break;
            };
            let Some(label) = coco::label_for_id(class_id.round() as u32) else {
                continue;
            };
            let (ymin, xmin, ymax, xmax) = (corners[0], corners[1], corners[2], corners[3]);
            let x = xmin.clamp(0.0, 1.0) * frame_w;
            let y = ymin.clamp(0.0, 1.0) * frame_h;
            let bbox = BoundingBox::new(
                x,
                y,
                xmax.clamp(0.0, 1.0) * frame_w - x,
                ymax.clamp(0.0, 1.0) * frame_h - y,
            );
            out.push(RawDetection::new(label, score, bbox));
        }
        Ok(out)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: FrameView<'_>) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }
}
