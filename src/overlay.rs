//! AR overlay drawing.
//!
//! `OverlayRenderer` turns the detections of one frame into draw calls on a
//! `Surface`. The surface is cleared on every call, so rendering the same
//! input twice leaves the same picture.

use crate::detect::Detection;
use crate::frame::FrameDimensions;

/// RGBA color, alpha in 0..=1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Rectangle in surface pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Stroke parameters for box outlines.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub line_width: f32,
    /// Blur radius of the glow drawn under the stroke. Zero disables it.
    pub glow_blur: f32,
}

/// Font used for labels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Font {
    pub size_px: f32,
    pub family: &'static str,
}

/// 2D drawing target sized to the video frame.
pub trait Surface {
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn stroke_rect(&mut self, rect: Rect, stroke: &Stroke);
    fn fill_rect(&mut self, rect: Rect, color: Color);
    /// Advance width of `text` in pixels.
    fn measure_text(&self, text: &str, font: &Font) -> f32;
    fn fill_text(&mut self, text: &str, x: f32, y: f32, font: &Font, color: Color);
}

/// Visual constants of the overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    pub box_stroke: Stroke,
    pub font: Font,
    pub label_background: Color,
    pub label_text: Color,
    pub label_height: f32,
    pub label_padding: f32,
    /// Distance from box top to label background top.
    pub label_offset: f32,
    /// Distance from box top to text baseline.
    pub baseline_offset: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_stroke: Stroke {
                color: Color::rgb(0x00, 0xe5, 0xff),
                line_width: 3.0,
                glow_blur: 12.0,
            },
            font: Font {
                size_px: 14.0,
                family: "Arial",
            },
            label_background: Color::rgba(0, 0, 0, 0.7),
            label_text: Color::rgb(0xff, 0xff, 0xff),
            label_height: 20.0,
            label_padding: 6.0,
            label_offset: 24.0,
            baseline_offset: 8.0,
        }
    }
}

/// Label text for a detection.
///
/// `<icon> <CLASS> • <pct>%`, or `<icon> PERSON • <activity> • <pct>%` for a
/// person with an activity.
pub fn label_for(det: &Detection) -> String {
    let icon = det.class.icon();
    let pct = det.confidence_percent();
    match (&det.activity, det.class.is_person()) {
        (Some(activity), true) => format!("{icon} PERSON • {activity} • {pct}%"),
        _ => format!(
            "{icon} {} • {pct}%",
            det.class.label().to_uppercase()
        ),
    }
}

#[derive(Clone, Debug)]
pub struct OverlayRenderer {
    visible: bool,
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(visible: bool) -> Self {
        Self {
            visible,
            style: OverlayStyle::default(),
        }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Flip visibility and return the new state.
    pub fn toggle(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        detections: &[Detection],
        dims: FrameDimensions,
    ) {
        surface.resize(dims.width, dims.height);
        surface.clear();

        if !self.visible {
            return;
        }

        let style = &self.style;
        for det in detections {
            let bbox = &det.bbox;
            surface.stroke_rect(
                Rect::new(bbox.x, bbox.y, bbox.width, bbox.height),
                &style.box_stroke,
            );

            let label = label_for(det);
            let text_width = surface.measure_text(&label, &style.font);
            surface.fill_rect(
                Rect::new(
                    bbox.x,
                    bbox.y - style.label_offset,
                    text_width + style.label_padding * 2.0,
                    style.label_height,
                ),
                style.label_background,
            );
            surface.fill_text(
                &label,
                bbox.x + style.label_padding,
                bbox.y - style.baseline_offset,
                &style.font,
                style.label_text,
            );
        }
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(true)
    }
}

/// One recorded draw call.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    StrokeRect { rect: Rect, stroke: Stroke },
    FillRect { rect: Rect, color: Color },
    FillText { text: String, x: f32, y: f32, color: Color },
}

/// In-memory surface that keeps the draw calls since the last clear.
///
/// Text is measured with a fixed per-character advance of `0.6 * font size`.
#[derive(Clone, Debug, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
    clears: u64,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Draw calls currently visible on the surface.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn clear_count(&self) -> u64 {
        self.clears
    }

    /// Texts drawn since the last clear.
    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                DrawCommand::FillText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.clears += 1;
    }

    fn stroke_rect(&mut self, rect: Rect, stroke: &Stroke) {
        self.commands.push(DrawCommand::StrokeRect {
            rect,
            stroke: *stroke,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn measure_text(&self, text: &str, font: &Font) -> f32 {
        text.chars().count() as f32 * font.size_px * 0.6
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, _font: &Font, color: Color) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Activity;
    use crate::detect::{BoundingBox, ObjectClass};

    fn person(activity: Option<Activity>) -> Detection {
        Detection {
            class: ObjectClass::Person,
            score: 0.874,
            bbox: BoundingBox::new(100.0, 50.0, 80.0, 200.0),
            activity,
        }
    }

    fn phone() -> Detection {
        Detection {
            class: ObjectClass::CellPhone,
            score: 0.6,
            bbox: BoundingBox::new(300.0, 200.0, 40.0, 70.0),
            activity: None,
        }
    }

    #[test]
    fn labels_follow_class_format() {
        assert_eq!(
            label_for(&person(Some(Activity::Walking))),
            "🧍 PERSON • walking • 87%"
        );
        assert_eq!(label_for(&person(None)), "🧍 PERSON • 87%");
        assert_eq!(label_for(&phone()), "📱 CELL PHONE • 60%");

        let other = Detection {
            class: ObjectClass::Other("dog".to_string()),
            ..phone()
        };
        assert_eq!(label_for(&other), " DOG • 60%");
    }

    #[test]
    fn draws_box_background_and_text_per_detection() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::new();
        let dets = vec![person(Some(Activity::Standing)), phone()];
        renderer.render(&mut surface, &dets, FrameDimensions::new(640, 480));

        assert_eq!(surface.size(), (640, 480));
        assert_eq!(surface.commands().len(), 6);

        let label = label_for(&dets[0]);
        let width = surface.measure_text(&label, &renderer.style().font);
        match &surface.commands()[1] {
            DrawCommand::FillRect { rect, color } => {
                assert_eq!(*rect, Rect::new(100.0, 26.0, width + 12.0, 20.0));
                assert_eq!(*color, Color::rgba(0, 0, 0, 0.7));
            }
            other => panic!("unexpected command {other:?}"),
        }
        match &surface.commands()[2] {
            DrawCommand::FillText { text, x, y, .. } => {
                assert_eq!(text, &label);
                assert_eq!((*x, *y), (106.0, 42.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
        match &surface.commands()[0] {
            DrawCommand::StrokeRect { rect, stroke } => {
                assert_eq!(*rect, Rect::new(100.0, 50.0, 80.0, 200.0));
                assert_eq!(stroke.color, Color::rgb(0x00, 0xe5, 0xff));
                assert_eq!(stroke.line_width, 3.0);
                assert_eq!(stroke.glow_blur, 12.0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn hidden_overlay_only_clears() {
        let mut renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::new();
        renderer.render(&mut surface, &[phone()], FrameDimensions::new(640, 480));
        assert!(!surface.commands().is_empty());

        assert!(!renderer.toggle());
        renderer.render(&mut surface, &[phone()], FrameDimensions::new(640, 480));
        assert!(surface.commands().is_empty());
        assert_eq!(surface.clear_count(), 2);
    }

    #[test]
    fn rendering_twice_does_not_accumulate() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::new();
        let dets = vec![person(Some(Activity::Sitting)), phone()];

        renderer.render(&mut surface, &dets, FrameDimensions::new(640, 480));
        let first = surface.commands().to_vec();
        renderer.render(&mut surface, &dets, FrameDimensions::new(640, 480));
        assert_eq!(surface.commands(), first.as_slice());
    }
}
