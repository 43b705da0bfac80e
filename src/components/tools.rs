use eframe::egui;

use super::history::StrokeRecord;
use crate::canvas::CanvasState;
use crate::settings::{BRUSH_MAX, BRUSH_MIN};

const BRUSH_SIZE_PRESETS: [f32; 6] = [5.0, 10.0, 20.0, 30.0, 50.0, 80.0];

// ============================================================================
// PAINTER: idle/drawing state machine over the two surfaces
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PainterState {
    #[default]
    Idle,
    Drawing,
}

/// Turns press/move/release into strokes on a [`CanvasState`].
///
/// A press paints a dot immediately, so a click without movement still
/// marks pixels. Each move draws one segment from the previous point.
#[derive(Default)]
pub struct Painter {
    state: PainterState,
    current: Option<StrokeRecord>,
}

impl Painter {
    pub fn state(&self) -> PainterState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        self.state == PainterState::Drawing
    }

    pub fn press(&mut self, canvas: &mut CanvasState, at: (f32, f32), width: f32) {
        canvas.draw_dot(at, width);
        self.current = Some(StrokeRecord::new(at, width));
        self.state = PainterState::Drawing;
    }

    /// Extend the active stroke; ignored while idle.
    pub fn move_to(&mut self, canvas: &mut CanvasState, at: (f32, f32)) {
        if self.state != PainterState::Drawing {
            return;
        }
        let Some(stroke) = self.current.as_mut() else { return };
        let Some(prev) = stroke.last() else { return };
        if prev == at {
            return;
        }
        canvas.draw_segment(prev, at, stroke.width);
        stroke.push(at);
    }

    /// End the active stroke (release or pointer leaving the canvas). Ending
    /// while idle is a no-op and yields nothing.
    pub fn finish(&mut self) -> Option<StrokeRecord> {
        self.state = PainterState::Idle;
        self.current.take()
    }
}

/// Draw `stroke` exactly as the live painter drew it.
pub fn replay_stroke(canvas: &mut CanvasState, stroke: &StrokeRecord) {
    let mut points = stroke.points.iter().map(|p| (p[0], p[1]));
    let Some(mut prev) = points.next() else { return };
    canvas.draw_dot(prev, stroke.width);
    for p in points {
        canvas.draw_segment(prev, p, stroke.width);
        prev = p;
    }
}

// ============================================================================
// BRUSH TOOL: size control
// ============================================================================

pub struct BrushTool {
    pub size: f32,
}

impl BrushTool {
    pub fn new(size: f32) -> Self {
        Self {
            size: size.clamp(BRUSH_MIN, BRUSH_MAX),
        }
    }

    /// Returns true when a new size has settled and should be persisted.
    /// Slider drags report once, when released.
    pub fn show(&mut self, ui: &mut egui::Ui) -> bool {
        ui.label("Brush size");
        let slider = ui.add(
            egui::Slider::new(&mut self.size, BRUSH_MIN..=BRUSH_MAX)
                .step_by(1.0)
                .suffix("px"),
        );
        let mut settled = edit_settled(slider.changed(), slider.dragged(), slider.drag_released());
        ui.horizontal_wrapped(|ui| {
            for &preset in BRUSH_SIZE_PRESETS.iter() {
                if ui
                    .selectable_label((self.size - preset).abs() < 0.1, format!("{:.0}", preset))
                    .clicked()
                {
                    self.size = preset;
                    settled = true;
                }
            }
        });
        settled
    }
}

fn edit_settled(changed: bool, dragging: bool, drag_released: bool) -> bool {
    drag_released || (changed && !dragging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn canvas() -> CanvasState {
        CanvasState::new(&RgbaImage::from_pixel(80, 60, Rgba([40, 60, 80, 255])))
    }

    #[test]
    fn click_without_move_paints_a_dot() {
        let mut c = canvas();
        let mut p = Painter::default();
        p.press(&mut c, (20.0, 20.0), 10.0);
        let stroke = p.finish().unwrap();
        assert_eq!(stroke.points.len(), 1);
        assert_eq!(c.mask().get_pixel(20, 20).0[0], 255);
        assert_eq!(p.state(), PainterState::Idle);
    }

    #[test]
    fn moves_while_idle_draw_nothing() {
        let mut c = canvas();
        let mut p = Painter::default();
        p.move_to(&mut c, (10.0, 10.0));
        p.move_to(&mut c, (50.0, 40.0));
        assert!(c.mask_is_clear());
        assert!(p.finish().is_none());
    }

    #[test]
    fn replay_reproduces_live_pixels() {
        let mut live = canvas();
        let mut p = Painter::default();
        p.press(&mut live, (10.0, 10.0), 12.0);
        p.move_to(&mut live, (30.0, 15.0));
        p.move_to(&mut live, (55.0, 40.0));
        let stroke = p.finish().unwrap();

        let mut replayed = canvas();
        replay_stroke(&mut replayed, &stroke);
        assert_eq!(replayed.mask(), live.mask());
        assert_eq!(replayed.visible(), live.visible());
    }

    #[test]
    fn brush_size_is_clamped() {
        assert_eq!(BrushTool::new(1.0).size, BRUSH_MIN);
        assert_eq!(BrushTool::new(500.0).size, BRUSH_MAX);
    }

    #[test]
    fn slider_drag_settles_on_release() {
        assert!(!edit_settled(true, true, false));
        assert!(!edit_settled(false, true, false));
        assert!(edit_settled(false, false, true));
        assert!(edit_settled(true, false, false));
        assert!(!edit_settled(false, false, false));
    }
}
