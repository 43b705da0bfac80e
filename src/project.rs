use image::RgbaImage;
use std::path::PathBuf;
use uuid::Uuid;

use crate::canvas::CanvasState;
use crate::components::history::{HistoryManager, UndoStep};
use crate::components::tools::{Painter, replay_stroke};
use crate::engine::EngineError;
use crate::io::{self, SessionError, SessionFileV1};
use crate::ops::remove::{InpaintJob, InpaintParams, RemoveError};

/// One open image: the clean source, the two drawing surfaces, pending
/// strokes and pass history.
pub struct Project {
    pub id: Uuid,
    /// Clean working image (no overlay). Replaced after every pass.
    source: RgbaImage,
    pub canvas_state: CanvasState,
    pub history: HistoryManager,
    painter: Painter,
    /// Set while a pass is in flight; blocks drawing and further passes.
    processing: bool,
    /// `None` when the image did not come from a file.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
    /// Display name (derived from path or "Untitled")
    pub name: String,
}

impl Project {
    /// Start a project from a decoded image, downscaled to `max_width`.
    pub fn from_image(
        image: RgbaImage,
        path: Option<PathBuf>,
        max_width: u32,
        max_undo_steps: usize,
    ) -> Self {
        let source = io::fit_to_width(image, max_width);
        let name = display_name(path.as_ref());
        crate::log_info!(
            "Loaded {} at working size {}x{}",
            name,
            source.width(),
            source.height()
        );
        Self {
            id: Uuid::new_v4(),
            canvas_state: CanvasState::new(&source),
            source,
            history: HistoryManager::new(max_undo_steps),
            painter: Painter::default(),
            processing: false,
            path,
            is_dirty: false,
            name,
        }
    }

    /// Restore a saved session; pending strokes are replayed onto both canvases.
    pub fn from_session(
        session: SessionFileV1,
        path: PathBuf,
        max_undo_steps: usize,
    ) -> Result<Self, SessionError> {
        let source = session.image()?;
        let mut project = Self::from_image(source, Some(path), u32::MAX, max_undo_steps);
        for stroke in &session.strokes {
            replay_stroke(&mut project.canvas_state, stroke);
        }
        project.history.replace_strokes(session.strokes);
        Ok(project)
    }

    pub fn to_session(&self, brush_size: f32) -> SessionFileV1 {
        SessionFileV1::new(&self.source, brush_size, self.history.strokes().to_vec())
    }

    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    pub fn working_size(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn is_drawing(&self) -> bool {
        self.painter.is_drawing()
    }

    // ------------------------------------------------------------------
    // Painting
    // ------------------------------------------------------------------

    /// Begin a stroke. Ignored while a pass is running.
    pub fn press(&mut self, at: (f32, f32), width: f32) {
        if self.processing {
            return;
        }
        self.painter.press(&mut self.canvas_state, at, width);
        self.is_dirty = true;
    }

    pub fn move_to(&mut self, at: (f32, f32)) {
        self.painter.move_to(&mut self.canvas_state, at);
    }

    /// Commit the active stroke (release or pointer leaving the canvas).
    pub fn release(&mut self) {
        if let Some(stroke) = self.painter.finish() {
            self.history.push_stroke(stroke);
        }
    }

    /// Discard pending strokes and redraw both canvases from the source.
    pub fn reset(&mut self) {
        if self.processing {
            return;
        }
        self.painter.finish();
        self.history.clear_strokes();
        self.canvas_state.reset_from(&self.source);
    }

    /// Undo the last stroke, or the last pass when no strokes are pending.
    pub fn undo(&mut self) -> Option<UndoStep> {
        if self.processing || self.painter.is_drawing() {
            return None;
        }
        match self.history.next_undo()? {
            UndoStep::Stroke => {
                self.history.pop_stroke();
                self.redraw();
                Some(UndoStep::Stroke)
            }
            UndoStep::Pass => {
                let snap = self.history.pop_pass()?;
                self.source = snap.source;
                self.history.replace_strokes(snap.strokes);
                self.redraw();
                Some(UndoStep::Pass)
            }
        }
    }

    fn redraw(&mut self) {
        self.canvas_state.reset_from(&self.source);
        for stroke in self.history.strokes() {
            replay_stroke(&mut self.canvas_state, stroke);
        }
    }

    // ------------------------------------------------------------------
    // Inpainting
    // ------------------------------------------------------------------

    /// Snapshot the inputs for one pass and mark the project busy.
    ///
    /// Returns [`RemoveError::EngineNotReady`] or [`RemoveError::Busy`]
    /// without touching any state.
    pub fn begin_inpaint(
        &mut self,
        engine_ready: bool,
        params: InpaintParams,
    ) -> Result<InpaintJob, RemoveError> {
        if !engine_ready {
            return Err(RemoveError::EngineNotReady);
        }
        if self.processing {
            return Err(RemoveError::Busy);
        }
        self.release();
        self.processing = true;
        Ok(InpaintJob {
            source: self.source.clone(),
            mask: self.canvas_state.mask().clone(),
            params,
        })
    }

    /// Apply a finished pass: on success the result becomes the visible
    /// canvas and the new source and the mask is cleared. On failure the
    /// canvases are left as they were. The busy flag is cleared either way.
    pub fn finish_inpaint(
        &mut self,
        result: Result<RgbaImage, RemoveError>,
    ) -> Result<(), RemoveError> {
        self.processing = false;
        let image = result?;
        if image.dimensions() != self.source.dimensions() {
            crate::log_err!(
                "Discarding pass result of size {:?}, working size is {:?}",
                image.dimensions(),
                self.source.dimensions()
            );
            return Err(RemoveError::Engine(EngineError::SizeMismatch {
                source: self.source.dimensions(),
                mask: image.dimensions(),
            }));
        }
        let previous = std::mem::replace(&mut self.source, image);
        self.history.push_pass(previous);
        self.canvas_state.set_visible(self.source.clone());
        self.canvas_state.clear_mask();
        self.is_dirty = true;
        Ok(())
    }

    /// What export writes: the visible canvas as displayed.
    pub fn export_image(&self) -> &RgbaImage {
        self.canvas_state.visible()
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}

fn display_name(path: Option<&PathBuf>) -> String {
    path.and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Untitled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineConfig};
    use image::Rgba;

    fn project(w: u32, h: u32) -> Project {
        Project::from_image(RgbaImage::from_pixel(w, h, Rgba([30, 90, 150, 255])), None, 1280, 20)
    }

    #[test]
    fn load_caps_width_and_starts_with_black_mask() {
        let p = project(2000, 1000);
        assert_eq!(p.working_size(), (1280, 640));
        assert_eq!(p.canvas_state.mask().dimensions(), (1280, 640));
        assert!(p.canvas_state.mask_is_clear());
    }

    #[test]
    fn second_begin_is_rejected_as_busy() {
        let mut p = project(20, 20);
        p.press((10.0, 10.0), 6.0);
        let _job = p.begin_inpaint(true, InpaintParams::default()).unwrap();
        assert!(p.is_processing());
        assert_eq!(
            p.begin_inpaint(true, InpaintParams::default()).err(),
            Some(RemoveError::Busy)
        );
    }

    #[test]
    fn not_ready_engine_leaves_state_alone() {
        let mut p = project(20, 20);
        assert_eq!(
            p.begin_inpaint(false, InpaintParams::default()).err(),
            Some(RemoveError::EngineNotReady)
        );
        assert!(!p.is_processing());
    }

    #[test]
    fn pass_promotes_result_and_undo_restores() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let mut p = project(40, 40);
        let original = p.source().clone();
        p.press((20.0, 20.0), 8.0);
        p.move_to((25.0, 22.0));
        p.release();

        let job = p.begin_inpaint(true, InpaintParams::default()).unwrap();
        p.finish_inpaint(job.run(&engine)).unwrap();
        assert!(!p.is_processing());
        assert!(p.canvas_state.mask_is_clear());
        assert_eq!(p.canvas_state.visible(), p.source());
        assert_eq!(p.history.stroke_count(), 0);

        assert_eq!(p.undo(), Some(UndoStep::Pass));
        assert_eq!(p.source(), &original);
        assert_eq!(p.history.stroke_count(), 1);
        assert!(!p.canvas_state.mask_is_clear());
    }

    #[test]
    fn failed_pass_clears_busy_and_keeps_canvases() {
        let mut p = project(20, 20);
        p.press((5.0, 5.0), 6.0);
        p.release();
        let mask_before = p.canvas_state.mask().clone();
        let _job = p.begin_inpaint(true, InpaintParams::default()).unwrap();
        let err = p
            .finish_inpaint(Err(RemoveError::Panicked("boom".into())))
            .unwrap_err();
        assert!(!err.is_noop());
        assert!(!p.is_processing());
        assert_eq!(p.canvas_state.mask(), &mask_before);
    }

    #[test]
    fn undo_stroke_replays_remaining() {
        let mut p = project(60, 60);
        p.press((10.0, 10.0), 6.0);
        p.release();
        let after_first = p.canvas_state.mask().clone();
        p.press((40.0, 40.0), 6.0);
        p.move_to((50.0, 45.0));
        p.release();
        assert_ne!(p.canvas_state.mask(), &after_first);

        assert_eq!(p.undo(), Some(UndoStep::Stroke));
        assert_eq!(p.canvas_state.mask(), &after_first);
        assert_eq!(p.undo(), Some(UndoStep::Stroke));
        assert!(p.canvas_state.mask_is_clear());
        assert_eq!(p.undo(), None);
    }

    #[test]
    fn reset_discards_strokes() {
        let mut p = project(30, 30);
        p.press((15.0, 15.0), 10.0);
        p.release();
        p.reset();
        assert!(p.canvas_state.mask_is_clear());
        assert_eq!(p.canvas_state.visible(), p.source());
        assert_eq!(p.history.stroke_count(), 0);
    }
}
