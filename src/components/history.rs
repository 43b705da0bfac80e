use eframe::egui;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ============================================================================
// STROKE RECORD: replayable description of one brush stroke
// ============================================================================

/// Pointer path of one stroke in canvas pixel coordinates, plus its brush
/// width. Replaying a record draws the same pixels the live stroke drew.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokeRecord {
    pub points: Vec<[f32; 2]>,
    pub width: f32,
}

impl StrokeRecord {
    pub fn new(start: (f32, f32), width: f32) -> Self {
        Self {
            points: vec![[start.0, start.1]],
            width,
        }
    }

    pub fn push(&mut self, p: (f32, f32)) {
        self.points.push([p.0, p.1]);
    }

    pub fn last(&self) -> Option<(f32, f32)> {
        self.points.last().map(|p| (p[0], p[1]))
    }

    /// Finite coordinates and a positive finite width.
    pub fn is_well_formed(&self) -> bool {
        self.width.is_finite()
            && self.width > 0.0
            && self.points.iter().all(|p| p[0].is_finite() && p[1].is_finite())
    }

    fn memory_size(&self) -> usize {
        self.points.len() * std::mem::size_of::<[f32; 2]>()
    }
}

// ============================================================================
// PASS SNAPSHOT: source image and mask strokes before an inpaint pass
// ============================================================================

pub struct PassSnapshot {
    pub source: RgbaImage,
    pub strokes: Vec<StrokeRecord>,
}

impl PassSnapshot {
    fn memory_size(&self) -> usize {
        self.source.as_raw().len() + self.strokes.iter().map(|s| s.memory_size()).sum::<usize>()
    }
}

/// What an undo step reverted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndoStep {
    Stroke,
    Pass,
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// Strokes on the current mask plus a bounded stack of completed passes.
///
/// Undo removes the most recent stroke while the mask has any; otherwise it
/// hands back the newest pass snapshot so the session can restore it.
pub struct HistoryManager {
    strokes: Vec<StrokeRecord>,
    passes: VecDeque<PassSnapshot>,
    max_passes: usize,
    /// Optional memory cap in bytes for pass snapshots.
    max_memory_bytes: Option<usize>,
    pass_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(20)
    }
}

impl HistoryManager {
    pub fn new(max_passes: usize) -> Self {
        Self {
            strokes: Vec::new(),
            passes: VecDeque::new(),
            max_passes,
            max_memory_bytes: Some(512 * 1024 * 1024),
            pass_memory: 0,
        }
    }

    pub fn push_stroke(&mut self, stroke: StrokeRecord) {
        self.strokes.push(stroke);
    }

    pub fn pop_stroke(&mut self) -> Option<StrokeRecord> {
        self.strokes.pop()
    }

    pub fn strokes(&self) -> &[StrokeRecord] {
        &self.strokes
    }

    pub fn clear_strokes(&mut self) {
        self.strokes.clear();
    }

    pub fn replace_strokes(&mut self, strokes: Vec<StrokeRecord>) {
        self.strokes = strokes;
    }

    /// Record the state that a pass is about to replace. The current strokes
    /// move into the snapshot.
    pub fn push_pass(&mut self, source: RgbaImage) {
        let snapshot = PassSnapshot {
            source,
            strokes: std::mem::take(&mut self.strokes),
        };
        self.pass_memory += snapshot.memory_size();
        self.passes.push_back(snapshot);
        self.prune();
    }

    pub fn pop_pass(&mut self) -> Option<PassSnapshot> {
        let snap = self.passes.pop_back()?;
        self.pass_memory = self.pass_memory.saturating_sub(snap.memory_size());
        Some(snap)
    }

    pub fn can_undo(&self) -> bool {
        !self.strokes.is_empty() || !self.passes.is_empty()
    }

    /// Which kind of step the next undo would revert.
    pub fn next_undo(&self) -> Option<UndoStep> {
        if !self.strokes.is_empty() {
            Some(UndoStep::Stroke)
        } else if !self.passes.is_empty() {
            Some(UndoStep::Pass)
        } else {
            None
        }
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.pass_memory + self.strokes.iter().map(|s| s.memory_size()).sum::<usize>()
    }

    fn prune(&mut self) {
        while self.passes.len() > self.max_passes {
            if let Some(removed) = self.passes.pop_front() {
                self.pass_memory = self.pass_memory.saturating_sub(removed.memory_size());
            }
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.pass_memory > max_bytes && self.passes.len() > 1 {
                if let Some(removed) = self.passes.pop_front() {
                    self.pass_memory = self.pass_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.passes.clear();
        self.pass_memory = 0;
    }
}

#[derive(Default)]
pub struct HistoryPanel {
    show_memory_info: bool,
}

impl HistoryPanel {
    pub fn show(&mut self, ui: &mut egui::Ui, history: &HistoryManager) {
        ui.horizontal(|ui| {
            ui.label(format!(
                "Strokes: {} | Passes: {}",
                history.stroke_count(),
                history.pass_count()
            ));
            if ui.small_button("ℹ").on_hover_text("Show memory info").clicked() {
                self.show_memory_info = !self.show_memory_info;
            }
        });
        if self.show_memory_info {
            let mem_mb = history.memory_usage() as f64 / (1024.0 * 1024.0);
            ui.label(format!("Memory: {:.2} MB", mem_mb));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn img(v: u8) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([v, v, v, 255]))
    }

    #[test]
    fn strokes_undo_before_passes() {
        let mut h = HistoryManager::new(5);
        h.push_stroke(StrokeRecord::new((1.0, 1.0), 10.0));
        h.push_pass(img(1));
        assert_eq!(h.stroke_count(), 0);
        h.push_stroke(StrokeRecord::new((2.0, 2.0), 10.0));

        assert_eq!(h.next_undo(), Some(UndoStep::Stroke));
        assert!(h.pop_stroke().is_some());
        assert_eq!(h.next_undo(), Some(UndoStep::Pass));
        let snap = h.pop_pass().unwrap();
        assert_eq!(snap.source, img(1));
        assert_eq!(snap.strokes.len(), 1);
        assert!(!h.can_undo());
    }

    #[test]
    fn pass_stack_is_bounded() {
        let mut h = HistoryManager::new(2);
        for v in 0..5 {
            h.push_pass(img(v));
        }
        assert_eq!(h.pass_count(), 2);
        assert_eq!(h.pop_pass().unwrap().source, img(4));
        assert_eq!(h.pop_pass().unwrap().source, img(3));
        assert_eq!(h.memory_usage(), 0);
    }
}
