use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Sense, TextureOptions, Vec2};
use image::{Rgba, RgbaImage};

/// Stroke colour on the visible canvas (red, drawn at half opacity).
pub const OVERLAY_RGB: [u8; 3] = [255, 50, 50];
pub const OVERLAY_ALPHA: f32 = 0.5;

const MASK_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

// ============================================================================
// CANVAS STATE: the visible surface and its binary mask twin
// ============================================================================

/// Two same-sized RGBA surfaces: what the user sees (image + red overlay) and
/// the mask the engine consumes (white marks on opaque black).
#[derive(Clone)]
pub struct CanvasState {
    pub width: u32,
    pub height: u32,
    visible: RgbaImage,
    mask: RgbaImage,
    /// Bumped on every pixel change; the widget re-uploads its texture when
    /// this differs from the generation it last uploaded.
    generation: u64,
}

impl CanvasState {
    /// Visible surface starts as a copy of `source`, mask fully black.
    pub fn new(source: &RgbaImage) -> Self {
        let (width, height) = source.dimensions();
        Self {
            width,
            height,
            visible: source.clone(),
            mask: RgbaImage::from_pixel(width, height, MASK_BACKGROUND),
            generation: 1,
        }
    }

    /// Resize both surfaces to `source`, redraw it and clear the mask.
    pub fn reset_from(&mut self, source: &RgbaImage) {
        *self = Self {
            generation: self.generation + 1,
            ..Self::new(source)
        };
    }

    pub fn visible(&self) -> &RgbaImage {
        &self.visible
    }

    pub fn mask(&self) -> &RgbaImage {
        &self.mask
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the visible surface wholesale (inpaint result).
    pub fn set_visible(&mut self, img: RgbaImage) {
        debug_assert_eq!(img.dimensions(), (self.width, self.height));
        self.visible = img;
        self.generation += 1;
    }

    pub fn clear_mask(&mut self) {
        for p in self.mask.pixels_mut() {
            *p = MASK_BACKGROUND;
        }
        self.generation += 1;
    }

    /// True when no mask pixel carries any mark.
    pub fn mask_is_clear(&self) -> bool {
        self.mask.pixels().all(|p| *p == MASK_BACKGROUND)
    }

    /// Round dot of diameter `width` centred on `at`.
    pub fn draw_dot(&mut self, at: (f32, f32), width: f32) {
        self.draw_segment(at, at, width);
    }

    /// Draw one round-capped segment onto both surfaces: translucent red on
    /// the visible canvas, white on the mask. Each call blends independently,
    /// matching a canvas path that is restarted after every segment.
    pub fn draw_segment(&mut self, from: (f32, f32), to: (f32, f32), width: f32) {
        let radius = width.max(1.0) * 0.5;
        let Some((min_x, min_y, max_x, max_y)) = self.segment_bounds(from, to, radius) else {
            return;
        };

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let d = dist_to_segment(x as f32 + 0.5, y as f32 + 0.5, from, to);
                let coverage = (radius + 0.5 - d).clamp(0.0, 1.0);
                if coverage <= 0.0 {
                    continue;
                }
                blend_over(
                    self.visible.get_pixel_mut(x, y),
                    OVERLAY_RGB,
                    OVERLAY_ALPHA * coverage,
                );
                let m = self.mask.get_pixel_mut(x, y);
                for c in 0..3 {
                    let v = m.0[c] as f32;
                    m.0[c] = (v + (255.0 - v) * coverage).round() as u8;
                }
            }
        }
        self.generation += 1;
    }

    fn segment_bounds(
        &self,
        from: (f32, f32),
        to: (f32, f32),
        radius: f32,
    ) -> Option<(u32, u32, u32, u32)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let pad = radius + 1.0;
        let lo_x = (from.0.min(to.0) - pad).floor();
        let lo_y = (from.1.min(to.1) - pad).floor();
        let hi_x = (from.0.max(to.0) + pad).ceil();
        let hi_y = (from.1.max(to.1) + pad).ceil();
        let max_w = (self.width - 1) as f32;
        let max_h = (self.height - 1) as f32;
        if hi_x < 0.0 || hi_y < 0.0 || lo_x > max_w || lo_y > max_h {
            return None;
        }
        Some((
            lo_x.max(0.0) as u32,
            lo_y.max(0.0) as u32,
            hi_x.min(max_w) as u32,
            hi_y.min(max_h) as u32,
        ))
    }
}

/// Distance from `(px, py)` to the segment `a`–`b`.
#[inline]
fn dist_to_segment(px: f32, py: f32, a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((px - a.0) * dx + (py - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = a.0 + t * dx;
    let cy = a.1 + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Source-over blend of an unpremultiplied colour at `alpha`.
#[inline]
fn blend_over(dst: &mut Rgba<u8>, rgb: [u8; 3], alpha: f32) {
    let inv = 1.0 - alpha;
    for (c, &top) in rgb.iter().enumerate() {
        dst.0[c] = (top as f32 * alpha + dst.0[c] as f32 * inv).round() as u8;
    }
    let a = dst.0[3] as f32 / 255.0;
    dst.0[3] = ((alpha + a * inv) * 255.0).round() as u8;
}

// ============================================================================
// VIEW MAPPING: displayed rect <-> backing pixels
// ============================================================================

/// Where the canvas is drawn on screen and how big its backing store is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewMapping {
    pub display: Rect,
    pub pixel_size: (u32, u32),
}

impl ViewMapping {
    /// Fit `pixel_size` inside `available`, centred, never enlarged.
    pub fn fit(available: Rect, pixel_size: (u32, u32)) -> Self {
        let (w, h) = (pixel_size.0.max(1) as f32, pixel_size.1.max(1) as f32);
        let scale = (available.width() / w)
            .min(available.height() / h)
            .min(1.0)
            .max(0.01);
        let display = Rect::from_center_size(available.center(), Vec2::new(w * scale, h * scale));
        Self {
            display,
            pixel_size,
        }
    }

    /// Screen position to sub-pixel canvas coordinates. Scales each axis by
    /// backing size over displayed size, so any stretching is accounted for.
    pub fn to_canvas(&self, pos: Pos2) -> (f32, f32) {
        let sx = self.pixel_size.0 as f32 / self.display.width().max(f32::EPSILON);
        let sy = self.pixel_size.1 as f32 / self.display.height().max(f32::EPSILON);
        (
            (pos.x - self.display.min.x) * sx,
            (pos.y - self.display.min.y) * sy,
        )
    }

    pub fn contains(&self, pos: Pos2) -> bool {
        self.display.contains(pos)
    }
}

// ============================================================================
// CANVAS WIDGET
// ============================================================================

/// Pointer activity over the canvas for one frame, already in pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Press((f32, f32)),
    Move((f32, f32)),
    Release,
    Leave,
}

/// egui widget that shows a [`CanvasState`] and reports pointer events.
pub struct Canvas {
    texture: Option<egui::TextureHandle>,
    uploaded_generation: u64,
    pub last_mapping: Option<ViewMapping>,
    was_inside: bool,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            texture: None,
            uploaded_generation: 0,
            last_mapping: None,
            was_inside: false,
        }
    }

    /// Drop the cached texture (new image loaded).
    pub fn invalidate(&mut self) {
        self.uploaded_generation = 0;
    }

    /// Draw the visible surface and collect pointer events. Touch input
    /// arrives as pointer input; the canvas is not inside a scroll area and
    /// claims drags, so strokes never pan the view.
    pub fn show(&mut self, ui: &mut egui::Ui, state: &CanvasState) -> Vec<PointerEvent> {
        let available = ui.available_rect_before_wrap();
        let (_, response) = ui.allocate_exact_size(available.size(), Sense::click_and_drag());
        let mapping = ViewMapping::fit(available, (state.width, state.height));
        self.last_mapping = Some(mapping);

        if self.uploaded_generation != state.generation() || self.texture.is_none() {
            let image = rgba_image_to_color_image(state.visible());
            match &mut self.texture {
                Some(tex) => tex.set(image, TextureOptions::LINEAR),
                None => {
                    self.texture =
                        Some(ui.ctx().load_texture("canvas", image, TextureOptions::LINEAR))
                }
            }
            self.uploaded_generation = state.generation();
        }

        let painter = ui.painter_at(available);
        if let Some(tex) = &self.texture {
            painter.image(
                tex.id(),
                mapping.display,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }

        let (pressed, down, released, pos) = ui.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.primary_released(),
                i.pointer.interact_pos().or(i.pointer.hover_pos()),
            )
        });

        let mut events = Vec::new();
        let inside = pos.is_some_and(|p| mapping.contains(p)) && response.hovered();
        if self.was_inside && !inside {
            events.push(PointerEvent::Leave);
        }
        if let Some(p) = pos.filter(|_| inside) {
            let at = mapping.to_canvas(p);
            if pressed {
                events.push(PointerEvent::Press(at));
            } else if down {
                events.push(PointerEvent::Move(at));
            }
        }
        if released {
            events.push(PointerEvent::Release);
        }
        self.was_inside = inside;

        if inside {
            ui.ctx().set_cursor_icon(egui::CursorIcon::Crosshair);
        }
        events
    }
}

/// Converts an RgbaImage to egui's ColorImage format
pub fn rgba_image_to_color_image(img: &RgbaImage) -> ColorImage {
    let size = [img.width() as usize, img.height() as usize];
    ColorImage::from_rgba_unmultiplied(size, img.as_raw())
}
