// ============================================================================
// WATERMARK REMOVAL: one inpaint pass over the marked region
// ============================================================================

use image::{Rgba, RgbaImage};

use super::inpaint::InpaintMethod;
use crate::engine::{ColorConversion, Engine, EngineError, ThresholdType};

/// Knobs for one removal pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InpaintParams {
    pub radius: u32,
    pub method: InpaintMethod,
    /// Mask gray level that must be exceeded for a pixel to be filled.
    pub threshold: u8,
}

impl Default for InpaintParams {
    fn default() -> Self {
        Self {
            radius: 5,
            method: InpaintMethod::Telea,
            threshold: 100,
        }
    }
}

/// Why a removal request did not produce an image.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveError {
    NoImage,
    EngineNotReady,
    /// A pass is already running.
    Busy,
    Engine(EngineError),
    /// The worker running the pass panicked.
    Panicked(String),
}

impl RemoveError {
    /// Precondition failures are silent no-ops in the UI; everything else is
    /// shown to the user.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            RemoveError::NoImage | RemoveError::EngineNotReady | RemoveError::Busy
        )
    }

    /// The one message the user sees for any failed pass.
    pub fn user_message(&self) -> &'static str {
        "Processing failed. Try again with a smaller marked area, or reload the image."
    }
}

impl std::fmt::Display for RemoveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoveError::NoImage => write!(f, "no image loaded"),
            RemoveError::EngineNotReady => write!(f, "inpaint engine not ready"),
            RemoveError::Busy => write!(f, "a removal pass is already running"),
            RemoveError::Engine(e) => write!(f, "engine error: {}", e),
            RemoveError::Panicked(msg) => write!(f, "removal worker panicked: {}", msg),
        }
    }
}

impl std::error::Error for RemoveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RemoveError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for RemoveError {
    fn from(e: EngineError) -> Self {
        RemoveError::Engine(e)
    }
}

/// Inpaint the pixels marked in `mask_canvas` out of `source`.
///
/// `mask_canvas` is the white-on-black mask surface; it is reduced to gray
/// and thresholded so anti-aliased fringes at or below `params.threshold`
/// stay untouched. Only pixels set in the binary mask change in the result,
/// and those come back opaque. Every engine buffer is dropped before return,
/// on success and on every error path.
pub fn remove_marked(
    engine: &Engine,
    source: &RgbaImage,
    mask_canvas: &RgbaImage,
    params: InpaintParams,
) -> Result<RgbaImage, RemoveError> {
    if source.width() == 0 || source.height() == 0 {
        return Err(RemoveError::NoImage);
    }

    let src = engine.read_rgba(source)?;
    let mask_rgba = engine.read_rgba(mask_canvas)?;
    let mask_gray = engine.cvt_color(&mask_rgba, ColorConversion::Rgba2Gray)?;
    drop(mask_rgba);
    let binary = engine.threshold(&mask_gray, params.threshold, 255, ThresholdType::Binary)?;
    drop(mask_gray);

    let rgb = engine.cvt_color(&src, ColorConversion::Rgba2Rgb)?;
    drop(src);
    let filled = engine.inpaint(&rgb, &binary, params.radius, params.method)?;
    drop(rgb);

    let mut out = source.clone();
    for ((x, y, px), &m) in out.enumerate_pixels_mut().zip(binary.data()) {
        if m != 0
            && let &[r, g, b] = filled.pixel(x, y)
        {
            *px = Rgba([r, g, b, 255]);
        }
    }
    Ok(out)
}

/// Everything a worker thread needs to run one pass, detached from the
/// session that produced it.
#[derive(Clone)]
pub struct InpaintJob {
    pub source: RgbaImage,
    pub mask: RgbaImage,
    pub params: InpaintParams,
}

impl InpaintJob {
    pub fn run(&self, engine: &Engine) -> Result<RgbaImage, RemoveError> {
        let started = std::time::Instant::now();
        let result = remove_marked(engine, &self.source, &self.mask, self.params);
        match &result {
            Ok(_) => {
                crate::log_info!(
                    "Removal pass ({}, radius {}) on {}x{} took {:.0?}",
                    self.params.method.key(),
                    self.params.radius,
                    self.source.width(),
                    self.source.height(),
                    started.elapsed()
                );
            }
            Err(e) => {
                crate::log_err!("Removal pass failed: {}", e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    fn scene() -> (RgbaImage, RgbaImage) {
        let mut src = RgbaImage::from_pixel(40, 30, Rgba([90, 140, 200, 255]));
        let mut mask = RgbaImage::from_pixel(40, 30, Rgba([0, 0, 0, 255]));
        for y in 12..18 {
            for x in 10..30 {
                src.put_pixel(x, y, Rgba([250, 250, 250, 255]));
                mask.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        (src, mask)
    }

    #[test]
    fn marked_band_is_filled_from_surroundings() {
        let e = engine();
        let (src, mask) = scene();
        let out = remove_marked(&e, &src, &mask, InpaintParams::default()).unwrap();
        let p = out.get_pixel(20, 15).0;
        assert!(p[0].abs_diff(90) <= 2 && p[2].abs_diff(200) <= 2, "{p:?}");
        assert_eq!(e.live_buffers(), 0);
    }

    #[test]
    fn unmarked_pixels_are_bit_exact() {
        let e = engine();
        let (mut src, mask) = scene();
        src.put_pixel(0, 0, Rgba([1, 2, 3, 4]));
        let out = remove_marked(&e, &src, &mask, InpaintParams::default()).unwrap();
        for (x, y, p) in src.enumerate_pixels() {
            if mask.get_pixel(x, y).0[0] == 0 {
                assert_eq!(out.get_pixel(x, y), p);
            }
        }
    }

    #[test]
    fn faint_mask_below_threshold_is_ignored() {
        let e = engine();
        let (src, _) = scene();
        let mask = RgbaImage::from_pixel(40, 30, Rgba([100, 100, 100, 255]));
        let out = remove_marked(&e, &src, &mask, InpaintParams::default()).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn failures_release_buffers() {
        let e = engine();
        let (src, _) = scene();
        let wrong = RgbaImage::new(10, 10);
        let err = remove_marked(&e, &src, &wrong, InpaintParams::default()).unwrap_err();
        assert!(matches!(err, RemoveError::Engine(EngineError::SizeMismatch { .. })));
        assert!(!err.is_noop());
        assert_eq!(e.live_buffers(), 0);

        let params = InpaintParams {
            radius: 1000,
            ..Default::default()
        };
        let (_, mask) = scene();
        assert!(remove_marked(&e, &src, &mask, params).is_err());
        assert_eq!(e.live_buffers(), 0);
    }

    #[test]
    fn precondition_errors_are_noops() {
        assert!(RemoveError::Busy.is_noop());
        assert!(RemoveError::EngineNotReady.is_noop());
        assert!(!RemoveError::Panicked("x".into()).is_noop());
    }
}
