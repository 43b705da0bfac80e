// ============================================================================
// ENGINE MODULE: inpainting engine with an explicit buffer API
// ============================================================================
//
// Architecture:
//   context.rs: Engine handle, configuration, asynchronous initialisation
//   mat.rs    : Mat pixel buffers + live-buffer accounting (scoped release)
//   imgproc.rs: read/show, colour conversion, threshold, inpaint dispatch
//
// Callers treat the engine as a black box: every buffer it hands out is a Mat
// that returns its lease when dropped, so an early `?` return or a panic on a
// worker never leaves buffers allocated.
// ============================================================================

pub mod context;
pub mod imgproc;
pub mod mat;

pub use context::{Engine, EngineConfig, EngineLoader, EngineStatus};
pub use imgproc::{ColorConversion, ThresholdType};
pub use mat::{BufferCounter, Mat};

/// Errors raised by engine operations.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Only 1, 3 and 4 channel buffers exist.
    UnsupportedChannels(u8),
    /// Raw data length does not match `width * height * channels`.
    BadLength { expected: usize, got: usize },
    /// An operation received a buffer with the wrong channel count.
    ChannelMismatch {
        op: &'static str,
        expected: &'static str,
        got: u8,
    },
    /// Source and mask dimensions differ.
    SizeMismatch { source: (u32, u32), mask: (u32, u32) },
    /// Inpaint radius outside `1..=max_radius`.
    InvalidRadius { radius: u32, max: u32 },
    /// Zero-sized input.
    EmptyImage,
    /// Initialisation did not complete.
    InitFailed(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnsupportedChannels(c) => write!(f, "unsupported channel count {}", c),
            EngineError::BadLength { expected, got } => {
                write!(f, "buffer holds {} bytes, expected {}", got, expected)
            }
            EngineError::ChannelMismatch { op, expected, got } => {
                write!(f, "{}: expected {} channel input, got {}", op, expected, got)
            }
            EngineError::SizeMismatch { source, mask } => write!(
                f,
                "source is {}x{} but mask is {}x{}",
                source.0, source.1, mask.0, mask.1
            ),
            EngineError::InvalidRadius { radius, max } => {
                write!(f, "inpaint radius {} outside 1..={}", radius, max)
            }
            EngineError::EmptyImage => write!(f, "image has no pixels"),
            EngineError::InitFailed(msg) => write!(f, "engine initialisation failed: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}
