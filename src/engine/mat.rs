// ============================================================================
// MAT: engine-owned pixel buffers with scoped release
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::EngineError;

/// Shared counter of live engine buffers.
///
/// Every [`Mat`] holds one [`BufferLease`]; the count drops back when the
/// Mat is released or goes out of scope, on any exit path.
#[derive(Clone, Debug, Default)]
pub struct BufferCounter {
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl BufferCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a lease for a new buffer.
    pub fn lease(&self) -> BufferLease {
        let now = self.live.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        BufferLease {
            live: Arc::clone(&self.live),
        }
    }

    /// Number of buffers currently allocated.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Highest number of simultaneously live buffers seen so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

/// Returned to the counter on drop.
#[derive(Debug)]
pub struct BufferLease {
    live: Arc<AtomicUsize>,
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Interleaved 8-bit image buffer, 1, 3 or 4 channels.
#[derive(Debug)]
pub struct Mat {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
    _lease: BufferLease,
}

impl Mat {
    pub(crate) fn from_raw(
        counter: &BufferCounter,
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, EngineError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(EngineError::UnsupportedChannels(channels));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(EngineError::BadLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
            _lease: counter.lease(),
        })
    }

    pub(crate) fn zeros(
        counter: &BufferCounter,
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<Self, EngineError> {
        let len = width as usize * height as usize * channels as usize;
        Self::from_raw(counter, width, height, channels, vec![0u8; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Channel values of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels as usize;
        let i = (y as usize * self.width as usize + x as usize) * c;
        &self.data[i..i + c]
    }

    /// Explicitly give the buffer back to the engine.
    pub fn release(self) {}
}
