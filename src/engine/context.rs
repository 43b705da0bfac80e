// ============================================================================
// ENGINE CONTEXT: handle, configuration and asynchronous initialisation
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc;

use super::EngineError;
use super::mat::BufferCounter;
use crate::ops::inpaint::InpaintMethod;

/// Tunables fixed at initialisation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    /// Largest accepted inpaint radius.
    pub max_radius: u32,
    /// Patch side length for the PatchMatch variant (odd, >= 3).
    pub patch_size: u32,
    /// PatchMatch refinement iterations.
    pub patch_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_radius: 32,
            patch_size: 7,
            patch_iterations: 3,
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    buffers: BufferCounter,
}

/// Cheap-to-clone handle to an initialised engine.
///
/// Clones share the same buffer counter, so buffers created on a worker
/// thread are visible in [`Engine::live_buffers`] on the UI thread.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("live_buffers", &self.live_buffers())
            .finish()
    }
}

impl Engine {
    /// Initialise synchronously: validate the configuration and run a tiny
    /// inpaint through every variant so a broken engine fails here rather
    /// than on the user's first pass.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        if config.max_radius == 0 {
            return Err(EngineError::InitFailed("max_radius must be at least 1".into()));
        }
        if config.patch_size < 3 {
            return Err(EngineError::InitFailed("patch_size must be at least 3".into()));
        }
        let engine = Self {
            inner: Arc::new(EngineInner {
                config,
                buffers: BufferCounter::new(),
            }),
        };
        engine.self_test()?;
        Ok(engine)
    }

    fn self_test(&self) -> Result<(), EngineError> {
        let (w, h) = (8u32, 8u32);
        let pixels = vec![64u8; (w * h * 3) as usize];
        let mut mask_px = vec![0u8; (w * h) as usize];
        mask_px[(3 * w + 3) as usize] = 255;
        {
            let src = self.mat_from_raw(w, h, 3, pixels)?;
            let mask = self.mat_from_raw(w, h, 1, mask_px)?;
            for method in InpaintMethod::all() {
                let out = self.inpaint(&src, &mask, 1, *method)?;
                if out.pixel(3, 3) != [64, 64, 64] {
                    return Err(EngineError::InitFailed(format!(
                        "{} self-test produced {:?}",
                        method.label(),
                        out.pixel(3, 3)
                    )));
                }
            }
        }
        if self.live_buffers() != 0 {
            return Err(EngineError::InitFailed("self-test leaked buffers".into()));
        }
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub(crate) fn buffers(&self) -> &BufferCounter {
        &self.inner.buffers
    }

    /// Number of engine buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.inner.buffers.live()
    }
}

// ============================================================================
// ASYNC INITIALISATION: one completion signal, polling only as fallback
// ============================================================================

/// Readiness as last observed by [`EngineLoader::poll`].
#[derive(Clone, Debug, PartialEq)]
pub enum EngineStatus {
    Loading,
    Ready,
    Failed(String),
}

enum LoaderState {
    Pending(mpsc::Receiver<Result<Engine, EngineError>>),
    Ready(Engine),
    Failed(String),
}

/// Owns the background initialisation of an [`Engine`].
///
/// The init task sends exactly one message. [`EngineLoader::wait`] blocks on
/// it; [`EngineLoader::poll`] is the non-blocking probe for event loops that
/// cannot block. Once a result is observed the receiver is dropped and later
/// polls return the cached status without touching the channel.
pub struct EngineLoader {
    state: LoaderState,
}

impl EngineLoader {
    /// Start initialisation on a rayon worker.
    pub fn spawn(config: EngineConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        rayon::spawn(move || {
            let result = std::panic::catch_unwind(|| Engine::new(config)).unwrap_or_else(|_| {
                Err(EngineError::InitFailed("initialisation panicked".into()))
            });
            let _ = sender.send(result);
        });
        Self {
            state: LoaderState::Pending(receiver),
        }
    }

    /// Wrap an engine that is already initialised.
    pub fn from_engine(engine: Engine) -> Self {
        Self {
            state: LoaderState::Ready(engine),
        }
    }

    /// Non-blocking readiness probe.
    pub fn poll(&mut self) -> EngineStatus {
        if let LoaderState::Pending(receiver) = &self.state {
            match receiver.try_recv() {
                Ok(Ok(engine)) => {
                    crate::log_info!("Inpaint engine ready");
                    self.state = LoaderState::Ready(engine);
                }
                Ok(Err(e)) => {
                    crate::log_err!("Inpaint engine failed to initialise: {}", e);
                    self.state = LoaderState::Failed(e.to_string());
                }
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.state = LoaderState::Failed("initialisation task vanished".into());
                }
            }
        }
        self.status()
    }

    /// Last observed status, without probing.
    pub fn status(&self) -> EngineStatus {
        match &self.state {
            LoaderState::Pending(_) => EngineStatus::Loading,
            LoaderState::Ready(_) => EngineStatus::Ready,
            LoaderState::Failed(msg) => EngineStatus::Failed(msg.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, LoaderState::Ready(_))
    }

    /// The engine, once readiness has been observed.
    pub fn engine(&self) -> Option<&Engine> {
        match &self.state {
            LoaderState::Ready(engine) => Some(engine),
            _ => None,
        }
    }

    /// Block until initialisation completes.
    pub fn wait(self) -> Result<Engine, EngineError> {
        match self.state {
            LoaderState::Ready(engine) => Ok(engine),
            LoaderState::Failed(msg) => Err(EngineError::InitFailed(msg)),
            LoaderState::Pending(receiver) => receiver.recv().unwrap_or_else(|_| {
                Err(EngineError::InitFailed("initialisation task vanished".into()))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_radius_config() {
        let cfg = EngineConfig {
            max_radius: 0,
            ..Default::default()
        };
        assert!(matches!(Engine::new(cfg), Err(EngineError::InitFailed(_))));
    }

    #[test]
    fn self_test_leaves_no_buffers() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        assert_eq!(engine.live_buffers(), 0);
    }

    #[test]
    fn loader_signals_once_and_caches() {
        let mut loader = EngineLoader::spawn(EngineConfig::default());
        let mut status = loader.poll();
        while status == EngineStatus::Loading {
            std::thread::sleep(std::time::Duration::from_millis(5));
            status = loader.poll();
        }
        assert_eq!(status, EngineStatus::Ready);
        assert!(loader.engine().is_some());
        assert_eq!(loader.poll(), EngineStatus::Ready);
    }

    #[test]
    fn wait_returns_engine() {
        let engine = EngineLoader::spawn(EngineConfig::default()).wait().unwrap();
        assert_eq!(engine.config().max_radius, 32);
    }

    #[test]
    fn failed_init_is_reported() {
        let cfg = EngineConfig {
            patch_size: 1,
            ..Default::default()
        };
        let mut loader = EngineLoader::spawn(cfg);
        let mut status = loader.poll();
        while status == EngineStatus::Loading {
            std::thread::sleep(std::time::Duration::from_millis(5));
            status = loader.poll();
        }
        assert!(matches!(status, EngineStatus::Failed(_)));
        assert!(loader.engine().is_none());
    }
}
