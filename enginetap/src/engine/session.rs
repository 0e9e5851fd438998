//! Engine session: one engine instance plus everything needed to observe it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, warn};

use super::config::RenderConfig;
use super::Engine;
use crate::channel::{HostStreams, OutputBuffer};
use crate::error::DispatchError;

/// Lifecycle of the command currently owning the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// No command has run yet.
    #[default]
    Idle,
    /// The blocking engine call is in flight.
    Running,
    /// The engine call returned and the final drain is pending.
    Draining,
    /// The last command completed successfully.
    Done,
    /// The last command failed.
    Failed,
}

impl StreamState {
    /// Whether a command currently owns the session.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Draining)
    }
}

/// An embedded engine and the host-side state attached to it.
///
/// This replaces process-wide globals: the buffer read offset, the host
/// stream slots, the rendering preferences, and the admission state all
/// live here. Share it with `Arc`.
///
/// Create exactly one session per engine instance and hand clones of that
/// `Arc` to every dispatcher. Admission is tracked per session, so two
/// sessions built over the same engine would not exclude each other and
/// would both drain its one buffer.
pub struct EngineSession {
    engine: Arc<dyn Engine>,
    buffer: Arc<OutputBuffer>,
    streams: HostStreams,
    config: RwLock<RenderConfig>,
    state: Mutex<StreamState>,
}

impl EngineSession {
    /// Create a session around an engine with default preferences.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_config(engine, RenderConfig::default())
    }

    /// Create a session with explicit rendering preferences.
    pub fn with_config(engine: Arc<dyn Engine>, config: RenderConfig) -> Self {
        Self {
            buffer: Arc::new(OutputBuffer::new(engine.clone())),
            engine,
            streams: HostStreams::new(),
            config: RwLock::new(config),
            state: Mutex::new(StreamState::Idle),
        }
    }

    /// Use custom host stream targets instead of the process's stdio.
    pub fn with_streams(mut self, streams: HostStreams) -> Self {
        self.streams = streams;
        self
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// The output buffer protocol for this engine.
    pub fn buffer(&self) -> &Arc<OutputBuffer> {
        &self.buffer
    }

    /// Host stdout/stderr slots.
    pub fn streams(&self) -> &HostStreams {
        &self.streams
    }

    /// Snapshot of the current rendering preferences.
    pub fn config(&self) -> RenderConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the rendering preferences. Applies from the next command on.
    pub fn set_config(&self, config: RenderConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Modify the rendering preferences in place.
    pub fn update_config(&self, f: impl FnOnce(&mut RenderConfig)) {
        f(&mut self.config.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Current stream state.
    pub fn state(&self) -> StreamState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: StreamState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("session state {:?} -> {:?}", *current, state);
        *current = state;
    }

    /// Claim the session for one command.
    ///
    /// Fails with [`DispatchError::Busy`] while another command is active.
    pub(crate) fn admit(self: &Arc<Self>) -> Result<Admission, DispatchError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_active() {
            return Err(DispatchError::Busy);
        }
        *state = StreamState::Running;
        Ok(Admission {
            session: Arc::clone(self),
            finished: false,
        })
    }
}

impl fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSession")
            .field("engine", &"<Engine>")
            .field("buffer", &self.buffer)
            .field("state", &self.state())
            .finish()
    }
}

/// Exclusive claim on a session for the lifetime of one command.
///
/// Dropping it without calling [`finish`](Self::finish) marks the session
/// `Failed`, so a panicking worker never leaves it stuck as active.
pub(crate) struct Admission {
    session: Arc<EngineSession>,
    finished: bool,
}

impl Admission {
    pub(crate) fn session(&self) -> &Arc<EngineSession> {
        &self.session
    }

    pub(crate) fn finish(mut self, state: StreamState) {
        self.finished = true;
        self.session.set_state(state);
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if !self.finished {
            warn!("command released the session without finishing");
            self.session.set_state(StreamState::Failed);
        }
    }
}
