//! Host stdout/stderr slots and the scope that redirects them into the
//! engine's output buffer.
//!
//! Rust has no process-wide writable `stdout` object to swap, so host code
//! that wants its prints to interleave with engine output writes through a
//! [`HostOutput`] handle obtained from [`HostStreams`]. A
//! [`RedirectionScope`] swaps what those handles point to for as long as it
//! is alive and puts the previous targets back when dropped.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;
use memchr::memchr_iter;

use super::buffer::OutputBuffer;
use crate::error::RedirectError;

/// Destination of host writes.
pub trait StreamTarget: Send + Sync {
    /// Write all of `bytes`.
    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()>;

    /// Flush anything buffered.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Shared handle to a stream target. Identity is compared by pointer.
pub type SharedTarget = Arc<dyn StreamTarget>;

/// The process's real standard output.
#[derive(Debug, Default)]
pub struct ProcessStdout;

impl StreamTarget for ProcessStdout {
    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        io::stdout().lock().write_all(bytes)
    }

    fn flush(&self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// The process's real standard error.
#[derive(Debug, Default)]
pub struct ProcessStderr;

impl StreamTarget for ProcessStderr {
    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        io::stderr().lock().write_all(bytes)
    }
}

/// Which host stream a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// The handles that were installed before a redirection.
#[derive(Clone)]
pub struct RedirectionContext {
    pub stdout: SharedTarget,
    pub stderr: SharedTarget,
}

impl RedirectionContext {
    /// Get the target for one stream.
    pub fn get(&self, kind: StreamKind) -> &SharedTarget {
        match kind {
            StreamKind::Stdout => &self.stdout,
            StreamKind::Stderr => &self.stderr,
        }
    }
}

impl fmt::Debug for RedirectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectionContext")
            .field("stdout", &Arc::as_ptr(&self.stdout))
            .field("stderr", &Arc::as_ptr(&self.stderr))
            .finish()
    }
}

struct Slots {
    current: RedirectionContext,
    /// Present while a redirection scope is active.
    saved: Option<RedirectionContext>,
}

/// Host stdout/stderr slots for one session.
#[derive(Clone)]
pub struct HostStreams {
    slots: Arc<Mutex<Slots>>,
}

impl HostStreams {
    /// Slots pointing at the process's real stdout and stderr.
    pub fn new() -> Self {
        Self::with_targets(Arc::new(ProcessStdout), Arc::new(ProcessStderr))
    }

    /// Slots pointing at custom targets.
    pub fn with_targets(stdout: SharedTarget, stderr: SharedTarget) -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                current: RedirectionContext { stdout, stderr },
                saved: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writer for host code's standard output.
    pub fn stdout(&self) -> HostOutput {
        HostOutput {
            streams: self.clone(),
            kind: StreamKind::Stdout,
        }
    }

    /// Writer for host code's standard error.
    pub fn stderr(&self) -> HostOutput {
        HostOutput {
            streams: self.clone(),
            kind: StreamKind::Stderr,
        }
    }

    /// The target currently installed for a stream.
    pub fn current(&self, kind: StreamKind) -> SharedTarget {
        self.lock().current.get(kind).clone()
    }

    /// The targets host writes would reach without any redirection.
    pub fn originals(&self) -> RedirectionContext {
        let slots = self.lock();
        slots.saved.as_ref().unwrap_or(&slots.current).clone()
    }

    /// Whether a redirection scope is active.
    pub fn is_redirected(&self) -> bool {
        self.lock().saved.is_some()
    }

    /// Redirect both streams into `buffer` until the returned scope drops.
    pub fn redirect(&self, buffer: Arc<OutputBuffer>) -> Result<RedirectionScope, RedirectError> {
        RedirectionScope::enter(self, buffer)
    }

    /// Run `body` with both streams redirected into `buffer`.
    pub fn with_redirect<T>(
        &self,
        buffer: Arc<OutputBuffer>,
        body: impl FnOnce() -> T,
    ) -> Result<T, RedirectError> {
        let _scope = self.redirect(buffer)?;
        Ok(body())
    }
}

impl Default for HostStreams {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.lock();
        f.debug_struct("HostStreams")
            .field("current", &slots.current)
            .field("redirected", &slots.saved.is_some())
            .finish()
    }
}

/// `io::Write` handle that always writes to whatever is installed in its
/// slot at the time of the write.
#[derive(Clone)]
pub struct HostOutput {
    streams: HostStreams,
    kind: StreamKind,
}

impl HostOutput {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }
}

impl Write for HostOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Clone the target out so the slot lock is not held during I/O.
        let target = self.streams.current(self.kind);
        target.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.streams.current(self.kind).flush()
    }
}

impl fmt::Debug for HostOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostOutput").field("kind", &self.kind).finish()
    }
}

/// Target that appends host writes to the engine buffer, one line at a time.
///
/// Every complete line is appended with its newline. A trailing fragment is
/// appended as-is so a later write can complete the line.
pub struct BufferForwarder {
    buffer: Arc<OutputBuffer>,
}

impl BufferForwarder {
    pub fn new(buffer: Arc<OutputBuffer>) -> Self {
        Self { buffer }
    }
}

impl StreamTarget for BufferForwarder {
    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut start = 0;
        for nl in memchr_iter(b'\n', bytes) {
            self.buffer.append(&bytes[start..=nl]);
            start = nl + 1;
        }
        if start < bytes.len() {
            self.buffer.append(&bytes[start..]);
        }
        Ok(())
    }
}

/// Active redirection of a session's host streams into the engine buffer.
///
/// Dropping the scope restores the saved handles, on normal return, on
/// early `?` return, and during panic unwinding alike. Nesting is rejected.
#[must_use = "the redirection ends as soon as the scope is dropped"]
pub struct RedirectionScope {
    streams: HostStreams,
}

impl RedirectionScope {
    /// Save the current handles and install forwarders into `buffer`.
    pub fn enter(streams: &HostStreams, buffer: Arc<OutputBuffer>) -> Result<Self, RedirectError> {
        let mut slots = streams.lock();
        if slots.saved.is_some() {
            return Err(RedirectError::AlreadyActive);
        }

        let forwarder: SharedTarget = Arc::new(BufferForwarder::new(buffer));
        let previous = std::mem::replace(
            &mut slots.current,
            RedirectionContext {
                stdout: forwarder.clone(),
                stderr: forwarder,
            },
        );
        slots.saved = Some(previous);
        trace!("host streams redirected into engine buffer");

        Ok(Self {
            streams: streams.clone(),
        })
    }
}

impl Drop for RedirectionScope {
    fn drop(&mut self) {
        let mut slots = self.streams.lock();
        if let Some(saved) = slots.saved.take() {
            slots.current = saved;
            trace!("host streams restored");
        }
    }
}

impl fmt::Debug for RedirectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectionScope").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use super::*;
    use crate::engine::scripted::ScriptedEngine;

    /// Target that records every write call separately.
    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl StreamTarget for Recorder {
        fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
            self.writes.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    fn setup() -> (Arc<ScriptedEngine>, Arc<OutputBuffer>, HostStreams, SharedTarget, SharedTarget) {
        let engine = Arc::new(ScriptedEngine::cumulative());
        let buffer = Arc::new(OutputBuffer::new(engine.clone()));
        let out: SharedTarget = Arc::new(Recorder::default());
        let err: SharedTarget = Arc::new(Recorder::default());
        let streams = HostStreams::with_targets(out.clone(), err.clone());
        (engine, buffer, streams, out, err)
    }

    #[test]
    fn test_writes_reach_engine_buffer_while_redirected() {
        let (engine, buffer, streams, _, _) = setup();
        let mut stdout = streams.stdout();
        let mut stderr = streams.stderr();

        streams
            .with_redirect(buffer.clone(), || {
                write!(stdout, "hello\nwor").unwrap();
                write!(stdout, "ld\n").unwrap();
                write!(stderr, "oops\n").unwrap();
            })
            .unwrap();

        assert_eq!(engine.contents(), b"hello\nworld\noops\n");
        assert_eq!(
            engine.appends(),
            vec![
                b"hello\n".to_vec(),
                b"wor".to_vec(),
                b"ld\n".to_vec(),
                b"oops\n".to_vec()
            ]
        );
    }

    #[test]
    fn test_restoration_after_normal_exit() {
        let (_, buffer, streams, out, err) = setup();
        {
            let _scope = streams.redirect(buffer).unwrap();
            assert!(streams.is_redirected());
            assert!(!Arc::ptr_eq(&streams.current(StreamKind::Stdout), &out));
            assert!(Arc::ptr_eq(&streams.originals().stdout, &out));
        }
        assert!(!streams.is_redirected());
        assert!(Arc::ptr_eq(&streams.current(StreamKind::Stdout), &out));
        assert!(Arc::ptr_eq(&streams.current(StreamKind::Stderr), &err));
    }

    #[test]
    fn test_restoration_after_panic() {
        let (_, buffer, streams, out, err) = setup();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _scope = streams.redirect(buffer).unwrap();
            panic!("body failed");
        }));

        assert!(result.is_err());
        assert!(Arc::ptr_eq(&streams.current(StreamKind::Stdout), &out));
        assert!(Arc::ptr_eq(&streams.current(StreamKind::Stderr), &err));
    }

    #[test]
    fn test_restoration_after_error_return() {
        let (_, buffer, streams, out, _) = setup();
        let body = || -> Result<(), RedirectError> {
            let _scope = streams.redirect(buffer.clone())?;
            Err(RedirectError::AlreadyActive)
        };
        assert!(body().is_err());
        assert!(Arc::ptr_eq(&streams.current(StreamKind::Stdout), &out));
    }

    #[test]
    fn test_nesting_is_rejected() {
        let (_, buffer, streams, out, _) = setup();
        let scope = streams.redirect(buffer.clone()).unwrap();
        assert!(matches!(
            streams.redirect(buffer),
            Err(RedirectError::AlreadyActive)
        ));
        drop(scope);
        assert!(Arc::ptr_eq(&streams.current(StreamKind::Stdout), &out));
    }

    #[test]
    fn test_writes_go_to_host_outside_scope() {
        let (engine, _, streams, _, _) = setup();
        let mut stdout = streams.stdout();
        write!(stdout, "direct\n").unwrap();
        assert!(engine.contents().is_empty());
    }
}
