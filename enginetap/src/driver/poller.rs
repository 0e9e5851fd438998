//! Background poller that streams the engine buffer while a command runs.
//!
//! The engine only exposes "execute, then read a buffer". While the
//! blocking call is in flight on another thread, the poller drains the
//! buffer on a fixed interval and forwards what it finds to the display
//! sink. When the dispatcher hands it the return code through the
//! termination slot, it performs one last drain and decides whether that
//! final content is shown or kept as an error message.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, trace, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::channel::{decode_escaped, Chunk, DisplaySink, OutputBuffer};
use crate::engine::{RenderConfig, ReturnCode};
use crate::platform::{extract_interactive, extract_settled, ConsoleMode};

/// How output reaches the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Partial chunks are forwarded as soon as they are drained.
    Streaming,
    /// Everything is withheld and delivered in one final chunk.
    Batch,
}

impl From<&RenderConfig> for Delivery {
    fn from(config: &RenderConfig) -> Self {
        if config.streaming_output {
            Self::Streaming
        } else {
            Self::Batch
        }
    }
}

/// Poller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Starting,
    Polling,
    Stopping,
    Stopped,
}

/// Single-slot handoff of the return code to the poller.
///
/// Consumed by [`signal`](Self::signal), so it is used at most once.
/// Dropping it unsignaled tells the poller the engine call never returned
/// a code.
#[derive(Debug)]
pub struct TerminationSlot {
    tx: oneshot::Sender<ReturnCode>,
}

impl TerminationSlot {
    /// Hand over the return code. Returns false if the poller is gone.
    pub fn signal(self, code: ReturnCode) -> bool {
        self.tx.send(code).is_ok()
    }
}

/// What the poller saw and did for one command.
#[derive(Debug)]
pub struct PollerReport {
    /// Code received through the termination slot, if any.
    pub return_code: Option<ReturnCode>,

    /// Every byte drained, in order.
    pub raw_output: Vec<u8>,

    /// Visible text computed for the sink, partial and final.
    pub shown: String,

    /// Final content that was not forwarded. Becomes the error message.
    pub withheld: String,

    /// Whether a final chunk was forwarded.
    pub forwarded_final: bool,

    /// First error returned by the sink, if any.
    pub sink_error: Option<io::Error>,
}

/// Running poller task.
#[derive(Debug)]
pub struct PollerHandle {
    task: JoinHandle<PollerReport>,
}

impl PollerHandle {
    /// Wait for the poller to reach `Stopped`.
    pub async fn join(self) -> Result<PollerReport, tokio::task::JoinError> {
        self.task.await
    }
}

/// Output poller for one command. Created fresh per command.
pub struct Poller {
    termination: oneshot::Receiver<ReturnCode>,
    forwarder: Forwarder,
}

impl Poller {
    /// Create a poller and the slot used to stop it.
    pub fn new(
        buffer: Arc<OutputBuffer>,
        sink: Arc<dyn DisplaySink>,
        command: impl Into<String>,
        mode: ConsoleMode,
        delivery: Delivery,
        interval: Duration,
    ) -> (Self, TerminationSlot) {
        let (tx, rx) = oneshot::channel();
        let poller = Self {
            termination: rx,
            forwarder: Forwarder {
                buffer,
                sink,
                command: command.into(),
                mode,
                delivery,
                interval,
                tolerates_no_payload: false,
                state: PollerState::Starting,
                raw: BytesMut::new(),
                pending: BytesMut::new(),
                session: String::new(),
                shown: String::new(),
                sink_error: None,
            },
        };
        (poller, TerminationSlot { tx })
    }

    /// Forward the final content for a no-payload code instead of
    /// withholding it.
    pub fn tolerate_no_payload(mut self, tolerate: bool) -> Self {
        self.forwarder.tolerates_no_payload = tolerate;
        self
    }

    pub fn state(&self) -> PollerState {
        self.forwarder.state
    }

    /// Run the poller on its own task.
    pub fn spawn(self) -> PollerHandle {
        PollerHandle {
            task: tokio::spawn(self.run()),
        }
    }

    /// Poll until the termination slot fires, then drain one last time.
    pub async fn run(self) -> PollerReport {
        let Poller {
            mut termination,
            mut forwarder,
        } = self;

        forwarder.state = PollerState::Polling;
        debug!(
            "poller started: mode={}, delivery={:?}, interval={:?}",
            forwarder.mode, forwarder.delivery, forwarder.interval
        );

        let mut ticker = tokio::time::interval(forwarder.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let code = loop {
            tokio::select! {
                biased;
                signal = &mut termination => break signal.ok(),
                _ = ticker.tick() => forwarder.poll_once(),
            }
        };

        forwarder.state = PollerState::Stopping;
        forwarder.finish(code)
    }
}

/// Drain-and-forward state owned by the poller task.
struct Forwarder {
    buffer: Arc<OutputBuffer>,
    sink: Arc<dyn DisplaySink>,
    command: String,
    mode: ConsoleMode,
    delivery: Delivery,
    interval: Duration,
    tolerates_no_payload: bool,
    state: PollerState,

    /// Every byte drained so far.
    raw: BytesMut,

    /// Drained bytes not yet decoded: the whole output in batch delivery,
    /// or an incomplete UTF-8 tail while streaming.
    pending: BytesMut,

    /// Decoded sub-console output so far. Extraction runs over all of it,
    /// since markers and the echo are positional within the session.
    session: String,

    /// Everything passed to the sink so far, partial and final.
    shown: String,
    sink_error: Option<io::Error>,
}

impl Forwarder {
    /// One drain cycle while the engine is still running.
    fn poll_once(&mut self) {
        let fresh = self.buffer.drain();
        if fresh.is_empty() {
            return;
        }
        self.raw.extend_from_slice(&fresh);
        self.pending.extend_from_slice(&fresh);

        if self.delivery == Delivery::Batch {
            trace!("withholding {} bytes ({} total)", fresh.len(), self.pending.len());
            return;
        }

        let text = self.take_complete_text();
        let visible = if self.mode.is_sub_console() {
            self.session.push_str(&text);
            let settled = extract_settled(&self.session, &self.command, self.mode);
            self.unshown(settled)
        } else {
            text
        };

        if !visible.is_empty() {
            trace!("partial chunk: {} bytes", visible.len());
            self.emit(Chunk::partial(visible));
        }
    }

    /// Decode pending bytes, keeping back an incomplete UTF-8 sequence at
    /// the end so a character split across drains is not escaped.
    fn take_complete_text(&mut self) -> String {
        let keep = incomplete_utf8_tail(&self.pending);
        let complete = self.pending.split_to(self.pending.len() - keep);
        decode_escaped(&complete)
    }

    /// The part of a sub-console extraction not yet passed to the sink.
    ///
    /// Every extraction of a longer session starts with what was already
    /// shown, so only the tail is new.
    fn unshown(&self, extracted: String) -> String {
        match extracted.strip_prefix(self.shown.as_str()) {
            Some(tail) => tail.to_string(),
            None => {
                warn!(
                    "{} extraction diverged from shown output, forwarding nothing",
                    self.mode
                );
                String::new()
            }
        }
    }

    /// Plain-mode final text, with a newline appended when the whole
    /// delivered output would otherwise end without one.
    fn with_trailing_newline(&self, mut text: String) -> String {
        let last = text.chars().last().or_else(|| self.shown.chars().last());
        if last.is_some_and(|c| c != '\n') {
            text.push('\n');
        }
        text
    }

    fn finish(mut self, code: Option<ReturnCode>) -> PollerReport {
        let fresh = self.buffer.drain();
        self.raw.extend_from_slice(&fresh);
        self.pending.extend_from_slice(&fresh);

        let text = decode_escaped(&self.pending);
        self.pending.clear();

        let forward = match code {
            Some(rc) => rc.is_success() || (rc.is_no_error_payload() && self.tolerates_no_payload),
            None => false,
        };

        let mut withheld = String::new();
        if forward {
            let visible = if self.mode.is_sub_console() {
                self.session.push_str(&text);
                let extracted = extract_interactive(&self.session, &self.command, self.mode);
                self.unshown(extracted)
            } else {
                self.with_trailing_newline(text)
            };
            trace!("final chunk: {} bytes", visible.len());
            self.emit(Chunk::last(visible));
        } else {
            debug!(
                "withholding final output for code {:?} ({} bytes)",
                code.map(ReturnCode::get),
                text.len()
            );
            withheld = text;
        }

        self.state = PollerState::Stopped;
        debug!("poller stopped after {} bytes", self.raw.len());

        PollerReport {
            return_code: code,
            raw_output: self.raw.to_vec(),
            shown: self.shown,
            withheld,
            forwarded_final: forward,
            sink_error: self.sink_error,
        }
    }

    fn emit(&mut self, chunk: Chunk) {
        self.shown.push_str(&chunk.text);
        if self.sink_error.is_some() {
            return;
        }
        if let Err(e) = self.sink.emit(&chunk) {
            warn!("display sink failed, dropping further output: {}", e);
            self.sink_error = Some(e);
        }
    }
}

/// Length of a trailing, possibly incomplete UTF-8 sequence.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => 0,
        Err(e) if e.error_len().is_none() => bytes.len() - e.valid_up_to(),
        Err(_) => {
            // Invalid bytes earlier on; only look at the last few bytes.
            let start = bytes.len().saturating_sub(3);
            (start..bytes.len())
                .find(|&i| {
                    std::str::from_utf8(&bytes[i..])
                        .err()
                        .is_some_and(|e| e.valid_up_to() == 0 && e.error_len().is_none())
                })
                .map_or(0, |i| bytes.len() - i)
        }
    }
}
