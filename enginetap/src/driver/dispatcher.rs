//! Command dispatcher: runs one engine call with live output around it.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use log::{debug, warn};
use tokio::task::JoinError;

use super::command::Command;
use super::outcome::ExecutionOutcome;
use super::poller::{Delivery, Poller, PollerReport};
use super::Executor;
use crate::channel::{DisplaySink, NullSink, StreamSink};
use crate::engine::{EngineSession, RenderConfig, ReturnCode, StreamState};
use crate::error::{DispatchError, ExecutionError, RedirectError, Result};

/// Dispatcher for one engine session.
///
/// Each [`execute`](Executor::execute) call:
/// - claims the session (a second concurrent call fails with `Busy`)
/// - starts an output poller on the async runtime
/// - runs the blocking engine call on a blocking thread, with the host
///   streams redirected into the engine buffer
/// - hands the return code to the poller and waits for its final drain
/// - classifies the code
pub struct Dispatcher {
    session: Arc<EngineSession>,
    sink: RwLock<Arc<dyn DisplaySink>>,
}

impl Dispatcher {
    /// Create a dispatcher that displays on the session's host stdout.
    pub fn new(session: Arc<EngineSession>) -> Self {
        let sink: Arc<dyn DisplaySink> = Arc::new(StreamSink::stdout(session.streams()));
        Self {
            session,
            sink: RwLock::new(sink),
        }
    }

    /// Use a custom display sink.
    pub fn with_sink(self, sink: Arc<dyn DisplaySink>) -> Self {
        self.set_sink(sink);
        self
    }

    /// Replace the display sink. Applies from the next command on.
    pub fn set_sink(&self, sink: Arc<dyn DisplaySink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    /// The currently registered display sink.
    pub fn sink(&self) -> Arc<dyn DisplaySink> {
        Arc::clone(&self.sink.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn session(&self) -> &Arc<EngineSession> {
        &self.session
    }
}

impl Executor for Dispatcher {
    async fn execute(&self, command: &Command) -> Result<ExecutionOutcome> {
        let admission = self.session.admit()?;
        let started = Instant::now();

        let config = self.session.config();
        let delivery = Delivery::from(&config);
        let tolerant = command.mode().is_sub_console() && delivery == Delivery::Streaming;
        let sink: Arc<dyn DisplaySink> = if command.is_quiet() {
            Arc::new(NullSink)
        } else {
            self.sink()
        };

        debug!(
            "dispatching {:?} (mode={}, delivery={:?}, quiet={})",
            command.text(),
            command.mode(),
            delivery,
            command.is_quiet()
        );

        let (poller, slot) = Poller::new(
            Arc::clone(self.session.buffer()),
            sink,
            command.text(),
            command.mode(),
            delivery,
            config.poll_interval,
        );
        let poller = poller.tolerate_no_payload(tolerant).spawn();

        let session = Arc::clone(&self.session);
        let text = command.text().as_bytes().to_vec();
        let call = tokio::task::spawn_blocking(move || -> std::result::Result<(), RedirectError> {
            let scope = session.streams().redirect(Arc::clone(session.buffer()))?;
            let code = ReturnCode(session.engine().execute(&text));
            drop(scope);

            session.set_state(StreamState::Draining);
            if !slot.signal(code) {
                warn!("poller went away before receiving return code {}", code);
            }
            Ok(())
        });

        // The rest runs detached so that dropping this future neither
        // abandons the final drain nor releases the session early.
        let command = command.clone();
        let finisher = tokio::spawn(async move {
            let call = call.await;
            let report = poller.join().await;
            let result = conclude(&command, &config, tolerant, started, call, report);
            admission.finish(if result.is_ok() {
                StreamState::Done
            } else {
                StreamState::Failed
            });
            result
        });

        finisher.await.map_err(DispatchError::PollerFailed)?
    }
}

fn conclude(
    command: &Command,
    config: &RenderConfig,
    tolerant: bool,
    started: Instant,
    call: std::result::Result<std::result::Result<(), RedirectError>, JoinError>,
    report: std::result::Result<PollerReport, JoinError>,
) -> Result<ExecutionOutcome> {
    let report = report.map_err(DispatchError::PollerFailed)?;
    match call {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(e) => {
            warn!("engine call for {:?} did not complete: {}", command.text(), e);
            return Err(DispatchError::EngineCallAborted.into());
        }
    }

    let PollerReport {
        return_code,
        raw_output,
        shown,
        withheld,
        sink_error,
        ..
    } = report;

    let return_code = classify(return_code, tolerant, withheld)?;
    if let Some(e) = sink_error {
        return Err(e.into());
    }

    let elapsed = started.elapsed();
    debug!(
        "command finished with code {} in {:?} ({} bytes)",
        return_code,
        elapsed,
        raw_output.len()
    );

    Ok(ExecutionOutcome {
        command: command.text().to_string(),
        mode: command.mode(),
        return_code,
        raw_output,
        output: shown,
        elapsed,
        inline_graphics: command.is_inline() && config.graph.show,
    })
}

/// Map a return code onto the error taxonomy.
///
/// `message` is the final drained content the poller withheld.
fn classify(code: Option<ReturnCode>, tolerant: bool, message: String) -> Result<ReturnCode> {
    let Some(code) = code else {
        return Err(DispatchError::EngineCallAborted.into());
    };

    if code.is_success() || (code.is_no_error_payload() && tolerant) {
        return Ok(code);
    }

    let err = if code.is_initialization_pending() {
        ExecutionError::InitializationPending { message }
    } else if code.is_no_error_payload() {
        ExecutionError::NoErrorPayload { message }
    } else {
        ExecutionError::EngineFailure {
            code: code.get(),
            message,
        }
    };
    Err(err.into())
}
