//! Outcome of a successfully classified command.

use std::time::Duration;

use crate::engine::ReturnCode;
use crate::platform::ConsoleMode;

/// Result of one engine call that completed without a raised error.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The command text that was executed.
    pub command: String,

    /// Console mode the command ran in.
    pub mode: ConsoleMode,

    /// Code returned by the engine.
    pub return_code: ReturnCode,

    /// Every byte drained from the engine buffer for this command.
    pub raw_output: Vec<u8>,

    /// Visible text, as delivered (or, for quiet commands, as it would
    /// have been delivered) to the display sink.
    pub output: String,

    /// Time from dispatch to the end of the final drain.
    pub elapsed: Duration,

    /// Whether graphs produced by the command should render inline.
    pub inline_graphics: bool,
}

impl ExecutionOutcome {
    /// Whether the engine returned exactly zero.
    ///
    /// A tolerated no-payload code is not an error, but it is not a clean
    /// success either.
    pub fn is_success(&self) -> bool {
        self.return_code.is_success()
    }

    /// Visible output lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }

    /// Check if the visible output contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.output.contains(pattern)
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output)
    }
}
