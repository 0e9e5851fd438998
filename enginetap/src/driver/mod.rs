//! Command execution with live output.
//!
//! The driver layer provides the main API: build a [`Command`], hand it to
//! a [`Dispatcher`], and receive an [`ExecutionOutcome`] once the engine
//! returns, while the output is streamed to the display sink as it is
//! produced.

mod command;
mod dispatcher;
mod outcome;
pub mod poller;

pub use command::Command;
pub use dispatcher::Dispatcher;
pub use outcome::ExecutionOutcome;
pub use poller::{Delivery, Poller, PollerHandle, PollerReport, PollerState, TerminationSlot};

use std::future::Future;

use crate::error::Result;

/// Trait for command executors.
pub trait Executor: Send + Sync {
    /// Run one command to completion, streaming its output.
    fn execute(&self, command: &Command) -> impl Future<Output = Result<ExecutionOutcome>> + Send;

    /// Run commands one after another, stopping at the first error.
    fn execute_all(
        &self,
        commands: &[Command],
    ) -> impl Future<Output = Result<Vec<ExecutionOutcome>>> + Send {
        async move {
            let mut outcomes = Vec::with_capacity(commands.len());
            for cmd in commands {
                outcomes.push(self.execute(cmd).await?);
            }
            Ok(outcomes)
        }
    }
}
