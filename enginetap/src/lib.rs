//! # Enginetap
//!
//! Live output streaming for an embedded, synchronous computational engine.
//!
//! The engine only offers "execute a command, then read a buffer". Enginetap
//! runs the blocking call on a blocking thread and polls the engine's output
//! buffer in the background, so output reaches the display while the
//! command is still running.
//!
//! ## Features
//!
//! - Streaming or batch delivery of engine output to a pluggable sink
//! - Extraction of user output from `mata` and `python` sub-console sessions
//! - Redirection of host prints into the engine buffer during a call
//! - Return-code classification into typed errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use enginetap::{Command, Dispatcher, Engine, EngineSession, Executor};
//!
//! # fn load_engine() -> Arc<dyn Engine> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), enginetap::Error> {
//!     let session = Arc::new(EngineSession::new(load_engine()));
//!     let dispatcher = Dispatcher::new(session);
//!
//!     let outcome = dispatcher.execute(&Command::new("display 1+1")).await?;
//!     println!("return code {}", outcome.return_code);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod engine;
pub mod error;
pub mod platform;

// Re-export main types for convenience
pub use channel::{Chunk, DisplaySink, HostStreams};
pub use driver::{Command, Dispatcher, ExecutionOutcome, Executor};
pub use engine::{Engine, EngineSession, RenderConfig, ReturnCode, StreamState};
pub use error::Error;
pub use platform::ConsoleMode;
