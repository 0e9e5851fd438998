//! Error types for enginetap.

use std::io;
use thiserror::Error;

/// Main error type for enginetap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The engine reported a failure for the executed command
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// The command could not be dispatched or its worker died
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Host stream redirection misuse
    #[error("Redirection error: {0}")]
    Redirect(#[from] RedirectError),

    /// Invalid rendering configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A display sink or output file failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures classified from an engine return code.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Non-zero return code without a distinguished meaning.
    #[error("engine returned {code}: {message}")]
    EngineFailure { code: i32, message: String },

    /// The engine could not complete its setup.
    #[error(
        "engine initialization is pending; the engine's support libraries were not \
         initialized, check the installation and restart the session: {message}"
    )]
    InitializationPending { message: String },

    /// Non-zero code with nothing exceptional to show, in a context that
    /// does not tolerate ambiguous codes.
    #[error("engine returned without an error payload: {message}")]
    NoErrorPayload { message: String },
}

impl ExecutionError {
    /// The drained engine output carried by this error.
    pub fn message(&self) -> &str {
        match self {
            Self::EngineFailure { message, .. }
            | Self::InitializationPending { message }
            | Self::NoErrorPayload { message } => message,
        }
    }
}

/// Dispatcher errors (admission, worker lifecycle).
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Another command is still running on this session.
    #[error("a command is already running on this session")]
    Busy,

    /// The blocking engine call did not return a code (it panicked).
    #[error("engine call aborted before returning a code")]
    EngineCallAborted,

    /// The output poller task panicked or was cancelled.
    #[error("output poller failed: {0}")]
    PollerFailed(#[from] tokio::task::JoinError),
}

/// Redirection scope usage errors.
#[derive(Error, Debug)]
pub enum RedirectError {
    /// Entering a redirection scope while one is already active.
    #[error("host streams are already redirected")]
    AlreadyActive,
}

/// Rendering configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Graph width or height could not be parsed, or is negative
    #[error("invalid graph size '{value}'")]
    InvalidGraphSize { value: String },

    /// Neither width nor height were given
    #[error("one of width and height must be specified")]
    MissingGraphSize,

    /// Unknown graph format
    #[error("invalid graph format '{value}', expected svg, png or pdf")]
    InvalidGraphFormat { value: String },

    /// Unknown streaming mode
    #[error("invalid streaming mode '{value}', expected on or off")]
    InvalidStreamingMode { value: String },

    /// Output file exists and replacing was not requested
    #[error("output file '{path}' already exists")]
    OutputFileExists { path: String },
}

/// Result type alias using enginetap's Error.
pub type Result<T> = std::result::Result<T, Error>;
