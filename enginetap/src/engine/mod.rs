//! Engine layer: the native engine seam and the session that owns it.
//!
//! The engine itself is opaque. All the host can do is hand it a command,
//! block until it returns a code, and read or append to its single output
//! buffer. [`EngineSession`] wraps one engine instance together with the
//! state needed to observe that buffer safely.

pub mod config;
#[cfg(test)]
pub(crate) mod scripted;
mod session;

pub use config::{GraphConfig, GraphFormat, GraphSize, GraphUnit, RenderConfig, StreamingMode};
pub use session::{EngineSession, StreamState};

use std::fmt;

/// Trait for the embedded native engine.
///
/// Implementations wrap whatever the loaded library exposes. `execute` is
/// the only blocking call and is always made from a blocking thread, never
/// from the async runtime's workers.
///
/// An engine instance belongs to a single [`EngineSession`].
pub trait Engine: Send + Sync + 'static {
    /// Run one command to completion and return its code.
    fn execute(&self, command: &[u8]) -> i32;

    /// Read the engine's output buffer.
    ///
    /// Depending on [`resets_on_read`](Self::resets_on_read) this returns
    /// either the bytes written since the last read, or the whole buffer.
    fn read_output(&self) -> Vec<u8>;

    /// Append bytes to the engine's output buffer.
    fn append_output(&self, bytes: &[u8]);

    /// Whether `read_output` consumes what it returns.
    fn resets_on_read(&self) -> bool {
        true
    }
}

/// Return code of a single engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnCode(pub i32);

impl ReturnCode {
    /// Successful completion.
    pub const SUCCESS: ReturnCode = ReturnCode(0);

    /// Non-zero, but nothing exceptional to surface.
    pub const NO_ERROR_PAYLOAD: ReturnCode = ReturnCode(3000);

    /// The engine could not complete its setup.
    pub const INITIALIZATION_PENDING: ReturnCode = ReturnCode(-7100);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn is_no_error_payload(self) -> bool {
        self == Self::NO_ERROR_PAYLOAD
    }

    pub fn is_initialization_pending(self) -> bool {
        self == Self::INITIALIZATION_PENDING
    }

    /// Raw integer value.
    pub fn get(self) -> i32 {
        self.0
    }
}

impl From<i32> for ReturnCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert!(ReturnCode(0).is_success());
        assert!(ReturnCode::from(3000).is_no_error_payload());
        assert!(ReturnCode::from(-7100).is_initialization_pending());
        assert!(!ReturnCode(-1).is_success());
        assert!(!ReturnCode(-1).is_initialization_pending());
    }
}
