//! Output buffer protocol over the engine's single shared buffer.
//!
//! The engine owns the buffer. The host only drains it (read and advance)
//! or appends to it. Engines whose read does not consume the buffer are
//! tracked with a read offset so no byte is ever drained twice.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace};

use crate::engine::Engine;

/// Drain/append access to an engine's output buffer.
pub struct OutputBuffer {
    engine: Arc<dyn Engine>,

    /// Bytes of a cumulative engine buffer already handed out.
    /// Unused when the engine resets its buffer on read.
    offset: Mutex<usize>,
}

impl OutputBuffer {
    /// Create the protocol for an engine.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            offset: Mutex::new(0),
        }
    }

    /// Return every byte written since the previous drain.
    pub fn drain(&self) -> Vec<u8> {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = self.engine.read_output();

        if self.engine.resets_on_read() {
            trace!("drained {} bytes", raw.len());
            return raw;
        }

        // A shorter buffer than what was already read means the engine
        // cleared it behind our back; everything in it is new.
        if raw.len() < *offset {
            debug!(
                "engine buffer shrank from {} to {} bytes, restarting offset",
                *offset,
                raw.len()
            );
            *offset = 0;
        }

        let fresh = raw[*offset..].to_vec();
        *offset = raw.len();
        trace!("drained {} bytes, offset now {}", fresh.len(), *offset);
        fresh
    }

    /// Drain and decode in one step.
    pub fn drain_text(&self) -> String {
        decode_escaped(&self.drain())
    }

    /// Append bytes behind whatever is pending for the next drain.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let _offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.engine.append_output(bytes);
    }

    /// Current read offset into a cumulative engine buffer.
    pub fn offset(&self) -> usize {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("resets_on_read", &self.engine.resets_on_read())
            .field("offset", &self.offset())
            .finish()
    }
}

/// Decode UTF-8, escaping every byte that is not part of a valid sequence
/// as `\xhh` instead of dropping it.
pub fn decode_escaped(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // valid_up_to() guarantees this prefix is UTF-8
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());

                // An incomplete sequence at the very end has no error_len
                let bad = e.error_len().unwrap_or(after.len());
                for b in &after[..bad] {
                    out.push_str(&format!("\\x{:02x}", b));
                }
                rest = &after[bad..];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::ScriptedEngine;

    #[test]
    fn test_decode_plain_utf8() {
        assert_eq!(decode_escaped("naïve 1+1\n".as_bytes()), "naïve 1+1\n");
    }

    #[test]
    fn test_decode_escapes_invalid_bytes() {
        assert_eq!(decode_escaped(b"a\xffb"), "a\\xffb");
        assert_eq!(decode_escaped(b"\xc3("), "\\xc3(");
        // truncated multi-byte sequence at the end
        assert_eq!(decode_escaped(b"ok\xe2\x82"), "ok\\xe2\\x82");
    }

    #[test]
    fn test_drain_cumulative_never_duplicates() {
        let engine = Arc::new(ScriptedEngine::cumulative());
        let buffer = OutputBuffer::new(engine.clone());

        engine.write(b"first\n");
        assert_eq!(buffer.drain(), b"first\n");
        assert_eq!(buffer.drain(), b"");

        engine.write(b"second\n");
        engine.write(b"third\n");
        assert_eq!(buffer.drain(), b"second\nthird\n");
        assert_eq!(buffer.offset(), engine.contents().len());
    }

    #[test]
    fn test_drain_resetting_engine() {
        let engine = Arc::new(ScriptedEngine::new());
        let buffer = OutputBuffer::new(engine.clone());

        engine.write(b"one");
        assert_eq!(buffer.drain(), b"one");
        engine.write(b"two");
        assert_eq!(buffer.drain(), b"two");
        assert_eq!(buffer.offset(), 0);
    }

    #[test]
    fn test_drain_after_engine_clear() {
        let engine = Arc::new(ScriptedEngine::cumulative());
        let buffer = OutputBuffer::new(engine.clone());

        engine.write(b"a long first line\n");
        buffer.drain();
        engine.clear();
        engine.write(b"new\n");
        assert_eq!(buffer.drain(), b"new\n");
    }

    #[test]
    fn test_append_lands_in_next_drain() {
        let engine = Arc::new(ScriptedEngine::cumulative());
        let buffer = OutputBuffer::new(engine.clone());

        engine.write(b"engine ");
        buffer.append(b"host\n");
        assert_eq!(buffer.drain_text(), "engine host\n");
    }
}
