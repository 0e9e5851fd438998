//! Channel layer: everything between the engine buffer and the display.
//!
//! This module handles the buffer-draining protocol, redirection of host
//! output into the engine buffer, and the sinks output chunks are
//! delivered to.

mod buffer;
mod redirect;
mod sink;

pub use buffer::{decode_escaped, OutputBuffer};
pub use redirect::{
    BufferForwarder, HostOutput, HostStreams, ProcessStderr, ProcessStdout, RedirectionContext,
    RedirectionScope, SharedTarget, StreamKind, StreamTarget,
};
pub use sink::{
    channel_sink, ChannelSink, Chunk, ChunkStream, CollectSink, DisplaySink, NullSink, StreamSink,
    WriterSink,
};
