//! Display sinks: where the poller delivers output chunks.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_core::Stream;
use log::debug;
use tokio::sync::mpsc;

use super::redirect::{HostStreams, SharedTarget};
use crate::error::{ConfigError, Result};

/// A unit of output delivered to a display sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Visible text.
    pub text: String,

    /// Whether this is the last chunk of the command.
    pub is_final: bool,
}

impl Chunk {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn last(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Receiver of ordered output chunks.
///
/// Chunks of one command arrive in drain order from a single task, all
/// partial chunks strictly before the final one.
pub trait DisplaySink: Send + Sync {
    fn emit(&self, chunk: &Chunk) -> io::Result<()>;
}

/// Sink that discards everything. Used for quiet commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn emit(&self, _chunk: &Chunk) -> io::Result<()> {
        Ok(())
    }
}

/// Sink writing to a host stream target, flushing after every chunk.
pub struct StreamSink {
    target: SharedTarget,
}

impl StreamSink {
    pub fn new(target: SharedTarget) -> Self {
        Self { target }
    }

    /// Sink on the host's original standard output.
    ///
    /// The target is captured now, skipping any active redirection, so the
    /// sink never writes back into the engine buffer it is draining.
    pub fn stdout(streams: &HostStreams) -> Self {
        Self::new(streams.originals().stdout)
    }
}

impl DisplaySink for StreamSink {
    fn emit(&self, chunk: &Chunk) -> io::Result<()> {
        self.target.write_bytes(chunk.text.as_bytes())?;
        self.target.flush()
    }
}

impl fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSink").finish_non_exhaustive()
    }
}

/// Sink over any writer, such as an output file.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WriterSink<File> {
    /// Append engine output to a text file instead of the screen.
    ///
    /// An existing file is refused unless `replace` is set, in which case
    /// it is removed first.
    pub fn append_file(path: impl AsRef<Path>, replace: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.is_file() {
            if !replace {
                return Err(ConfigError::OutputFileExists {
                    path: path.display().to_string(),
                }
                .into());
            }
            fs::remove_file(path)?;
        }

        debug!("writing engine output to {}", path.display());
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> DisplaySink for WriterSink<W> {
    fn emit(&self, chunk: &Chunk) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(chunk.text.as_bytes())?;
        writer.flush()
    }
}

/// Sink that records every chunk in memory.
#[derive(Debug, Default)]
pub struct CollectSink {
    chunks: Mutex<Vec<Chunk>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All chunks received so far, in order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Concatenated text of all chunks.
    pub fn text(&self) -> String {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.text.as_str())
            .collect()
    }

    /// Forget recorded chunks.
    pub fn clear(&self) {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DisplaySink for CollectSink {
    fn emit(&self, chunk: &Chunk) -> io::Result<()> {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chunk.clone());
        Ok(())
    }
}

/// Create a sink that forwards chunks to an async consumer.
pub fn channel_sink() -> (ChannelSink, ChunkStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, ChunkStream { rx })
}

/// Sending half of [`channel_sink`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl DisplaySink for ChannelSink {
    fn emit(&self, chunk: &Chunk) -> io::Result<()> {
        self.tx
            .send(chunk.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "chunk stream closed"))
    }
}

/// Receiving half of [`channel_sink`]; yields chunks in delivery order.
///
/// The stream ends once every [`ChannelSink`] clone is dropped.
#[derive(Debug)]
pub struct ChunkStream {
    rx: mpsc::UnboundedReceiver<Chunk>,
}

impl ChunkStream {
    /// Wait for the next chunk.
    pub async fn next_chunk(&mut self) -> Option<Chunk> {
        self.rx.recv().await
    }

    /// Take every chunk already delivered without waiting.
    pub fn drain_ready(&mut self) -> Vec<Chunk> {
        let mut ready = Vec::new();
        while let Ok(chunk) = self.rx.try_recv() {
            ready.push(chunk);
        }
        ready
    }
}

impl Stream for ChunkStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[test]
    fn test_collect_sink_keeps_order() {
        let sink = CollectSink::new();
        sink.emit(&Chunk::partial("a")).unwrap();
        sink.emit(&Chunk::partial("b")).unwrap();
        sink.emit(&Chunk::last("c\n")).unwrap();

        assert_eq!(sink.text(), "abc\n");
        let chunks = sink.chunks();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].is_final);
        assert!(!chunks[0].is_final);
    }

    #[test]
    fn test_writer_sink() {
        let sink = WriterSink::new(Vec::new());
        sink.emit(&Chunk::partial("2")).unwrap();
        sink.emit(&Chunk::last("\n")).unwrap();
        assert_eq!(sink.into_inner(), b"2\n");
    }

    #[test]
    fn test_append_file_refuses_existing() {
        let path = std::env::temp_dir().join(format!("enginetap-sink-{}.log", std::process::id()));
        fs::write(&path, "old\n").unwrap();

        assert!(matches!(
            WriterSink::append_file(&path, false),
            Err(crate::Error::Config(ConfigError::OutputFileExists { .. }))
        ));

        let sink = WriterSink::append_file(&path, true).unwrap();
        sink.emit(&Chunk::last("new\n")).unwrap();
        drop(sink);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_channel_sink_stream() {
        let (sink, stream) = channel_sink();
        sink.emit(&Chunk::partial("x")).unwrap();
        sink.emit(&Chunk::last("y")).unwrap();
        drop(sink);

        let chunks: Vec<Chunk> = stream.collect().await;
        assert_eq!(chunks, vec![Chunk::partial("x"), Chunk::last("y")]);
    }

    #[tokio::test]
    async fn test_channel_sink_closed_stream_is_error() {
        let (sink, stream) = channel_sink();
        drop(stream);
        assert!(sink.emit(&Chunk::partial("lost")).is_err());
    }
}
