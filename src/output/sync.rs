//! Synchronized console output
//!
//! A single writer task owns the sink. Workers send whole write requests
//! over a channel, and each request is written with one `write_all`, so two
//! requests never interleave. Requests are served in arrival order.

use std::io::{self, Write};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// Output errors
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Output writer has shut down")]
    Closed,

    #[error("Output write failed: {0}")]
    Io(#[from] io::Error),

    #[error("Output writer task failed: {0}")]
    Task(String),
}

enum OutputCommand {
    Write(Vec<u8>),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable producer side, one per worker
#[derive(Clone, Debug)]
pub struct OutputHandle {
    tx: mpsc::UnboundedSender<OutputCommand>,
}

impl std::fmt::Debug for OutputCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputCommand::Write(bytes) => write!(f, "Write({} bytes)", bytes.len()),
            OutputCommand::Flush(_) => write!(f, "Flush"),
            OutputCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl OutputHandle {
    /// Queue one atomic write
    pub fn print(&self, bytes: impl AsRef<[u8]>) -> Result<(), OutputError> {
        self.tx
            .send(OutputCommand::Write(bytes.as_ref().to_vec()))
            .map_err(|_| OutputError::Closed)
    }

    /// Queue one atomic write followed by a newline
    pub fn print_line(&self, bytes: impl AsRef<[u8]>) -> Result<(), OutputError> {
        let mut line = Vec::with_capacity(bytes.as_ref().len() + 1);
        line.extend_from_slice(bytes.as_ref());
        line.push(b'\n');
        self.tx
            .send(OutputCommand::Write(line))
            .map_err(|_| OutputError::Closed)
    }

    /// Wait until everything queued before this call is written
    pub async fn flush(&self) -> Result<(), OutputError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(OutputCommand::Flush(ack_tx))
            .map_err(|_| OutputError::Closed)?;
        ack_rx.await.map_err(|_| OutputError::Closed)
    }
}

/// Owner of the writer task
pub struct SynchronizedOutput {
    handle: OutputHandle,
    writer: JoinHandle<Result<u64, OutputError>>,
}

impl SynchronizedOutput {
    /// Writer over stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Writer over an arbitrary sink; must be called inside a tokio runtime
    pub fn new<W>(sink: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::task::spawn_blocking(move || write_loop(sink, rx));

        Self {
            handle: OutputHandle { tx },
            writer,
        }
    }

    pub fn handle(&self) -> OutputHandle {
        self.handle.clone()
    }

    /// Drain pending writes, stop the writer and return bytes written
    pub async fn close(self) -> Result<u64, OutputError> {
        // Shutdown is queued behind every earlier write
        let _ = self.handle.tx.send(OutputCommand::Shutdown);
        drop(self.handle);

        self.writer
            .await
            .map_err(|e| OutputError::Task(e.to_string()))?
    }
}

fn write_loop<W: Write>(
    mut sink: W,
    mut rx: mpsc::UnboundedReceiver<OutputCommand>,
) -> Result<u64, OutputError> {
    let mut written = 0u64;

    while let Some(command) = rx.blocking_recv() {
        match command {
            OutputCommand::Write(bytes) => {
                sink.write_all(&bytes)?;
                sink.flush()?;
                written += bytes.len() as u64;
            }
            OutputCommand::Flush(ack) => {
                sink.flush()?;
                let _ = ack.send(());
            }
            OutputCommand::Shutdown => break,
        }
    }

    sink.flush()?;
    debug!("Output writer stopped after {} bytes", written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink that records every byte and writes one byte per call
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match buf.first() {
                Some(b) => {
                    self.0.lock().unwrap().push(*b);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedSink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_prints_never_interleave() {
        let sink = SharedSink::default();
        let output = SynchronizedOutput::new(sink.clone());

        let mut tasks = Vec::new();
        for chunk in ["AAAA", "BBBB"] {
            for _ in 0..50 {
                let handle = output.handle();
                tasks.push(tokio::spawn(async move {
                    handle.print(chunk).unwrap();
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        let written = output.close().await.unwrap();
        assert_eq!(written, 400);

        let contents = sink.contents();
        assert_eq!(contents.len(), 400);
        for chunk in contents.as_bytes().chunks(4) {
            assert!(
                chunk == b"AAAA" || chunk == b"BBBB",
                "interleaved: {chunk:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_print_line_and_flush() {
        let sink = SharedSink::default();
        let output = SynchronizedOutput::new(sink.clone());
        let handle = output.handle();

        handle.print("✓").unwrap();
        handle.print_line(" done").unwrap();
        handle.flush().await.unwrap();
        assert_eq!(sink.contents(), "✓ done\n");

        output.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_print_after_close_fails() {
        let output = SynchronizedOutput::new(SharedSink::default());
        let handle = output.handle();
        output.close().await.unwrap();

        assert!(matches!(handle.print("late"), Err(OutputError::Closed)));
    }
}
