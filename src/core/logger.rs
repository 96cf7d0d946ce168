//! Durable packet mirror
//!
//! Appends every logged packet to a JSON-lines file from a background task.
//! Recording never blocks and never fails the caller; write errors are only
//! reported through tracing.

use crate::core::packet::Packet;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};

enum MirrorMessage {
    Record(String),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background writer
#[derive(Debug, Clone)]
pub struct PacketMirror {
    tx: mpsc::UnboundedSender<MirrorMessage>,
    path: PathBuf,
}

impl PacketMirror {
    /// Start the writer task on the current tokio runtime
    pub fn spawn(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            std::io::Error::other(format!("packet mirror needs a tokio runtime: {e}"))
        })?;

        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run_writer(path.clone(), rx));

        tracing::info!(path = %path.display(), "mirroring packet log");
        Ok(Self { tx, path })
    }

    /// Mirror file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a packet for writing
    pub fn record(&self, packet: &Packet) {
        let line = match serde_json::to_string(packet) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("failed to serialize packet {}: {}", packet.id, e);
                return;
            }
        };
        if self.tx.send(MirrorMessage::Record(line)).is_err() {
            tracing::warn!("packet mirror writer has stopped; packet {} not persisted", packet.id);
        }
    }

    /// Wait until everything queued so far has been written
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(MirrorMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<MirrorMessage>) {
    let mut file = match OpenOptions::new().create(true).append(true).open(&path).await {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to open packet mirror: {}", e);
            None
        }
    };

    while let Some(message) = rx.recv().await {
        match message {
            MirrorMessage::Record(line) => {
                let Some(writer) = file.as_mut() else { continue };
                let result = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.write_all(b"\n").await
                }
                .await;
                if let Err(e) = result {
                    tracing::warn!(path = %path.display(), "failed to persist packet: {}", e);
                }
                // Flush once the queue drains
                if rx.is_empty() {
                    flush(writer, &path).await;
                }
            }
            MirrorMessage::Flush(done) => {
                if let Some(writer) = file.as_mut() {
                    flush(writer, &path).await;
                }
                let _ = done.send(());
            }
        }
    }
}

async fn flush(writer: &mut BufWriter<tokio::fs::File>, path: &Path) {
    if let Err(e) = writer.flush().await {
        tracing::warn!(path = %path.display(), "failed to flush packet mirror: {}", e);
    }
}

/// Render packets as JSON lines, in the given order
pub fn export_jsonl(packets: &[Packet]) -> String {
    let mut out = String::new();
    for packet in packets {
        if let Ok(line) = serde_json::to_string(packet) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}
