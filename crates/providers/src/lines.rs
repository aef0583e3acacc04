//! Line-oriented stream pumping shared by the NDJSON and SSE backends.
//!
//! Bytes are buffered until a full line is available so multi-byte UTF-8
//! sequences split across network reads decode correctly.

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::trace;
use veracity_core::error::ProviderError;
use veracity_core::provider::StreamChunk;

/// What a single wire line means to the turn engine.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LineEvent {
    /// A text delta
    Delta(String),
    /// The backend signalled end of generation
    Done,
    /// The backend reported an error in-band
    Error(String),
    /// Keep-alive, metadata, or unparseable
    Skip,
}

/// Read `stream` line by line, translate each line with `parse`, and forward
/// the result to `tx`.
///
/// Returns when the backend finishes, errors, or the receiver is dropped.
/// Dropping the receiver drops the response body, which closes the HTTP
/// connection and stops generation upstream.
pub(crate) async fn pump_lines<S, B, E, F>(
    stream: S,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
    provider: &str,
    mut parse: F,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    F: FnMut(&str) -> LineEvent,
{
    let mut stream = std::pin::pin!(stream);
    let mut buf: Vec<u8> = Vec::new();

    loop {
        while let Some(end) = buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = buf.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            if !forward(&tx, provider, parse(line)).await {
                return;
            }
        }

        match stream.next().await {
            Some(Ok(bytes)) => buf.extend_from_slice(bytes.as_ref()),
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                    .await;
                return;
            }
            None => break,
        }
    }

    // Trailing line without a newline
    let tail = String::from_utf8_lossy(&buf).trim().to_string();
    if !tail.is_empty() && !forward(&tx, provider, parse(&tail)).await {
        return;
    }

    let _ = tx.send(Ok(StreamChunk::finished())).await;
}

/// Returns false when pumping should stop.
async fn forward(
    tx: &mpsc::Sender<Result<StreamChunk, ProviderError>>,
    provider: &str,
    event: LineEvent,
) -> bool {
    match event {
        LineEvent::Delta(text) => {
            if text.is_empty() {
                return true;
            }
            tx.send(Ok(StreamChunk::delta(text))).await.is_ok()
        }
        LineEvent::Done => {
            let _ = tx.send(Ok(StreamChunk::finished())).await;
            false
        }
        LineEvent::Error(message) => {
            let _ = tx
                .send(Err(ProviderError::StreamInterrupted(message)))
                .await;
            false
        }
        LineEvent::Skip => {
            trace!(provider, "Skipping stream line");
            true
        }
    }
}
