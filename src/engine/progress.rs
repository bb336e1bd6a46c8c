//! Draining of the engine's streamed progress bodies
//!
//! Pull and push answer `200 OK` immediately and then stream newline-delimited JSON
//! progress messages. A failure shows up as a message carrying `error`/`errorDetail`,
//! so the body has to be read to the end before the operation can be called done.

use crate::error::{Result, SyncerError};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;
use tracing::trace;

#[derive(Debug, Default, Deserialize)]
pub struct ProgressMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "errorDetail", default)]
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl ProgressMessage {
    fn error_message(&self) -> Option<String> {
        self.error_detail
            .as_ref()
            .and_then(|detail| detail.message.clone())
            .or_else(|| self.error.clone())
            .filter(|message| !message.is_empty())
    }
}

/// What was seen while draining a progress body
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProgressSummary {
    pub messages: usize,
    pub last_status: Option<String>,
}

/// Incremental decoder for newline-delimited progress messages
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    buffer: Vec<u8>,
    summary: ProgressSummary,
    error: Option<String>,
}

impl ProgressDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes; chunks may split messages anywhere
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line);
        }
    }

    /// Flush any trailing message and report the first error seen
    pub fn finish(mut self) -> Result<ProgressSummary> {
        let rest = std::mem::take(&mut self.buffer);
        self.handle_line(&rest);
        match self.error {
            Some(message) => Err(SyncerError::Stream(message)),
            None => Ok(self.summary),
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }
        match serde_json::from_slice::<ProgressMessage>(line) {
            Ok(message) => {
                self.summary.messages += 1;
                if let Some(error) = message.error_message() {
                    self.error.get_or_insert(error);
                } else if let Some(status) = message.status {
                    trace!(id = message.id.as_deref().unwrap_or(""), "{}", status);
                    self.summary.last_status = Some(status);
                }
            }
            Err(e) => trace!("Skipping undecodable progress line: {}", e),
        }
    }
}

/// Read a progress stream to its end
pub async fn drain<S, B, E>(stream: S) -> Result<ProgressSummary>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = ProgressDecoder::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| SyncerError::Stream(format!("progress stream interrupted: {}", e)))?;
        decoder.feed(chunk.as_ref());
    }
    decoder.finish()
}

/// Drain the body of an engine response
pub async fn drain_response(response: reqwest::Response) -> Result<ProgressSummary> {
    drain(response.bytes_stream()).await
}
