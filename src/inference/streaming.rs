//! Streaming inference support
//!
//! Chunk types yielded by an engine's completion stream, plus the UTF-8
//! reassembly used when a backend emits raw token bytes.

use std::pin::Pin;

use futures::Stream;

use crate::inference::capability::EngineError;

/// One increment of a streaming completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionChunk {
    /// Text produced by this step. Some engines emit chunks without content
    /// (role headers, keep-alives), which show up as `None`.
    pub delta: Option<String>,
}

impl CompletionChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
        }
    }

    /// A chunk carrying no delta
    pub fn empty() -> Self {
        Self { delta: None }
    }

    /// The delta text, with a missing delta read as the empty string
    pub fn delta_text(&self) -> &str {
        self.delta.as_deref().unwrap_or("")
    }
}

/// Lazy, finite, non-restartable sequence of chunks from one completion.
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<CompletionChunk, EngineError>> + Send>>;

/// Takes the longest decodable prefix out of `buffer`.
///
/// Token pieces can split a multi-byte character, so an incomplete trailing
/// sequence stays in the buffer until the next piece arrives. Bytes that can
/// never form valid UTF-8 are flushed lossily rather than held forever.
pub fn drain_utf8(buffer: &mut Vec<u8>) -> Option<String> {
    if buffer.is_empty() {
        return None;
    }

    match std::str::from_utf8(buffer) {
        Ok(s) => {
            let text = s.to_string();
            buffer.clear();
            Some(text)
        }
        Err(e) if e.error_len().is_some() => {
            let text = String::from_utf8_lossy(buffer).into_owned();
            buffer.clear();
            Some(text)
        }
        Err(e) => {
            let valid = e.valid_up_to();
            if valid == 0 {
                return None;
            }
            let text = String::from_utf8_lossy(&buffer[..valid]).into_owned();
            buffer.drain(..valid);
            Some(text)
        }
    }
}
