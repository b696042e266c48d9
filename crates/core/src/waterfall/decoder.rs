//! # Event Frame Decoder
//!
//! Splits the chunked waterfall response into [`StreamEvent`]s.
//!
//! Handles:
//! - Line buffering across chunk boundaries
//! - `data: ` / `data:` prefix extraction
//! - Comments, blank lines, other SSE fields, and `[DONE]` markers
//! - Per-line parse failures that leave later lines decodable

use bytes::BytesMut;
use serde_json::Value;

use super::error::FrameParseError;
use super::events::StreamEvent;

/// Result of decoding one event line
pub type DecodedFrame = Result<StreamEvent, FrameParseError>;

/// Incremental decoder for one response body
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Feed a chunk and return every frame completed by it, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(newline_pos + 1);
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            if let Some(frame) = decode_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<DecodedFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Option<DecodedFrame> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line,
        Err(e) => return Some(Err(e.into())),
    };
    let data = extract_data(line)?;
    Some(parse_frame(data))
}

/// Payload of a `data:` line, or `None` for lines carrying no event
fn extract_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data)
}

fn parse_frame(data: &str) -> DecodedFrame {
    let value: Value = serde_json::from_str(data)?;
    StreamEvent::from_frame(value)
}
