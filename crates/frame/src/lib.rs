//! Wire framing for the tunnel relay protocol.
//!
//! A frame is a JSON object `{"id": "<stream id>", "data": "<base64>"?}`.
//! `data`, when present and non-empty, is base64 of an LZMA-compressed byte
//! payload. A frame with no `data` (or empty `data`) is a control frame;
//! whether it means OPEN or CLOSE is a property of the receiver's stream
//! table, not of the frame itself, so this crate never names "open"/"close".

mod compress;

use std::io;

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Recommended maximum pre-compression payload size for a single frame.
/// Larger writes at the socket must be split by the caller.
pub const MAX_PAYLOAD: usize = 128 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("malformed base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("lzma codec error: {0}")]
    Compression(#[from] io::Error),
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD} byte limit")]
    PayloadTooLarge(usize),
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

/// A decoded frame: a stream id plus an optional payload.
///
/// `data.is_none()` (equivalently, [`Frame::is_control`]) marks a control
/// frame. Constructing a frame with an empty payload normalizes to a
/// control frame, per the wire invariant that zero-byte frames are never
/// DATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: String,
    pub data: Option<Bytes>,
}

impl Frame {
    pub fn control(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
        }
    }

    pub fn data(id: impl Into<String>, payload: Bytes) -> Self {
        Self {
            id: id.into(),
            data: if payload.is_empty() {
                None
            } else {
                Some(payload)
            },
        }
    }

    pub fn is_control(&self) -> bool {
        self.data.is_none()
    }

    /// Encode this frame as one JSON line, without a trailing newline.
    pub fn encode_line(&self) -> Result<String, FrameError> {
        if let Some(payload) = &self.data {
            if payload.len() > MAX_PAYLOAD {
                return Err(FrameError::PayloadTooLarge(payload.len()));
            }
        }

        let data = match &self.data {
            Some(payload) => {
                let compressed = compress::compress(payload)?;
                Some(base64::engine::general_purpose::STANDARD.encode(compressed))
            }
            None => None,
        };

        Ok(serde_json::to_string(&WireFrame {
            id: self.id.clone(),
            data,
        })?)
    }

    /// Decode one line of a GET response body. Returns `Ok(None)` for a
    /// heartbeat (a blank line) which the caller must skip without
    /// affecting any per-stream state.
    pub fn decode_line(line: &str) -> Result<Option<Frame>, FrameError> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let wire: WireFrame = serde_json::from_str(line)?;
        let data = match wire.data {
            Some(encoded) if !encoded.is_empty() => {
                let compressed = base64::engine::general_purpose::STANDARD.decode(encoded)?;
                let raw = compress::decompress(&compressed)?;
                Some(Bytes::from(raw))
            }
            _ => None,
        };

        Ok(Some(Frame { id: wire.id, data }))
    }
}
