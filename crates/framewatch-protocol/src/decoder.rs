use thiserror::Error;
use tracing::{debug, trace};

use crate::{FieldValue, FrameRecord};

/// Opens a frame section in the probe's default output writer
pub const FRAME_START_MARKER: &str = "[FRAME]";
/// Closes a frame section
pub const FRAME_END_MARKER: &str = "[/FRAME]";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Frame buffer overflow: {length} bytes buffered, limit is {limit}")]
    BufferOverflow { length: usize, limit: usize },

    #[error("Malformed frame record ({} bytes buffered): {fragment:?}", buffer.len())]
    MalformedRecord { fragment: String, buffer: String },
}

/// Reassembles frame records out of arbitrarily chunked probe output.
///
/// The decoder keeps the unterminated tail of the stream between calls. Its
/// size is bounded by `buffer_max_length`; once a call would exceed the bound
/// the decoder stays failed until [`FrameDecoder::reset`] is called.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer_max_length: usize,
    pending: String,
    overflow: Option<DecodeError>,
}

impl FrameDecoder {
    pub fn new(buffer_max_length: usize) -> Self {
        Self {
            buffer_max_length,
            pending: String::new(),
            overflow: None,
        }
    }

    /// Feed one chunk of output, returning every record closed by it in the
    /// order the closing markers appear.
    ///
    /// A failed call leaves the pending remainder untouched.
    pub fn decode(&mut self, chunk: &str) -> Result<Vec<FrameRecord>, DecodeError> {
        if let Some(ref err) = self.overflow {
            return Err(err.clone());
        }

        let length = self.pending.len() + chunk.len();
        if length > self.buffer_max_length {
            let err = DecodeError::BufferOverflow {
                length,
                limit: self.buffer_max_length,
            };
            debug!(length, limit = self.buffer_max_length, "Frame buffer frozen");
            self.overflow = Some(err.clone());
            return Err(err);
        }

        let mut buffer = String::with_capacity(length);
        buffer.push_str(&self.pending);
        buffer.push_str(chunk);

        let mut fragments: Vec<&str> = buffer.split(FRAME_END_MARKER).collect();
        // split always yields at least one element
        let remainder = fragments.pop().unwrap_or_default();

        let mut frames = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            frames.push(Self::parse_fragment(fragment, &buffer)?);
        }

        trace!(
            frames = frames.len(),
            remainder_len = remainder.len(),
            "Decoded chunk"
        );
        self.pending = remainder.to_string();
        Ok(frames)
    }

    /// Drop any buffered data and clear a frozen overflow.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.overflow = None;
    }

    /// The unterminated tail carried into the next call
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn buffer_max_length(&self) -> usize {
        self.buffer_max_length
    }

    fn parse_fragment(fragment: &str, buffer: &str) -> Result<FrameRecord, DecodeError> {
        let body = match fragment.split_once(FRAME_START_MARKER) {
            Some((_, body)) if !body.contains(FRAME_START_MARKER) => body,
            _ => {
                return Err(DecodeError::MalformedRecord {
                    fragment: fragment.to_string(),
                    buffer: buffer.to_string(),
                })
            }
        };

        let mut frame = FrameRecord::new();
        for line in body.lines() {
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                frame.insert(key, FieldValue::coerce(value));
            }
        }
        Ok(frame)
    }
}
