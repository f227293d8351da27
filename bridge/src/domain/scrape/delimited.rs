//! Incremental decoder for varint-length-prefixed `MetricFamily` frames
//!
//! Bytes arrive in arbitrary chunks from the response body. Complete frames
//! are returned as soon as they are buffered; a partial frame waits for the
//! next chunk.

use bytes::{Buf, BytesMut};
use prost::Message;

use super::proto::MetricFamily;
use crate::domain::error::{DecodeError, FetchError};

/// Longest legal varint encoding of a u64
const MAX_VARINT_LEN: usize = 10;

/// Upper bound for a single frame; anything larger means the stream is corrupt
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub enum Frame {
    Family(MetricFamily),
    /// The length prefix was sound but the message bytes were not
    Invalid(DecodeError),
    /// More input is needed
    Incomplete,
}

#[derive(Debug, Default)]
pub struct DelimitedDecoder {
    buf: BytesMut,
}

impl DelimitedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next buffered frame.
    ///
    /// An unreadable length prefix is fatal: frame boundaries can no longer be found.
    pub fn next_frame(&mut self) -> Result<Frame, FetchError> {
        let header_len = match self
            .buf
            .iter()
            .take(MAX_VARINT_LEN)
            .position(|b| b & 0x80 == 0)
        {
            Some(pos) => pos + 1,
            None if self.buf.len() < MAX_VARINT_LEN => return Ok(Frame::Incomplete),
            None => {
                return Err(FetchError::Framing(
                    "length prefix longer than 10 bytes".to_string(),
                ));
            }
        };

        let frame_len = prost::decode_length_delimiter(&self.buf[..header_len])
            .map_err(|e| FetchError::Framing(e.to_string()))?;
        if frame_len > MAX_FRAME_BYTES {
            return Err(FetchError::Framing(format!(
                "frame of {} bytes exceeds limit of {} bytes",
                frame_len, MAX_FRAME_BYTES
            )));
        }

        if self.buf.len() < header_len + frame_len {
            return Ok(Frame::Incomplete);
        }

        self.buf.advance(header_len);
        let body = self.buf.split_to(frame_len).freeze();
        Ok(match MetricFamily::decode(body) {
            Ok(family) => Frame::Family(family),
            Err(e) => Frame::Invalid(DecodeError::Frame(e)),
        })
    }

    /// Call once the body is exhausted. Leftover bytes are a truncated frame.
    pub fn finish(&self) -> Result<(), FetchError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(FetchError::Framing(format!(
                "body ended inside a frame ({} bytes left over)",
                self.buf.len()
            )))
        }
    }
}
