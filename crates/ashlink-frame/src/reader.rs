use bytes::{Bytes, BytesMut};

use crate::codec::{DecodeStatus, FrameDecoder};
use crate::control::MAX_FRAME_LEN;
use crate::error::{FrameError, Result};

/// Assembles complete logical frames from wire bytes.
///
/// Suited to peers that only care about whole frames, such as the
/// simulated NCP and protocol tests. Each yielded frame holds the control
/// byte followed by the data field.
#[derive(Debug, Clone)]
pub struct FrameReader {
    decoder: FrameDecoder,
    buf: BytesMut,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl FrameReader {
    /// Create a reader accepting frames of up to `max_len` logical bytes.
    pub fn new(max_len: usize) -> Self {
        Self {
            decoder: FrameDecoder::new(max_len),
            buf: BytesMut::with_capacity(max_len),
        }
    }

    /// Feed one wire byte; returns a frame or an error when one ends.
    pub fn push(&mut self, wire: u8) -> Option<Result<Bytes>> {
        let decoded = self.decoder.decode(wire);
        if let Some(byte) = decoded.byte {
            self.buf.extend_from_slice(&[byte]);
        }
        match decoded.status {
            DecodeStatus::InProgress => None,
            DecodeStatus::Complete => Some(Ok(self.buf.split().freeze())),
            DecodeStatus::Cancelled => {
                self.buf.clear();
                Some(Err(FrameError::Cancelled))
            }
            DecodeStatus::Error(err) => {
                self.buf.clear();
                Some(Err(err))
            }
        }
    }

    /// Feed a run of wire bytes, collecting every frame or error that ends.
    pub fn push_all(&mut self, wire: &[u8]) -> Vec<Result<Bytes>> {
        wire.iter().filter_map(|&b| self.push(b)).collect()
    }
}
