//! zlib-stream frame reassembly
//!
//! With `compress=zlib-stream` the server sends one zlib stream per
//! connection, split across binary frames. A message is complete when the
//! buffered bytes end with the sync-flush marker. The inflate context must
//! outlive each message because later messages reference the dictionary
//! built up by earlier ones.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::GatewayError;

/// Sync-flush marker that ends every complete compressed message
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

const INFLATE_CHUNK: usize = 32 * 1024;

/// Raw transport frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Complete uncompressed JSON message
    Text(String),
    /// Fragment of the compressed stream
    Binary(Vec<u8>),
}

/// Per-connection reassembler
///
/// Create a new one for every connection; a fresh connection starts a fresh
/// compression stream.
pub struct FrameReassembler {
    buffer: Vec<u8>,
    inflater: Decompress,
}

impl FrameReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            inflater: Decompress::new(true),
        }
    }

    /// Feed one frame; returns the complete message once one is available
    pub fn push(&mut self, frame: Frame) -> Result<Option<String>, GatewayError> {
        match frame {
            Frame::Text(text) => Ok(Some(text)),
            Frame::Binary(bytes) => {
                self.buffer.extend_from_slice(&bytes);
                if !self.buffer.ends_with(&ZLIB_SUFFIX) {
                    return Ok(None);
                }
                let inflated = self.inflate();
                self.buffer.clear();
                inflated.map(Some)
            }
        }
    }

    /// Bytes buffered for an incomplete message
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn inflate(&mut self) -> Result<String, GatewayError> {
        let mut out = Vec::with_capacity(self.buffer.len().saturating_mul(4).max(INFLATE_CHUNK));
        let mut consumed = 0usize;

        loop {
            if out.len() == out.capacity() {
                out.reserve(INFLATE_CHUNK);
            }

            let in_before = self.inflater.total_in();
            let out_before = out.len();
            let status = self
                .inflater
                .decompress_vec(&self.buffer[consumed..], &mut out, FlushDecompress::Sync)
                .map_err(|e| GatewayError::Inflate(e.to_string()))?;
            let read = usize::try_from(self.inflater.total_in() - in_before)
                .map_err(|e| GatewayError::Inflate(e.to_string()))?;
            consumed += read;

            // Spare output capacity means the inflater stopped for lack of input
            if consumed >= self.buffer.len() && out.len() < out.capacity() {
                break;
            }
            if status == Status::StreamEnd {
                break;
            }
            if read == 0 && out.len() == out_before {
                return Err(GatewayError::Inflate("inflate made no progress".to_string()));
            }
        }

        String::from_utf8(out).map_err(|e| GatewayError::Inflate(e.to_string()))
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameReassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReassembler")
            .field("buffered", &self.buffer.len())
            .field("total_in", &self.inflater.total_in())
            .field("total_out", &self.inflater.total_out())
            .finish()
    }
}
