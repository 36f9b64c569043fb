//! Bounded response reading and status-line classification.

use super::UploadOutcome;
use crate::error::{TransportError, TransportStage};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

pub const HTTP_ACCEPTED: &[u8] = b"HTTP/1.1 200 ";
pub const HTTP_REFUSED: &[u8] = b"HTTP/1.1 400 ";

/// Number of response bytes read before classifying
pub const STATUS_PREFIX_LEN: usize = if HTTP_ACCEPTED.len() < HTTP_REFUSED.len() {
    HTTP_ACCEPTED.len()
} else {
    HTTP_REFUSED.len()
};

/// Read size used while diagnostic mode is on
pub const DEBUG_READ_CHUNK: usize = 1024;

/// Exact-match classification of the response prefix.
pub fn classify(prefix: &[u8]) -> UploadOutcome {
    if prefix == HTTP_ACCEPTED {
        UploadOutcome::Accepted
    } else if prefix == HTTP_REFUSED {
        UploadOutcome::Refused
    } else {
        UploadOutcome::Other(prefix.to_vec())
    }
}

/// Accumulates exactly `expected` bytes through repeated bounded reads
#[derive(Debug, Clone, Copy)]
pub struct ResponseReader {
    expected: usize,
    chunk: Option<usize>,
}

impl ResponseReader {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            chunk: None,
        }
    }

    /// Use fixed-size reads instead of "remaining bytes" reads.
    pub fn with_debug_chunk(mut self, chunk: Option<usize>) -> Self {
        self.chunk = chunk.filter(|c| *c > 0);
        self
    }

    /// Size of the next read given `have` bytes already buffered
    pub fn read_size(&self, have: usize) -> usize {
        self.chunk
            .unwrap_or_else(|| self.expected.saturating_sub(have))
    }

    /// Read until `expected` bytes are buffered; anything beyond is dropped.
    pub async fn read<R>(&self, stream: &mut R) -> Result<Vec<u8>, TransportError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut data = Vec::with_capacity(self.expected);
        let mut buf = Vec::new();
        while data.len() < self.expected {
            buf.resize(self.read_size(data.len()), 0);
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|e| TransportError::from_io(TransportStage::Read, &e))?;
            if n == 0 {
                return Err(TransportError::new(
                    TransportStage::Read,
                    format!(
                        "connection closed after {} of {} bytes",
                        data.len(),
                        self.expected
                    ),
                ));
            }
            trace!(read = n, "Response bytes");
            data.extend_from_slice(&buf[..n]);
        }
        data.truncate(self.expected);
        Ok(data)
    }
}
