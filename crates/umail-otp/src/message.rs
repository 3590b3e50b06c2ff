//! Sender and receiver halves of the pipeline.
//!
//! `encode` frames the payload and draws matching key chunks; the caller
//! combines them into a session. `reveal` is the receiver side: it draws the
//! same number of chunks from its own copy of the pad and undoes the XOR.

use tracing::{debug, info};
use umail_core::{UmailError, UmailResult};

use crate::cipher::combine;
use crate::frame::{frame, unframe};
use crate::pool::{KeyBytes, KeyPool};

/// Plaintext chunks paired with the key chunks drawn for them.
pub struct Encoded {
    /// Pool cursor before the draw
    pub pool_offset: u64,
    pub plaintext_chunks: Vec<Vec<u8>>,
    pub key_chunks: Vec<KeyBytes>,
}

impl std::fmt::Debug for Encoded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoded")
            .field("pool_offset", &self.pool_offset)
            .field("chunks", &self.plaintext_chunks.len())
            .finish()
    }
}

/// Frame `payload` and draw one key chunk per plaintext chunk.
///
/// Framing happens first, so an oversized payload never consumes key bytes.
pub fn encode(pool: &mut KeyPool, payload: &[u8], chunk_length: usize) -> UmailResult<Encoded> {
    let plaintext_chunks = frame(payload, chunk_length)?;
    let pool_offset = pool.current_offset();
    let key_chunks = pool.take_chunks(plaintext_chunks.len(), chunk_length)?;

    debug!(
        pool = %pool.name(),
        pool_offset,
        chunks = plaintext_chunks.len(),
        "drew key material for message"
    );

    Ok(Encoded {
        pool_offset,
        plaintext_chunks,
        key_chunks,
    })
}

/// Recover the payload hidden in `boundaries` using the receiver's pool.
///
/// Every boundary must be `chunk_length` bytes; this is checked before any
/// key bytes are drawn.
pub fn reveal<B: AsRef<[u8]>>(
    pool: &mut KeyPool,
    boundaries: &[B],
    chunk_length: usize,
) -> UmailResult<Vec<u8>> {
    if boundaries.is_empty() {
        return Err(UmailError::InvalidCount("no boundaries to reveal".into()));
    }
    if let Some(bad) = boundaries
        .iter()
        .map(|b| b.as_ref().len())
        .find(|&len| len != chunk_length)
    {
        return Err(UmailError::LengthMismatch {
            left: bad,
            right: chunk_length,
        });
    }

    let pool_offset = pool.current_offset();
    let keys = pool.take_chunks(boundaries.len(), chunk_length)?;

    let mut plaintext = Vec::with_capacity(boundaries.len());
    for (boundary, key) in boundaries.iter().zip(&keys) {
        plaintext.push(combine(boundary.as_ref(), key)?);
    }

    let payload = unframe(&plaintext)?;
    info!(
        pool = %pool.name(),
        pool_offset,
        boundaries = boundaries.len(),
        len = payload.len(),
        "revealed message"
    );
    Ok(payload)
}
