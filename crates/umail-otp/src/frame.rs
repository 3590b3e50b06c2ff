//! Length-prefixed message framing into fixed-size chunks
//!
//! Frame format:
//! ```text
//! [2 bytes: payload length, little-endian u16][payload][zero padding to a chunk multiple]
//! ```

use std::io::Read;

use umail_core::config::MAX_CHUNK_LENGTH;
use umail_core::{UmailError, UmailResult};

/// Size of the payload length prefix
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Largest payload the 2-byte length prefix can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Number of chunks `frame` produces for a payload of `payload_len` bytes.
pub fn chunk_count(payload_len: usize, chunk_length: usize) -> UmailResult<usize> {
    if chunk_length == 0 {
        return Err(UmailError::InvalidCount("chunk length must be at least 1".into()));
    }
    if chunk_length > MAX_CHUNK_LENGTH {
        return Err(UmailError::InvalidCount(format!(
            "chunk length {chunk_length} exceeds the maximum of {MAX_CHUNK_LENGTH}"
        )));
    }
    Ok((LENGTH_PREFIX_LEN + payload_len).div_ceil(chunk_length))
}

/// Prefix `payload` with its length and split it into `chunk_length`-byte
/// chunks. Only the last chunk is zero-padded.
pub fn frame(payload: &[u8], chunk_length: usize) -> UmailResult<Vec<Vec<u8>>> {
    let len = u16::try_from(payload.len()).map_err(|_| UmailError::PayloadTooLarge {
        len: payload.len(),
        max: MAX_PAYLOAD_LEN,
    })?;
    let count = chunk_count(payload.len(), chunk_length)?;
    let framed_len = count.checked_mul(chunk_length).ok_or_else(|| {
        UmailError::InvalidCount(format!("{count} chunks of {chunk_length} bytes overflows"))
    })?;

    let mut buf = Vec::with_capacity(framed_len);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    buf.resize(framed_len, 0);

    Ok(buf.chunks(chunk_length).map(<[u8]>::to_vec).collect())
}

/// Reassemble chunks produced by `frame` and return the original payload.
/// Trailing padding past the declared length is dropped.
pub fn unframe<C: AsRef<[u8]>>(chunks: &[C]) -> UmailResult<Vec<u8>> {
    if chunks.is_empty() {
        return Err(UmailError::InvalidCount("cannot unframe 0 chunks".into()));
    }

    let joined: Vec<u8> = chunks.iter().flat_map(|c| c.as_ref().iter().copied()).collect();
    if joined.len() < LENGTH_PREFIX_LEN {
        return Err(UmailError::TruncatedFrame {
            declared: LENGTH_PREFIX_LEN,
            available: joined.len(),
        });
    }

    let declared = u16::from_le_bytes([joined[0], joined[1]]) as usize;
    let body = &joined[LENGTH_PREFIX_LEN..];
    if body.len() < declared {
        return Err(UmailError::TruncatedFrame {
            declared,
            available: body.len(),
        });
    }
    Ok(body[..declared].to_vec())
}

/// Read a whole payload from `reader`, stopping with `PayloadTooLarge` as
/// soon as it grows past `MAX_PAYLOAD_LEN`.
pub fn read_payload<R: Read>(reader: R) -> UmailResult<Vec<u8>> {
    let mut payload = Vec::new();
    reader
        .take(MAX_PAYLOAD_LEN as u64 + 1)
        .read_to_end(&mut payload)?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(UmailError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const L: usize = 35;

    #[test]
    fn test_two_byte_payload_fills_one_chunk() {
        let chunks = frame(b"AB", 4).unwrap();
        assert_eq!(chunks, vec![vec![0x02, 0x00, b'A', b'B']]);
    }

    #[test]
    fn test_last_chunk_is_zero_padded() {
        let chunks = frame(b"hello", 4).unwrap();
        assert_eq!(
            chunks,
            vec![vec![0x05, 0x00, b'h', b'e'], vec![b'l', b'l', b'o', 0x00]]
        );
    }

    #[test]
    fn test_empty_payload_is_one_chunk() {
        let chunks = frame(b"", L).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), L);
        assert!(chunks[0].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_chunk_count_formula() {
        assert_eq!(chunk_count(0, L).unwrap(), 1);
        assert_eq!(chunk_count(L - 2, L).unwrap(), 1);
        assert_eq!(chunk_count(L - 1, L).unwrap(), 2);
        assert_eq!(chunk_count(L, L).unwrap(), 2);
        assert_eq!(chunk_count(MAX_PAYLOAD_LEN, L).unwrap(), (MAX_PAYLOAD_LEN + 2).div_ceil(L));
        assert!(matches!(chunk_count(1, 0), Err(UmailError::InvalidCount(_))));
        assert_eq!(chunk_count(MAX_PAYLOAD_LEN, MAX_CHUNK_LENGTH).unwrap(), 1);
        assert!(matches!(
            chunk_count(1, MAX_CHUNK_LENGTH + 1),
            Err(UmailError::InvalidCount(_))
        ));
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        match frame(&payload, L) {
            Err(UmailError::PayloadTooLarge { len, max }) => {
                assert_eq!(len, MAX_PAYLOAD_LEN + 1);
                assert_eq!(max, MAX_PAYLOAD_LEN);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_chunk_length_rejected() {
        assert!(matches!(frame(b"x", 0), Err(UmailError::InvalidCount(_))));
    }

    #[test]
    fn test_huge_chunk_length_is_an_error() {
        assert!(matches!(frame(b"AB", usize::MAX), Err(UmailError::InvalidCount(_))));
        assert!(matches!(
            frame(b"AB", usize::MAX / 2 + 1),
            Err(UmailError::InvalidCount(_))
        ));

        // A whole maximal frame in one chunk is still allowed
        let chunks = frame(b"AB", MAX_CHUNK_LENGTH).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), MAX_CHUNK_LENGTH);
    }

    #[test]
    fn test_roundtrip_at_chunk_edges() {
        for len in [0, L - 1, L, L + 1, MAX_PAYLOAD_LEN] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let chunks = frame(&payload, L).unwrap();

            assert_eq!(chunks.len(), chunk_count(len, L).unwrap());
            assert!(chunks.iter().all(|c| c.len() == L));
            assert_eq!(unframe(&chunks).unwrap(), payload, "payload length {len}");
        }
    }

    #[test]
    fn test_unframe_truncated() {
        // Declares 10 bytes, carries 2
        let chunks = vec![vec![10u8, 0, b'h', b'i']];
        assert!(matches!(
            unframe(&chunks),
            Err(UmailError::TruncatedFrame {
                declared: 10,
                available: 2
            })
        ));

        let short = vec![vec![1u8]];
        assert!(matches!(unframe(&short), Err(UmailError::TruncatedFrame { .. })));

        let none: Vec<Vec<u8>> = Vec::new();
        assert!(matches!(unframe(&none), Err(UmailError::InvalidCount(_))));
    }

    #[test]
    fn test_read_payload_limits() {
        let at_limit = vec![1u8; MAX_PAYLOAD_LEN];
        assert_eq!(read_payload(at_limit.as_slice()).unwrap().len(), MAX_PAYLOAD_LEN);

        let over = vec![1u8; MAX_PAYLOAD_LEN + 100];
        assert!(matches!(
            read_payload(over.as_slice()),
            Err(UmailError::PayloadTooLarge { .. })
        ));
    }

    proptest! {
        #[test]
        fn frame_unframe_roundtrip(
            payload in proptest::collection::vec(any::<u8>(), 0..=2048),
            chunk_length in 1usize..=64,
        ) {
            let chunks = frame(&payload, chunk_length).unwrap();
            prop_assert_eq!(chunks.len(), chunk_count(payload.len(), chunk_length).unwrap());
            prop_assert!(chunks.iter().all(|c| c.len() == chunk_length));
            prop_assert_eq!(unframe(&chunks).unwrap(), payload);
        }

        #[test]
        fn frame_is_deterministic(payload in proptest::collection::vec(any::<u8>(), 0..=512)) {
            prop_assert_eq!(frame(&payload, 35).unwrap(), frame(&payload, 35).unwrap());
        }
    }
}
