//! Boundary encoding: a ciphertext chunk rendered as lowercase hex, as
//! carried in a MIME `boundary="..."` parameter.

use umail_core::{UmailError, UmailResult};

/// Render a chunk as a lowercase hex boundary.
pub fn encode(chunk: &[u8]) -> String {
    hex::encode(chunk)
}

/// Decode a hex boundary back to chunk bytes. Accepts either case and
/// ignores surrounding whitespace.
pub fn decode(boundary: &str) -> UmailResult<Vec<u8>> {
    let trimmed = boundary.trim();
    if trimmed.is_empty() {
        return Err(UmailError::InvalidBoundary("boundary is empty".into()));
    }
    hex::decode(trimmed)
        .map_err(|e| UmailError::InvalidBoundary(format!("\"{trimmed}\" is not hex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_lowercase() {
        assert_eq!(encode(&[0x00, 0xAB, 0x7F, 0xFF]), "00ab7fff");
    }

    #[test]
    fn test_decode_roundtrip_35_bytes() {
        let chunk: Vec<u8> = (0..35u8).map(|b| b.wrapping_mul(37)).collect();
        let boundary = encode(&chunk);
        assert_eq!(boundary.len(), 70);
        assert_eq!(decode(&boundary).unwrap(), chunk);
    }

    #[test]
    fn test_decode_accepts_uppercase_and_whitespace() {
        assert_eq!(decode(" 00AB7F\n").unwrap(), vec![0x00, 0xAB, 0x7F]);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        for bad in ["", "   ", "abc", "zz", "0g"] {
            assert!(
                matches!(decode(bad), Err(UmailError::InvalidBoundary(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
