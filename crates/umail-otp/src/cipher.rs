//! One-time-pad combination: bytewise XOR of two equal-length sequences.
//! The same call encrypts (plaintext, key) and decrypts (ciphertext, key).

use umail_core::{UmailError, UmailResult};

/// XOR `a` with `b`. Fails with `LengthMismatch` unless both have the same
/// length, which signals a chunk length misconfiguration in the caller.
pub fn combine(a: &[u8], b: &[u8]) -> UmailResult<Vec<u8>> {
    if a.len() != b.len() {
        return Err(UmailError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        let out = combine(&[0x00, 0xFF, 0x0F, 0xA5], &[0xFF, 0xFF, 0xF0, 0x5A]).unwrap();
        assert_eq!(out, vec![0xFF, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(combine(&[], &[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            combine(&[1, 2, 3], &[1, 2]),
            Err(UmailError::LengthMismatch { left: 3, right: 2 })
        ));
    }

    proptest! {
        #[test]
        fn combine_is_an_involution(
            (p, k) in (0usize..=256).prop_flat_map(|n| (
                proptest::collection::vec(any::<u8>(), n),
                proptest::collection::vec(any::<u8>(), n),
            ))
        ) {
            let c = combine(&p, &k).unwrap();
            prop_assert_eq!(c.len(), p.len());
            prop_assert_eq!(combine(&c, &k).unwrap(), p);
        }
    }
}
