//! Session creation: frame, draw key material, XOR, record.

use tracing::error;
use umail_core::{UmailError, UmailResult};
use umail_otp::KeyPool;

use crate::session::Session;
use crate::store::SessionStore;

/// Encrypt `payload` with fresh key material from `pool` and store it as
/// session `name`.
///
/// Every check that can fail without consuming key bytes (name, existing
/// session, payload size) runs before the draw. Once bytes are drawn they
/// are gone for good: if writing the record fails, the error is logged with
/// the pool position so the operator knows which range was burned.
pub fn create_session(
    store: &SessionStore,
    pool: &mut KeyPool,
    name: &str,
    payload: &[u8],
    chunk_length: usize,
) -> UmailResult<Session> {
    if store.exists(name)? {
        return Err(UmailError::SessionExists {
            name: name.to_string(),
        });
    }

    let encoded = umail_otp::encode(pool, payload, chunk_length)?;
    let session = Session::start(
        name,
        pool.name(),
        encoded.pool_offset,
        &encoded.plaintext_chunks,
        &encoded.key_chunks,
    )?;

    if let Err(e) = store.create(&session) {
        error!(
            session = %name,
            pool = %pool.name(),
            pool_position = encoded.pool_offset,
            consumed = pool.current_offset() - encoded.pool_offset,
            "key material consumed but session record not written: {e}"
        );
        return Err(e);
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_session_records_provenance() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(&dir.path().join("sessions"));
        let pad: Vec<u8> = (0..=255u8).collect();
        let mut pool = KeyPool::create(&dir.path().join("test"), pad.as_slice()).unwrap();
        pool.take(5).unwrap();

        let s = create_session(&store, &mut pool, "first", b"AB", 4).unwrap();
        assert_eq!(s.pool_name(), "test");
        assert_eq!(s.pool_position(), 5);
        // [2, 0, 'A', 'B'] ^ [5, 6, 7, 8]
        assert_eq!(s.boundaries(), &[vec![2u8 ^ 5, 6, b'A' ^ 7, b'B' ^ 8]]);
        assert_eq!(pool.current_offset(), 9);
        assert_eq!(store.load("first").unwrap(), s);
    }

    #[test]
    fn test_existing_session_consumes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut pool = KeyPool::create(&dir.path().join("pool"), [0u8; 64].as_slice()).unwrap();

        create_session(&store, &mut pool, "once", b"hi", 4).unwrap();
        let offset = pool.current_offset();

        let result = create_session(&store, &mut pool, "once", b"again", 4);
        assert!(matches!(result, Err(UmailError::SessionExists { .. })));
        assert_eq!(pool.current_offset(), offset);
    }

    #[test]
    fn test_invalid_name_consumes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut pool = KeyPool::create(&dir.path().join("pool"), [0u8; 64].as_slice()).unwrap();

        let result = create_session(&store, &mut pool, "../escape", b"hi", 4);
        assert!(matches!(result, Err(UmailError::InvalidName(_))));
        assert_eq!(pool.current_offset(), 0);
    }
}
