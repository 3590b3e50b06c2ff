//! File-backed key pool with a durable read cursor
//!
//! Pool file format (binary):
//! ```text
//! [8 bytes: little-endian u64 cursor][N bytes: raw key material]
//! ```
//!
//! The cursor counts key bytes already consumed from the start of the key
//! region. It is rewritten in place (and synced) on every successful `take`
//! before any bytes are handed to the caller. The key region is never
//! modified after creation.
//!
//! There is no locking. Two processes drawing from the same pool at once can
//! both read the same cursor and hand out the same key bytes twice; access to
//! a pool must be serialized by the operator.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, warn};
use umail_core::{UmailError, UmailResult};
use zeroize::Zeroizing;

/// Size of the cursor header in bytes
pub const HEADER_LEN: u64 = 8;

/// Key material handed out by the pool. Wiped on drop.
pub type KeyBytes = Zeroizing<Vec<u8>>;

const COPY_BUF_LEN: usize = 64 * 1024;

/// An open key pool: one file handle plus an in-memory mirror of the
/// persisted cursor. All cursor mutation goes through `take` and `set_offset`.
pub struct KeyPool {
    name: String,
    path: PathBuf,
    file: File,
    cursor: u64,
    len: u64,
}

impl KeyPool {
    /// Create a new pool at `path` holding a verbatim copy of `source`.
    ///
    /// Fails with `PoolExists` rather than overwriting an existing file.
    /// If `source` cannot be read to the end, the partial pool file is removed.
    pub fn create<R: Read>(path: &Path, mut source: R) -> UmailResult<Self> {
        let name = pool_name(path);
        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(UmailError::PoolExists {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let len = match write_new_pool(&mut file, &mut source) {
            Ok(len) => len,
            Err(e) => {
                drop(file);
                if let Err(rm) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), "failed to remove partial key pool: {rm}");
                }
                return Err(e);
            }
        };

        info!(pool = %name, path = %path.display(), len, "created key pool");

        Ok(Self {
            name,
            path: path.to_path_buf(),
            file,
            cursor: 0,
            len,
        })
    }

    /// Create a new pool holding `len` bytes from the operating system RNG.
    pub fn create_random(path: &Path, len: u64) -> UmailResult<Self> {
        if len == 0 {
            return Err(UmailError::InvalidCount(
                "a random key pool needs at least 1 byte".into(),
            ));
        }
        Self::create(path, OsRandomSource { remaining: len })
    }

    /// Open an existing pool and load its persisted cursor.
    pub fn open(path: &Path) -> UmailResult<Self> {
        let name = pool_name(path);
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN {
            return Err(UmailError::corrupt_pool(
                &name,
                format!("file is {file_len} bytes, too short for the {HEADER_LEN}-byte cursor header"),
            ));
        }
        let len = file_len - HEADER_LEN;

        let cursor = read_cursor(&mut file)?;
        if cursor > len {
            return Err(UmailError::corrupt_pool(
                &name,
                format!("cursor {cursor} is beyond the end of the {len} key bytes"),
            ));
        }

        debug!(pool = %name, cursor, len, "opened key pool");

        Ok(Self {
            name,
            path: path.to_path_buf(),
            file,
            cursor,
            len,
        })
    }

    /// Consume exactly `count` key bytes starting at the cursor.
    ///
    /// The advanced cursor is written and synced before the bytes are
    /// returned. On any error the in-memory cursor is left where it was and
    /// no bytes are returned; callers must still treat the range as possibly
    /// consumed, since the header write may have reached the disk.
    pub fn take(&mut self, count: usize) -> UmailResult<KeyBytes> {
        if count == 0 {
            return Err(UmailError::InvalidCount(
                "cannot take 0 bytes from a key pool".into(),
            ));
        }

        let requested = count as u64;
        let available = self.remaining();
        if requested > available {
            return Err(UmailError::KeyExhausted {
                pool: self.name.clone(),
                requested,
                available,
            });
        }

        let mut bytes = Zeroizing::new(vec![0u8; count]);
        self.file.seek(SeekFrom::Start(HEADER_LEN + self.cursor))?;
        self.file.read_exact(&mut bytes)?;

        let new_cursor = self.cursor + requested;
        write_cursor(&mut self.file, new_cursor)?;

        debug!(
            pool = %self.name,
            from = self.cursor,
            to = new_cursor,
            count,
            "consumed key bytes"
        );
        self.cursor = new_cursor;
        Ok(bytes)
    }

    /// Consume `chunk_count * chunk_length` bytes in one `take` and split
    /// them into `chunk_count` slices in pool order.
    pub fn take_chunks(&mut self, chunk_count: usize, chunk_length: usize) -> UmailResult<Vec<KeyBytes>> {
        if chunk_count == 0 || chunk_length == 0 {
            return Err(UmailError::InvalidCount(format!(
                "cannot take {chunk_count} chunks of {chunk_length} bytes"
            )));
        }
        let total = chunk_count.checked_mul(chunk_length).ok_or_else(|| {
            UmailError::InvalidCount(format!(
                "{chunk_count} chunks of {chunk_length} bytes overflows"
            ))
        })?;

        let bytes = self.take(total)?;
        Ok(bytes
            .chunks(chunk_length)
            .map(|c| Zeroizing::new(c.to_vec()))
            .collect())
    }

    /// Number of key bytes already consumed.
    pub fn current_offset(&self) -> u64 {
        self.cursor
    }

    /// Overwrite the persisted cursor without reading any key bytes.
    ///
    /// Moving the cursor backwards makes already-used key bytes available
    /// again. Anything encrypted with the re-read range loses the one-time
    /// pad guarantee.
    pub fn set_offset(&mut self, position: u64) -> UmailResult<()> {
        if position > self.len {
            return Err(UmailError::InvalidOffset {
                pool: self.name.clone(),
                requested: position,
                len: self.len,
            });
        }

        write_cursor(&mut self.file, position)?;

        if position < self.cursor {
            warn!(
                pool = %self.name,
                from = self.cursor,
                to = position,
                "key pool cursor rewound; bytes {position}..{} will be reused",
                self.cursor
            );
        } else {
            info!(pool = %self.name, from = self.cursor, to = position, "key pool cursor moved");
        }
        self.cursor = position;
        Ok(())
    }

    /// `set_offset` that refuses to move the cursor backwards unless
    /// `allow_rewind` is set. Moving forward only skips key and is always
    /// allowed.
    pub fn reposition(&mut self, position: u64, allow_rewind: bool) -> UmailResult<()> {
        if position < self.cursor && !allow_rewind {
            return Err(UmailError::RewindRefused {
                pool: self.name.clone(),
                from: self.cursor,
                to: position,
            });
        }
        self.set_offset(position)
    }

    /// Total key bytes in the pool (header excluded).
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Key bytes not yet consumed.
    pub fn remaining(&self) -> u64 {
        self.len - self.cursor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// BLAKE3 digest of the whole key region as lowercase hex.
    ///
    /// Two copies of the same pad have the same fingerprint regardless of
    /// their cursors.
    pub fn fingerprint(&self) -> UmailResult<String> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(HEADER_LEN))?;

        let mut hasher = blake3::Hasher::new();
        let mut buf = Zeroizing::new(vec![0u8; COPY_BUF_LEN]);
        let mut left = self.len;
        while left > 0 {
            let want = left.min(COPY_BUF_LEN as u64) as usize;
            file.read_exact(&mut buf[..want])?;
            hasher.update(&buf[..want]);
            left -= want as u64;
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

impl std::fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPool")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("cursor", &self.cursor)
            .field("len", &self.len)
            .finish()
    }
}

fn pool_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Write a zero cursor followed by everything in `source`, then sync.
/// Returns the number of key bytes written.
fn write_new_pool<R: Read>(file: &mut File, source: &mut R) -> UmailResult<u64> {
    file.write_all(&0u64.to_le_bytes())?;

    let mut buf = Zeroizing::new(vec![0u8; COPY_BUF_LEN]);
    let mut len = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        file.write_all(&buf[..n])?;
        len += n as u64;
    }

    file.sync_all()?;
    Ok(len)
}

fn read_cursor(file: &mut File) -> UmailResult<u64> {
    let mut header = [0u8; HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;
    Ok(u64::from_le_bytes(header))
}

fn write_cursor(file: &mut File, cursor: u64) -> UmailResult<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&cursor.to_le_bytes())?;
    file.sync_data()?;
    Ok(())
}

/// `Read` adapter over the OS RNG yielding a fixed number of bytes.
struct OsRandomSource {
    remaining: u64,
}

impl Read for OsRandomSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.remaining.min(buf.len() as u64) as usize;
        if n == 0 {
            return Ok(0);
        }
        OsRng
            .try_fill_bytes(&mut buf[..n])
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.remaining -= n as u64;
        Ok(n)
    }
}
