//! Session record and its send-progress state machine
//!
//! ```text
//! Created (index = 0) ──advance──▶ InProgress (0 < index < total) ──advance──▶ Complete (index = total)
//!        ▲                                   │                                       │
//!        └────────────── reset_progress ─────┴───────────────────────────────────────┘
//! ```
//!
//! The chunk count is fixed at creation; no operation changes it.

use serde::{Deserialize, Serialize};
use tracing::info;
use umail_core::{UmailError, UmailResult};
use umail_otp::combine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing delivered yet
    Created,
    /// Some but not all boundaries delivered
    InProgress,
    /// Every boundary delivered
    Complete,
}

/// One mailing operation. Field order is the on-disk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(skip)]
    name: String,
    /// Number of boundaries already delivered
    #[serde(rename = "email-index")]
    email_index: usize,
    /// Key pool the boundaries were drawn from
    #[serde(rename = "pool-name")]
    pool_name: String,
    /// Pool cursor before the draw
    #[serde(rename = "pool-position")]
    pool_position: u64,
    /// Ciphertext chunks, in send order
    boundaries: Vec<Vec<u8>>,
}

impl Session {
    /// XOR each plaintext chunk with its key chunk and record the provenance.
    pub fn start<P, K>(
        name: &str,
        pool_name: &str,
        pool_offset: u64,
        plaintext_chunks: &[P],
        key_chunks: &[K],
    ) -> UmailResult<Self>
    where
        P: AsRef<[u8]>,
        K: AsRef<[u8]>,
    {
        if plaintext_chunks.len() != key_chunks.len() {
            return Err(UmailError::ChunkCountMismatch {
                plaintext: plaintext_chunks.len(),
                key: key_chunks.len(),
            });
        }
        let Some(first) = plaintext_chunks.first() else {
            return Err(UmailError::InvalidCount(
                "a session needs at least one chunk".into(),
            ));
        };
        let chunk_length = first.as_ref().len();
        if chunk_length == 0 {
            return Err(UmailError::InvalidCount("chunks must not be empty".into()));
        }
        if let Some(bad) = plaintext_chunks
            .iter()
            .map(|p| p.as_ref().len())
            .find(|&len| len != chunk_length)
        {
            return Err(UmailError::LengthMismatch {
                left: bad,
                right: chunk_length,
            });
        }

        let boundaries = plaintext_chunks
            .iter()
            .zip(key_chunks)
            .map(|(p, k)| combine(p.as_ref(), k.as_ref()))
            .collect::<UmailResult<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            email_index: 0,
            pool_name: pool_name.to_string(),
            pool_position: pool_offset,
            boundaries,
        })
    }

    /// Check the invariants of a record read from disk.
    pub(crate) fn validate(&self) -> UmailResult<()> {
        let Some(first) = self.boundaries.first() else {
            return Err(UmailError::corrupt_session(&self.name, "no boundaries"));
        };
        let chunk_length = first.len();
        if chunk_length == 0 {
            return Err(UmailError::corrupt_session(&self.name, "empty boundary"));
        }
        if let Some(i) = self.boundaries.iter().position(|b| b.len() != chunk_length) {
            return Err(UmailError::corrupt_session(
                &self.name,
                format!(
                    "boundary {i} is {} bytes, expected {chunk_length}",
                    self.boundaries[i].len()
                ),
            ));
        }
        if self.email_index > self.boundaries.len() {
            return Err(UmailError::corrupt_session(
                &self.name,
                format!(
                    "email-index {} exceeds {} boundaries",
                    self.email_index,
                    self.boundaries.len()
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Record one successful delivery.
    pub fn advance(&mut self) -> UmailResult<()> {
        if self.email_index >= self.boundaries.len() {
            return Err(UmailError::AlreadyComplete {
                name: self.name.clone(),
                total: self.boundaries.len(),
            });
        }
        self.email_index += 1;
        info!(
            session = %self.name,
            sent = self.email_index,
            total = self.boundaries.len(),
            "session advanced"
        );
        Ok(())
    }

    /// Start delivery over from the first boundary. The boundaries and the
    /// key provenance are left untouched; no key material is drawn.
    pub fn reset_progress(&mut self) {
        if self.email_index != 0 {
            info!(session = %self.name, from = self.email_index, "session progress reset");
        }
        self.email_index = 0;
    }

    /// Boundaries still to be delivered.
    pub fn remaining(&self) -> usize {
        self.boundaries.len() - self.email_index
    }

    pub fn status(&self) -> SessionStatus {
        match self.email_index {
            0 => SessionStatus::Created,
            i if i < self.boundaries.len() => SessionStatus::InProgress,
            _ => SessionStatus::Complete,
        }
    }

    /// The boundary the delivery loop should send next.
    pub fn next_boundary(&self) -> Option<&[u8]> {
        self.boundaries.get(self.email_index).map(Vec::as_slice)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn progress(&self) -> usize {
        self.email_index
    }

    pub fn total(&self) -> usize {
        self.boundaries.len()
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn pool_position(&self) -> u64 {
        self.pool_position
    }

    pub fn boundaries(&self) -> &[Vec<u8>] {
        &self.boundaries
    }

    /// Compact JSON with fields in on-disk order.
    pub fn to_json(&self) -> UmailResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| UmailError::corrupt_session(&self.name, format!("serializing: {e}")))
    }

    /// Parse and validate a stored record.
    pub fn from_json(name: &str, bytes: &[u8]) -> UmailResult<Self> {
        let mut session: Session = serde_json::from_slice(bytes)
            .map_err(|e| UmailError::corrupt_session(name, e.to_string()))?;
        session.set_name(name);
        session.validate()?;
        Ok(session)
    }
}
