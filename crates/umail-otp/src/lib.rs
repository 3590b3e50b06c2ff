//! umail-otp: one-time-pad core for hiding a message in MIME boundaries
//!
//! Pipeline (sender): payload → length-prefixed frame → fixed-size chunks
//! → XOR with an equal number of key chunks drawn from the pool → hex boundaries
//!
//! Pipeline (receiver): hex boundaries → XOR with the same key chunks drawn
//! from the receiver's copy of the pool → frame → payload
//!
//! ```text
//! pool file:  [8 bytes: LE u64 cursor][N bytes: key material]
//! frame:      [2 bytes: LE u16 payload length][payload][zero padding]
//! ```

pub mod boundary;
pub mod cipher;
pub mod frame;
pub mod message;
pub mod pool;

pub use cipher::combine;
pub use frame::{chunk_count, frame, read_payload, unframe, MAX_PAYLOAD_LEN};
pub use message::{encode, reveal, Encoded};
pub use pool::{KeyBytes, KeyPool, HEADER_LEN};
