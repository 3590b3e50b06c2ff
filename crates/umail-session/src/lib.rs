//! umail-session: durable record of one mailing operation
//!
//! A session binds the ciphertext boundaries of one message to the key pool
//! and cursor position they were drawn from, plus how many boundaries have
//! been delivered so far. Sessions are stored as compact JSON, one file per
//! session name:
//!
//! ```text
//! {"email-index":0,"pool-name":"test","pool-position":0,"boundaries":[[12,200,...],...]}
//! ```

pub mod mailing;
pub mod session;
pub mod store;

pub use session::{Session, SessionStatus};
pub use store::SessionStore;
