//! kpv-format: tamper-evident serialization primitives
//!
//! Two wire formats sit beneath the vault record layer:
//!
//! - [`integrity`]: a chunked stream where every chunk is signed (SHA-256 or
//!   HMAC-SHA-256) and sequence-numbered, so any bit flip, truncation,
//!   reorder or injection fails loudly on read.
//! - [`kpmap`]: a versioned binary map of typed key/value pairs with a
//!   critical-version gate.
//!
//! All multi-byte integers in both formats are little-endian.

pub mod integrity;
pub mod kpmap;

pub use integrity::{IntegrityKey, IntegrityReader, IntegrityWriter};
pub use kpmap::{KpMap, KpValue};
