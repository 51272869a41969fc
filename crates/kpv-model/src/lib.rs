//! kpv-model: entry data collections backed by shrouded values
//!
//! Field names compare case-insensitively (ASCII ordinal); all secret
//! payloads are held as [`kpv_crypto::ShroudedChars`] /
//! [`kpv_crypto::ShroudedBytes`] and never decrypted for collection
//! bookkeeping (membership and equality ride on content hashes).

pub mod binaries;
pub mod fields;
pub mod name;

pub use binaries::{KpBinarySet, KpSortedBinaryMap};
pub use fields::KpFields;
pub use name::FieldName;
