//! kpv-crypto: in-memory secret shrouding for kpvault
//!
//! Pipeline: plaintext → BLAKE3 content hash → zero-pad to block boundary →
//! process protector (keystream XOR) → ciphertext held in memory
//!
//! Protection hierarchy:
//! ```text
//! Process Key (256-bit random, one per process lifetime)
//!   ├── SoftwareProtector: key in process memory, ChaCha keystream XOR
//!   │   └── per-value nonce: HKDF-SHA256(entropy, domain="kpv-protector-nonce")
//!   └── PlatformProtector: same transform, key held in the OS secure store
//! ShroudedBytes / ShroudedChars: ciphertext + BLAKE3(plaintext) + true length
//! ```

pub mod keystream;
pub mod protector;
pub mod shroud;

pub use keystream::{generate_key, generate_nonce, Keystream, KeystreamKey, KeystreamRounds};
pub use protector::{
    init_protector, protector, PlatformProtector, SecretProtector, SoftwareProtector,
};
pub use shroud::{ShroudedBytes, ShroudedChars};

/// Size of a keystream key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a ChaCha (IETF) nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Shrouded values are padded to a multiple of this block size
pub const BLOCK_SIZE: usize = 16;

/// Size of the per-value entropy mixed into each protect operation
pub const ENTROPY_SIZE: usize = 32;
