//! ChaCha keystream engine: XOR stream transform and deterministic byte source
//!
//! Encryption and decryption are the same operation (symmetric XOR keystream).
//! The round count selects the ChaCha variant; anything outside {8, 12, 20}
//! is rejected at construction.
//!
//! Invariant: a (key, nonce) pair must never protect two different plaintexts.
//! Nonce uniqueness per operation is the caller's responsibility.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha12, ChaCha20, ChaCha8, Key, Nonce};
use rand::RngCore;
use zeroize::Zeroize;

use kpv_core::{KpvError, KpvResult};

use crate::{KEY_SIZE, NONCE_SIZE};

/// ChaCha round count variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystreamRounds {
    R8,
    R12,
    R20,
}

impl KeystreamRounds {
    /// Validate a raw round count. Fails fast for anything but 8, 12 or 20.
    pub fn from_u32(rounds: u32) -> KpvResult<Self> {
        match rounds {
            8 => Ok(Self::R8),
            12 => Ok(Self::R12),
            20 => Ok(Self::R20),
            other => Err(KpvError::CryptoConfig(format!(
                "invalid ChaCha round count {other} (expected 8, 12 or 20)"
            ))),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::R8 => 8,
            Self::R12 => 12,
            Self::R20 => 20,
        }
    }
}

/// A 256-bit keystream key. Zeroized on drop.
#[derive(Clone)]
pub struct KeystreamKey {
    bytes: [u8; KEY_SIZE],
}

impl KeystreamKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for KeystreamKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for KeystreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystreamKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit keystream key.
pub fn generate_key() -> KeystreamKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    KeystreamKey::from_bytes(bytes)
}

/// Generate a random 96-bit nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

enum Inner {
    R8(ChaCha8),
    R12(ChaCha12),
    R20(ChaCha20),
}

/// A running keystream with an internal position.
///
/// Repeated `apply` calls continue where the previous one stopped, so a
/// plaintext may be transformed in arbitrary slices. The cipher state is
/// wiped on drop (`chacha20` zeroize feature).
pub struct Keystream {
    inner: Inner,
}

impl Keystream {
    pub fn new(key: &KeystreamKey, nonce: &[u8; NONCE_SIZE], rounds: KeystreamRounds) -> Self {
        let key = Key::from_slice(key.as_bytes());
        let nonce = Nonce::from_slice(nonce);
        let inner = match rounds {
            KeystreamRounds::R8 => Inner::R8(ChaCha8::new(key, nonce)),
            KeystreamRounds::R12 => Inner::R12(ChaCha12::new(key, nonce)),
            KeystreamRounds::R20 => Inner::R20(ChaCha20::new(key, nonce)),
        };
        Self { inner }
    }

    /// XOR-transform `buf` in place against the running keystream.
    pub fn apply(&mut self, buf: &mut [u8]) {
        match &mut self.inner {
            Inner::R8(cipher) => cipher.apply_keystream(buf),
            Inner::R12(cipher) => cipher.apply_keystream(buf),
            Inner::R20(cipher) => cipher.apply_keystream(buf),
        }
    }

    /// Fill `buf` with raw keystream bytes (RNG use).
    pub fn fill(&mut self, buf: &mut [u8]) {
        buf.zeroize();
        self.apply(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> KeystreamKey {
        KeystreamKey::from_bytes([7u8; KEY_SIZE])
    }

    #[test]
    fn test_apply_twice_is_identity() {
        let key = test_key();
        let nonce = [1u8; NONCE_SIZE];
        let mut data = b"attack at dawn".to_vec();

        Keystream::new(&key, &nonce, KeystreamRounds::R20).apply(&mut data);
        assert_ne!(data.as_slice(), b"attack at dawn".as_slice());

        Keystream::new(&key, &nonce, KeystreamRounds::R20).apply(&mut data);
        assert_eq!(data.as_slice(), b"attack at dawn".as_slice());
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let key = test_key();
        let nonce = [2u8; NONCE_SIZE];
        let plain: Vec<u8> = (0u8..=255).cycle().take(1000).collect();

        let mut one_shot = plain.clone();
        Keystream::new(&key, &nonce, KeystreamRounds::R12).apply(&mut one_shot);

        let mut streamed = plain.clone();
        let mut ks = Keystream::new(&key, &nonce, KeystreamRounds::R12);
        let (head, tail) = streamed.split_at_mut(337);
        ks.apply(head);
        ks.apply(tail);

        assert_eq!(one_shot, streamed, "split apply must continue the keystream");
    }

    #[test]
    fn test_fill_is_deterministic_per_key_nonce() {
        let key = test_key();
        let nonce = [3u8; NONCE_SIZE];

        let mut a = vec![0xFFu8; 64];
        Keystream::new(&key, &nonce, KeystreamRounds::R20).fill(&mut a);
        let mut b = vec![0u8; 64];
        Keystream::new(&key, &nonce, KeystreamRounds::R20).fill(&mut b);

        assert_eq!(a, b, "fill must ignore prior buffer contents");
    }

    #[test]
    fn test_different_nonces_differ() {
        let key = test_key();
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];

        Keystream::new(&key, &[4u8; NONCE_SIZE], KeystreamRounds::R20).fill(&mut a);
        Keystream::new(&key, &[5u8; NONCE_SIZE], KeystreamRounds::R20).fill(&mut b);

        assert_ne!(a, b);
    }

    #[test]
    fn test_round_variants_differ() {
        let key = test_key();
        let nonce = [6u8; NONCE_SIZE];
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];

        Keystream::new(&key, &nonce, KeystreamRounds::R8).fill(&mut a);
        Keystream::new(&key, &nonce, KeystreamRounds::R20).fill(&mut b);

        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_round_count_rejected() {
        for rounds in [0, 1, 10, 16, 21, 256] {
            let result = KeystreamRounds::from_u32(rounds);
            assert!(
                matches!(result, Err(KpvError::CryptoConfig(_))),
                "round count {rounds} must be rejected at construction"
            );
        }
    }

    #[test]
    fn test_valid_round_counts() {
        assert_eq!(KeystreamRounds::from_u32(8).unwrap().as_u32(), 8);
        assert_eq!(KeystreamRounds::from_u32(12).unwrap().as_u32(), 12);
        assert_eq!(KeystreamRounds::from_u32(20).unwrap().as_u32(), 20);
    }

    #[test]
    fn test_generated_keys_differ() {
        let k1 = generate_key();
        let k2 = generate_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }
}
