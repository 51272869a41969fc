//! Shrouded values: secrets that stay encrypted while resident in memory.
//!
//! A shrouded value holds only the protected form of a secret, plus a BLAKE3
//! content hash computed over the original plaintext before encryption. The
//! hash gives content-addressed equality: two values compare without either
//! being decrypted. Plaintext exists only inside a `read()` call, returned
//! in a `Zeroizing` buffer that wipes itself when the caller's scope ends.
//!
//! Values are immutable once constructed; "updating" a field means building
//! a new value.

use rand::RngCore;
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use kpv_core::{KpvError, KpvResult};

use crate::protector::protector;
use crate::{BLOCK_SIZE, ENTROPY_SIZE};

fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// An immutable byte secret, encrypted in memory.
pub struct ShroudedBytes {
    ciphertext: Vec<u8>,
    hash: [u8; 32],
    len: usize,
    entropy: [u8; ENTROPY_SIZE],
    id: Uuid,
}

impl ShroudedBytes {
    /// Shroud a plaintext buffer.
    ///
    /// The buffer is consumed: it is hashed, zero-padded to the block
    /// boundary and transformed in place, so no unprotected copy survives
    /// this call.
    pub fn new(plaintext: Vec<u8>) -> KpvResult<Self> {
        let hash: [u8; 32] = blake3::hash(&plaintext).into();
        let len = plaintext.len();

        let mut entropy = [0u8; ENTROPY_SIZE];
        rand::thread_rng().fill_bytes(&mut entropy);

        let mut padded = plaintext;
        padded.resize(padded_len(len), 0);
        let ciphertext = protector().protect(padded, &entropy)?;

        Ok(Self {
            ciphertext,
            hash,
            len,
            entropy,
            id: Uuid::new_v4(),
        })
    }

    /// True (unpadded) length of the secret in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Decrypt and return the plaintext in a self-wiping buffer.
    ///
    /// The content hash is re-checked after decryption; a mismatch means the
    /// process key or entropy no longer matches what protected this value
    /// and surfaces as an integrity error instead of silent garbage.
    pub fn read(&self) -> KpvResult<Zeroizing<Vec<u8>>> {
        let plain = protector().unprotect(self.ciphertext.clone(), &self.entropy)?;
        let mut plain = Zeroizing::new(plain);
        plain[self.len..].zeroize();
        plain.truncate(self.len);

        if <[u8; 32]>::from(blake3::hash(&plain)) != self.hash {
            return Err(KpvError::Integrity(
                "shrouded value content hash mismatch after unprotect".into(),
            ));
        }
        Ok(plain)
    }
}

impl PartialEq for ShroudedBytes {
    /// Content-addressed equality: identifier fast path first, then hash
    /// comparison. Never decrypts.
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && (self.id == other.id || self.hash == other.hash)
    }
}

impl Eq for ShroudedBytes {}

impl Clone for ShroudedBytes {
    fn clone(&self) -> Self {
        // clones share the identifier: they are the same logical value
        Self {
            ciphertext: self.ciphertext.clone(),
            hash: self.hash,
            len: self.len,
            entropy: self.entropy,
            id: self.id,
        }
    }
}

impl Drop for ShroudedBytes {
    fn drop(&mut self) {
        self.ciphertext.zeroize();
        self.hash.zeroize();
        self.entropy.zeroize();
    }
}

impl std::fmt::Debug for ShroudedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShroudedBytes")
            .field("len", &self.len)
            .field("data", &"[SHROUDED]")
            .finish()
    }
}

/// An immutable text secret, encrypted in memory.
///
/// Tracks the decoded character count separately from the UTF-8 byte
/// length, so multi-byte text reports both faithfully.
#[derive(Clone)]
pub struct ShroudedChars {
    inner: ShroudedBytes,
    char_count: usize,
}

impl ShroudedChars {
    pub fn new(text: &str) -> KpvResult<Self> {
        Ok(Self {
            char_count: text.chars().count(),
            inner: ShroudedBytes::new(text.as_bytes().to_vec())?,
        })
    }

    pub fn empty() -> KpvResult<Self> {
        Self::new("")
    }

    /// UTF-8 byte length.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Decoded character count (distinct from the byte length).
    pub fn char_count(&self) -> usize {
        self.char_count
    }

    /// Decrypt and return the raw UTF-8 bytes.
    pub fn read(&self) -> KpvResult<Zeroizing<Vec<u8>>> {
        self.inner.read()
    }

    /// Decrypt and return the text in a self-wiping string.
    pub fn read_str(&self) -> KpvResult<Zeroizing<String>> {
        let mut guard = self.inner.read()?;
        let bytes = std::mem::take(&mut *guard);
        match String::from_utf8(bytes) {
            Ok(s) => Ok(Zeroizing::new(s)),
            Err(e) => {
                let mut bytes = e.into_bytes();
                bytes.zeroize();
                Err(KpvError::Format("shrouded text is not valid UTF-8".into()))
            }
        }
    }
}

impl PartialEq for ShroudedChars {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for ShroudedChars {}

impl std::fmt::Debug for ShroudedChars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShroudedChars")
            .field("len", &self.inner.len())
            .field("chars", &self.char_count)
            .field("data", &"[SHROUDED]")
            .finish()
    }
}
