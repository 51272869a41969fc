//! Process-scoped secret protection.
//!
//! Two variants behind one trait, selected once per process:
//! - `SoftwareProtector`: process key in memory, ChaCha keystream XOR
//! - `PlatformProtector`: same transform, but the process key is held in the
//!   OS secure store (macOS Keychain, Secret Service, Windows Credential
//!   Manager via the `keyring` crate) and fetched per operation
//!
//! The protector performs no integrity check: unprotecting with the wrong
//! entropy yields wrong plaintext, never an error. Shrouded values detect
//! that through their content hash.
//!
//! The resolved protector is memoized for the process lifetime. Ciphertext
//! produced under one process key is permanently unprotectable under
//! another, so the selection must never change mid-session.

use std::sync::OnceLock;

use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use kpv_core::{EngineConfig, KpvError, KpvResult};

use crate::keystream::{generate_key, Keystream, KeystreamKey, KeystreamRounds};
use crate::{KEY_SIZE, NONCE_SIZE};

const SERVICE_NAME: &str = "kpvault";

/// Encrypts/decrypts byte buffers under a process-scoped key.
///
/// `entropy` is caller-supplied auxiliary bytes mixed into the operation so
/// that identical plaintexts protected with different entropy yield
/// different ciphertext. The transform is length-preserving; callers pad to
/// the block boundary before protecting.
pub trait SecretProtector: Send + Sync {
    fn protect(&self, data: Vec<u8>, entropy: &[u8]) -> KpvResult<Vec<u8>>;
    fn unprotect(&self, data: Vec<u8>, entropy: &[u8]) -> KpvResult<Vec<u8>>;
}

/// Derive a per-operation nonce from caller entropy via HKDF-SHA256.
fn derive_nonce(entropy: &[u8]) -> KpvResult<[u8; NONCE_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, entropy);
    let mut nonce = [0u8; NONCE_SIZE];
    hkdf.expand(b"kpv-protector-nonce", &mut nonce)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(nonce)
}

/// Software fallback: process key lives in process memory, zeroized on drop.
pub struct SoftwareProtector {
    key: KeystreamKey,
    rounds: KeystreamRounds,
}

impl SoftwareProtector {
    pub fn new(rounds: KeystreamRounds) -> Self {
        Self {
            key: generate_key(),
            rounds,
        }
    }

    fn transform(&self, mut data: Vec<u8>, entropy: &[u8]) -> KpvResult<Vec<u8>> {
        let nonce = derive_nonce(entropy)?;
        Keystream::new(&self.key, &nonce, self.rounds).apply(&mut data);
        Ok(data)
    }
}

impl SecretProtector for SoftwareProtector {
    fn protect(&self, data: Vec<u8>, entropy: &[u8]) -> KpvResult<Vec<u8>> {
        self.transform(data, entropy)
    }

    fn unprotect(&self, data: Vec<u8>, entropy: &[u8]) -> KpvResult<Vec<u8>> {
        // XOR keystream: same operation both ways
        self.transform(data, entropy)
    }
}

/// Platform variant: the process key is held in the OS secure store and
/// fetched per operation, so it never rests in this process's heap between
/// calls. The keychain entry is per-process and removed on drop.
pub struct PlatformProtector {
    entry: keyring::Entry,
    rounds: KeystreamRounds,
}

impl PlatformProtector {
    pub fn new(rounds: KeystreamRounds) -> KpvResult<Self> {
        let entry_name = format!("process-key-{}", std::process::id());
        let entry = keyring::Entry::new(SERVICE_NAME, &entry_name)
            .map_err(|e| anyhow::anyhow!("keychain entry creation: {e}"))?;

        let key = generate_key();
        let encoded = SecretString::from(base64_encode(key.as_bytes()));
        entry
            .set_password(encoded.expose_secret())
            .map_err(|e| anyhow::anyhow!("keychain store for '{entry_name}': {e}"))?;
        tracing::debug!(entry = entry_name, "stored process key in platform keychain");

        Ok(Self { entry, rounds })
    }

    /// Check if the platform secure store is reachable.
    pub fn is_available() -> bool {
        keyring::Entry::new(SERVICE_NAME, "__kpv_probe__").is_ok()
    }

    fn fetch_key(&self) -> KpvResult<KeystreamKey> {
        let mut encoded = self
            .entry
            .get_password()
            .map_err(|e| anyhow::anyhow!("keychain fetch: {e}"))?;
        let decoded = base64_decode(&encoded);
        encoded.zeroize();
        let mut decoded = decoded?;

        if decoded.len() != KEY_SIZE {
            decoded.zeroize();
            return Err(KpvError::CryptoConfig(format!(
                "keychain process key has wrong size: {} bytes (expected {KEY_SIZE})",
                decoded.len()
            )));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(KeystreamKey::from_bytes(bytes))
    }

    fn transform(&self, mut data: Vec<u8>, entropy: &[u8]) -> KpvResult<Vec<u8>> {
        let key = self.fetch_key()?;
        let nonce = derive_nonce(entropy)?;
        Keystream::new(&key, &nonce, self.rounds).apply(&mut data);
        Ok(data)
    }
}

impl SecretProtector for PlatformProtector {
    fn protect(&self, data: Vec<u8>, entropy: &[u8]) -> KpvResult<Vec<u8>> {
        self.transform(data, entropy)
    }

    fn unprotect(&self, data: Vec<u8>, entropy: &[u8]) -> KpvResult<Vec<u8>> {
        self.transform(data, entropy)
    }
}

impl Drop for PlatformProtector {
    fn drop(&mut self) {
        if let Err(e) = self.entry.delete_credential() {
            tracing::debug!("keychain cleanup failed: {e}");
        }
    }
}

fn base64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

fn base64_decode(s: &str) -> KpvResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|e| KpvError::Format(format!("base64 decode: {e}")))
}

static PROTECTOR: OnceLock<Box<dyn SecretProtector>> = OnceLock::new();

/// Resolve the process protector from configuration, exactly once.
///
/// An invalid round count fails before anything is memoized. If a protector
/// is already resolved, the existing one is returned and the configuration
/// is ignored (re-keying mid-session would orphan existing ciphertext).
pub fn init_protector(config: &EngineConfig) -> KpvResult<&'static dyn SecretProtector> {
    let rounds = KeystreamRounds::from_u32(config.keystream.rounds)?;

    if let Some(existing) = PROTECTOR.get() {
        tracing::warn!("process protector already resolved; configuration ignored");
        return Ok(existing.as_ref());
    }

    let boxed: Box<dyn SecretProtector> = if config.protector.prefer_platform {
        if PlatformProtector::is_available() {
            match PlatformProtector::new(rounds) {
                Ok(p) => {
                    tracing::debug!("resolved platform secret protector");
                    Box::new(p)
                }
                Err(e) => {
                    tracing::warn!("platform protector setup failed: {e}, using software fallback");
                    Box::new(SoftwareProtector::new(rounds))
                }
            }
        } else {
            tracing::warn!("platform secure store unavailable, using software fallback");
            Box::new(SoftwareProtector::new(rounds))
        }
    } else {
        Box::new(SoftwareProtector::new(rounds))
    };

    Ok(PROTECTOR.get_or_init(|| boxed).as_ref())
}

/// The process protector, lazily resolved with defaults on first use.
pub fn protector() -> &'static dyn SecretProtector {
    PROTECTOR
        .get_or_init(|| Box::new(SoftwareProtector::new(KeystreamRounds::R20)))
        .as_ref()
}
