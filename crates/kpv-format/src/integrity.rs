//! Chunked integrity stream over any byte transport.
//!
//! Frame format (all integers little-endian):
//! ```text
//! [4 bytes: sequence][32 bytes: chunk hash][4 bytes: chunk length][chunk bytes]
//! ```
//!
//! Sequences start at 0 and increase by exactly 1 per frame. The stream ends
//! with a terminal frame: length 0 and an all-zero hash sentinel. A reader
//! that reaches the terminal frame has verified every byte it served; any
//! mismatch (hash, sequence, sentinel, truncation) is a fatal integrity
//! error with no resynchronization.

use std::io::{Read, Write};

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use kpv_core::{KpvError, KpvResult};

type HmacSha256 = Hmac<Sha256>;

const HASH_SIZE: usize = 32;
const ZERO_HASH: [u8; HASH_SIZE] = [0u8; HASH_SIZE];

/// Upper bound on a single chunk (64 MiB). A corrupt length field must not
/// translate into a multi-gigabyte allocation before verification.
const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Chunk hash mode: plain SHA-256 or HMAC-SHA-256 under a 256-bit key.
#[derive(Clone)]
pub enum IntegrityKey {
    Unkeyed,
    Keyed([u8; 32]),
}

impl IntegrityKey {
    fn hash_chunk(&self, chunk: &[u8]) -> [u8; HASH_SIZE] {
        match self {
            IntegrityKey::Unkeyed => Sha256::digest(chunk).into(),
            IntegrityKey::Keyed(key) => {
                let mut mac =
                    HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
                mac.update(chunk);
                mac.finalize().into_bytes().into()
            }
        }
    }
}

impl Drop for IntegrityKey {
    fn drop(&mut self) {
        if let IntegrityKey::Keyed(key) = self {
            key.zeroize();
        }
    }
}

impl std::fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityKey::Unkeyed => f.write_str("IntegrityKey::Unkeyed"),
            IntegrityKey::Keyed(_) => f.write_str("IntegrityKey::Keyed([REDACTED])"),
        }
    }
}

/// Writes signed frames to an underlying stream.
pub struct IntegrityWriter<W: Write> {
    inner: W,
    key: IntegrityKey,
    seq: u32,
}

impl<W: Write> IntegrityWriter<W> {
    pub fn new(inner: W, key: IntegrityKey) -> Self {
        Self { inner, key, seq: 0 }
    }

    /// Emit one frame for `chunk`. Empty chunks are skipped: a zero length
    /// is reserved for the terminator.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> KpvResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        if chunk.len() > MAX_CHUNK_SIZE {
            return Err(KpvError::Format(format!(
                "chunk too large: {} bytes (maximum {MAX_CHUNK_SIZE})",
                chunk.len()
            )));
        }
        let len = chunk.len() as u32;

        let hash = self.key.hash_chunk(chunk);
        self.inner.write_all(&self.seq.to_le_bytes())?;
        self.inner.write_all(&hash)?;
        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(chunk)?;
        self.seq += 1;
        Ok(())
    }

    /// Emit the terminal frame and return the underlying writer.
    pub fn finish(mut self) -> KpvResult<W> {
        self.inner.write_all(&self.seq.to_le_bytes())?;
        self.inner.write_all(&ZERO_HASH)?;
        self.inner.write_all(&0u32.to_le_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reads and verifies signed frames from an underlying stream.
///
/// Chunk contents may be secret, so the internal buffer wipes itself when
/// replaced or dropped.
pub struct IntegrityReader<R: Read> {
    inner: R,
    key: IntegrityKey,
    expected_seq: u32,
    buffer: Zeroizing<Vec<u8>>,
    pos: usize,
    eos: bool,
}

impl<R: Read> IntegrityReader<R> {
    pub fn new(inner: R, key: IntegrityKey) -> Self {
        Self {
            inner,
            key,
            expected_seq: 0,
            buffer: Zeroizing::new(Vec::new()),
            pos: 0,
            eos: false,
        }
    }

    /// Serve up to `buf.len()` verified bytes. Returns 0 only at the
    /// (verified) end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> KpvResult<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.pos >= self.buffer.len() {
                if self.eos || !self.pull_frame()? {
                    break;
                }
            }
            let n = (buf.len() - written).min(self.buffer.len() - self.pos);
            buf[written..written + n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }
        Ok(written)
    }

    /// Read and verify everything up to the terminal frame.
    pub fn read_to_end(&mut self) -> KpvResult<Zeroizing<Vec<u8>>> {
        let mut out = Zeroizing::new(Vec::new());
        loop {
            if self.pos >= self.buffer.len() {
                if self.eos || !self.pull_frame()? {
                    break;
                }
            }
            out.extend_from_slice(&self.buffer[self.pos..]);
            self.pos = self.buffer.len();
        }
        Ok(out)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> KpvResult<()> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                KpvError::Integrity("stream truncated mid-frame".into())
            }
            _ => KpvError::Io(e),
        })
    }

    /// Pull and verify the next frame. Returns false when the terminal
    /// frame was consumed.
    fn pull_frame(&mut self) -> KpvResult<bool> {
        let mut seq_bytes = [0u8; 4];
        self.read_exact(&mut seq_bytes)?;
        let seq = u32::from_le_bytes(seq_bytes);
        if seq != self.expected_seq {
            return Err(KpvError::Integrity(format!(
                "frame sequence {seq}, expected {}",
                self.expected_seq
            )));
        }

        let mut hash = [0u8; HASH_SIZE];
        self.read_exact(&mut hash)?;

        let mut len_bytes = [0u8; 4];
        self.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len == 0 {
            if hash != ZERO_HASH {
                return Err(KpvError::Integrity(
                    "terminal frame carries a non-zero hash".into(),
                ));
            }
            self.eos = true;
            return Ok(false);
        }

        if len > MAX_CHUNK_SIZE {
            return Err(KpvError::Format(format!(
                "chunk length {len} exceeds maximum {MAX_CHUNK_SIZE}"
            )));
        }

        let mut chunk = Zeroizing::new(vec![0u8; len]);
        self.read_exact(&mut chunk)?;
        if self.key.hash_chunk(&chunk) != hash {
            return Err(KpvError::Integrity(format!(
                "chunk hash mismatch at sequence {seq}"
            )));
        }

        self.buffer = chunk;
        self.pos = 0;
        self.expected_seq += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn write_stream(key: IntegrityKey, chunks: &[&[u8]]) -> Vec<u8> {
        let mut writer = IntegrityWriter::new(Vec::new(), key);
        for chunk in chunks {
            writer.write_chunk(chunk).unwrap();
        }
        writer.finish().unwrap()
    }

    fn read_stream(key: IntegrityKey, bytes: &[u8]) -> KpvResult<Vec<u8>> {
        let mut reader = IntegrityReader::new(Cursor::new(bytes), key);
        reader.read_to_end().map(|z| z.to_vec())
    }

    #[test]
    fn roundtrip_multiple_chunks() {
        let chunks: [&[u8]; 3] = [b"first chunk", b"second", b"third chunk here"];
        let bytes = write_stream(IntegrityKey::Unkeyed, &chunks);
        let out = read_stream(IntegrityKey::Unkeyed, &bytes).unwrap();
        assert_eq!(out, b"first chunksecondthird chunk here");
    }

    #[test]
    fn roundtrip_keyed() {
        let key = [0x42u8; 32];
        let bytes = write_stream(IntegrityKey::Keyed(key), &[b"payload one", b"payload two"]);
        let out = read_stream(IntegrityKey::Keyed(key), &bytes).unwrap();
        assert_eq!(out, b"payload onepayload two");
    }

    #[test]
    fn empty_stream_roundtrip() {
        let bytes = write_stream(IntegrityKey::Unkeyed, &[]);
        // header-less format: just the terminal frame
        assert_eq!(bytes.len(), 4 + 32 + 4);
        let out = read_stream(IntegrityKey::Unkeyed, &bytes).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn empty_write_is_skipped() {
        let mut writer = IntegrityWriter::new(Vec::new(), IntegrityKey::Unkeyed);
        writer.write_chunk(b"").unwrap();
        writer.write_chunk(b"data").unwrap();
        let bytes = writer.finish().unwrap();
        let out = read_stream(IntegrityKey::Unkeyed, &bytes).unwrap();
        assert_eq!(out, b"data");
    }

    #[test]
    fn partial_reads_span_chunk_boundaries() {
        let bytes = write_stream(IntegrityKey::Unkeyed, &[b"abcde", b"fghij", b"klm"]);
        let mut reader = IntegrityReader::new(Cursor::new(&bytes), IntegrityKey::Unkeyed);

        let mut collected = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"abcdefghijklm");
    }

    #[test]
    fn payload_bit_flip_detected() {
        let mut bytes = write_stream(IntegrityKey::Unkeyed, &[b"sensitive payload"]);
        // first payload byte lives after the 40-byte frame header
        bytes[40] ^= 0x01;
        let result = read_stream(IntegrityKey::Unkeyed, &bytes);
        assert!(matches!(result, Err(KpvError::Integrity(_))));
    }

    #[test]
    fn hash_bit_flip_detected() {
        let mut bytes = write_stream(IntegrityKey::Unkeyed, &[b"sensitive payload"]);
        bytes[4] ^= 0x80;
        let result = read_stream(IntegrityKey::Unkeyed, &bytes);
        assert!(matches!(result, Err(KpvError::Integrity(_))));
    }

    #[test]
    fn sequence_tamper_detected() {
        let mut bytes = write_stream(IntegrityKey::Unkeyed, &[b"sensitive payload"]);
        bytes[0] ^= 0x01;
        let result = read_stream(IntegrityKey::Unkeyed, &bytes);
        assert!(matches!(result, Err(KpvError::Integrity(_))));
    }

    #[test]
    fn frame_reorder_detected() {
        let c1: &[u8] = b"chunk-one";
        let c2: &[u8] = b"chunk-two!";
        let bytes = write_stream(IntegrityKey::Unkeyed, &[c1, c2]);

        let f1 = 40 + c1.len();
        let f2 = f1 + 40 + c2.len();
        let mut swapped = Vec::new();
        swapped.extend_from_slice(&bytes[f1..f2]);
        swapped.extend_from_slice(&bytes[..f1]);
        swapped.extend_from_slice(&bytes[f2..]);

        let result = read_stream(IntegrityKey::Unkeyed, &swapped);
        assert!(matches!(result, Err(KpvError::Integrity(_))));
    }

    #[test]
    fn truncation_detected() {
        let bytes = write_stream(IntegrityKey::Unkeyed, &[b"sensitive payload"]);
        // drop the terminal frame entirely, then cut into the last chunk
        for cut in [bytes.len() - 40, bytes.len() - 45] {
            let result = read_stream(IntegrityKey::Unkeyed, &bytes[..cut]);
            assert!(
                matches!(result, Err(KpvError::Integrity(_))),
                "truncation at {cut} must fail"
            );
        }
    }

    #[test]
    fn terminal_sentinel_tamper_detected() {
        let mut bytes = write_stream(IntegrityKey::Unkeyed, &[b"data"]);
        // terminal frame hash starts 36 bytes before the end
        let n = bytes.len();
        bytes[n - 36] ^= 0xFF;
        let result = read_stream(IntegrityKey::Unkeyed, &bytes);
        assert!(matches!(result, Err(KpvError::Integrity(_))));
    }

    #[test]
    fn wrong_key_detected() {
        let bytes = write_stream(IntegrityKey::Keyed([1u8; 32]), &[b"payload"]);
        let result = read_stream(IntegrityKey::Keyed([2u8; 32]), &bytes);
        assert!(matches!(result, Err(KpvError::Integrity(_))));
    }

    #[test]
    fn keyed_and_unkeyed_are_incompatible() {
        let bytes = write_stream(IntegrityKey::Keyed([1u8; 32]), &[b"payload"]);
        let result = read_stream(IntegrityKey::Unkeyed, &bytes);
        assert!(matches!(result, Err(KpvError::Integrity(_))));
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.bin");

        let file = std::fs::File::create(&path).unwrap();
        let mut writer = IntegrityWriter::new(file, IntegrityKey::Keyed([7u8; 32]));
        writer.write_chunk(b"persisted chunk").unwrap();
        writer.finish().unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let mut reader = IntegrityReader::new(file, IntegrityKey::Keyed([7u8; 32]));
        let out = reader.read_to_end().unwrap();
        assert_eq!(out.as_slice(), b"persisted chunk");
    }

    proptest! {
        #[test]
        fn chunked_roundtrip(
            chunks in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 1..=256),
                0..=8,
            ),
            keyed in any::<bool>(),
        ) {
            let key = || if keyed { IntegrityKey::Keyed([9u8; 32]) } else { IntegrityKey::Unkeyed };
            let refs: Vec<&[u8]> = chunks.iter().map(|c| c.as_slice()).collect();
            let bytes = write_stream(key(), &refs);
            let out = read_stream(key(), &bytes).unwrap();
            let expected: Vec<u8> = chunks.concat();
            prop_assert_eq!(out, expected);
        }

        #[test]
        fn any_single_bit_flip_fails(
            flip_byte in 0usize..56,
        ) {
            // one 16-byte chunk: 40-byte frame + 16 payload bytes
            let bytes = write_stream(IntegrityKey::Unkeyed, &[&[0xA5u8; 16]]);
            prop_assume!(flip_byte < bytes.len());
            let mut tampered = bytes.clone();
            tampered[flip_byte] ^= 0x04;
            let result = read_stream(IntegrityKey::Unkeyed, &tampered);
            prop_assert!(result.is_err(), "bit flip at byte {} must not be served silently", flip_byte);
        }
    }
}
