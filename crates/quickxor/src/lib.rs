//! Streaming QuickXorHash implementation.
//!
//! QuickXorHash is the content hash the drive service reports for uploaded
//! files: input bytes are XORed into a 1760-byte circular accumulator, which
//! is then folded into a 160-bit digest with an 11-bit stagger, and the total
//! input length is XORed into the digest tail. The service reports the digest
//! base64-encoded in the item's hash facet.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::AsyncReadExt;

/// Digest width in bytes (160 bits).
pub const DIGEST_SIZE: usize = 20;

/// Bit positions advance by this much per accumulator byte during folding.
const SHIFT: usize = 11;

/// Accumulator width: one byte per digest bit position times the stagger.
const DATA_SIZE: usize = SHIFT * 8 * DIGEST_SIZE;

/// Read buffer for whole-file hashing.
const READ_BUF_SIZE: usize = 64 * 1024;

/// Incremental QuickXorHash state.
///
/// Bytes can be fed in any split; the digest depends only on the
/// concatenated input. [`finalize`](Self::finalize) does not consume the
/// state, so more input can be fed afterwards, and
/// [`reset`](Self::reset) returns the state to empty for reuse.
pub struct QuickXorHash {
    data: [u8; DATA_SIZE],
    size: u64,
}

impl QuickXorHash {
    pub fn new() -> Self {
        Self {
            data: [0u8; DATA_SIZE],
            size: 0,
        }
    }

    /// XORs `input` into the circular accumulator.
    pub fn update(&mut self, input: &[u8]) {
        let mut consumed = 0;
        let offset = (self.size % DATA_SIZE as u64) as usize;

        // Finish the lap in progress.
        if offset != 0 {
            consumed += xor_into(&mut self.data[offset..], input);
        }

        if consumed != input.len() {
            // Whole laps, then the remainder from the top.
            while input.len() - consumed >= DATA_SIZE {
                consumed += xor_into(&mut self.data, &input[consumed..]);
            }
            xor_into(&mut self.data, &input[consumed..]);
        }

        self.size += input.len() as u64;
    }

    /// Derives the 20-byte digest from the current state.
    pub fn finalize(&self) -> [u8; DIGEST_SIZE] {
        // Fold each accumulator byte into the digest at an 11-bit stagger.
        // The scratch has one spare byte so a shift spilling past the end
        // lands there; the spare is folded back into byte 0 afterwards.
        let mut folded = [0u8; DIGEST_SIZE + 1];
        for (i, &byte) in self.data.iter().enumerate() {
            let bit = (i * SHIFT) % (8 * DIGEST_SIZE);
            let shifted = (byte as u16) << (bit & 7);
            folded[bit >> 3] ^= (shifted & 0xff) as u8;
            folded[(bit >> 3) + 1] ^= (shifted >> 8) as u8;
        }
        folded[0] ^= folded[DIGEST_SIZE];

        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&folded[..DIGEST_SIZE]);

        // XOR the total input length, little-endian, into the last 8 bytes.
        for (i, &byte) in self.size.to_le_bytes().iter().enumerate() {
            digest[DIGEST_SIZE - 8 + i] ^= byte;
        }
        digest
    }

    /// Digest encoded the way the service reports it.
    pub fn finalize_base64(&self) -> String {
        STANDARD.encode(self.finalize())
    }

    /// Total bytes fed so far.
    pub fn bytes_fed(&self) -> u64 {
        self.size
    }

    /// Clears the state back to empty.
    pub fn reset(&mut self) {
        self.data = [0u8; DATA_SIZE];
        self.size = 0;
    }
}

impl Default for QuickXorHash {
    fn default() -> Self {
        Self::new()
    }
}

/// XORs `src` into the front of `dst`, returning how many bytes combined.
fn xor_into(dst: &mut [u8], src: &[u8]) -> usize {
    let n = dst.len().min(src.len());
    for (d, s) in dst[..n].iter_mut().zip(&src[..n]) {
        *d ^= *s;
    }
    n
}

/// Hashes a byte slice in one call, returning the base64 digest.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = QuickXorHash::new();
    hasher.update(data);
    hasher.finalize_base64()
}

/// Hashes an entire file, returning the base64 digest.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = QuickXorHash::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_base64())
}
