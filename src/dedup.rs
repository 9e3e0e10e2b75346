//! Content hashing and near-duplicate detection (C4).
//!
//! Three independent mechanisms: exact content hash (SHA-256), near-duplicate text
//! (64-bit shingle fingerprint / simhash), and near-duplicate image (64-bit perceptual
//! hash). Near-dup checks read the existing KV entries, emit matches, then insert the
//! new item's own entry last (§4.4).

use std::io::Read as _;
use std::path::Path;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::kv_store::KvStore;

const SHA256_CHUNK_SIZE: usize = 1 << 20;
pub const TEXT_NEAR_DUP_THRESHOLD: u32 = 3;
pub const IMAGE_NEAR_DUP_THRESHOLD: u32 = 6;

/// Streaming SHA-256 over a file, read in 1 MiB chunks.
pub fn compute_sha256(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; SHA256_CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// SHA-256 over an in-memory buffer, for callers that already hold the bytes (the
/// document processor, after reading a connector-supplied path).
pub fn compute_sha256_bytes(bytes: &[u8]) -> String {
    hex_encode(&Sha256::digest(bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// 64-bit simhash over whitespace-delimited word shingles. Two texts with Hamming
/// distance <= [`TEXT_NEAR_DUP_THRESHOLD`] are treated as near-duplicates.
pub fn compute_shingle_fingerprint(text: &str) -> u64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0;
    }
    const SHINGLE_SIZE: usize = 4;
    let mut weights = [0i64; 64];
    let shingles: Vec<String> = if words.len() < SHINGLE_SIZE {
        vec![words.join(" ")]
    } else {
        words
            .windows(SHINGLE_SIZE)
            .map(|w| w.join(" "))
            .collect()
    };
    for shingle in &shingles {
        let hash = Sha256::digest(shingle.as_bytes());
        let mut h: u64 = 0;
        for byte in &hash[..8] {
            h = (h << 8) | (*byte as u64);
        }
        for (bit, weight) in weights.iter_mut().enumerate() {
            if (h >> bit) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }
    let mut fingerprint: u64 = 0;
    for (bit, weight) in weights.iter().enumerate() {
        if *weight > 0 {
            fingerprint |= 1 << bit;
        }
    }
    fingerprint
}

/// 64-bit average hash (aHash) over an 8x8 grayscale downscale of the image, playing
/// the role of Python's `imagehash.phash` for this port. Returns `None` if the bytes
/// cannot be decoded as an image.
pub fn compute_perceptual_hash(image_bytes: &[u8]) -> Option<u64> {
    let img = image::load_from_memory(image_bytes).ok()?;
    let small = img.grayscale().resize_exact(
        8,
        8,
        image::imageops::FilterType::Triangle,
    );
    let pixels: Vec<u8> = small.to_luma8().into_raw();
    let sum: u32 = pixels.iter().map(|p| *p as u32).sum();
    let avg = sum / pixels.len().max(1) as u32;
    let mut hash: u64 = 0;
    for (i, pixel) in pixels.iter().enumerate() {
        if *pixel as u32 >= avg {
            hash |= 1 << i;
        }
    }
    Some(hash)
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Wraps a [`KvStore`] to implement the read-existing -> emit-matches -> insert-last
/// protocol over the `dedupe:simhash` / `dedupe:phash` hashes named in §6.
pub struct DedupEngine<'a, S: KvStore> {
    kv: &'a S,
}

impl<'a, S: KvStore> DedupEngine<'a, S> {
    pub fn new(kv: &'a S) -> Self {
        Self { kv }
    }

    /// Checks `fingerprint` against all recorded text fingerprints, returns the
    /// `sha256`s of any near-duplicate match, then records this item's own entry.
    /// Values are stored decimal, per the `dedupe:simhash` KV contract.
    pub async fn check_and_record_text(&self, sha256: &str, fingerprint: u64) -> Result<Vec<String>> {
        self.check_and_record(
            "dedupe:simhash",
            sha256,
            fingerprint,
            TEXT_NEAR_DUP_THRESHOLD,
            ValueEncoding::Decimal,
        )
        .await
    }

    /// Same protocol for perceptual image hashes. Values are stored hex, per the
    /// `dedupe:phash` KV contract.
    pub async fn check_and_record_image(&self, sha256: &str, phash: u64) -> Result<Vec<String>> {
        self.check_and_record(
            "dedupe:phash",
            sha256,
            phash,
            IMAGE_NEAR_DUP_THRESHOLD,
            ValueEncoding::Hex,
        )
        .await
    }

    async fn check_and_record(
        &self,
        hash_key: &str,
        sha256: &str,
        value: u64,
        threshold: u32,
        encoding: ValueEncoding,
    ) -> Result<Vec<String>> {
        let existing = self.kv.hgetall(hash_key).await?;
        let mut matches = Vec::new();
        for (other_sha, other_value) in &existing {
            if other_sha == sha256 {
                continue;
            }
            let Some(parsed) = encoding.parse(other_value) else {
                continue;
            };
            if hamming_distance(value, parsed) <= threshold {
                matches.push(other_sha.clone());
            }
        }
        self.kv.hset(hash_key, sha256, &encoding.format(value)).await?;
        Ok(matches)
    }
}

#[derive(Clone, Copy)]
enum ValueEncoding {
    Decimal,
    Hex,
}

impl ValueEncoding {
    fn format(self, value: u64) -> String {
        match self {
            ValueEncoding::Decimal => value.to_string(),
            ValueEncoding::Hex => format!("{value:016x}"),
        }
    }

    fn parse(self, raw: &str) -> Option<u64> {
        match self {
            ValueEncoding::Decimal => raw.parse::<u64>().ok(),
            ValueEncoding::Hex => u64::from_str_radix(raw, 16).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_distance_zero_for_identical() {
        assert_eq!(hamming_distance(0xABCD, 0xABCD), 0);
    }

    #[test]
    fn hamming_distance_counts_differing_bits() {
        assert_eq!(hamming_distance(0b1010, 0b1000), 1);
        assert_eq!(hamming_distance(0b1111, 0b0000), 4);
    }

    #[test]
    fn shingle_fingerprint_identical_for_identical_text() {
        let a = compute_shingle_fingerprint("the quick brown fox jumps over the lazy dog");
        let b = compute_shingle_fingerprint("the quick brown fox jumps over the lazy dog");
        assert_eq!(a, b);
    }

    #[test]
    fn shingle_fingerprint_differs_for_unrelated_text() {
        let a = compute_shingle_fingerprint("Project Alpha kickoff meeting notes agenda");
        let b = compute_shingle_fingerprint("completely unrelated grocery shopping list");
        assert!(hamming_distance(a, b) > TEXT_NEAR_DUP_THRESHOLD);
    }

    #[test]
    fn empty_text_yields_zero_fingerprint() {
        assert_eq!(compute_shingle_fingerprint(""), 0);
        assert_eq!(compute_shingle_fingerprint("   "), 0);
    }
}
