//! Fuzzy content hashing and rename pairing.
//!
//! Containers often carry the same member under a new name. Instead of
//! reporting a removal plus an addition, similar-but-renamed members are
//! paired up here and fed back through the engine as modifications.
//!
//! The digest is a locality-sensitive hash: byte trigrams are counted
//! into 256 buckets through a permutation hash, and the bucket histogram
//! is quartile-quantized to 2 bits per bucket. The distance between two
//! digests is the per-bucket difference sum (0..=1536); unrelated content
//! lands far apart, single-line edits stay close.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

const BUCKETS: usize = 256;
const CODE_BYTES: usize = BUCKETS / 4;

/// Locality-sensitive digest of file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyDigest {
    codes: [u8; CODE_BYTES],
}

// Multiplicative permutation of the byte space; 167 is odd, so this is a
// bijection mod 256.
#[inline]
fn perm(x: u8) -> u8 {
    x.wrapping_mul(167).wrapping_add(13)
}

#[inline]
fn bucket(t0: u8, t1: u8, t2: u8) -> usize {
    perm(perm(perm(t0) ^ t1) ^ t2) as usize
}

impl FuzzyDigest {
    pub fn from_path(path: &Path) -> io::Result<Option<Self>> {
        Self::from_reader(fs::File::open(path)?)
    }

    /// Streams the content in 32 KiB chunks, carrying a two-byte window
    /// across chunk boundaries. Returns `None` for content too short to
    /// form a single trigram.
    pub fn from_reader(mut reader: impl Read) -> io::Result<Option<Self>> {
        let mut counts = [0u32; BUCKETS];
        let mut buf = vec![0u8; 32 * 1024];
        let mut carry: Vec<u8> = Vec::with_capacity(2);
        let mut total = 0usize;

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            total += n;

            let mut window = carry.clone();
            window.extend_from_slice(&buf[..n]);
            for tri in window.windows(3) {
                counts[bucket(tri[0], tri[1], tri[2])] += 1;
            }

            let tail_start = window.len().saturating_sub(2);
            carry = window[tail_start..].to_vec();
        }

        if total < 3 {
            return Ok(None);
        }

        Ok(Some(Self::quantize(&counts)))
    }

    fn quantize(counts: &[u32; BUCKETS]) -> Self {
        let mut sorted = *counts;
        sorted.sort_unstable();
        let q1 = sorted[BUCKETS / 4 - 1];
        let q2 = sorted[BUCKETS / 2 - 1];
        let q3 = sorted[BUCKETS * 3 / 4 - 1];

        let mut codes = [0u8; CODE_BYTES];
        for (i, &count) in counts.iter().enumerate() {
            let code = if count <= q1 {
                0u8
            } else if count <= q2 {
                1
            } else if count <= q3 {
                2
            } else {
                3
            };
            codes[i / 4] |= code << ((i % 4) * 2);
        }
        Self { codes }
    }

    /// Difference score between two digests: per-bucket 2-bit distance
    /// summed over all buckets, with the maximal step (3) penalized as 6.
    pub fn distance(&self, other: &Self) -> u32 {
        let mut score = 0u32;
        for (a, b) in self.codes.iter().zip(other.codes.iter()) {
            for shift in [0u8, 2, 4, 6] {
                let ca = (a >> shift) & 0b11;
                let cb = (b >> shift) & 0b11;
                let d = ca.abs_diff(cb) as u32;
                score += if d == 3 { 6 } else { d };
            }
        }
        score
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.codes)
    }
}

/// One candidate member in a container-pair comparison: display name plus
/// optional digest. Ephemeral; built once per container pair.
#[derive(Debug)]
pub struct FuzzyCandidate<'a> {
    pub name: &'a str,
    pub digest: Option<&'a FuzzyDigest>,
}

/// A selected pairing, as indices into the removed and added slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyPair {
    pub removed: usize,
    pub added: usize,
    pub score: u32,
}

/// Greedy globally-best pairing of removed against added members.
pub struct FuzzyMatcher {
    threshold: u32,
}

impl FuzzyMatcher {
    /// `threshold` 0 disables matching entirely; only scores strictly
    /// below the threshold are eligible.
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// Repeatedly selects the best-scoring eligible pair and removes both
    /// sides from their pools. Deterministic regardless of input
    /// iteration order: ties are broken by the lexical order of
    /// (removed name, added name).
    pub fn pair(&self, removed: &[FuzzyCandidate], added: &[FuzzyCandidate]) -> Vec<FuzzyPair> {
        if self.threshold == 0 {
            return Vec::new();
        }

        // (score, removed name, added name, removed idx, added idx)
        let mut scored: Vec<(u32, &str, &str, usize, usize)> = Vec::new();
        for (ri, r) in removed.iter().enumerate() {
            let Some(rd) = r.digest else { continue };
            for (ai, a) in added.iter().enumerate() {
                let Some(ad) = a.digest else { continue };
                let score = rd.distance(ad);
                if score < self.threshold {
                    scored.push((score, r.name, a.name, ri, ai));
                }
            }
        }
        scored.sort_unstable_by(|x, y| (x.0, x.1, x.2).cmp(&(y.0, y.1, y.2)));

        let mut removed_used = vec![false; removed.len()];
        let mut added_used = vec![false; added.len()];
        let mut pairs = Vec::new();
        for (score, _, _, ri, ai) in scored {
            if removed_used[ri] || added_used[ai] {
                continue;
            }
            removed_used[ri] = true;
            added_used[ai] = true;
            pairs.push(FuzzyPair {
                removed: ri,
                added: ai,
                score,
            });
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(content: &[u8]) -> FuzzyDigest {
        FuzzyDigest::from_reader(content).unwrap().unwrap()
    }

    fn lines(n: usize, tag: &str) -> Vec<u8> {
        (0..n)
            .map(|i| format!("{tag} content line number {i}\n"))
            .collect::<String>()
            .into_bytes()
    }

    #[test]
    fn test_identical_content_distance_zero() {
        let body = lines(100, "shared");
        assert_eq!(digest(&body).distance(&digest(&body)), 0);
    }

    #[test]
    fn test_similar_content_scores_below_unrelated() {
        let base = lines(200, "shared");
        let mut edited = base.clone();
        edited.extend_from_slice(b"one extra trailing line\n");
        let unrelated: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();

        let d_base = digest(&base);
        let similar_score = d_base.distance(&digest(&edited));
        let unrelated_score = d_base.distance(&digest(&unrelated));
        assert!(
            similar_score < unrelated_score,
            "similar {similar_score} should score below unrelated {unrelated_score}"
        );
    }

    #[test]
    fn test_chunk_boundary_streaming_matches_whole() {
        // > 32 KiB so the streaming carry path is exercised
        let body = lines(3000, "boundary");
        assert!(body.len() > 32 * 1024);
        let streamed = FuzzyDigest::from_reader(&body[..]).unwrap().unwrap();
        assert_eq!(streamed.distance(&digest(&body)), 0);
    }

    #[test]
    fn test_too_short_content_has_no_digest() {
        assert!(FuzzyDigest::from_reader(&b"ab"[..]).unwrap().is_none());
    }

    #[test]
    fn test_threshold_zero_disables_pairing() {
        let body = lines(100, "x");
        let d = digest(&body);
        let removed = [FuzzyCandidate {
            name: "a",
            digest: Some(&d),
        }];
        let added = [FuzzyCandidate {
            name: "b",
            digest: Some(&d),
        }];
        assert!(FuzzyMatcher::new(0).pair(&removed, &added).is_empty());
        assert_eq!(FuzzyMatcher::new(60).pair(&removed, &added).len(), 1);
    }

    #[test]
    fn test_pairing_deterministic_under_ties() {
        let body = lines(100, "x");
        let d = digest(&body);
        // two removed candidates with identical digests against one added:
        // the lexically first removed name must win, regardless of order
        let removed_fwd = [
            FuzzyCandidate { name: "aaa", digest: Some(&d) },
            FuzzyCandidate { name: "bbb", digest: Some(&d) },
        ];
        let removed_rev = [
            FuzzyCandidate { name: "bbb", digest: Some(&d) },
            FuzzyCandidate { name: "aaa", digest: Some(&d) },
        ];
        let added = [FuzzyCandidate { name: "new", digest: Some(&d) }];

        let matcher = FuzzyMatcher::new(60);
        let fwd = matcher.pair(&removed_fwd, &added);
        let rev = matcher.pair(&removed_rev, &added);
        assert_eq!(fwd.len(), 1);
        assert_eq!(rev.len(), 1);
        assert_eq!(removed_fwd[fwd[0].removed].name, "aaa");
        assert_eq!(removed_rev[rev[0].removed].name, "aaa");
    }

    #[test]
    fn test_candidates_without_digest_are_skipped() {
        let body = lines(100, "x");
        let d = digest(&body);
        let removed = [FuzzyCandidate { name: "a", digest: None }];
        let added = [FuzzyCandidate { name: "b", digest: Some(&d) }];
        assert!(FuzzyMatcher::new(400).pair(&removed, &added).is_empty());
    }
}
