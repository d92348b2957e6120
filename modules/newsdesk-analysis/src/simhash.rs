//! 64-bit SimHash fingerprints and greedy near-duplicate clustering.
//!
//! Token hashes come from SHA-256 hex prefixes, so fingerprints are stable
//! across processes and platforms. Similarity is 1 − hamming/bits.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

pub const DEFAULT_BITS: u32 = 64;
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Tokenization granularity. Word tokens are the default; character tokens
/// resolve short texts where a word-level fingerprint is too coarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenKind {
    #[default]
    Word,
    Char,
}

#[derive(Debug, Clone)]
pub struct SimHash {
    bits: u32,
    token_kind: TokenKind,
}

impl SimHash {
    pub fn new(bits: u32, token_kind: TokenKind) -> Self {
        assert!(bits > 0 && bits <= 64, "hash bits must be in 1..=64");
        Self { bits, token_kind }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Lowercase, strip punctuation (CJK kept), then split: ASCII runs on
    /// whitespace, CJK runs per code point. Char mode splits everything per
    /// code point.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '_' || c.is_whitespace() || is_cjk(c) {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        match self.token_kind {
            TokenKind::Word => {
                let mut tokens = Vec::new();
                for part in cleaned.split_whitespace() {
                    if part.chars().any(is_cjk) {
                        tokens.extend(part.chars().map(|c| c.to_string()));
                    } else {
                        tokens.push(part.to_string());
                    }
                }
                tokens
            }
            TokenKind::Char => cleaned
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| c.to_string())
                .collect(),
        }
    }

    /// SimHash of a text: ±1 vote per token on every bit of the token's
    /// SHA-256 prefix; final bit is 1 iff the accumulated weight is ≥ 0.
    pub fn compute(&self, text: &str) -> u64 {
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            return 0;
        }

        let mut weights = vec![0i64; self.bits as usize];
        for token in &tokens {
            let token_bits = self.token_hash(token);
            for (i, weight) in weights.iter_mut().enumerate() {
                if (token_bits >> i) & 1 == 1 {
                    *weight += 1;
                } else {
                    *weight -= 1;
                }
            }
        }
        self.fold_weights(&weights)
    }

    /// Weighted variant: votes scale with token frequency times an optional
    /// external per-token weight.
    pub fn compute_weighted(&self, text: &str, external: Option<&HashMap<String, f64>>) -> u64 {
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            return 0;
        }

        let mut freq: HashMap<&str, u64> = HashMap::new();
        for token in &tokens {
            *freq.entry(token.as_str()).or_default() += 1;
        }

        let mut weights = vec![0f64; self.bits as usize];
        for (token, count) in freq {
            let mut vote = count as f64;
            if let Some(ext) = external {
                if let Some(w) = ext.get(token) {
                    vote *= w;
                }
            }
            let token_bits = self.token_hash(token);
            for (i, weight) in weights.iter_mut().enumerate() {
                if (token_bits >> i) & 1 == 1 {
                    *weight += vote;
                } else {
                    *weight -= vote;
                }
            }
        }

        let mut hash = 0u64;
        for (i, weight) in weights.iter().enumerate() {
            if *weight >= 0.0 {
                hash |= 1 << i;
            }
        }
        hash
    }

    pub fn hamming_distance(&self, a: u64, b: u64) -> u32 {
        (a ^ b).count_ones()
    }

    /// Similarity in [0, 1]; identical fingerprints score 1.0.
    pub fn similarity(&self, a: u64, b: u64) -> f64 {
        1.0 - self.hamming_distance(a, b) as f64 / self.bits as f64
    }

    pub fn is_duplicate(&self, a: u64, b: u64, threshold: f64) -> bool {
        self.similarity(a, b) >= threshold
    }

    /// First bits/4 hex chars of the token's SHA-256 digest as an integer.
    fn token_hash(&self, token: &str) -> u64 {
        let digest = Sha256::digest(token.as_bytes());
        let hex_prefix_len = (self.bits / 4) as usize;
        let hex = hex::encode(digest);
        u64::from_str_radix(&hex[..hex_prefix_len], 16).unwrap_or(0)
    }

    fn fold_weights(&self, weights: &[i64]) -> u64 {
        let mut hash = 0u64;
        for (i, weight) in weights.iter().enumerate() {
            if *weight >= 0 {
                hash |= 1 << i;
            }
        }
        hash
    }
}

impl Default for SimHash {
    fn default() -> Self {
        Self::new(DEFAULT_BITS, TokenKind::Word)
    }
}

/// One cluster from the greedy pass: the first-encountered member is the
/// representative; every other member within threshold is a duplicate.
#[derive(Debug, Clone)]
pub struct ClusterGroup {
    pub representative_id: i64,
    pub duplicate_ids: Vec<i64>,
}

impl ClusterGroup {
    pub fn total_count(&self) -> usize {
        1 + self.duplicate_ids.len()
    }
}

/// Greedy single-pass clustering over (id, text) pairs.
pub struct TextCluster {
    simhash: SimHash,
    threshold: f64,
}

impl TextCluster {
    pub fn new(bits: u32, threshold: f64, token_kind: TokenKind) -> Self {
        Self {
            simhash: SimHash::new(bits, token_kind),
            threshold,
        }
    }

    pub fn compute_hash(&self, text: &str) -> u64 {
        self.simhash.compute(text)
    }

    pub fn simhash(&self) -> &SimHash {
        &self.simhash
    }

    /// Cluster texts: each unassigned id starts a cluster and absorbs every
    /// later unassigned id within the similarity threshold. The output is a
    /// partition of the input ids, in first-encounter order.
    pub fn cluster_texts(&self, texts: &[String], ids: &[i64]) -> Vec<ClusterGroup> {
        assert_eq!(texts.len(), ids.len(), "texts and ids must have the same length");
        let hashes: Vec<u64> = texts.iter().map(|t| self.simhash.compute(t)).collect();
        self.cluster_hashes(&hashes, ids)
    }

    /// Same greedy pass over precomputed fingerprints.
    pub fn cluster_hashes(&self, hashes: &[u64], ids: &[i64]) -> Vec<ClusterGroup> {
        assert_eq!(hashes.len(), ids.len(), "hashes and ids must have the same length");

        let mut clusters: Vec<ClusterGroup> = Vec::new();
        let mut assigned = vec![false; ids.len()];

        for i in 0..ids.len() {
            if assigned[i] {
                continue;
            }
            assigned[i] = true;
            let mut group = ClusterGroup {
                representative_id: ids[i],
                duplicate_ids: Vec::new(),
            };
            for j in (i + 1)..ids.len() {
                if assigned[j] {
                    continue;
                }
                if self.simhash.is_duplicate(hashes[i], hashes[j], self.threshold) {
                    assigned[j] = true;
                    group.duplicate_ids.push(ids[j]);
                }
            }
            clusters.push(group);
        }

        clusters
    }

    /// All pairs above the threshold, most similar first.
    pub fn find_duplicates(&self, texts: &[String], ids: &[i64]) -> Vec<(i64, i64, f64)> {
        let hashes: Vec<u64> = texts.iter().map(|t| self.simhash.compute(t)).collect();
        let mut pairs = Vec::new();
        for i in 0..hashes.len() {
            for j in (i + 1)..hashes.len() {
                let similarity = self.simhash.similarity(hashes[i], hashes[j]);
                if similarity >= self.threshold {
                    pairs.push((ids[i], ids[j], similarity));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        pairs
    }

    /// Top-k candidates most similar to a query text.
    pub fn find_nearest(
        &self,
        query: &str,
        candidates: &[String],
        candidate_ids: &[i64],
        top_k: usize,
    ) -> Vec<(i64, f64)> {
        let query_hash = self.simhash.compute(query);
        let mut scored: Vec<(i64, f64)> = candidates
            .iter()
            .zip(candidate_ids)
            .map(|(text, id)| (*id, self.simhash.similarity(query_hash, self.simhash.compute(text))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

impl Default for TextCluster {
    fn default() -> Self {
        Self::new(DEFAULT_BITS, DEFAULT_THRESHOLD, TokenKind::Word)
    }
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_hash_identically() {
        let simhash = SimHash::default();
        let a = simhash.compute("The quick brown fox");
        let b = simhash.compute("The quick brown fox");
        assert_eq!(a, b);
        assert_eq!(simhash.similarity(a, b), 1.0);
    }

    #[test]
    fn near_duplicate_short_texts_with_char_tokens() {
        let simhash = SimHash::new(64, TokenKind::Char);
        let a = simhash.compute("Alpha bravo charlie delta");
        let b = simhash.compute("Alpha bravo charlie delta echo");
        assert!(
            simhash.similarity(a, b) >= 0.85,
            "similarity was {}",
            simhash.similarity(a, b)
        );
    }

    #[test]
    fn near_duplicate_long_texts_with_word_tokens() {
        let simhash = SimHash::default();
        let a = simhash.compute(
            "The central bank raised interest rates by fifty basis points on Tuesday \
             citing persistent inflation pressure across the economy",
        );
        let b = simhash.compute(
            "The central bank raised interest rates by fifty basis points on Tuesday \
             citing persistent inflation pressure across the economy analysts said",
        );
        assert!(simhash.similarity(a, b) >= 0.85);
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let simhash = SimHash::default();
        let a = simhash.compute("parliament approves budget");
        let b = simhash.compute("completely unrelated text about gardening tips");
        let ab = simhash.similarity(a, b);
        let ba = simhash.similarity(b, a);
        assert_eq!(ab, ba);
        assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn empty_text_hashes_to_zero() {
        let simhash = SimHash::default();
        assert_eq!(simhash.compute(""), 0);
        assert_eq!(simhash.compute("   !!! ..."), 0);
    }

    #[test]
    fn cjk_split_per_codepoint() {
        let simhash = SimHash::default();
        let tokens = simhash.tokenize("经济 growth 数据");
        assert_eq!(tokens, vec!["经", "济", "growth", "数", "据"]);
    }

    #[test]
    fn punctuation_stripped() {
        let simhash = SimHash::default();
        assert_eq!(
            simhash.tokenize("Hello, world! (2024)"),
            vec!["hello", "world", "2024"]
        );
    }

    #[test]
    fn weighted_hash_matches_unweighted_for_uniform_weights() {
        let simhash = SimHash::default();
        let text = "alpha bravo charlie delta";
        // With all-distinct tokens and no external weights the weighted
        // variant degenerates to the plain one.
        assert_eq!(simhash.compute(text), simhash.compute_weighted(text, None));
    }

    #[test]
    fn clustering_is_a_partition() {
        let cluster = TextCluster::default();
        let texts: Vec<String> = vec![
            "The central bank raised interest rates by fifty basis points on Tuesday".into(),
            "The central bank raised interest rates by fifty basis points on Tuesday morning".into(),
            "Completely different story about a football championship final".into(),
            "Another unrelated piece on regional drought conditions this summer".into(),
        ];
        let ids = vec![1, 2, 3, 4];
        let clusters = cluster.cluster_texts(&texts, &ids);

        let mut seen: Vec<i64> = clusters
            .iter()
            .flat_map(|c| {
                std::iter::once(c.representative_id).chain(c.duplicate_ids.iter().copied())
            })
            .collect();
        seen.sort();
        assert_eq!(seen, ids, "every id appears in exactly one cluster");
    }

    #[test]
    fn near_duplicates_cluster_together() {
        let cluster = TextCluster::default();
        let texts: Vec<String> = vec![
            "The central bank raised interest rates by fifty basis points on Tuesday citing inflation".into(),
            "The central bank raised interest rates by fifty basis points on Tuesday citing inflation worries".into(),
            "A football championship final ended in penalties after extra time last night".into(),
        ];
        let ids = vec![10, 20, 30];
        let clusters = cluster.cluster_texts(&texts, &ids);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].representative_id, 10);
        assert_eq!(clusters[0].duplicate_ids, vec![20]);
        assert_eq!(clusters[1].representative_id, 30);
    }

    #[test]
    fn find_nearest_ranks_by_similarity() {
        let cluster = TextCluster::default();
        let candidates: Vec<String> = vec![
            "central bank raises interest rates amid inflation pressure".into(),
            "local football team wins the championship game".into(),
        ];
        let ids = vec![1, 2];
        let nearest = cluster.find_nearest(
            "bank raises rates as inflation persists",
            &candidates,
            &ids,
            1,
        );
        assert_eq!(nearest.len(), 1);
        assert_eq!(nearest[0].0, 1);
    }

    #[test]
    fn first_encountered_id_is_representative() {
        let cluster = TextCluster::default();
        let texts: Vec<String> = vec![
            "The exact same sentence repeated for clustering purposes here".into(),
            "The exact same sentence repeated for clustering purposes here".into(),
        ];
        let clusters = cluster.cluster_texts(&texts, &[7, 3]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].representative_id, 7);
        assert_eq!(clusters[0].duplicate_ids, vec![3]);
    }
}
