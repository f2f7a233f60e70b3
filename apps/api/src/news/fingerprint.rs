//! Content fingerprints and token-set similarity for near-duplicate detection.

use std::collections::{BTreeSet, HashSet};

use sha2::{Digest, Sha256};

/// Body tokens folded into the fingerprint after the title tokens.
const BODY_TOKENS: usize = 24;

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "are", "as", "at", "be", "been", "but", "by",
    "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he", "her", "his",
    "how", "if", "in", "into", "is", "it", "its", "just", "may", "more", "new", "not", "of", "on",
    "or", "our", "out", "over", "says", "she", "so", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "to", "up", "was", "we", "were", "what", "when",
    "which", "while", "who", "will", "with", "would", "you",
];

/// Lowercase alphanumeric words of at least two characters, stopwords removed,
/// in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 2 && !STOPWORDS.contains(word))
        .map(str::to_string)
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Hex SHA-256 of the sorted unique title tokens followed by the leading body
/// tokens, truncated to 16 bytes. `None` when there is nothing to hash.
pub fn fingerprint(title: &str, body: Option<&str>) -> Option<String> {
    let title_tokens: BTreeSet<String> = tokenize(title).into_iter().collect();
    let body_tokens: Vec<String> = body
        .map(|b| tokenize(b).into_iter().take(BODY_TOKENS).collect())
        .unwrap_or_default();

    if title_tokens.is_empty() && body_tokens.is_empty() {
        return None;
    }

    let mut material: Vec<String> = title_tokens.into_iter().collect();
    material.push("|".to_string());
    material.extend(body_tokens);
    Some(hex_digest(&material.join(" ")))
}

/// First 16 bytes of the SHA-256 of `text`, hex encoded.
pub fn hex_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(32);
    hex
}

/// |a ∩ b| / |a ∪ b|. Two empty sets are not similar.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
