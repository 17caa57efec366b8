//! Normalized Cache Keys and Similarity
//!
//! Canonicalizes queries into cache keys (lowercase, Unicode folding,
//! abbreviation expansion, whitespace collapse, punctuation stripping) and
//! scores the similarity between two canonical keys for the fuzzy-match
//! fallback. The abbreviation table is derived from the trie at startup: an
//! acronym whose expansion exists as a single trie entry is a valid
//! expansion.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::core::resolve::trie::{normalize, InstitutionTrie};
use crate::core::schema::InstitutionType;

/// Weighted similarity at or above this accepts a fuzzy cache match.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

/// Tokens skipped when deriving acronyms from multi-word names.
const ACRONYM_STOPWORDS: &[&str] = &["of", "the", "and", "for"];

// ============================================================================
// Abbreviation Table
// ============================================================================

/// Acronym → full-name expansions, built from the trie once at startup.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationTable {
    map: HashMap<String, String>,
}

impl AbbreviationTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive expansions from trie entries with at least three words.
    /// Ambiguous acronyms (two entries sharing one) are discarded.
    pub fn from_trie(trie: &InstitutionTrie) -> Self {
        let mut candidates: HashMap<String, Vec<String>> = HashMap::new();
        for entry in trie.entries() {
            let tokens: Vec<&str> = entry.normalized.split_whitespace().collect();
            if tokens.len() < 3 {
                continue;
            }
            let acronym: String = tokens
                .iter()
                .filter(|t| !ACRONYM_STOPWORDS.contains(t))
                .filter_map(|t| t.chars().next())
                .collect();
            if acronym.chars().count() < 2 {
                continue;
            }
            candidates
                .entry(acronym)
                .or_default()
                .push(entry.normalized.clone());
        }
        let map = candidates
            .into_iter()
            .filter_map(|(acronym, mut expansions)| {
                expansions.dedup();
                if expansions.len() == 1 {
                    Some((acronym, expansions.remove(0)))
                } else {
                    None
                }
            })
            .collect();
        Self { map }
    }

    /// Insert a fixed expansion (both sides canonicalized).
    pub fn insert(&mut self, acronym: &str, expansion: &str) {
        self.map.insert(normalize(acronym), normalize(expansion));
    }

    pub fn expand(&self, canonical: &str) -> Option<&str> {
        self.map.get(canonical).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ============================================================================
// Canonicalization
// ============================================================================

/// Canonicalize a name for cache keying: lowercase, Unicode-fold, strip
/// punctuation, collapse whitespace, then expand a whole-string acronym.
pub fn canonicalize(name: &str, abbreviations: &AbbreviationTable) -> String {
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    let canonical = normalize(&folded);
    match abbreviations.expand(&canonical) {
        Some(expanded) => expanded.to_string(),
        None => canonical,
    }
}

/// Canonical form of a query: name, optional type tag, and a fingerprint of
/// the recognized search-refinement options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedKey {
    pub canonical_name: String,
    pub type_tag: Option<InstitutionType>,
    pub option_fingerprint: String,
}

impl NormalizedKey {
    pub fn new(
        name: &str,
        type_tag: Option<InstitutionType>,
        option_fingerprint: String,
        abbreviations: &AbbreviationTable,
    ) -> Self {
        Self {
            canonical_name: canonicalize(name, abbreviations),
            type_tag,
            option_fingerprint,
        }
    }

    /// Flat string used as the cache key and hashed for file names.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.canonical_name,
            self.type_tag.map(|t| t.as_str()).unwrap_or("unknown"),
            self.option_fingerprint
        )
    }
}

impl std::fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cache_key())
    }
}

// ============================================================================
// Similarity
// ============================================================================

/// Blended similarity between two canonical keys:
/// character-level Levenshtein ratio (0.3), token-set Jaccard (0.4),
/// token-sequence ratio (0.3). Symmetric by construction.
pub fn similarity(a: &str, b: &str) -> f64 {
    let char_ratio = strsim::normalized_levenshtein(a, b);
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();
    0.3 * char_ratio + 0.4 * jaccard(&tokens_a, &tokens_b) + 0.3 * sequence_ratio(&tokens_a, &tokens_b)
}

fn jaccard(a: &[&str], b: &[&str]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let set_a: std::collections::HashSet<&str> = a.iter().copied().collect();
    let set_b: std::collections::HashSet<&str> = b.iter().copied().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Token-level edit-distance ratio: 1 − d / max(len). Tokens compare as
/// whole units, so word reordering costs less than it would per-character.
fn sequence_ratio(a: &[&str], b: &[&str]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.len().max(b.len());
    1.0 - token_edit_distance(a, b) as f64 / max_len as f64
}

fn token_edit_distance(a: &[&str], b: &[&str]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, token_a) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, token_b) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(token_a != token_b);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}
