//! Institution Name Trie
//!
//! Prefix index over known institution names. Built once at startup from
//! dictionary ingestion, immutable afterwards, freely shared across tasks.
//! Lookups are case-insensitive on the normalized form; terminal nodes keep
//! the original casing so suggestions render the way the source dictionary
//! spelled them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::schema::InstitutionType;

/// Normalize an institution name for trie storage and lookup: lowercase,
/// punctuation stripped, whitespace collapsed. Apostrophes are removed
/// outright ("St. Mary's" and "st marys" normalize identically); other
/// punctuation acts as a word break.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Metadata stored at a terminal node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrieMetadata {
    /// Original casing of the inserted name.
    pub original_name: String,
    /// Positive suggestion-ordering weight.
    pub frequency: u64,
    pub institution_type: Option<InstitutionType>,
}

/// A matched trie entry, as returned by lookups and suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrieEntry {
    pub normalized: String,
    pub original_name: String,
    pub frequency: u64,
    pub institution_type: Option<InstitutionType>,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<char, TrieNode>,
    terminal: Option<TrieMetadata>,
}

/// Prefix trie of institution names with per-terminal metadata.
#[derive(Debug, Default)]
pub struct InstitutionTrie {
    root: TrieNode,
    len: usize,
}

impl InstitutionTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct normalized names stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a name. Idempotent on the normalized form: a re-insert keeps
    /// the higher frequency, and keeps the earlier institution type unless
    /// the earlier entry had none and the new insert has one.
    pub fn insert(&mut self, name: &str, frequency: u64, institution_type: Option<InstitutionType>) {
        let normalized = normalize(name);
        if normalized.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        for c in normalized.chars() {
            node = node.children.entry(c).or_default();
        }
        match &mut node.terminal {
            Some(existing) => {
                if frequency > existing.frequency {
                    existing.frequency = frequency;
                }
                if existing.institution_type.is_none() {
                    existing.institution_type = institution_type;
                }
            }
            None => {
                node.terminal = Some(TrieMetadata {
                    original_name: name.trim().to_string(),
                    frequency: frequency.max(1),
                    institution_type,
                });
                self.len += 1;
            }
        }
    }

    fn walk(&self, normalized: &str) -> Option<&TrieNode> {
        let mut node = &self.root;
        for c in normalized.chars() {
            node = node.children.get(&c)?;
        }
        Some(node)
    }

    /// Exact membership test on the normalized form. This is the validator
    /// the spell corrector runs every candidate phrase through.
    pub fn contains(&self, name: &str) -> bool {
        self.walk(&normalize(name))
            .map_or(false, |node| node.terminal.is_some())
    }

    /// Exact lookup returning the stored entry.
    pub fn entry(&self, name: &str) -> Option<TrieEntry> {
        let normalized = normalize(name);
        let node = self.walk(&normalized)?;
        node.terminal.as_ref().map(|meta| TrieEntry {
            normalized,
            original_name: meta.original_name.clone(),
            frequency: meta.frequency,
            institution_type: meta.institution_type,
        })
    }

    /// Top-k completions of a prefix: all terminals in the prefix subtree,
    /// ordered by descending frequency then ascending normalized name.
    pub fn suggest(&self, prefix: &str, k: usize) -> Vec<TrieEntry> {
        if k == 0 {
            return Vec::new();
        }
        let normalized = normalize(prefix);
        let Some(node) = self.walk(&normalized) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        let mut path = normalized;
        Self::collect(node, &mut path, &mut results);
        results.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.normalized.cmp(&b.normalized))
        });
        results.truncate(k);
        results
    }

    fn collect(node: &TrieNode, path: &mut String, out: &mut Vec<TrieEntry>) {
        if let Some(meta) = &node.terminal {
            out.push(TrieEntry {
                normalized: path.clone(),
                original_name: meta.original_name.clone(),
                frequency: meta.frequency,
                institution_type: meta.institution_type,
            });
        }
        // Deterministic child order keeps collection stable; the final sort
        // imposes the suggestion ordering anyway.
        let mut keys: Vec<char> = node.children.keys().copied().collect();
        keys.sort_unstable();
        for c in keys {
            path.push(c);
            Self::collect(&node.children[&c], path, out);
            path.pop();
        }
    }

    /// Every stored entry. Used once at startup to derive the abbreviation
    /// table and the corrector dictionary.
    pub fn entries(&self) -> Vec<TrieEntry> {
        let mut out = Vec::with_capacity(self.len);
        let mut path = String::new();
        Self::collect(&self.root, &mut path, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trie() -> InstitutionTrie {
        let mut trie = InstitutionTrie::new();
        trie.insert(
            "Massachusetts Institute of Technology",
            100,
            Some(InstitutionType::University),
        );
        trie.insert(
            "Massachusetts General Hospital",
            80,
            Some(InstitutionType::Hospital),
        );
        trie.insert("Massey University", 40, Some(InstitutionType::University));
        trie.insert("Masseter Clinic", 5, Some(InstitutionType::Hospital));
        trie.insert("Harvard University", 10, Some(InstitutionType::University));
        trie
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Harvard   University  "), "harvard university");
        assert_eq!(normalize("St. Mary's Hospital"), "st marys hospital");
        assert_eq!(normalize("A&M-University"), "a m university");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_contains_case_insensitive() {
        let trie = sample_trie();
        assert!(trie.contains("harvard university"));
        assert!(trie.contains("HARVARD UNIVERSITY"));
        assert!(trie.contains("Harvard  University"));
        assert!(!trie.contains("harvard"));
    }

    #[test]
    fn test_entry_preserves_original_casing() {
        let trie = sample_trie();
        let entry = trie.entry("massachusetts institute of technology").unwrap();
        assert_eq!(entry.original_name, "Massachusetts Institute of Technology");
        assert_eq!(entry.frequency, 100);
        assert_eq!(entry.institution_type, Some(InstitutionType::University));
    }

    #[test]
    fn test_suggest_ordering_by_frequency() {
        // Scenario: prefix "mass", k=3 over the four "mass*" entries.
        let trie = sample_trie();
        let suggestions = trie.suggest("mass", 3);
        let names: Vec<&str> = suggestions.iter().map(|s| s.original_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Massachusetts Institute of Technology",
                "Massachusetts General Hospital",
                "Massey University",
            ]
        );
    }

    #[test]
    fn test_suggest_tie_break_lexicographic() {
        let mut trie = InstitutionTrie::new();
        trie.insert("Beta College", 10, None);
        trie.insert("Alpha College", 10, None);
        let suggestions = trie.suggest("", 2);
        assert_eq!(suggestions[0].normalized, "alpha college");
        assert_eq!(suggestions[1].normalized, "beta college");
    }

    #[test]
    fn test_insert_idempotent_keeps_higher_frequency() {
        let mut trie = InstitutionTrie::new();
        trie.insert("Harvard University", 10, None);
        trie.insert("harvard  university", 3, Some(InstitutionType::University));
        assert_eq!(trie.len(), 1);
        let entry = trie.entry("harvard university").unwrap();
        assert_eq!(entry.frequency, 10);
        // Earlier insert had no type, so the later one fills it in.
        assert_eq!(entry.institution_type, Some(InstitutionType::University));
    }

    #[test]
    fn test_insert_keeps_earlier_type() {
        let mut trie = InstitutionTrie::new();
        trie.insert("General Hospital", 5, Some(InstitutionType::Hospital));
        trie.insert("General Hospital", 50, Some(InstitutionType::General));
        let entry = trie.entry("general hospital").unwrap();
        assert_eq!(entry.institution_type, Some(InstitutionType::Hospital));
        assert_eq!(entry.frequency, 50);
    }

    #[test]
    fn test_suggest_missing_prefix() {
        let trie = sample_trie();
        assert!(trie.suggest("zzz", 5).is_empty());
    }

    #[test]
    fn test_entries_returns_all() {
        let trie = sample_trie();
        assert_eq!(trie.entries().len(), trie.len());
    }

    proptest::proptest! {
        #[test]
        fn prop_normalize_idempotent(s in "\\PC{0,40}") {
            let once = normalize(&s);
            proptest::prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn prop_suggest_ordering(k in 1usize..6) {
            let trie = sample_trie();
            let suggestions = trie.suggest("mas", k);
            for pair in suggestions.windows(2) {
                proptest::prop_assert!(
                    pair[0].frequency > pair[1].frequency
                        || (pair[0].frequency == pair[1].frequency
                            && pair[0].normalized <= pair[1].normalized)
                );
            }
        }
    }
}
