//! Autocomplete Front End
//!
//! Prefix completion over the trie with a spell-correction fallback. Each
//! result is annotated with its provenance so callers can distinguish plain
//! completions from corrections. When the bare prefix has no completions, a
//! configurable set of institutional prefix tokens generates alternate
//! prefixes ("mass" also tries "university of mass", "bank of mass", ...).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::corrector::SpellCorrector;
use super::trie::{normalize, InstitutionTrie};
use crate::core::schema::InstitutionType;

/// How a suggestion was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Autocomplete,
    SpellCorrection,
}

/// One annotated autocomplete result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutocompleteSuggestion {
    /// Original casing for display.
    pub text: String,
    pub normalized: String,
    pub frequency: u64,
    pub institution_type: Option<InstitutionType>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone)]
pub struct AutocompleteConfig {
    /// Default result limit.
    pub limit: usize,
    /// Minimum prefix length (chars) before the spell fallback may run on a
    /// single-token prefix.
    pub min_fallback_chars: usize,
    /// Institutional prefix tokens tried when the bare prefix is empty.
    pub prefix_variations: Vec<String>,
}

impl Default for AutocompleteConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            min_fallback_chars: 4,
            prefix_variations: vec![
                "university of".to_string(),
                "college of".to_string(),
                "institute of".to_string(),
                "hospital of".to_string(),
                "bank of".to_string(),
            ],
        }
    }
}

/// Autocomplete over the trie with trie-validated spell fallback.
pub struct Autocomplete {
    trie: Arc<InstitutionTrie>,
    corrector: Arc<SpellCorrector>,
    config: AutocompleteConfig,
}

impl Autocomplete {
    pub fn new(
        trie: Arc<InstitutionTrie>,
        corrector: Arc<SpellCorrector>,
        config: AutocompleteConfig,
    ) -> Self {
        Self {
            trie,
            corrector,
            config,
        }
    }

    /// Complete a prefix, newest results first by frequency. Falls back to
    /// spell correction only when completion (including prefix variations)
    /// found nothing and the prefix is substantial enough.
    pub fn complete(&self, prefix: &str, k: usize) -> Vec<AutocompleteSuggestion> {
        let k = if k == 0 { self.config.limit } else { k };

        let direct = self.trie.suggest(prefix, k);
        if !direct.is_empty() {
            return direct.into_iter().map(|e| annotate(e, Provenance::Autocomplete)).collect();
        }

        let varied = self.prefix_variations(prefix, k);
        if !varied.is_empty() {
            return varied;
        }

        if self.fallback_allowed(prefix) {
            return self
                .corrector
                .correct(prefix, k)
                .into_iter()
                .map(|s| AutocompleteSuggestion {
                    text: s.original_name,
                    normalized: s.corrected_phrase,
                    frequency: s.frequency,
                    institution_type: None,
                    provenance: Provenance::SpellCorrection,
                })
                .collect();
        }
        Vec::new()
    }

    /// Alternate prefixes built from institutional prefix tokens, merged and
    /// re-ranked by frequency across all variations.
    fn prefix_variations(&self, prefix: &str, k: usize) -> Vec<AutocompleteSuggestion> {
        let mut merged = Vec::new();
        for token in &self.config.prefix_variations {
            let alternate = format!("{token} {prefix}");
            for entry in self.trie.suggest(&alternate, k) {
                if merged
                    .iter()
                    .all(|s: &AutocompleteSuggestion| s.normalized != entry.normalized)
                {
                    merged.push(annotate(entry, Provenance::Autocomplete));
                }
            }
        }
        merged.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.normalized.cmp(&b.normalized))
        });
        merged.truncate(k);
        merged
    }

    fn fallback_allowed(&self, prefix: &str) -> bool {
        let normalized = normalize(prefix);
        let tokens = normalized.split_whitespace().count();
        tokens >= 2 || normalized.chars().count() >= self.config.min_fallback_chars
    }
}

fn annotate(entry: super::trie::TrieEntry, provenance: Provenance) -> AutocompleteSuggestion {
    AutocompleteSuggestion {
        text: entry.original_name,
        normalized: entry.normalized,
        frequency: entry.frequency,
        institution_type: entry.institution_type,
        provenance,
    }
}
