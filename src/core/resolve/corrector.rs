//! Trie-Validated Spell Correction
//!
//! Proposes corrections for a multi-word institution query. Candidate words
//! come from a SymSpell engine loaded with the institution word dictionary;
//! candidate phrases are the bounded cartesian product of per-word candidate
//! sets, and every emitted phrase must exist in the trie. Zero tolerance for
//! out-of-vocabulary suggestions: the trie membership test is the gate, not
//! a ranking signal.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use symspell::{SymSpell, UnicodeStringStrategy, Verbosity};

use super::trie::{normalize, InstitutionTrie};

/// Common institution-type terms unioned into the candidate set for the last
/// query word, so "harvard uni" can still reach "harvard university".
const TYPE_TERMS: &[&str] = &[
    "university",
    "college",
    "hospital",
    "clinic",
    "bank",
    "institute",
    "school",
    "academy",
    "medical",
    "center",
];

/// Queries longer than this are not corrected; the candidate product would
/// be meaningless noise at that length.
const MAX_QUERY_WORDS: usize = 8;

#[derive(Debug, Clone)]
pub struct CorrectorConfig {
    /// Maximum per-word edit distance, clamped to 2.
    pub max_edit_distance: usize,
    /// Cap on the candidate-phrase cartesian product.
    pub product_cap: usize,
    /// Per-position candidate cap applied before product pruning.
    pub max_word_candidates: usize,
}

impl Default for CorrectorConfig {
    fn default() -> Self {
        Self {
            max_edit_distance: 2,
            product_cap: 128,
            max_word_candidates: 8,
        }
    }
}

/// A single corrected word within a phrase suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCorrection {
    pub position: usize,
    pub original: String,
    pub corrected: String,
}

/// One trie-validated phrase suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseSuggestion {
    /// Normalized corrected phrase; guaranteed present in the trie.
    pub corrected_phrase: String,
    /// Original casing from the trie entry.
    pub original_name: String,
    pub corrections: Vec<WordCorrection>,
    pub total_edit_distance: usize,
    pub frequency: u64,
}

/// Spell corrector whose every suggestion is a known institution.
pub struct SpellCorrector {
    engine: SymSpell<UnicodeStringStrategy>,
    trie: Arc<InstitutionTrie>,
    config: CorrectorConfig,
}

impl SpellCorrector {
    /// Create a corrector with no word dictionary loaded. Candidates are
    /// then limited to the query words themselves plus type terms.
    pub fn new(trie: Arc<InstitutionTrie>, config: CorrectorConfig) -> Self {
        Self {
            engine: SymSpell::default(),
            trie,
            config,
        }
    }

    /// Load a SymSpell-format unigram dictionary (`term count` per line),
    /// as produced by dictionary ingestion. Returns false if the file could
    /// not be loaded.
    pub fn load_dictionary(&mut self, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        self.engine
            .load_dictionary(path.to_string_lossy().as_ref(), 0, 1, " ")
    }

    /// Correct a query. An empty result is the no-suggestion outcome, not an
    /// error: the bounded candidate product held no trie member.
    pub fn correct(&self, query: &str, limit: usize) -> Vec<PhraseSuggestion> {
        let normalized = normalize(query);
        let words: Vec<&str> = normalized.split_whitespace().collect();
        if words.is_empty() || words.len() > MAX_QUERY_WORDS || limit == 0 {
            return Vec::new();
        }

        let mut candidate_sets = self.candidate_sets(&words);
        Self::prune_to_cap(&mut candidate_sets, self.config.product_cap);

        let mut seen: HashSet<String> = HashSet::new();
        let mut suggestions = Vec::new();
        let mut indices = vec![0usize; candidate_sets.len()];
        loop {
            let phrase = candidate_sets
                .iter()
                .zip(&indices)
                .map(|(set, &i)| set[i].0.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            if let Some(entry) = self.trie.entry(&phrase) {
                if seen.insert(entry.normalized.clone()) {
                    let corrections: Vec<WordCorrection> = words
                        .iter()
                        .enumerate()
                        .filter(|(i, w)| candidate_sets[*i][indices[*i]].0 != **w)
                        .map(|(i, w)| WordCorrection {
                            position: i,
                            original: (*w).to_string(),
                            corrected: candidate_sets[i][indices[i]].0.clone(),
                        })
                        .collect();
                    let total_edit_distance = candidate_sets
                        .iter()
                        .zip(&indices)
                        .map(|(set, &i)| set[i].1)
                        .sum();
                    suggestions.push(PhraseSuggestion {
                        corrected_phrase: entry.normalized,
                        original_name: entry.original_name,
                        corrections,
                        total_edit_distance,
                        frequency: entry.frequency,
                    });
                }
            }

            // Odometer advance over the candidate product.
            let mut pos = indices.len();
            loop {
                if pos == 0 {
                    return Self::finish(suggestions, limit);
                }
                pos -= 1;
                indices[pos] += 1;
                if indices[pos] < candidate_sets[pos].len() {
                    break;
                }
                indices[pos] = 0;
            }
        }
    }

    /// Per-position candidate sets `(term, edit_distance)`, distance
    /// ascending, identity first.
    fn candidate_sets(&self, words: &[&str]) -> Vec<Vec<(String, usize)>> {
        let max_dist = self.config.max_edit_distance.min(2);
        let last = words.len() - 1;
        words
            .iter()
            .enumerate()
            .map(|(i, word)| {
                let mut set: Vec<(String, usize)> = vec![((*word).to_string(), 0)];
                for suggestion in self.engine.lookup(word, Verbosity::All, max_dist as i64) {
                    if suggestion.term != *word {
                        set.push((suggestion.term, suggestion.distance as usize));
                    }
                }
                if i == last {
                    for term in TYPE_TERMS {
                        if set.iter().all(|(t, _)| t != term) {
                            set.push(((*term).to_string(), strsim::levenshtein(word, term)));
                        }
                    }
                }
                set.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                set.dedup_by(|a, b| a.0 == b.0);
                set.truncate(self.config.max_word_candidates.max(1));
                set
            })
            .collect()
    }

    /// Shrink candidate sets until the product fits the cap, dropping the
    /// highest-distance candidate of the currently largest set each round.
    fn prune_to_cap(sets: &mut [Vec<(String, usize)>], cap: usize) {
        let cap = cap.max(1);
        loop {
            let product = sets
                .iter()
                .fold(1usize, |acc, s| acc.saturating_mul(s.len().max(1)));
            if product <= cap {
                return;
            }
            let Some(largest) = sets
                .iter_mut()
                .filter(|s| s.len() > 1)
                .max_by_key(|s| s.len())
            else {
                return;
            };
            largest.pop();
        }
    }

    fn finish(mut suggestions: Vec<PhraseSuggestion>, limit: usize) -> Vec<PhraseSuggestion> {
        suggestions.sort_by(|a, b| {
            a.total_edit_distance
                .cmp(&b.total_edit_distance)
                .then_with(|| b.frequency.cmp(&a.frequency))
                .then_with(|| a.corrected_phrase.cmp(&b.corrected_phrase))
        });
        suggestions.truncate(limit);
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolve::dictionary::DictionaryLoader;
    use crate::core::schema::InstitutionType;
    use std::collections::HashMap;

    fn fixture() -> (tempfile::TempDir, SpellCorrector) {
        let mut trie = InstitutionTrie::new();
        trie.insert("Harvard University", 10, Some(InstitutionType::University));
        trie.insert("Harvest", 1, None);
        trie.insert("Stanford University", 20, Some(InstitutionType::University));
        trie.insert("Massachusetts General Hospital", 80, Some(InstitutionType::Hospital));

        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in trie.entries() {
            for word in entry.normalized.split_whitespace() {
                *counts.entry(word.to_string()).or_insert(0) += entry.frequency;
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let dict_path = dir.path().join("institutions.dict");
        DictionaryLoader::default()
            .write_symspell_dictionary(&counts, &dict_path)
            .unwrap();

        let mut corrector = SpellCorrector::new(Arc::new(trie), CorrectorConfig::default());
        assert!(corrector.load_dictionary(&dict_path));
        (dir, corrector)
    }

    #[test]
    fn test_single_typo_correction() {
        // "harvrd university" -> exactly "harvard university", one
        // correction at position 0, edit distance 1.
        let (_dir, corrector) = fixture();
        let suggestions = corrector.correct("harvrd university", 5);
        assert_eq!(suggestions.len(), 1);
        let top = &suggestions[0];
        assert_eq!(top.corrected_phrase, "harvard university");
        assert_eq!(top.original_name, "Harvard University");
        assert_eq!(top.total_edit_distance, 1);
        assert_eq!(
            top.corrections,
            vec![WordCorrection {
                position: 0,
                original: "harvrd".to_string(),
                corrected: "harvard".to_string(),
            }]
        );
    }

    #[test]
    fn test_exact_query_yields_zero_distance_suggestion() {
        let (_dir, corrector) = fixture();
        let suggestions = corrector.correct("Harvard University", 5);
        assert_eq!(suggestions[0].corrected_phrase, "harvard university");
        assert_eq!(suggestions[0].total_edit_distance, 0);
        assert!(suggestions[0].corrections.is_empty());
    }

    #[test]
    fn test_no_suggestion_for_unknown_phrase() {
        let (_dir, corrector) = fixture();
        assert!(corrector.correct("quantum flux capacitors", 5).is_empty());
    }

    #[test]
    fn test_type_term_completion_on_last_word() {
        let (_dir, corrector) = fixture();
        // "univrsity" is within distance 1 of the type term "university".
        let suggestions = corrector.correct("stanford univrsity", 5);
        assert!(suggestions
            .iter()
            .any(|s| s.corrected_phrase == "stanford university"));
    }

    #[test]
    fn test_every_suggestion_is_in_trie() {
        let (_dir, corrector) = fixture();
        for query in [
            "harvrd university",
            "harvet",
            "massachusets general hospial",
            "stanford university",
            "stanfrd universty",
        ] {
            for suggestion in corrector.correct(query, 10) {
                assert!(
                    corrector.trie.contains(&suggestion.corrected_phrase),
                    "out-of-vocabulary suggestion {:?} for query {:?}",
                    suggestion.corrected_phrase,
                    query
                );
            }
        }
    }

    #[test]
    fn test_ordering_distance_then_frequency() {
        let mut trie = InstitutionTrie::new();
        trie.insert("Mercy Hospital", 50, Some(InstitutionType::Hospital));
        trie.insert("Marcy Hospital", 5, Some(InstitutionType::Hospital));

        let mut counts: HashMap<String, u64> = HashMap::new();
        for w in ["mercy", "marcy", "hospital"] {
            counts.insert(w.to_string(), 10);
        }
        let dir = tempfile::tempdir().unwrap();
        let dict_path = dir.path().join("d.dict");
        DictionaryLoader::default()
            .write_symspell_dictionary(&counts, &dict_path)
            .unwrap();
        let mut corrector = SpellCorrector::new(Arc::new(trie), CorrectorConfig::default());
        corrector.load_dictionary(&dict_path);

        // "mrcy" is distance 1 from both; frequency breaks the tie.
        let suggestions = corrector.correct("mrcy hospital", 5);
        assert!(suggestions.len() >= 2);
        assert_eq!(suggestions[0].corrected_phrase, "mercy hospital");
        assert_eq!(suggestions[1].corrected_phrase, "marcy hospital");
    }

    #[test]
    fn test_product_cap_pruning() {
        let mut sets = vec![
            vec![("a".to_string(), 0), ("b".to_string(), 1), ("c".to_string(), 2)],
            vec![("d".to_string(), 0), ("e".to_string(), 1)],
        ];
        SpellCorrector::prune_to_cap(&mut sets, 4);
        let product: usize = sets.iter().map(|s| s.len()).product();
        assert!(product <= 4);
        // Identity candidates survive pruning.
        assert_eq!(sets[0][0].0, "a");
        assert_eq!(sets[1][0].0, "d");
    }

    #[test]
    fn test_overlong_query_not_corrected() {
        let (_dir, corrector) = fixture();
        let query = "a b c d e f g h i j";
        assert!(corrector.correct(query, 5).is_empty());
    }
}
