//! Input Resolution
//!
//! Resolves free-text institution queries against the known-institution
//! dictionary: prefix trie, trie-validated spell correction, autocomplete,
//! and the CSV ingestion that populates all of them at startup. The trie
//! and corrector are built once and immutable afterwards; every suggestion
//! either component emits corresponds to a reachable trie terminal.

pub mod autocomplete;
pub mod corrector;
pub mod dictionary;
pub mod error;
pub mod trie;

pub use autocomplete::{Autocomplete, AutocompleteConfig, AutocompleteSuggestion, Provenance};
pub use corrector::{CorrectorConfig, PhraseSuggestion, SpellCorrector, WordCorrection};
pub use dictionary::{DictionaryLoader, LoadSummary};
pub use error::{ResolveError, ResolveResult};
pub use trie::{normalize, InstitutionTrie, TrieEntry, TrieMetadata};
