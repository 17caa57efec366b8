//! Caching Layer
//!
//! Normalized query keys, the similarity cache used by the search and
//! extraction phases, the per-URL crawl cache, and the per-entry file
//! persistence behind all three.

pub mod disk;
pub mod key;
pub mod store;

pub use disk::{key_file_stem, DiskStore};
pub use key::{canonicalize, similarity, AbbreviationTable, NormalizedKey, SIMILARITY_THRESHOLD};
pub use store::{CacheEntry, CacheHit, CacheProvenance, CacheStats, SimilarityCache};
