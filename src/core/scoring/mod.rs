//! Scoring Engines
//!
//! Per-image media heuristics (logo confidence, relevance bands) and the
//! type-aware profile quality score.

pub mod media;
pub mod quality;

pub use media::{image_relevance, is_campus_image, logo_confidence, score_image, LOGO_CONFIDENCE_THRESHOLD};
pub use quality::{score, ClassRatio, DataSignals, QualityScore, Rating};
