//! Profile Quality Scoring
//!
//! Type-aware 0-100 score over the final record: weighted field-presence
//! base (0-75) plus bonus points (0-25) for visual content, richness, data
//! source quality, and processing success. Pure and deterministic given its
//! inputs.
//!
//! The base score counts extracted record fields only; crawl-derived media
//! earns its points through the visual-content bonus, not the field ratios.

use serde::{Deserialize, Serialize};

use crate::core::profile::{MediaBundle, ProfileRecord};
use crate::core::schema::{eligible_fields, FieldClass, InstitutionType};

// ============================================================================
// Inputs
// ============================================================================

/// Request-level signals feeding the data-quality and processing bonuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSignals {
    /// Distinct source pages contributing to the profile.
    pub sources: usize,
    pub crawl_attempted: usize,
    pub crawl_succeeded: usize,
    pub total_bytes: u64,
    pub cache_hits: usize,
    pub cache_lookups: usize,
    /// Pipeline phases that completed without degradation, 0..=3.
    pub phases_ok: u8,
}

impl DataSignals {
    fn crawl_success_rate(&self) -> f64 {
        if self.crawl_attempted == 0 {
            0.0
        } else {
            self.crawl_succeeded as f64 / self.crawl_attempted as f64
        }
    }

    fn cache_hit_rate(&self) -> f64 {
        if self.cache_lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.cache_lookups as f64
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Rating band for a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Exceptional,
    Excellent,
    VeryGood,
    Good,
    Fair,
    Poor,
    VeryPoor,
    Minimal,
}

impl Rating {
    pub fn for_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => Rating::Exceptional,
            s if s >= 80.0 => Rating::Excellent,
            s if s >= 70.0 => Rating::VeryGood,
            s if s >= 60.0 => Rating::Good,
            s if s >= 50.0 => Rating::Fair,
            s if s >= 35.0 => Rating::Poor,
            s if s >= 20.0 => Rating::VeryPoor,
            _ => Rating::Minimal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Exceptional => "Exceptional",
            Rating::Excellent => "Excellent",
            Rating::VeryGood => "Very Good",
            Rating::Good => "Good",
            Rating::Fair => "Fair",
            Rating::Poor => "Poor",
            Rating::VeryPoor => "Very Poor",
            Rating::Minimal => "Minimal",
        }
    }
}

/// Per-class presence ratio in the breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRatio {
    pub class: FieldClass,
    pub present: usize,
    pub eligible: usize,
}

/// Full scoring result with its component breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: f64,
    pub rating: Rating,
    /// Weighted field-presence component in [0, 1].
    pub base: f64,
    pub class_ratios: Vec<ClassRatio>,
    pub visual_bonus: u8,
    pub richness_bonus: u8,
    pub data_quality_bonus: u8,
    pub processing_bonus: u8,
}

// ============================================================================
// Scorer
// ============================================================================

/// Score a profile. `institution_type` selects which specialized fields are
/// eligible; for `General` the specialized class drops out and the remaining
/// class weights renormalize.
pub fn score(
    record: &ProfileRecord,
    institution_type: InstitutionType,
    media: &MediaBundle,
    signals: &DataSignals,
) -> QualityScore {
    let mut weighted = 0.0;
    let mut weight_total = 0.0;
    let mut class_ratios = Vec::with_capacity(FieldClass::ALL.len());

    for class in FieldClass::ALL {
        let eligible: Vec<&str> = eligible_fields(class, institution_type)
            .map(|s| s.name)
            .collect();
        if eligible.is_empty() {
            class_ratios.push(ClassRatio {
                class,
                present: 0,
                eligible: 0,
            });
            continue;
        }
        let present = eligible.iter().filter(|name| record.has(name)).count();
        weighted += class.weight() * present as f64 / eligible.len() as f64;
        weight_total += class.weight();
        class_ratios.push(ClassRatio {
            class,
            present,
            eligible: eligible.len(),
        });
    }

    let base = if weight_total > 0.0 {
        weighted / weight_total
    } else {
        0.0
    };

    let visual_bonus = visual_bonus(media);
    let richness_bonus = richness_bonus(media, signals);
    let data_quality_bonus = data_quality_bonus(signals);
    let processing_bonus = processing_bonus(signals);

    let score = (base * 75.0
        + f64::from(visual_bonus)
        + f64::from(richness_bonus)
        + f64::from(data_quality_bonus)
        + f64::from(processing_bonus))
    .clamp(0.0, 100.0);

    QualityScore {
        score,
        rating: Rating::for_score(score),
        base,
        class_ratios,
        visual_bonus,
        richness_bonus,
        data_quality_bonus,
        processing_bonus,
    }
}

/// Visual content, up to 8: logo +3, any image +2, any facility image +2,
/// any campus image +1.
fn visual_bonus(media: &MediaBundle) -> u8 {
    let mut bonus = 0;
    if !media.logos.is_empty() {
        bonus += 3;
    }
    if !media.images.is_empty() {
        bonus += 2;
    }
    if !media.facility_images.is_empty() {
        bonus += 2;
    }
    if !media.campus_images.is_empty() {
        bonus += 1;
    }
    bonus
}

/// Richness, up to 7: social links +2, documents +2, three or more sources +3.
fn richness_bonus(media: &MediaBundle, signals: &DataSignals) -> u8 {
    let mut bonus = 0;
    if !media.social_links.is_empty() {
        bonus += 2;
    }
    if !media.documents.is_empty() {
        bonus += 2;
    }
    if signals.sources >= 3 {
        bonus += 3;
    }
    bonus
}

/// Data-source quality, up to 10: crawl success >= 80% +3, more than 1 MiB
/// fetched +2, mostly-fresh data (cache hit rate <= 50%) +2, at least two
/// sources +3.
fn data_quality_bonus(signals: &DataSignals) -> u8 {
    let mut bonus = 0;
    if signals.crawl_attempted > 0 && signals.crawl_success_rate() >= 0.8 {
        bonus += 3;
    }
    if signals.total_bytes > 1_048_576 {
        bonus += 2;
    }
    if signals.cache_lookups > 0 && signals.cache_hit_rate() <= 0.5 {
        bonus += 2;
    }
    if signals.sources >= 2 {
        bonus += 3;
    }
    bonus
}

/// Processing success, up to 5: two phases ok +2, all three +3 more.
fn processing_bonus(signals: &DataSignals) -> u8 {
    let mut bonus = 0;
    if signals.phases_ok >= 2 {
        bonus += 2;
    }
    if signals.phases_ok >= 3 {
        bonus += 3;
    }
    bonus
}
