//! Media Scoring Heuristics
//!
//! Logo confidence and image relevance for crawl-derived images. Both
//! scorers are pure: the same image and institution name always produce the
//! same scores. When an image straddles two relevance bands the lower,
//! more conservative band wins.

use crate::core::profile::{DomLocation, ImageRecord, ScoredImage};

/// Logo candidates at or above this confidence are classified as logos.
pub const LOGO_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Alt/context terms indicating campus or facility photography.
const FACILITY_TERMS: &[&str] = &[
    "campus",
    "building",
    "facility",
    "facilities",
    "grounds",
    "aerial",
    "branding",
    "headquarters",
    "exterior",
];

/// Alt/context terms indicating type-specific activity shots.
const ACTIVITY_TERMS: &[&str] = &[
    "students",
    "program",
    "programs",
    "event",
    "events",
    "staff",
    "faculty",
    "patients",
    "graduation",
    "lecture",
    "surgery",
    "ceremony",
];

/// Decorative filler keywords.
const DECORATIVE_TERMS: &[&str] = &["decoration", "divider", "spacer", "background", "pattern"];

/// Hosts and path fragments marking ads, share widgets, and trackers.
const AD_TRACKER_MARKERS: &[&str] = &[
    "doubleclick",
    "adservice",
    "googlesyndication",
    "facebook.com/tr",
    "sharethis",
    "addthis",
    "pixel",
    "tracker",
    "analytics",
];

/// Compute the logo confidence of an image, clamped to [0, 1].
///
/// Additive evidence: logo-ish source URL, logo-ish or name-bearing alt
/// text, logo-shaped dimensions, and header/near-title DOM placement.
pub fn logo_confidence(image: &ImageRecord, institution_name: &str) -> f64 {
    let src = image.src.to_lowercase();
    let alt = image.alt.to_lowercase();
    let mut confidence: f64 = 0.0;

    if src.contains("logo") || src.contains("brand") {
        confidence += 0.4;
    }

    let name_tokens: Vec<String> = institution_name
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let alt_mentions_name =
        !name_tokens.is_empty() && name_tokens.iter().all(|t| alt.contains(t.as_str()));
    if alt.contains("logo") || alt_mentions_name {
        confidence += 0.3;
    }

    if (50..=400).contains(&image.width) && (50..=200).contains(&image.height) {
        confidence += 0.2;
    }

    if matches!(image.dom_location, DomLocation::Header | DomLocation::NearTitle) {
        confidence += 0.2;
    }

    confidence.min(1.0)
}

/// Assign the image relevance band, 0..=6. Bands are checked from most
/// disqualifying (0) upward so ties resolve to the lower band.
pub fn image_relevance(image: &ImageRecord, logo_confidence: f64) -> u8 {
    let src = image.src.to_lowercase();
    let alt = image.alt.to_lowercase();
    let context = image.context.to_lowercase();
    let haystack = format!("{alt} {context}");

    // 0: advertisement / social-share / tracker.
    if AD_TRACKER_MARKERS.iter().any(|m| src.contains(m)) {
        return 0;
    }

    // 1: navigation or UI icon.
    let max_dim = image.width.max(image.height);
    if (max_dim > 0 && max_dim <= 64) || image.dom_location == DomLocation::Nav {
        return 1;
    }

    // 6: confirmed logo. Checked ahead of the dimension bands: logos are
    // routinely small, and confirmation overrides size.
    if logo_confidence >= 0.8 {
        return 6;
    }

    // 2: decorative.
    let small = image.width < 200 || image.height < 200;
    if DECORATIVE_TERMS.iter().any(|t| haystack.contains(t)) || small {
        return 2;
    }

    // 5: facility/branding photograph.
    let photograph = image.width >= 300 && image.height >= 300;
    if photograph && FACILITY_TERMS.iter().any(|t| haystack.contains(t)) {
        return 5;
    }

    // 4: type-specific activity shot.
    let medium = image.width >= 200 && image.height >= 200;
    if medium && ACTIVITY_TERMS.iter().any(|t| haystack.contains(t)) {
        return 4;
    }

    // 3: main-content placement with a generic caption.
    if image.dom_location == DomLocation::MainContent {
        return 3;
    }

    2
}

/// Score one image with both heuristics.
pub fn score_image(image: ImageRecord, institution_name: &str) -> ScoredImage {
    let confidence = logo_confidence(&image, institution_name);
    let relevance = image_relevance(&image, confidence);
    ScoredImage {
        image,
        relevance_score: relevance,
        logo_confidence: confidence,
    }
}

/// Whether a scored image reads as campus grounds photography.
pub fn is_campus_image(image: &ScoredImage) -> bool {
    let haystack = format!(
        "{} {}",
        image.image.alt.to_lowercase(),
        image.image.context.to_lowercase()
    );
    image.relevance_score >= 5 && haystack.contains("campus")
}
