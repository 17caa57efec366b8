//! Institution Field Schema
//!
//! The closed field schema shared by the extractor and the quality scorer.
//! Fields are partitioned into five priority classes; specialized fields are
//! additionally tagged with the institution types they apply to. The schema
//! is frozen at build time: adding a field means updating this table and the
//! record in [`crate::core::profile`] together (a test enforces the two stay
//! in sync).

use serde::{Deserialize, Serialize};

/// Bumped whenever the field table changes shape. Part of the extraction
/// cache key so stale cached extractions are never replayed against a newer
/// schema.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Institution Types
// ============================================================================

/// Classification of a profiled institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstitutionType {
    University,
    Hospital,
    Bank,
    General,
}

impl InstitutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstitutionType::University => "university",
            InstitutionType::Hospital => "hospital",
            InstitutionType::Bank => "bank",
            InstitutionType::General => "general",
        }
    }

    /// Parse a user-supplied type tag. Case-insensitive; unknown tags map to
    /// `None` so callers can fall back to inference.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "university" | "college" => Some(InstitutionType::University),
            "hospital" | "clinic" => Some(InstitutionType::Hospital),
            "bank" => Some(InstitutionType::Bank),
            "general" => Some(InstitutionType::General),
            _ => None,
        }
    }

    /// Infer the institution type from a free-text name.
    ///
    /// Ordered keyword scan against the lowercased name; first match wins,
    /// fallback is `General`.
    pub fn infer(name: &str) -> Self {
        let lower = name.to_lowercase();
        for (keywords, ty) in TYPE_KEYWORDS {
            if keywords.iter().any(|kw| lower.contains(kw)) {
                return *ty;
            }
        }
        InstitutionType::General
    }
}

impl std::fmt::Display for InstitutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword table for type inference, checked in order.
const TYPE_KEYWORDS: &[(&[&str], InstitutionType)] = &[
    (
        &["university", "college", "institute of", "polytechnic", "academy"],
        InstitutionType::University,
    ),
    (
        &["hospital", "clinic", "medical center", "medical centre", "health system"],
        InstitutionType::Hospital,
    ),
    (
        &["bank", "banking", "financial", "credit union"],
        InstitutionType::Bank,
    ),
];

// ============================================================================
// Field Classes
// ============================================================================

/// Priority class of a schema field. Drives the quality-score weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldClass {
    Critical,
    Important,
    Valuable,
    Specialized,
    Enhanced,
}

impl FieldClass {
    /// Base weight of this class in the quality score.
    pub fn weight(&self) -> f64 {
        match self {
            FieldClass::Critical => 0.40,
            FieldClass::Important => 0.25,
            FieldClass::Valuable => 0.20,
            FieldClass::Specialized => 0.10,
            FieldClass::Enhanced => 0.05,
        }
    }

    pub const ALL: [FieldClass; 5] = [
        FieldClass::Critical,
        FieldClass::Important,
        FieldClass::Valuable,
        FieldClass::Specialized,
        FieldClass::Enhanced,
    ];
}

// ============================================================================
// Field Table
// ============================================================================

/// One entry of the frozen field schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub class: FieldClass,
    /// Institution types this field applies to. Empty slice = all types.
    pub types: &'static [InstitutionType],
}

impl FieldSpec {
    /// Whether this field counts for a record of the given type.
    ///
    /// Specialized fields only count for their tagged types; for `General`
    /// records no specialized field is eligible.
    pub fn eligible_for(&self, ty: InstitutionType) -> bool {
        if self.types.is_empty() {
            return true;
        }
        ty != InstitutionType::General && self.types.contains(&ty)
    }
}

const ALL_TYPES: &[InstitutionType] = &[];
const UNIVERSITY: &[InstitutionType] = &[InstitutionType::University];
const HOSPITAL: &[InstitutionType] = &[InstitutionType::Hospital];
const BANK: &[InstitutionType] = &[InstitutionType::Bank];

macro_rules! spec {
    ($name:literal, $class:ident, $types:expr) => {
        FieldSpec {
            name: $name,
            class: FieldClass::$class,
            types: $types,
        }
    };
}

/// The frozen field schema. Extraction and scoring both read this table.
pub const SCHEMA: &[FieldSpec] = &[
    // Critical
    spec!("name", Critical, ALL_TYPES),
    spec!("official_name", Critical, ALL_TYPES),
    spec!("institution_type", Critical, ALL_TYPES),
    spec!("website", Critical, ALL_TYPES),
    spec!("description", Critical, ALL_TYPES),
    spec!("location_city", Critical, ALL_TYPES),
    spec!("location_country", Critical, ALL_TYPES),
    spec!("founded", Critical, ALL_TYPES),
    // Important
    spec!("address", Important, ALL_TYPES),
    spec!("phone", Important, ALL_TYPES),
    spec!("email", Important, ALL_TYPES),
    spec!("ceo", Important, ALL_TYPES),
    spec!("region", Important, ALL_TYPES),
    spec!("postal_code", Important, ALL_TYPES),
    spec!("employee_count", Important, ALL_TYPES),
    spec!("parent_organization", Important, ALL_TYPES),
    spec!("motto", Important, ALL_TYPES),
    spec!("fax", Important, ALL_TYPES),
    // Valuable
    spec!("mission_statement", Valuable, ALL_TYPES),
    spec!("history", Valuable, ALL_TYPES),
    spec!("awards", Valuable, ALL_TYPES),
    spec!("rankings", Valuable, ALL_TYPES),
    spec!("annual_budget", Valuable, ALL_TYPES),
    spec!("memberships", Valuable, ALL_TYPES),
    spec!("subsidiaries", Valuable, ALL_TYPES),
    spec!("leadership", Valuable, ALL_TYPES),
    // Specialized: university
    spec!("student_population", Specialized, UNIVERSITY),
    spec!("faculty_count", Specialized, UNIVERSITY),
    spec!("programs_offered", Specialized, UNIVERSITY),
    spec!("tuition_fees", Specialized, UNIVERSITY),
    spec!("acceptance_rate", Specialized, UNIVERSITY),
    spec!("research_output", Specialized, UNIVERSITY),
    spec!("campus_size", Specialized, UNIVERSITY),
    spec!("accreditation", Specialized, UNIVERSITY),
    // Specialized: hospital
    spec!("bed_count", Specialized, HOSPITAL),
    spec!("medical_specialties", Specialized, HOSPITAL),
    spec!("patient_capacity", Specialized, HOSPITAL),
    spec!("emergency_services", Specialized, HOSPITAL),
    spec!("research_centers", Specialized, HOSPITAL),
    spec!("affiliated_universities", Specialized, HOSPITAL),
    // Specialized: bank
    spec!("total_assets", Specialized, BANK),
    spec!("branches_count", Specialized, BANK),
    spec!("services_offered", Specialized, BANK),
    spec!("swift_code", Specialized, BANK),
    spec!("stock_symbol", Specialized, BANK),
    spec!("regulatory_bodies", Specialized, BANK),
    // Enhanced (derived from crawl media, not extracted by the LLM)
    spec!("logo", Enhanced, ALL_TYPES),
    spec!("images", Enhanced, ALL_TYPES),
    spec!("facility_images", Enhanced, ALL_TYPES),
    spec!("campus_images", Enhanced, ALL_TYPES),
    spec!("social_links", Enhanced, ALL_TYPES),
    spec!("documents", Enhanced, ALL_TYPES),
    spec!("videos", Enhanced, ALL_TYPES),
];

/// Look up the class of a schema field. `None` for out-of-schema names.
pub fn field_class(name: &str) -> Option<FieldClass> {
    SCHEMA.iter().find(|s| s.name == name).map(|s| s.class)
}

/// All fields of a class eligible for the given institution type.
pub fn eligible_fields(class: FieldClass, ty: InstitutionType) -> impl Iterator<Item = &'static FieldSpec> {
    SCHEMA
        .iter()
        .filter(move |s| s.class == class && s.eligible_for(ty))
}
