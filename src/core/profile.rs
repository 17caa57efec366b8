//! Profile Record Types
//!
//! The extracted institution record, the polymorphic field value, and the
//! crawl-derived media bundle. The record is a single flat struct with one
//! optional slot per schema field, generated from a field-name table so the
//! struct and the name-based accessors cannot drift apart; a schema test
//! verifies the table against [`crate::core::schema::SCHEMA`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Field Values
// ============================================================================

/// Polymorphic field value, parsed once at the extractor boundary.
///
/// Absent fields are omitted entirely (`Option::None` on the record), never
/// stored as a null variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    List(Vec<Value>),
    Record(IndexMap<String, Value>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether the value carries no usable content (empty text, list or
    /// record). Empty values do not count as present for scoring.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(_) => false,
            Value::List(items) => items.is_empty(),
            Value::Record(map) => map.is_empty(),
        }
    }

    /// Convert a `serde_json::Value` into a field value.
    ///
    /// Nulls and empty strings become `None`; booleans are folded into text
    /// so downstream consumers see a single scalar shape.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Text(b.to_string())),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Value::Text(trimmed.to_string()))
                }
            }
            serde_json::Value::Array(items) => {
                let converted: Vec<Value> = items.iter().filter_map(Value::from_json).collect();
                if converted.is_empty() {
                    None
                } else {
                    Some(Value::List(converted))
                }
            }
            serde_json::Value::Object(map) => {
                let converted: IndexMap<String, Value> = map
                    .iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect();
                if converted.is_empty() {
                    None
                } else {
                    Some(Value::Record(converted))
                }
            }
        }
    }
}

// ============================================================================
// Profile Record
// ============================================================================

macro_rules! profile_record {
    ($($field:ident),* $(,)?) => {
        /// Flat extracted record: one optional slot per extractable schema
        /// field. Enhanced (media) fields live on [`MediaBundle`] instead.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct ProfileRecord {
            $(
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<Value>,
            )*
        }

        impl ProfileRecord {
            /// Names of every extractable field, in schema order.
            pub const FIELD_NAMES: &'static [&'static str] = &[$(stringify!($field)),*];

            /// Name-based field access, shared by scoring and merging.
            pub fn get(&self, name: &str) -> Option<&Value> {
                match name {
                    $(stringify!($field) => self.$field.as_ref(),)*
                    _ => None,
                }
            }

            /// Name-based field assignment. Returns false for names outside
            /// the schema, leaving the record untouched.
            pub fn set(&mut self, name: &str, value: Value) -> bool {
                match name {
                    $(stringify!($field) => { self.$field = Some(value); true },)*
                    _ => false,
                }
            }
        }
    };
}

profile_record!(
    // critical
    name,
    official_name,
    institution_type,
    website,
    description,
    location_city,
    location_country,
    founded,
    // important
    address,
    phone,
    email,
    ceo,
    region,
    postal_code,
    employee_count,
    parent_organization,
    motto,
    fax,
    // valuable
    mission_statement,
    history,
    awards,
    rankings,
    annual_budget,
    memberships,
    subsidiaries,
    leadership,
    // specialized: university
    student_population,
    faculty_count,
    programs_offered,
    tuition_fees,
    acceptance_rate,
    research_output,
    campus_size,
    accreditation,
    // specialized: hospital
    bed_count,
    medical_specialties,
    patient_capacity,
    emergency_services,
    research_centers,
    affiliated_universities,
    // specialized: bank
    total_assets,
    branches_count,
    services_offered,
    swift_code,
    stock_symbol,
    regulatory_bodies,
);

impl ProfileRecord {
    /// Whether a field is present with non-empty content.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).map_or(false, |v| !v.is_empty())
    }

    /// Assign every recognized key of an extractor response map, returning
    /// the keys that were dropped (outside the schema, or empty values).
    pub fn absorb_json(
        &mut self,
        map: &serde_json::Map<String, serde_json::Value>,
    ) -> Vec<String> {
        let mut dropped = Vec::new();
        for (key, json) in map {
            match Value::from_json(json) {
                Some(value) => {
                    if !self.set(key, value) {
                        dropped.push(key.clone());
                    }
                }
                None => {
                    // Nulls and empties are omissions, not malformed keys.
                }
            }
        }
        dropped
    }

    /// Count of fields present with content.
    pub fn present_count(&self) -> usize {
        Self::FIELD_NAMES.iter().filter(|n| self.has(n)).count()
    }
}

// ============================================================================
// Media Types
// ============================================================================

/// Where an image sat in the page DOM, as reported by the crawler engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DomLocation {
    Header,
    NearTitle,
    MainContent,
    Nav,
    Footer,
    Other,
}

impl Default for DomLocation {
    fn default() -> Self {
        DomLocation::Other
    }
}

/// Raw image record from a crawl artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Text found near the image in the document.
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub dom_location: DomLocation,
}

/// Image with both media scores attached. An image can be a logo candidate
/// and a relevant photograph at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredImage {
    #[serde(flatten)]
    pub image: ImageRecord,
    /// Relevance band, 0..=6.
    pub relevance_score: u8,
    /// Logo confidence in [0, 1].
    pub logo_confidence: f64,
}

/// External link matched against the known social-platform host list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialLink {
    pub platform: String,
    pub url: String,
}

/// Crawl-derived media attached to the final report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaBundle {
    /// Logo candidates (confidence >= 0.5), confidence descending.
    pub logos: Vec<ScoredImage>,
    /// Images with relevance >= 3, score descending.
    pub images: Vec<ScoredImage>,
    /// Subset with relevance >= 5.
    pub facility_images: Vec<ScoredImage>,
    /// Facility images whose alt/context mentions campus grounds.
    pub campus_images: Vec<ScoredImage>,
    pub social_links: Vec<SocialLink>,
    pub documents: Vec<String>,
    pub videos: Vec<String>,
}

impl MediaBundle {
    /// Presence of an enhanced schema field, used by the quality scorer.
    pub fn has_field(&self, name: &str) -> bool {
        match name {
            "logo" => !self.logos.is_empty(),
            "images" => !self.images.is_empty(),
            "facility_images" => !self.facility_images.is_empty(),
            "campus_images" => !self.campus_images.is_empty(),
            "social_links" => !self.social_links.is_empty(),
            "documents" => !self.documents.is_empty(),
            "videos" => !self.videos.is_empty(),
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.logos.is_empty()
            && self.images.is_empty()
            && self.social_links.is_empty()
            && self.documents.is_empty()
            && self.videos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{FieldClass, SCHEMA};

    #[test]
    fn test_record_and_schema_stay_in_sync() {
        // Every extractable schema field must be a record field, and every
        // record field must be in the schema with a non-enhanced class.
        for spec in SCHEMA.iter().filter(|s| s.class != FieldClass::Enhanced) {
            let mut record = ProfileRecord::default();
            assert!(
                record.set(spec.name, Value::text("x")),
                "schema field {} missing from ProfileRecord",
                spec.name
            );
        }
        for name in ProfileRecord::FIELD_NAMES {
            let class = crate::core::schema::field_class(name);
            assert!(
                matches!(class, Some(c) if c != FieldClass::Enhanced),
                "record field {} not in schema (or misclassified)",
                name
            );
        }
    }

    #[test]
    fn test_enhanced_fields_covered_by_media_bundle() {
        let media = MediaBundle {
            logos: vec![logo_image()],
            images: vec![logo_image()],
            facility_images: vec![logo_image()],
            campus_images: vec![logo_image()],
            social_links: vec![SocialLink {
                platform: "linkedin".into(),
                url: "https://linkedin.com/school/x".into(),
            }],
            documents: vec!["https://x.edu/annual-report.pdf".into()],
            videos: vec!["https://x.edu/tour.mp4".into()],
        };
        for spec in SCHEMA.iter().filter(|s| s.class == FieldClass::Enhanced) {
            assert!(media.has_field(spec.name), "enhanced field {} unmapped", spec.name);
        }
    }

    fn logo_image() -> ScoredImage {
        ScoredImage {
            image: ImageRecord {
                src: "/img/logo.png".into(),
                alt: "logo".into(),
                width: 120,
                height: 80,
                context: String::new(),
                dom_location: DomLocation::Header,
            },
            relevance_score: 6,
            logo_confidence: 1.0,
        }
    }

    #[test]
    fn test_value_from_json_drops_nulls_and_empties() {
        assert_eq!(Value::from_json(&serde_json::Value::Null), None);
        assert_eq!(Value::from_json(&serde_json::json!("  ")), None);
        assert_eq!(Value::from_json(&serde_json::json!([])), None);
        assert_eq!(
            Value::from_json(&serde_json::json!("Harvard")),
            Some(Value::text("Harvard"))
        );
        assert_eq!(Value::from_json(&serde_json::json!(1636)), Some(Value::number(1636.0)));
    }

    #[test]
    fn test_value_from_json_nested() {
        let json = serde_json::json!([{"name": "Jane Doe", "title": "President"}]);
        let value = Value::from_json(&json).unwrap();
        match value {
            Value::List(items) => {
                assert_eq!(items.len(), 1);
                match &items[0] {
                    Value::Record(map) => {
                        assert_eq!(map.get("name"), Some(&Value::text("Jane Doe")));
                    }
                    other => panic!("expected record, got {other:?}"),
                }
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_absorb_json_reports_unknown_keys() {
        let mut record = ProfileRecord::default();
        let map = serde_json::json!({
            "name": "Harvard University",
            "founded": 1636,
            "mascot": "John Harvard",
            "website": null
        });
        let dropped = record.absorb_json(map.as_object().unwrap());
        assert_eq!(dropped, vec!["mascot".to_string()]);
        assert!(record.has("name"));
        assert!(record.has("founded"));
        assert!(!record.has("website"));
    }

    #[test]
    fn test_record_serialization_omits_absent_fields() {
        let mut record = ProfileRecord::default();
        record.set("name", Value::text("Harvard University"));
        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("name"));
    }

    #[test]
    fn test_record_round_trip() {
        let mut record = ProfileRecord::default();
        record.set("name", Value::text("MIT"));
        record.set("founded", Value::number(1861.0));
        record.set(
            "leadership",
            Value::List(vec![Value::Record(
                [("name".to_string(), Value::text("Sally Kornbluth"))]
                    .into_iter()
                    .collect(),
            )]),
        );
        let json = serde_json::to_string(&record).unwrap();
        let back: ProfileRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_present_count_ignores_empty_values() {
        let mut record = ProfileRecord::default();
        record.set("name", Value::text("X"));
        record.set("motto", Value::text("   "));
        assert_eq!(record.present_count(), 1);
    }
}
