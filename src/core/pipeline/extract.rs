//! Extract Phase
//!
//! Prompts the LLM with the field schema and the prepared content, parses
//! the response against the schema (malformed keys are dropped and
//! reported), and merges crawl-derived media into the result. On LLM or
//! parse failure the record degrades to the fields derivable from crawl
//! artifacts alone.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::context::PhaseMetrics;
use super::crawl::CrawlOutcome;
use super::content::PreparedContent;
use super::error::{ErrorKind, PhaseFailure};
use crate::core::cache::NormalizedKey;
use crate::core::profile::{MediaBundle, ProfileRecord, SocialLink, Value};
use crate::core::providers::{CompletionRequest, Services};
use crate::core::schema::{eligible_fields, FieldClass, InstitutionType, SCHEMA_VERSION};
use crate::core::scoring::{is_campus_image, LOGO_CONFIDENCE_THRESHOLD};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            model_id: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            temperature: 0.1,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Extract phase output; the record alone is the cacheable value.
#[derive(Debug, Clone, Default)]
pub struct ExtractOutcome {
    pub record: ProfileRecord,
    /// Response keys outside the schema, dropped with a warning.
    pub dropped_keys: Vec<String>,
    pub metrics: PhaseMetrics,
}

// ============================================================================
// Phase
// ============================================================================

pub struct ExtractPhase {
    config: ExtractConfig,
}

impl ExtractPhase {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    /// Extraction cache key: normalized key, content hash, schema version,
    /// model. Any of the four changing invalidates the entry.
    pub fn cache_key(&self, key: &NormalizedKey, prepared: &PreparedContent) -> String {
        format!(
            "{}|{}|v{}|{}",
            key.cache_key(),
            prepared.hash(),
            SCHEMA_VERSION,
            self.config.model_id
        )
    }

    pub async fn run(
        &self,
        services: &Services,
        institution_name: &str,
        institution_type: InstitutionType,
        prepared: &PreparedContent,
        cancel: &CancellationToken,
    ) -> Result<ExtractOutcome, PhaseFailure> {
        let request = CompletionRequest {
            system_prompt: build_system_prompt(institution_type),
            user_prompt: build_user_prompt(institution_name, prepared),
            model_id: self.config.model_id.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut metrics = PhaseMetrics {
            api_calls: 1,
            ..Default::default()
        };
        let completion = tokio::select! {
            result = services.llm.complete(&request) => result,
            _ = cancel.cancelled() => {
                return Err(PhaseFailure { kind: ErrorKind::Canceled, metrics });
            }
        };
        let completion = match completion {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %e, "llm completion failed");
                return Err(PhaseFailure {
                    kind: ErrorKind::ExtractFailed,
                    metrics,
                });
            }
        };
        metrics.input_tokens = completion.input_tokens;
        metrics.output_tokens = completion.output_tokens;
        metrics.cost_usd = completion.cost_usd;

        match parse_record(&completion.text) {
            Some((record, dropped_keys)) => {
                if !dropped_keys.is_empty() {
                    debug!(?dropped_keys, "extractor returned out-of-schema keys");
                }
                Ok(ExtractOutcome {
                    record,
                    dropped_keys,
                    metrics,
                })
            }
            None => {
                warn!("llm response held no parseable record");
                Err(PhaseFailure {
                    kind: ErrorKind::ExtractFailed,
                    metrics,
                })
            }
        }
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// System prompt embedding the schema, specialized fields filtered by type.
pub fn build_system_prompt(institution_type: InstitutionType) -> String {
    let mut prompt = String::from(
        "You extract structured institution profiles from web content.\n\
         Respond with a single JSON object and nothing else.\n\
         Only use the field names listed below. Omit any field the content\n\
         does not support; never invent values, never emit null.\n\n",
    );
    for class in [
        FieldClass::Critical,
        FieldClass::Important,
        FieldClass::Valuable,
        FieldClass::Specialized,
    ] {
        let names: Vec<&str> = eligible_fields(class, institution_type)
            .map(|s| s.name)
            .collect();
        if names.is_empty() {
            continue;
        }
        let label = match class {
            FieldClass::Critical => "Core fields",
            FieldClass::Important => "Contact and organization fields",
            FieldClass::Valuable => "Background fields",
            // Enhanced fields are crawl-derived and never prompted.
            FieldClass::Specialized | FieldClass::Enhanced => "Type-specific fields",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(&names.join(", "));
        prompt.push('\n');
    }
    prompt.push_str(
        "\n`leadership` is a list of {name, title} objects. Numeric fields\n\
         may be numbers or descriptive strings, whichever the source gives.\n",
    );
    prompt
}

fn build_user_prompt(institution_name: &str, prepared: &PreparedContent) -> String {
    format!(
        "Institution: {institution_name}\n\nSource content:\n{}",
        prepared.text
    )
}

/// Pull the JSON object out of the response text, tolerating code fences
/// and prose around it.
pub fn parse_record(text: &str) -> Option<(ProfileRecord, Vec<String>)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let json: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let map = json.as_object()?;
    let mut record = ProfileRecord::default();
    let dropped = record.absorb_json(map);
    Some((record, dropped))
}

// ============================================================================
// Merging
// ============================================================================

/// Hosts recognized as social platforms, deduped per platform.
const SOCIAL_HOSTS: &[(&str, &str)] = &[
    ("facebook", "facebook.com"),
    ("twitter", "twitter.com"),
    ("twitter", "x.com"),
    ("instagram", "instagram.com"),
    ("linkedin", "linkedin.com"),
    ("youtube", "youtube.com"),
    ("tiktok", "tiktok.com"),
];

const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx"];

/// Build the media bundle from the crawl output per the merge rules:
/// logos by confidence, images by relevance, facility and campus subsets,
/// social links deduped per platform, document and video link lists.
pub fn merge_media(crawl: &CrawlOutcome) -> MediaBundle {
    let mut media = MediaBundle::default();
    let mut seen_srcs = std::collections::HashSet::new();
    let mut all_images = Vec::new();

    for scored_artifact in &crawl.artifacts {
        for image in &scored_artifact.scored_images {
            if seen_srcs.insert(image.image.src.clone()) {
                all_images.push(image.clone());
            }
        }
        for link in scored_artifact
            .artifact
            .external_links
            .iter()
            .chain(&scored_artifact.artifact.internal_links)
        {
            let lower = link.to_lowercase();
            if DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
                && !media.documents.contains(link)
            {
                media.documents.push(link.clone());
            }
        }
        for link in &scored_artifact.artifact.external_links {
            let Some(host) = url::Url::parse(link).ok().and_then(|u| u.host_str().map(str::to_lowercase))
            else {
                continue;
            };
            for (platform, social_host) in SOCIAL_HOSTS {
                if (host == *social_host || host.ends_with(&format!(".{social_host}")))
                    && media.social_links.iter().all(|s| s.platform != *platform)
                {
                    media.social_links.push(SocialLink {
                        platform: (*platform).to_string(),
                        url: link.clone(),
                    });
                }
            }
        }
        for video in &scored_artifact.artifact.videos {
            if !media.videos.contains(video) {
                media.videos.push(video.clone());
            }
        }
    }

    media.logos = all_images
        .iter()
        .filter(|i| i.logo_confidence >= LOGO_CONFIDENCE_THRESHOLD)
        .cloned()
        .collect();
    media
        .logos
        .sort_by(|a, b| b.logo_confidence.total_cmp(&a.logo_confidence));

    media.images = all_images
        .iter()
        .filter(|i| i.relevance_score >= 3)
        .cloned()
        .collect();
    media.images.sort_by(|a, b| {
        b.relevance_score
            .cmp(&a.relevance_score)
            .then_with(|| b.logo_confidence.total_cmp(&a.logo_confidence))
    });

    media.facility_images = media
        .images
        .iter()
        .filter(|i| i.relevance_score >= 5)
        .cloned()
        .collect();
    media.campus_images = media
        .facility_images
        .iter()
        .filter(|i| is_campus_image(i))
        .cloned()
        .collect();
    media
}

/// Fill record basics from the request and crawl output when the extractor
/// left them absent; also the whole record when extraction failed.
pub fn apply_crawl_basics(
    record: &mut ProfileRecord,
    institution_name: &str,
    institution_type: InstitutionType,
    crawl: Option<&CrawlOutcome>,
) {
    if !record.has("name") {
        record.set("name", Value::text(institution_name));
    }
    if !record.has("institution_type") {
        record.set("institution_type", Value::text(institution_type.as_str()));
    }
    let Some(crawl) = crawl else {
        return;
    };
    let Some(first) = crawl.artifacts.first() else {
        return;
    };
    if !record.has("website") {
        if let Some(origin) = url::Url::parse(&first.artifact.url)
            .ok()
            .map(|u| u.origin().ascii_serialization())
        {
            record.set("website", Value::text(origin));
        }
    }
    if !record.has("description") {
        let description = first
            .artifact
            .metadata
            .get("description")
            .or_else(|| first.artifact.metadata.get("og:description"));
        if let Some(description) = description {
            record.set("description", Value::text(description.clone()));
        }
    }
}
