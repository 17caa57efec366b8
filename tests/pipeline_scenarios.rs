//! End-to-end pipeline scenarios against stub capability providers:
//! dictionary ingestion through spell correction and autocomplete, cache
//! canonicalization across abbreviations, degraded pipelines, and the
//! persisted cache/benchmark layout.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use instprofiler::core::benchmark::{BenchmarkCollector, PhaseCategory};
use instprofiler::core::cache::{
    key_file_stem, AbbreviationTable, CacheProvenance, NormalizedKey, SimilarityCache,
};
use instprofiler::core::pipeline::{
    CacheSet, CacheTtls, ErrorKind, Pipeline, ProfileRequest,
};
use instprofiler::core::profile::{DomLocation, ImageRecord};
use instprofiler::core::providers::{
    Completion, CompletionRequest, CrawlArtifact, CrawlerEngine, FetchSpec, LlmClient,
    MarkdownContent, ProviderError, ProviderResult, SearchHit, SearchProvider, SearchRequest,
    Services,
};
use instprofiler::core::resolve::{
    Autocomplete, AutocompleteConfig, DictionaryLoader, InstitutionTrie, Provenance,
    SpellCorrector,
};
use instprofiler::core::schema::InstitutionType;
use instprofiler::core::scoring;

// ============================================================================
// Stub services
// ============================================================================

#[derive(Default)]
struct StubSearch {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, _request: &SearchRequest) -> ProviderResult<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }
        Ok(vec![
            SearchHit {
                url: "https://www.mit.edu/".to_string(),
                title: "Massachusetts Institute of Technology".to_string(),
                snippet: "MIT is a private research university in Cambridge.".to_string(),
                domain: "www.mit.edu".to_string(),
            },
            SearchHit {
                url: "https://en.wikipedia.org/wiki/MIT".to_string(),
                title: "MIT - Wikipedia".to_string(),
                snippet: "Massachusetts Institute of Technology article.".to_string(),
                domain: "en.wikipedia.org".to_string(),
            },
        ])
    }
}

#[derive(Default)]
struct StubCrawler {
    calls: AtomicUsize,
}

#[async_trait]
impl CrawlerEngine for StubCrawler {
    async fn fetch(&self, spec: &FetchSpec) -> ProviderResult<CrawlArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut artifact = CrawlArtifact::empty(&spec.url);
        artifact.status = 200;
        artifact.size_bytes = 4096;
        artifact.markdown = MarkdownContent {
            title: "MIT".to_string(),
            primary_content:
                "The Massachusetts Institute of Technology, founded in 1861, advances \
                 knowledge in science and technology."
                    .to_string(),
        };
        artifact.images = vec![ImageRecord {
            src: "https://www.mit.edu/img/logo.png".to_string(),
            alt: "MIT logo".to_string(),
            width: 120,
            height: 80,
            context: String::new(),
            dom_location: DomLocation::Header,
        }];
        artifact.external_links = vec!["https://twitter.com/mit".to_string()];
        artifact
            .metadata
            .insert("description".to_string(), "MIT official site".to_string());
        Ok(artifact)
    }
}

#[derive(Default)]
struct StubLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn complete(&self, _request: &CompletionRequest) -> ProviderResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            text: r#"{"name": "Massachusetts Institute of Technology",
                      "founded": 1861,
                      "location_city": "Cambridge",
                      "location_country": "United States",
                      "student_population": 11934,
                      "campus_mascot": "Tim the Beaver"}"#
                .to_string(),
            input_tokens: 1500,
            output_tokens: 120,
            cost_usd: 0.0003,
        })
    }
}

fn stub_services() -> (Services, Arc<StubSearch>, Arc<StubCrawler>, Arc<StubLlm>) {
    let search = Arc::new(StubSearch::default());
    let crawler = Arc::new(StubCrawler::default());
    let llm = Arc::new(StubLlm::default());
    let services = Services::new(search.clone(), crawler.clone(), llm.clone());
    (services, search, crawler, llm)
}

fn write_institutions_csv(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("institutions.csv");
    std::fs::write(
        &path,
        "name,type,frequency\n\
         Massachusetts Institute of Technology,university,100\n\
         Massachusetts General Hospital,hospital,80\n\
         Massey University,university,40\n\
         Masseter Clinic,hospital,5\n\
         Harvard University,university,10\n\
         Harvest,,1\n",
    )
    .unwrap();
    path
}

// ============================================================================
// Input resolution scenarios
// ============================================================================

#[test]
fn spell_correction_from_ingested_dictionary() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_institutions_csv(dir.path());

    let mut trie = InstitutionTrie::new();
    let mut counts = HashMap::new();
    let loader = DictionaryLoader::default();
    loader.load_csv(&csv, &mut trie, &mut counts).unwrap();
    let dict_path = dir.path().join("institutions.dict");
    loader.write_symspell_dictionary(&counts, &dict_path).unwrap();

    let trie = Arc::new(trie);
    let mut corrector = SpellCorrector::new(trie.clone(), Default::default());
    assert!(corrector.load_dictionary(&dict_path));

    let suggestions = corrector.correct("harvrd university", 5);
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].corrected_phrase, "harvard university");
    assert_eq!(suggestions[0].corrections.len(), 1);
    assert_eq!(suggestions[0].corrections[0].position, 0);
    assert_eq!(suggestions[0].corrections[0].corrected, "harvard");
    assert_eq!(suggestions[0].total_edit_distance, 1);

    // Every suggestion the corrector can ever emit validates against the trie.
    for query in ["massachusets institute", "harvet", "massey universty"] {
        for s in corrector.correct(query, 10) {
            assert!(trie.contains(&s.corrected_phrase));
        }
    }
}

#[test]
fn autocomplete_orders_by_frequency() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_institutions_csv(dir.path());

    let mut trie = InstitutionTrie::new();
    let mut counts = HashMap::new();
    DictionaryLoader::default()
        .load_csv(&csv, &mut trie, &mut counts)
        .unwrap();
    let trie = Arc::new(trie);
    let corrector = Arc::new(SpellCorrector::new(trie.clone(), Default::default()));
    let autocomplete = Autocomplete::new(trie, corrector, AutocompleteConfig::default());

    let results = autocomplete.complete("mass", 3);
    let names: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Massachusetts Institute of Technology",
            "Massachusetts General Hospital",
            "Massey University",
        ]
    );
    assert!(results.iter().all(|r| r.provenance == Provenance::Autocomplete));
}

#[tokio::test]
async fn abbreviation_collapses_to_one_cache_key() {
    // "mit" and the full name canonicalize identically, so a value cached
    // under one is a direct hit under the other.
    let dir = tempfile::tempdir().unwrap();
    let csv = write_institutions_csv(dir.path());
    let mut trie = InstitutionTrie::new();
    let mut counts = HashMap::new();
    DictionaryLoader::default()
        .load_csv(&csv, &mut trie, &mut counts)
        .unwrap();
    let abbreviations = AbbreviationTable::from_trie(&trie);

    let key_short = NormalizedKey::new("MIT", None, String::new(), &abbreviations);
    let key_full = NormalizedKey::new(
        "Massachusetts Institute of Technology",
        None,
        String::new(),
        &abbreviations,
    );
    assert_eq!(key_short.cache_key(), key_full.cache_key());

    let cache: SimilarityCache<String> =
        SimilarityCache::new("search", std::time::Duration::from_secs(3600), None);
    cache.put(&key_short.cache_key(), "profile_A".to_string()).await;
    let hit = cache.get(&key_full.cache_key()).await.unwrap();
    assert_eq!(hit.value, "profile_A");
    assert_eq!(hit.provenance, CacheProvenance::DirectHit);
}

// ============================================================================
// Pipeline scenarios
// ============================================================================

#[tokio::test]
async fn full_pipeline_produces_scored_profile() {
    let (services, _search, _crawler, llm) = stub_services();
    let pipeline = Pipeline::builder(services).build();

    let report = pipeline
        .profile(ProfileRequest::new("Massachusetts Institute of Technology"))
        .await
        .unwrap();

    assert!(!report.degraded);
    assert_eq!(report.institution_type, InstitutionType::University);
    assert!(report.record.has("founded"));
    assert!(report.record.has("student_population"));
    // The out-of-schema key was dropped and reported.
    assert_eq!(report.dropped_keys, vec!["campus_mascot".to_string()]);

    // Crawl media made it into the bundle: the header logo scores 6 / 1.0.
    assert_eq!(report.media.logos.len(), 1);
    assert!(report.media.logos[0].logo_confidence >= 0.99);
    assert_eq!(report.media.logos[0].relevance_score, 6);
    assert!(report
        .media
        .social_links
        .iter()
        .any(|s| s.platform == "twitter"));

    assert!(report.quality.score > 0.0);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

    // Benchmark conservation: phases fit inside the pipeline span.
    let pipeline_sample = report
        .benchmark
        .iter()
        .find(|s| s.category == PhaseCategory::Pipeline)
        .unwrap();
    let phase_total: u64 = report
        .benchmark
        .iter()
        .filter(|s| s.category != PhaseCategory::Pipeline)
        .map(|s| s.phase_ms)
        .sum();
    assert!(phase_total <= pipeline_sample.phase_ms);
}

#[tokio::test]
async fn degraded_search_cascades_to_crawl_empty() {
    let search = Arc::new(StubSearch {
        fail: true,
        ..Default::default()
    });
    let crawler = Arc::new(StubCrawler::default());
    let llm = Arc::new(StubLlm::default());
    let services = Services::new(search, crawler.clone(), llm);
    let pipeline = Pipeline::builder(services).build();

    let report = pipeline
        .profile(ProfileRequest::new("Massachusetts Institute of Technology"))
        .await
        .unwrap();

    assert!(report.degraded);
    assert_eq!(
        report.error_kinds,
        vec![ErrorKind::SearchProviderUnavailable, ErrorKind::CrawlEmpty]
    );
    // Nothing was crawled.
    assert_eq!(crawler.calls.load(Ordering::SeqCst), 0);
    assert!(report.media.is_empty());
    // Processing-success bonus collapses with two failed phases.
    assert_eq!(report.quality.processing_bonus, 0);
}

#[tokio::test]
async fn repeat_request_is_served_from_caches() {
    let (services, search, crawler, llm) = stub_services();
    let pipeline = Pipeline::builder(services).build();
    let request = ProfileRequest::new("Massachusetts Institute of Technology");

    pipeline.profile(request.clone()).await.unwrap();
    let first_calls = (
        search.calls.load(Ordering::SeqCst),
        crawler.calls.load(Ordering::SeqCst),
        llm.calls.load(Ordering::SeqCst),
    );
    assert_eq!(first_calls, (1, 2, 1));

    let second = pipeline.profile(request).await.unwrap();
    // No additional provider traffic.
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    assert_eq!(crawler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    let search_sample = second
        .benchmark
        .iter()
        .find(|s| s.category == PhaseCategory::Search)
        .unwrap();
    assert_eq!(search_sample.cache_hit, Some(CacheProvenance::DirectHit));
}

#[tokio::test]
async fn force_refresh_bypasses_cache_reads() {
    let (services, search, _crawler, _llm) = stub_services();
    let pipeline = Pipeline::builder(services).build();

    pipeline
        .profile(ProfileRequest::new("Massachusetts Institute of Technology"))
        .await
        .unwrap();
    let mut request = ProfileRequest::new("Massachusetts Institute of Technology");
    request.options.force_refresh = true;
    pipeline.profile(request).await.unwrap();
    assert_eq!(search.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persistent_state_layout_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let (services, _search, _crawler, _llm) = stub_services();
    let caches = CacheSet::persistent(dir.path(), CacheTtls::default()).unwrap();
    let benchmark = Arc::new(BenchmarkCollector::new(dir.path()).unwrap());
    let pipeline = Pipeline::builder(services)
        .caches(caches)
        .benchmark(benchmark)
        .build();

    pipeline
        .profile(ProfileRequest::new("Massachusetts Institute of Technology"))
        .await
        .unwrap();

    for cache_dir in ["search", "crawl", "extract"] {
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("cache").join(cache_dir))
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("json"))
            .collect();
        assert!(!entries.is_empty(), "no cache files under cache/{cache_dir}");
        // File names are 16-hex stems.
        for entry in entries {
            let name = entry.path();
            let stem = name.file_stem().unwrap().to_string_lossy().into_owned();
            assert_eq!(stem.len(), 16);
            assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    let bench_dir = dir.path().join("benchmarks");
    let names: Vec<String> = std::fs::read_dir(&bench_dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n.starts_with("session_") && n.ends_with(".jsonl")));
    assert!(names.iter().any(|n| n == "aggregate.json"));
}

#[tokio::test]
async fn corrupt_cache_file_is_quarantined_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (services, search, _crawler, _llm) = stub_services();
    let caches = CacheSet::persistent(dir.path(), CacheTtls::default()).unwrap();

    // Plant a corrupt entry where the search cache will look for this key.
    let cache_key = "massachusetts institute of technology|unknown|";
    let search_dir = dir.path().join("cache").join("search");
    let entry_path = search_dir.join(format!("{}.json", key_file_stem(cache_key)));
    std::fs::write(&entry_path, "{not valid json").unwrap();

    let pipeline = Pipeline::builder(services).caches(caches).build();
    let report = pipeline
        .profile(ProfileRequest::new("Massachusetts Institute of Technology"))
        .await
        .unwrap();

    // The corruption is reported, but the phase recovered with a fresh call.
    assert!(report.degraded);
    assert_eq!(report.error_kinds, vec![ErrorKind::CacheCorrupt]);
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    assert!(report.record.has("founded"));

    // The offending file was renamed aside and a fresh entry written.
    let names: Vec<String> = std::fs::read_dir(&search_dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n.ends_with(".json.bad")));
    assert!(entry_path.exists());
}

// ============================================================================
// Scoring scenarios
// ============================================================================

#[test]
fn header_logo_scores_full_confidence() {
    let image = ImageRecord {
        src: "/img/logo.png".to_string(),
        alt: "University X logo".to_string(),
        width: 120,
        height: 80,
        context: String::new(),
        dom_location: DomLocation::Header,
    };
    let scored = scoring::score_image(image, "University X");
    assert!((scored.logo_confidence - 1.0).abs() < 1e-9);
    assert_eq!(scored.relevance_score, 6);
}
