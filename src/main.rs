use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use instprofiler::config::ProfilerConfig;
use instprofiler::core::benchmark::BenchmarkCollector;
use instprofiler::core::cache::AbbreviationTable;
use instprofiler::core::logging;
use instprofiler::core::pipeline::{CacheSet, CrawlStrategy, Pipeline, ProfileRequest};
use instprofiler::core::providers::{
    HttpCrawler, OpenAiCompatClient, SerperSearchProvider, Services,
};
use instprofiler::core::resolve::{DictionaryLoader, InstitutionTrie, SpellCorrector};
use instprofiler::core::schema::InstitutionType;

/// Build a structured profile of a named institution from web sources.
#[derive(Debug, Parser)]
#[command(name = "instprofiler", version, about)]
struct Cli {
    /// Institution to profile.
    institution_name: String,

    /// Override type inference: university, hospital, bank, or general.
    #[arg(long = "type")]
    institution_type: Option<String>,

    /// Free-text location constraint for the search query.
    #[arg(long)]
    location: Option<String>,

    /// Extra search keywords.
    #[arg(long)]
    keywords: Option<String>,

    /// Preferred domain; becomes a site: operator and a ranking boost.
    #[arg(long)]
    domain_hint: Option<String>,

    /// Space-separated terms to exclude from the search.
    #[arg(long)]
    exclude: Option<String>,

    /// Bypass cache reads for this request.
    #[arg(long)]
    force_refresh: bool,

    /// Stop after crawl and return the partial result.
    #[arg(long)]
    skip_extraction: bool,

    /// Crawl strategy: equal, priority_based, high_links, high_depth.
    #[arg(long)]
    strategy: Option<String>,

    /// Global cap on pages crawled.
    #[arg(long)]
    max_pages: Option<usize>,

    /// Config file path (default: platform config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines instead of human-readable output.
    #[arg(long)]
    log_json: bool,

    /// Institution CSV dictionaries to load (name,type,frequency).
    #[arg(long = "dict")]
    dictionaries: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        logging::init_json();
    } else {
        logging::init();
    }
    let config = ProfilerConfig::load(cli.config.as_deref());
    let base_dir = config.data.resolved_dir();

    // Dictionary ingestion: trie + abbreviation table + corrector dictionary.
    let mut trie = InstitutionTrie::new();
    let mut word_counts: HashMap<String, u64> = HashMap::new();
    let loader = DictionaryLoader::default();
    for path in &cli.dictionaries {
        let summary = loader
            .load_csv(path, &mut trie, &mut word_counts)
            .with_context(|| format!("loading dictionary {}", path.display()))?;
        tracing::info!(path = %path.display(), inserted = summary.inserted, "dictionary loaded");
    }
    let abbreviations = AbbreviationTable::from_trie(&trie);
    let trie = Arc::new(trie);

    // Surface a spelling hint when the name misses the known set.
    if !trie.is_empty() && !trie.contains(&cli.institution_name) {
        let dict_path = base_dir.join("dictionaries").join("institutions.dict");
        loader.write_symspell_dictionary(&word_counts, &dict_path)?;
        let mut corrector = SpellCorrector::new(trie.clone(), Default::default());
        corrector.load_dictionary(&dict_path);
        if let Some(suggestion) = corrector.correct(&cli.institution_name, 1).into_iter().next() {
            if !suggestion.corrections.is_empty() {
                eprintln!(
                    "note: '{}' is not a known institution; did you mean '{}'?",
                    cli.institution_name, suggestion.original_name
                );
            }
        }
    }

    let services = build_services(&config)?;
    let caches = CacheSet::persistent(&base_dir, config.cache.ttls())?;
    let benchmark = Arc::new(BenchmarkCollector::new(&base_dir)?);

    let pipeline = Pipeline::builder(services)
        .caches(caches)
        .abbreviations(abbreviations)
        .benchmark(benchmark)
        .search_config(config.search.to_config())
        .crawl_config(config.crawl.to_config())
        .extract_config(config.extract.to_config())
        .build();
    pipeline.sweep_caches().await;

    let mut request = ProfileRequest::new(&cli.institution_name);
    request.options.institution_type = cli
        .institution_type
        .as_deref()
        .and_then(InstitutionType::parse);
    request.options.location = cli.location;
    request.options.additional_keywords = cli.keywords;
    request.options.domain_hint = cli.domain_hint;
    request.options.exclude_terms = cli.exclude;
    request.options.force_refresh = cli.force_refresh;
    request.options.skip_extraction = cli.skip_extraction;
    if let Some(strategy) = &cli.strategy {
        request.options.strategy = strategy
            .parse::<CrawlStrategy>()
            .map_err(anyhow::Error::msg)?;
    }
    request.options.max_pages = cli.max_pages;

    let report = pipeline.profile(request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn build_services(config: &ProfilerConfig) -> anyhow::Result<Services> {
    let search_key = std::env::var(&config.providers.search_api_key_env).unwrap_or_default();
    if search_key.is_empty() {
        tracing::warn!(
            env = %config.providers.search_api_key_env,
            "search API key not set; the search phase will degrade"
        );
    }
    let search = match &config.providers.search_endpoint {
        Some(endpoint) => SerperSearchProvider::with_endpoint(search_key, endpoint.clone()),
        None => SerperSearchProvider::new(search_key),
    }
    .context("building search provider")?;

    let llm_key = std::env::var(&config.providers.llm_api_key_env).unwrap_or_default();
    if llm_key.is_empty() {
        tracing::warn!(
            env = %config.providers.llm_api_key_env,
            "LLM API key not set; the extract phase will degrade"
        );
    }
    let llm = match &config.providers.llm_endpoint {
        Some(endpoint) => OpenAiCompatClient::with_endpoint(llm_key, endpoint.clone()),
        None => OpenAiCompatClient::new(llm_key),
    }
    .context("building LLM client")?;

    let crawler = HttpCrawler::new().context("building crawler engine")?;

    Ok(Services::new(Arc::new(search), Arc::new(crawler), Arc::new(llm)))
}
