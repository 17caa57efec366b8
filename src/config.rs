use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::pipeline::{CacheTtls, CrawlConfig, ExtractConfig, SearchConfig};

/// Top-level profiler configuration.
///
/// Loaded from a TOML file with every section optional; missing sections
/// and fields fall back to their defaults. API keys are NOT stored here —
/// each provider section names the environment variable carrying its key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub data: DataConfig,
    pub search: SearchSection,
    pub crawl: CrawlSection,
    pub extract: ExtractSection,
    pub cache: CacheSection,
    pub providers: ProvidersSection,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            search: SearchSection::default(),
            crawl: CrawlSection::default(),
            extract: ExtractSection::default(),
            cache: CacheSection::default(),
            providers: ProvidersSection::default(),
        }
    }
}

impl ProfilerConfig {
    /// Load from the given path, or the default location, or defaults.
    /// A missing or unparseable file logs a warning and yields `Default`.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path(),
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "config unparseable, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("instprofiler")
            .join("config.toml")
    }
}

/// Data directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Override the default data directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { data_dir: None }
    }
}

impl DataConfig {
    /// The base directory for caches, dictionaries, and benchmarks.
    pub fn resolved_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("instprofiler"),
        }
    }
}

/// Search phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub result_count: usize,
    pub top_k: usize,
    pub timeout_s: u64,
    pub language: String,
    pub country: String,
}

impl Default for SearchSection {
    fn default() -> Self {
        let defaults = SearchConfig::default();
        Self {
            result_count: defaults.result_count,
            top_k: defaults.top_k,
            timeout_s: defaults.timeout.as_secs(),
            language: defaults.language,
            country: defaults.country,
        }
    }
}

impl SearchSection {
    pub fn to_config(&self) -> SearchConfig {
        SearchConfig {
            result_count: self.result_count,
            top_k: self.top_k,
            timeout: Duration::from_secs(self.timeout_s),
            language: self.language.clone(),
            country: self.country.clone(),
            ..Default::default()
        }
    }
}

/// Crawl phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    pub concurrency: usize,
    pub per_url_timeout_s: u64,
    pub timeout_s: u64,
    pub per_page_text_cap: usize,
}

impl Default for CrawlSection {
    fn default() -> Self {
        let defaults = CrawlConfig::default();
        Self {
            concurrency: defaults.concurrency,
            per_url_timeout_s: defaults.per_url_timeout.as_secs(),
            timeout_s: defaults.timeout.as_secs(),
            per_page_text_cap: defaults.per_page_text_cap,
        }
    }
}

impl CrawlSection {
    pub fn to_config(&self) -> CrawlConfig {
        CrawlConfig {
            concurrency: self.concurrency,
            per_url_timeout: Duration::from_secs(self.per_url_timeout_s),
            timeout: Duration::from_secs(self.timeout_s),
            per_page_text_cap: self.per_page_text_cap,
        }
    }
}

/// Extract phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSection {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_s: u64,
}

impl Default for ExtractSection {
    fn default() -> Self {
        let defaults = ExtractConfig::default();
        Self {
            model: defaults.model_id,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            timeout_s: defaults.timeout.as_secs(),
        }
    }
}

impl ExtractSection {
    pub fn to_config(&self) -> ExtractConfig {
        ExtractConfig {
            model_id: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_s),
        }
    }
}

/// Cache TTLs, per cache instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub search_ttl_s: u64,
    pub crawl_ttl_s: u64,
    pub extract_ttl_s: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheTtls::default();
        Self {
            search_ttl_s: defaults.search.as_secs(),
            crawl_ttl_s: defaults.crawl.as_secs(),
            extract_ttl_s: defaults.extract.as_secs(),
        }
    }
}

impl CacheSection {
    pub fn ttls(&self) -> CacheTtls {
        CacheTtls {
            search: Duration::from_secs(self.search_ttl_s),
            crawl: Duration::from_secs(self.crawl_ttl_s),
            extract: Duration::from_secs(self.extract_ttl_s),
        }
    }
}

/// Provider endpoints and key sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    /// Override the search API endpoint (self-hosted gateway).
    pub search_endpoint: Option<String>,
    /// Environment variable holding the search API key.
    pub search_api_key_env: String,
    /// Override the chat-completions endpoint.
    pub llm_endpoint: Option<String>,
    /// Environment variable holding the LLM API key.
    pub llm_api_key_env: String,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            search_endpoint: None,
            search_api_key_env: "SERPER_API_KEY".to_string(),
            llm_endpoint: None,
            llm_api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_mirror_pipeline_defaults() {
        let config = ProfilerConfig::default();
        assert_eq!(config.search.to_config().top_k, SearchConfig::default().top_k);
        assert_eq!(config.crawl.to_config().concurrency, 8);
        assert_eq!(config.extract.to_config().model_id, "gpt-4o-mini");
        assert_eq!(config.cache.ttls().crawl.as_secs(), 86_400);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[crawl]\nconcurrency = 4\n\n[extract]\nmodel = \"gpt-4o\"\n",
        )
        .unwrap();

        let config = ProfilerConfig::load(Some(&path));
        assert_eq!(config.crawl.concurrency, 4);
        assert_eq!(config.extract.model, "gpt-4o");
        // Untouched sections keep their defaults.
        assert_eq!(config.search.top_k, 15);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let config = ProfilerConfig::load(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.search.top_k, SearchConfig::default().top_k);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = ProfilerConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let back: ProfilerConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(back.cache.search_ttl_s, config.cache.search_ttl_s);
    }
}
