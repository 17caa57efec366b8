//! Plain-HTTP Crawler Engine
//!
//! Fetches a page over HTTP and derives the full crawl artifact: raw and
//! cleaned HTML, a text-only content rendering, JSON-LD blocks, image
//! records with DOM-location tags, link lists, and page metadata. No
//! JavaScript execution; `js_enabled` is accepted and ignored. Extraction
//! is regex-based and intentionally tolerant of malformed markup.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{CrawlArtifact, CrawlerEngine, FetchSpec, MarkdownContent, ProviderError, ProviderResult};
use crate::core::profile::{DomLocation, ImageRecord};

static JSONLD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("static regex")
});
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script>").expect("static regex"));
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b.*?</style>").expect("static regex"));
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</p>|<br\s*/?>|</h[1-6]>|</li>|</div>").expect("static regex"));
static IMG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("static regex"));
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)([a-zA-Z-]+)\s*=\s*["']([^"']*)["']"#).expect("static regex"));
static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<a\b[^>]*href\s*=\s*["']([^"'#][^"']*)["']"#).expect("static regex"));
static META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("static regex"));
static MEDIA_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<(?:video|audio|source)\b[^>]*src\s*=\s*["']([^"']+)["']"#)
        .expect("static regex")
});
static HEADER_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<header\b.*?</header>").expect("static regex"));
static NAV_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<nav\b.*?</nav>").expect("static regex"));
static FOOTER_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<footer\b.*?</footer>").expect("static regex"));
static H1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h1\b").expect("static regex"));

/// Characters of surrounding markup captured as an image's context snippet.
const CONTEXT_WINDOW: usize = 300;

/// Distance after an `<h1>` within which an image counts as near-title.
const NEAR_TITLE_WINDOW: usize = 400;

// ============================================================================
// Engine
// ============================================================================

/// Reqwest-backed crawler engine.
pub struct HttpCrawler {
    client: Client,
    user_agent: String,
}

impl HttpCrawler {
    pub fn new() -> ProviderResult<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            user_agent: format!("instprofiler/{}", env!("CARGO_PKG_VERSION")),
        })
    }
}

#[async_trait]
impl CrawlerEngine for HttpCrawler {
    async fn fetch(&self, spec: &FetchSpec) -> ProviderResult<CrawlArtifact> {
        let response = self
            .client
            .get(&spec.url)
            .timeout(spec.timeout)
            .header("user-agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        debug!(url = %spec.url, status, bytes = body.len(), "page fetched");
        Ok(parse_document(&spec.url, status, &body))
    }
}

// ============================================================================
// Document Parsing
// ============================================================================

/// Build the full artifact from a fetched document body.
pub fn parse_document(url: &str, status: u16, body: &str) -> CrawlArtifact {
    let base = Url::parse(url).ok();

    let structured_data: Vec<serde_json::Value> = JSONLD_RE
        .captures_iter(body)
        .filter_map(|cap| serde_json::from_str(cap[1].trim()).ok())
        .collect();

    let cleaned_html = {
        let no_scripts = SCRIPT_RE.replace_all(body, " ");
        let no_styles = STYLE_RE.replace_all(&no_scripts, " ");
        COMMENT_RE.replace_all(&no_styles, " ").into_owned()
    };

    let title = TITLE_RE
        .captures(body)
        .map(|cap| collapse(&decode_entities(&TAG_RE.replace_all(&cap[1], " "))))
        .unwrap_or_default();

    let primary_content = extract_text(&cleaned_html);

    let spans = SectionSpans::scan(body);
    let images = extract_images(body, &base, &spans);
    let (internal_links, external_links) = extract_links(body, &base);
    let (videos, audio) = extract_media(body, &base);
    let metadata = extract_metadata(body);

    let mut artifact = CrawlArtifact::empty(url);
    artifact.status = status;
    artifact.raw_html = body.to_string();
    artifact.cleaned_html = cleaned_html;
    artifact.markdown = MarkdownContent {
        title,
        primary_content,
    };
    artifact.structured_data = structured_data;
    artifact.images = images;
    artifact.videos = videos;
    artifact.audio = audio;
    artifact.internal_links = internal_links;
    artifact.external_links = external_links;
    artifact.metadata = metadata;
    artifact.size_bytes = body.len() as u64;
    artifact
}

/// Byte spans of the structural sections, for DOM-location tagging.
struct SectionSpans {
    header: Vec<(usize, usize)>,
    nav: Vec<(usize, usize)>,
    footer: Vec<(usize, usize)>,
    h1_starts: Vec<usize>,
}

impl SectionSpans {
    fn scan(body: &str) -> Self {
        let spans = |re: &Regex| re.find_iter(body).map(|m| (m.start(), m.end())).collect();
        Self {
            header: spans(&HEADER_SPAN_RE),
            nav: spans(&NAV_SPAN_RE),
            footer: spans(&FOOTER_SPAN_RE),
            h1_starts: H1_RE.find_iter(body).map(|m| m.start()).collect(),
        }
    }

    fn locate(&self, offset: usize) -> DomLocation {
        let within = |spans: &[(usize, usize)]| spans.iter().any(|&(s, e)| offset >= s && offset < e);
        if within(&self.header) {
            return DomLocation::Header;
        }
        if self
            .h1_starts
            .iter()
            .any(|&h1| offset >= h1 && offset - h1 <= NEAR_TITLE_WINDOW)
        {
            return DomLocation::NearTitle;
        }
        if within(&self.nav) {
            return DomLocation::Nav;
        }
        if within(&self.footer) {
            return DomLocation::Footer;
        }
        DomLocation::MainContent
    }
}

fn extract_images(body: &str, base: &Option<Url>, spans: &SectionSpans) -> Vec<ImageRecord> {
    IMG_RE
        .find_iter(body)
        .filter_map(|m| {
            let attrs: std::collections::HashMap<String, String> = ATTR_RE
                .captures_iter(m.as_str())
                .map(|cap| (cap[1].to_lowercase(), cap[2].to_string()))
                .collect();
            let src = attrs.get("src")?.trim();
            if src.is_empty() || src.starts_with("data:") {
                return None;
            }
            let resolved = resolve(base, src)?;
            let parse_dim = |key: &str| {
                attrs
                    .get(key)
                    .and_then(|v| v.trim_end_matches("px").trim().parse::<u32>().ok())
                    .unwrap_or(0)
            };
            let context_start = m.start().saturating_sub(CONTEXT_WINDOW);
            let context_end = (m.end() + CONTEXT_WINDOW).min(body.len());
            let context = collapse(&decode_entities(
                &TAG_RE.replace_all(slice_at_char_boundaries(body, context_start, context_end), " "),
            ));
            Some(ImageRecord {
                src: resolved,
                alt: decode_entities(attrs.get("alt").map(String::as_str).unwrap_or("")),
                width: parse_dim("width"),
                height: parse_dim("height"),
                context,
                dom_location: spans.locate(m.start()),
            })
        })
        .collect()
}

fn extract_links(body: &str, base: &Option<Url>) -> (Vec<String>, Vec<String>) {
    let mut internal = Vec::new();
    let mut external = Vec::new();
    let base_host = base.as_ref().and_then(|u| u.host_str().map(str::to_string));
    for cap in ANCHOR_RE.captures_iter(body) {
        let href = cap[1].trim();
        if href.starts_with("javascript:") || href.starts_with("mailto:") || href.starts_with("tel:")
        {
            continue;
        }
        let Some(resolved) = resolve(base, href) else {
            continue;
        };
        let host = Url::parse(&resolved)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let is_internal = match (&base_host, &host) {
            (Some(b), Some(h)) => b == h,
            _ => false,
        };
        let bucket = if is_internal { &mut internal } else { &mut external };
        if !bucket.contains(&resolved) {
            bucket.push(resolved);
        }
    }
    (internal, external)
}

fn extract_media(body: &str, base: &Option<Url>) -> (Vec<String>, Vec<String>) {
    let mut videos = Vec::new();
    let mut audio = Vec::new();
    for cap in MEDIA_SRC_RE.captures_iter(body) {
        let Some(resolved) = resolve(base, cap[1].trim()) else {
            continue;
        };
        let lower = resolved.to_lowercase();
        if [".mp3", ".wav", ".ogg", ".m4a"].iter().any(|ext| lower.ends_with(ext)) {
            if !audio.contains(&resolved) {
                audio.push(resolved);
            }
        } else if !videos.contains(&resolved) {
            videos.push(resolved);
        }
    }
    (videos, audio)
}

fn extract_metadata(body: &str) -> std::collections::BTreeMap<String, String> {
    let mut metadata = std::collections::BTreeMap::new();
    for m in META_RE.find_iter(body) {
        let attrs: std::collections::HashMap<String, String> = ATTR_RE
            .captures_iter(m.as_str())
            .map(|cap| (cap[1].to_lowercase(), cap[2].to_string()))
            .collect();
        let key = attrs.get("name").or_else(|| attrs.get("property"));
        if let (Some(key), Some(content)) = (key, attrs.get("content")) {
            metadata
                .entry(key.to_lowercase())
                .or_insert_with(|| decode_entities(content));
        }
    }
    metadata
}

/// Text-only rendering: block-level breaks become newlines, tags drop out,
/// entities decode, whitespace collapses per line.
fn extract_text(cleaned_html: &str) -> String {
    let with_breaks = BREAK_RE.replace_all(cleaned_html, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&stripped);
    decoded
        .lines()
        .map(collapse)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn resolve(base: &Option<Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
}

/// Clamp a byte range onto valid char boundaries before slicing.
fn slice_at_char_boundaries(text: &str, mut start: usize, mut end: usize) -> &str {
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    while end > start && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>University X &mdash; Home</title>
  <meta name="description" content="The official site of University X.">
  <meta property="og:title" content="University X">
  <style>body { color: red; }</style>
  <script>console.log("tracking");</script>
  <script type="application/ld+json">{"@type": "CollegeOrUniversity", "name": "University X"}</script>
</head>
<body>
  <header>
    <img src="/img/logo.png" alt="University X logo" width="120" height="80">
    <nav><a href="/about">About</a><img src="/icons/menu.svg" alt="menu" width="24" height="24"></nav>
  </header>
  <main>
    <h1>Welcome to University X</h1>
    <p>Founded in 1900, University X is a leading research institution.</p>
    <p>Across twelve schools and colleges, our faculty and students pursue
    discovery in the sciences, the humanities, engineering, and medicine.
    The university enrolls more than thirty thousand students from over one
    hundred countries, supported by a library system holding eight million
    volumes and an annual research budget exceeding one billion dollars.
    Our graduates lead laboratories, hospitals, companies, and governments
    on every continent.</p>
    <img src="/photos/campus.jpg" alt="Aerial view of the campus" width="1600" height="900">
    <a href="https://twitter.com/universityx">Twitter</a>
    <a href="/admissions">Admissions</a>
    <video src="/media/tour.mp4"></video>
  </main>
  <footer><a href="https://partner.example.org/">Partner</a></footer>
</body>
</html>"#;

    fn artifact() -> CrawlArtifact {
        parse_document("https://www.universityx.edu/", 200, PAGE)
    }

    #[test]
    fn test_title_extracted() {
        let artifact = artifact();
        assert_eq!(artifact.markdown.title, "University X &mdash; Home");
    }

    #[test]
    fn test_text_content_strips_scripts_and_styles() {
        let artifact = artifact();
        let text = &artifact.markdown.primary_content;
        assert!(text.contains("Founded in 1900"));
        assert!(!text.contains("console.log"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_structured_data_extracted() {
        let artifact = artifact();
        assert_eq!(artifact.structured_data.len(), 1);
        assert_eq!(
            artifact.structured_data[0]["@type"],
            serde_json::json!("CollegeOrUniversity")
        );
    }

    #[test]
    fn test_images_with_locations() {
        let artifact = artifact();
        assert_eq!(artifact.images.len(), 3);

        let logo = &artifact.images[0];
        assert_eq!(logo.src, "https://www.universityx.edu/img/logo.png");
        assert_eq!(logo.alt, "University X logo");
        assert_eq!(logo.width, 120);
        assert_eq!(logo.height, 80);
        assert_eq!(logo.dom_location, DomLocation::Header);

        // The nav icon sits inside <header><nav>; header wins on containment.
        assert_eq!(artifact.images[1].dom_location, DomLocation::Header);

        let campus = &artifact.images[2];
        assert_eq!(campus.width, 1600);
        assert_eq!(campus.dom_location, DomLocation::MainContent);
        assert!(campus.context.contains("every continent"));
    }

    #[test]
    fn test_links_partitioned_by_host() {
        let artifact = artifact();
        assert!(artifact
            .internal_links
            .contains(&"https://www.universityx.edu/admissions".to_string()));
        assert!(artifact
            .internal_links
            .contains(&"https://www.universityx.edu/about".to_string()));
        assert!(artifact
            .external_links
            .contains(&"https://twitter.com/universityx".to_string()));
        assert!(artifact
            .external_links
            .contains(&"https://partner.example.org/".to_string()));
    }

    #[test]
    fn test_media_and_metadata() {
        let artifact = artifact();
        assert_eq!(artifact.videos, vec!["https://www.universityx.edu/media/tour.mp4"]);
        assert!(artifact.audio.is_empty());
        assert_eq!(
            artifact.metadata.get("description").map(String::as_str),
            Some("The official site of University X.")
        );
        assert_eq!(
            artifact.metadata.get("og:title").map(String::as_str),
            Some("University X")
        );
    }

    #[test]
    fn test_size_and_status() {
        let artifact = artifact();
        assert_eq!(artifact.status, 200);
        assert!(artifact.succeeded());
        assert_eq!(artifact.size_bytes, PAGE.len() as u64);
    }

    #[tokio::test]
    async fn test_fetch_against_mock_server() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let crawler = HttpCrawler::new().unwrap();
        let artifact = crawler
            .fetch(&FetchSpec::for_url(format!("{}/", server.uri())))
            .await
            .unwrap();
        assert!(artifact.succeeded());
        assert_eq!(artifact.images.len(), 3);
    }
}
