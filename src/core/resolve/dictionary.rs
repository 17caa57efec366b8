//! Institution Dictionary Ingestion
//!
//! Bulk-loads institution CSVs into the trie at startup and generates the
//! SymSpell-format word dictionary the corrector loads. CSV rows are
//! `name,type,frequency`; a header row is detected and skipped, and missing
//! type/frequency columns are tolerated.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};

use super::error::{ResolveError, ResolveResult};
use super::trie::{normalize, InstitutionTrie};
use crate::core::schema::InstitutionType;

/// Summary of one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Rows inserted into the trie.
    pub inserted: usize,
    /// Rows skipped (blank names, unparseable lines).
    pub skipped: usize,
}

/// Loads institution CSVs and writes corrector dictionaries.
pub struct DictionaryLoader {
    /// Minimum word length to include in the word dictionary.
    pub min_word_length: usize,
    /// Minimum accumulated frequency to include in the word dictionary.
    pub min_frequency: u64,
}

impl Default for DictionaryLoader {
    fn default() -> Self {
        Self {
            min_word_length: 2,
            min_frequency: 1,
        }
    }
}

impl DictionaryLoader {
    /// Ingest one CSV file into the trie, accumulating per-word frequencies
    /// into `word_counts` for later dictionary generation.
    pub fn load_csv(
        &self,
        path: &Path,
        trie: &mut InstitutionTrie,
        word_counts: &mut HashMap<String, u64>,
    ) -> ResolveResult<LoadSummary> {
        let contents = fs::read_to_string(path).map_err(|source| ResolveError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut summary = LoadSummary::default();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields = parse_csv_line(line);
            let name = fields.first().map(|s| s.trim()).unwrap_or_default();
            if name.is_empty() {
                summary.skipped += 1;
                continue;
            }
            // Header detection: first line whose name column is literally
            // "name" and whose frequency column is not numeric.
            if line_no == 0 && name.eq_ignore_ascii_case("name") {
                continue;
            }
            let institution_type = fields
                .get(1)
                .and_then(|t| InstitutionType::parse(t));
            let frequency = fields
                .get(2)
                .and_then(|f| f.trim().parse::<u64>().ok())
                .unwrap_or(1);

            trie.insert(name, frequency, institution_type);
            for word in normalize(name).split_whitespace() {
                *word_counts.entry(word.to_string()).or_insert(0) += frequency;
            }
            summary.inserted += 1;
        }
        debug!(
            path = %path.display(),
            inserted = summary.inserted,
            skipped = summary.skipped,
            "institution csv ingested"
        );
        Ok(summary)
    }

    /// Write a SymSpell unigram dictionary (`term count` per line) from the
    /// accumulated word counts. Returns the number of terms written.
    pub fn write_symspell_dictionary(
        &self,
        word_counts: &HashMap<String, u64>,
        path: &Path,
    ) -> ResolveResult<usize> {
        let mut terms: Vec<(&String, &u64)> = word_counts
            .iter()
            .filter(|(word, count)| {
                word.chars().count() >= self.min_word_length && **count >= self.min_frequency
            })
            .collect();
        // Deterministic output: frequency descending, term ascending.
        terms.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ResolveError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let mut file = fs::File::create(path).map_err(|source| ResolveError::Io {
            path: path.display().to_string(),
            source,
        })?;
        for (term, count) in &terms {
            writeln!(file, "{term} {count}").map_err(|source| ResolveError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(terms.len())
    }
}

/// Minimal CSV field split with double-quote support; institution names
/// regularly contain commas ("University of California, Berkeley").
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if in_quotes {
        warn!(line, "unterminated quote in csv line");
    }
    fields.push(current.trim().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_line_plain() {
        assert_eq!(
            parse_csv_line("Harvard University,university,10"),
            vec!["Harvard University", "university", "10"]
        );
    }

    #[test]
    fn test_parse_csv_line_quoted_comma() {
        assert_eq!(
            parse_csv_line("\"University of California, Berkeley\",university,55"),
            vec!["University of California, Berkeley", "university", "55"]
        );
    }

    #[test]
    fn test_parse_csv_line_escaped_quote() {
        assert_eq!(parse_csv_line("\"St. \"\"Old\"\" Hospital\",hospital"), vec![
            "St. \"Old\" Hospital",
            "hospital"
        ]);
    }

    #[test]
    fn test_load_csv_with_header_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("institutions.csv");
        fs::write(
            &csv,
            "name,type,frequency\n\
             Harvard University,university,10\n\
             Mystery Org\n\
             ,university,3\n\
             Mayo Clinic,hospital,7\n",
        )
        .unwrap();

        let mut trie = InstitutionTrie::new();
        let mut counts = HashMap::new();
        let summary = DictionaryLoader::default()
            .load_csv(&csv, &mut trie, &mut counts)
            .unwrap();

        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.skipped, 1);
        assert!(trie.contains("harvard university"));
        assert!(trie.contains("mystery org"));
        let mystery = trie.entry("mystery org").unwrap();
        assert_eq!(mystery.frequency, 1);
        assert_eq!(mystery.institution_type, None);
        assert_eq!(counts.get("harvard"), Some(&10));
        // "university" appears only in the harvard row.
        assert_eq!(counts.get("university"), Some(&10));
    }

    #[test]
    fn test_write_symspell_dictionary_filters_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dict.txt");
        let mut counts = HashMap::new();
        counts.insert("university".to_string(), 100u64);
        counts.insert("harvard".to_string(), 10u64);
        counts.insert("a".to_string(), 500u64); // below min length

        let loader = DictionaryLoader::default();
        let written = loader.write_symspell_dictionary(&counts, &out).unwrap();
        assert_eq!(written, 2);

        let contents = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["university 100", "harvard 10"]);
    }

    #[test]
    fn test_load_csv_missing_file() {
        let err = DictionaryLoader::default()
            .load_csv(
                Path::new("/nonexistent/institutions.csv"),
                &mut InstitutionTrie::new(),
                &mut HashMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ResolveError::Io { .. }));
    }
}
