//! Deterministic citation-key generation.

use std::sync::LazyLock;

use regex::Regex;

use citefill_shared::{Candidate, CitationKeyConfig, KeyFormat};

/// Title words never used as the distinguishing word of a key.
const TITLE_STOPWORDS: &[&str] = &["the", "and", "for", "from", "with", "that", "this", "are", "was"];

/// Build the citation key for `candidate`.
///
/// - `RawIdentifier`: the backend id, minus characters that cannot appear in a
///   key. Casing is left alone so the key still names the record.
/// - `AuthorYear` / `AuthorYearTitle`: first-author last name, year and
///   optionally the first meaningful title word, reduced to ASCII
///   alphanumerics and lowercased when configured.
///
/// Every format is truncated to `max_length` chars. An identifier that
/// strips to nothing falls back to author+year, and an author name with no
/// ASCII letters or digits becomes `Unknown`.
pub fn generate_key(candidate: &Candidate, config: &CitationKeyConfig) -> String {
    let key = match config.format {
        KeyFormat::RawIdentifier => {
            let raw: String = candidate.id.chars().filter(|c| is_key_char(*c)).collect();
            if raw.is_empty() {
                derived_key(candidate, false, config.lowercase)
            } else {
                raw
            }
        }
        KeyFormat::AuthorYear => derived_key(candidate, false, config.lowercase),
        KeyFormat::AuthorYearTitle => derived_key(candidate, true, config.lowercase),
    };

    key.chars().take(config.max_length.max(1)).collect()
}

fn derived_key(candidate: &Candidate, with_title: bool, lowercase: bool) -> String {
    let year = candidate.year.map(|y| y.to_string()).unwrap_or_default();
    let title_word = if with_title { title_word(&candidate.title) } else { "" };

    let mut author: String = candidate
        .first_author()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if author.is_empty() {
        author.push_str("Unknown");
    }

    let key: String = format!("{author}{year}{title_word}");

    if lowercase { key.to_lowercase() } else { key }
}

/// First alphabetic word of three or more letters that is not a stopword.
fn title_word(title: &str) -> &str {
    static WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").expect("valid regex"));

    WORD_RE
        .find_iter(title)
        .map(|m| m.as_str())
        .find(|w| !TITLE_STOPWORDS.contains(&w.to_lowercase().as_str()))
        .unwrap_or_default()
}

fn is_key_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '{' | '}' | ',' | '%' | '\\' | '#' | '~' | '"')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper() -> Candidate {
        let mut c = Candidate::new("2019ApJ...872..123S", "The Structure of Dark Matter Halos");
        c.year = Some(2019);
        c.authors = vec!["Smith-Jones, A.".into(), "Doe, J.".into()];
        c
    }

    fn config(format: KeyFormat) -> CitationKeyConfig {
        CitationKeyConfig {
            format,
            ..CitationKeyConfig::default()
        }
    }

    #[test]
    fn raw_identifier_is_kept_verbatim() {
        assert_eq!(generate_key(&paper(), &config(KeyFormat::RawIdentifier)), "2019ApJ...872..123S");
    }

    #[test]
    fn author_year() {
        assert_eq!(generate_key(&paper(), &config(KeyFormat::AuthorYear)), "smithjones2019");
    }

    #[test]
    fn author_year_title_skips_stopwords() {
        assert_eq!(
            generate_key(&paper(), &config(KeyFormat::AuthorYearTitle)),
            "smithjones2019structure"
        );
    }

    #[test]
    fn casing_and_truncation() {
        let cfg = CitationKeyConfig {
            format: KeyFormat::AuthorYearTitle,
            lowercase: false,
            max_length: 12,
        };
        assert_eq!(generate_key(&paper(), &cfg), "SmithJones20");
    }

    #[test]
    fn missing_fields_fall_back() {
        let bare = Candidate::new(" { } ", "On it");
        assert_eq!(generate_key(&bare, &config(KeyFormat::RawIdentifier)), "unknown");
        assert_eq!(generate_key(&bare, &config(KeyFormat::AuthorYearTitle)), "unknown");
    }

    #[test]
    fn non_ascii_author_is_never_empty() {
        let mut c = Candidate::new("", "");
        c.authors = vec!["张, 三".into()];
        assert_eq!(generate_key(&c, &config(KeyFormat::AuthorYear)), "unknown");
        assert_eq!(generate_key(&c, &config(KeyFormat::RawIdentifier)), "unknown");

        c.year = Some(2021);
        assert_eq!(generate_key(&c, &config(KeyFormat::AuthorYearTitle)), "unknown2021");
    }

    #[test]
    fn deterministic() {
        let cfg = config(KeyFormat::AuthorYearTitle);
        assert_eq!(generate_key(&paper(), &cfg), generate_key(&paper(), &cfg));
    }
}
