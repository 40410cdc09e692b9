//! Bibliography mode detection.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::LineIndex;

/// Extension appended to `\bibliography{name}` references that lack one.
pub const BIB_EXTENSION: &str = ".bib";

/// Opening marker of the inline bibliography environment.
pub const THEBIBLIOGRAPHY_BEGIN: &str = r"\begin{thebibliography}";
/// Closing marker of the inline bibliography environment.
pub const THEBIBLIOGRAPHY_END: &str = r"\end{thebibliography}";
/// Closing marker of the document body.
pub const END_DOCUMENT: &str = r"\end{document}";

/// How a manuscript manages its reference list.
///
/// Recompute after any edit that may change the bibliography structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BibliographyMode {
    /// Entries live in an external file, as written in the manuscript.
    ExternalFile { path: PathBuf },
    /// An inline environment opens at this 1-based line.
    InlineEnvironment { line: usize },
    /// No bibliography yet.
    None,
}

impl std::fmt::Display for BibliographyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExternalFile { path } => write!(f, "external file {}", path.display()),
            Self::InlineEnvironment { line } => write!(f, "inline environment at line {line}"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Detect the bibliography mode, in priority order:
/// `\bibliography{..}`, `\addbibresource{..}`, `\begin{thebibliography}`.
///
/// References inside `%` comments are ignored.
pub fn detect_bibliography(text: &str) -> BibliographyMode {
    static BIB_FILE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\bibliography\{([^}]*)\}").expect("valid regex"));
    static BIBRESOURCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\addbibresource(?:\[[^\]]*\])?\{([^}]*)\}").expect("valid regex"));

    if let Some(caps) = first_live_match(&BIB_FILE_RE, text) {
        let first = caps.split(',').next().unwrap_or_default().trim();
        let mut name = first.to_string();
        if !name.is_empty() && !name.ends_with(BIB_EXTENSION) {
            name.push_str(BIB_EXTENSION);
        }
        return BibliographyMode::ExternalFile {
            path: PathBuf::from(name),
        };
    }

    if let Some(caps) = first_live_match(&BIBRESOURCE_RE, text) {
        return BibliographyMode::ExternalFile {
            path: PathBuf::from(caps.trim()),
        };
    }

    if let Some(offset) = find_marker(text, THEBIBLIOGRAPHY_BEGIN, 0) {
        let (line, _) = LineIndex::new(text).locate(text, offset);
        return BibliographyMode::InlineEnvironment { line };
    }

    BibliographyMode::None
}

/// Byte offset of the first uncommented occurrence of `marker` at or after `from`.
pub fn find_marker(text: &str, marker: &str, from: usize) -> Option<usize> {
    let from = from.min(text.len());
    text.get(from..)?
        .match_indices(marker)
        .map(|(i, _)| from + i)
        .find(|&offset| !is_commented(text, offset))
}

/// First capture group of the first match not inside a comment.
fn first_live_match<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures_iter(text)
        .filter(|caps| caps.get(0).is_some_and(|m| !is_commented(text, m.start())))
        .find_map(|caps| caps.get(1).map(|m| m.as_str()))
}

/// Whether `offset` follows an unescaped `%` on its line.
pub fn is_commented(text: &str, offset: usize) -> bool {
    let line_start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &text[line_start..offset];
    let mut escaped = false;
    for ch in prefix.chars() {
        match ch {
            '\\' => escaped = !escaped,
            '%' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}
