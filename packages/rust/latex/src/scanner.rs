//! Citation scanner: finds citation commands with empty or partially empty keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use citefill_shared::{Result, ScanConfig};

use crate::bibmode::is_commented;
use crate::context::extract_context;
use crate::document::LineIndex;
use crate::patterns::{CitationPatterns, existing_keys, key_slots};

/// A location where a citation key is expected but missing.
///
/// Positions refer to the document as it was when scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationSite {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column (in chars) of the command's backslash.
    pub column: usize,
    /// Byte offset of the command's backslash.
    pub offset: usize,
    /// Command name without backslash, e.g. `citep`.
    pub command: String,
    /// The full matched command text.
    pub raw_span: String,
    /// Keys already present, in order.
    pub existing_keys: Vec<String>,
    /// Cleaned text around the site.
    pub context: String,
}

impl CitationSite {
    /// True when no key is present at all.
    pub fn is_fully_empty(&self) -> bool {
        self.existing_keys.is_empty()
    }
}

/// Locates incomplete citation sites over a fixed command vocabulary.
#[derive(Debug, Clone)]
pub struct Scanner {
    patterns: CitationPatterns,
    context_window: usize,
}

impl Scanner {
    pub fn new(commands: &[String], context_window: usize) -> Result<Self> {
        Ok(Self {
            patterns: CitationPatterns::new(commands)?,
            context_window,
        })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        Self::new(&config.commands, config.context_window)
    }

    /// Every incomplete citation site in `text`, in document order.
    ///
    /// Fully empty arguments and arguments with an empty slot (`\cite{a, }`)
    /// are both reported, once per `(line, column)`. Commands after a `%`
    /// comment marker are skipped.
    #[instrument(skip_all, fields(bytes = text.len()))]
    pub fn scan(&self, text: &str) -> Vec<CitationSite> {
        let index = LineIndex::new(text);
        let mut sites: BTreeMap<(usize, usize), CitationSite> = BTreeMap::new();

        let live = |caps: &regex::Captures<'_>| !is_commented(text, caps.get_match().start());

        for caps in self.patterns.empty().captures_iter(text).filter(live) {
            let site = self.site_from(text, &index, &caps);
            sites.entry((site.line, site.column)).or_insert(site);
        }

        for caps in self.patterns.any().captures_iter(text).filter(live) {
            if !key_slots(&caps["keys"]).iter().any(|k| k.is_empty()) {
                continue;
            }
            let site = self.site_from(text, &index, &caps);
            sites.entry((site.line, site.column)).or_insert(site);
        }

        debug!(found = sites.len(), "scan complete");
        sites.into_values().collect()
    }

    fn site_from(&self, text: &str, index: &LineIndex, caps: &regex::Captures<'_>) -> CitationSite {
        let whole = caps.get_match();
        let (line, column) = index.locate(text, whole.start());

        CitationSite {
            line,
            column,
            offset: whole.start(),
            command: caps["cmd"].to_string(),
            raw_span: whole.as_str().to_string(),
            existing_keys: existing_keys(&caps["keys"]),
            context: extract_context(text, whole.start(), self.context_window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citefill_shared::default_commands;

    fn scanner() -> Scanner {
        Scanner::new(&default_commands(), 200).expect("scanner")
    }

    #[test]
    fn finds_fully_empty_sites_in_order() {
        let text = "Intro \\cite{}.\nMore \\citep{ } and \\citet{,}.\n\\citeauthor{}\n";
        let sites = scanner().scan(text);
        assert_eq!(sites.len(), 4);

        let positions: Vec<_> = sites.iter().map(|s| (s.line, s.column)).collect();
        assert_eq!(positions, vec![(1, 7), (2, 6), (2, 20), (3, 1)]);
        assert_eq!(sites[2].command, "citet");
        assert!(sites.iter().all(CitationSite::is_fully_empty));
    }

    #[test]
    fn finds_partial_sites_with_existing_keys() {
        let text = "As shown \\citep[e.g.][]{knownKey, } and \\cite{a,,b}.";
        let sites = scanner().scan(text);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].existing_keys, vec!["knownKey"]);
        assert_eq!(sites[0].raw_span, "\\citep[e.g.][]{knownKey, }");
        assert_eq!(sites[1].existing_keys, vec!["a", "b"]);
    }

    #[test]
    fn commented_out_commands_are_skipped() {
        let text = "% draft: \\cite{}\nKept \\cite{} % old \\citep{}\n100\\% sure \\citet{}\n";
        let sites = scanner().scan(text);
        let positions: Vec<_> = sites.iter().map(|s| (s.line, s.command.as_str())).collect();
        assert_eq!(positions, vec![(2, "cite"), (3, "citet")]);
    }

    #[test]
    fn complete_and_malformed_commands_are_ignored() {
        let text = "Done \\cite{key1, key2}. Broken \\cite{ and \\foo{} here.";
        assert!(scanner().scan(text).is_empty());
    }

    #[test]
    fn fully_empty_sites_are_not_reported_twice() {
        let text = "\\cite{}\\cite{ , }";
        let sites = scanner().scan(text);
        assert_eq!(sites.len(), 2);
        assert_ne!(sites[0].column, sites[1].column);
    }

    #[test]
    fn n_empty_sites_yield_n_distinct_positions() {
        let n = 25;
        let text: String = (0..n)
            .map(|i| format!("Claim number {i} needs support \\citep{{}}.\n"))
            .collect();
        let sites = scanner().scan(&text);
        assert_eq!(sites.len(), n);
        for pair in sites.windows(2) {
            assert!((pair[0].line, pair[0].column) < (pair[1].line, pair[1].column));
        }
    }

    #[test]
    fn context_is_attached() {
        let text = "Dark matter halos are \\emph{triaxial} \\cite{}.";
        let sites = scanner().scan(text);
        assert_eq!(sites[0].context, "Dark matter halos are triaxial .");
    }

    #[test]
    fn custom_vocabulary() {
        let scanner = Scanner::new(&["footcite".to_string()], 50).unwrap();
        let sites = scanner.scan("\\footcite{} \\cite{}");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].command, "footcite");
    }
}
