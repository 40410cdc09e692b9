//! Entry text for both bibliography styles.

use std::sync::LazyLock;

use regex::Regex;

use citefill_shared::Candidate;

/// BibTeX entry header: `@type{key,`.
static ENTRY_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<head>\s*@\w+\s*\{)\s*(?P<key>[^,\s]*)\s*,").expect("valid regex"));

/// Body of a `\bibitem{key}` line (everything after the key).
///
/// `Authors, year, ``Title'', journal, volume, pages.` with the author list
/// shortened to `First et al.` beyond three names. Missing parts are skipped.
pub fn format_bibitem(candidate: &Candidate) -> String {
    let mut parts: Vec<String> = Vec::new();

    match candidate.authors.as_slice() {
        [] => {}
        [first, rest @ ..] if rest.len() >= 3 => parts.push(format!("{first} et al.")),
        all => parts.push(all.join(", ")),
    }

    if let Some(year) = candidate.year {
        parts.push(year.to_string());
    }

    if !candidate.title.trim().is_empty() {
        parts.push(format!("``{}''", candidate.title.trim()));
    }

    let venue: Vec<&str> = [&candidate.journal, &candidate.volume, &candidate.pages]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .filter(|s| !s.trim().is_empty())
        .collect();
    if !venue.is_empty() {
        parts.push(venue.join(", "));
    }

    format!("{}.", parts.join(", "))
}

/// Key of a BibTeX block, if it has a recognizable header.
#[cfg(test)]
fn entry_key(block: &str) -> Option<&str> {
    ENTRY_HEADER_RE
        .captures(block)
        .and_then(|caps| caps.name("key"))
        .map(|m| m.as_str())
}

/// Rewrite a BibTeX block's header so it carries `key`.
///
/// Returns `None` when the block has no `@type{key,` header.
pub fn rekey_entry(block: &str, key: &str) -> Option<String> {
    let caps = ENTRY_HEADER_RE.captures(block)?;
    let whole = caps.get(0)?;
    let head = caps.name("head")?.as_str();
    Some(format!("{head}{key},{}", &block[whole.end()..]).trim().to_string())
}

/// Minimal `@article` block built from a candidate's fields.
pub fn synthesize_bibtex(candidate: &Candidate, key: &str) -> String {
    let mut fields: Vec<(&str, String)> = Vec::new();

    if !candidate.authors.is_empty() {
        fields.push(("author", candidate.authors.join(" and ")));
    }
    // Double braces keep BibTeX styles from re-casing the title.
    fields.push(("title", format!("{{{}}}", candidate.title.trim())));
    let optional = [
        ("journal", candidate.journal.as_deref()),
        ("volume", candidate.volume.as_deref()),
        ("pages", candidate.pages.as_deref()),
        ("doi", candidate.doi.as_deref()),
    ];
    if let Some(year) = candidate.year {
        fields.push(("year", year.to_string()));
    }
    fields.extend(
        optional
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v.to_string()))),
    );

    let body: Vec<String> = fields
        .iter()
        .map(|(name, value)| format!("  {name} = {{{value}}}"))
        .collect();

    format!("@article{{{key},\n{}\n}}", body.join(",\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper() -> Candidate {
        let mut c = Candidate::new("2020MNRAS.491.1234A", "Galaxy Rotation Curves");
        c.year = Some(2020);
        c.authors = vec!["Adams, B.".into(), "Baker, C.".into()];
        c.journal = Some("MNRAS".into());
        c.volume = Some("491".into());
        c.pages = Some("1234".into());
        c
    }

    #[test]
    fn bibitem_with_all_parts() {
        assert_eq!(
            format_bibitem(&paper()),
            "Adams, B., Baker, C., 2020, ``Galaxy Rotation Curves'', MNRAS, 491, 1234."
        );
    }

    #[test]
    fn bibitem_shortens_long_author_lists() {
        let mut c = Candidate::new("x", "T");
        c.authors = vec!["A".into(), "B".into(), "C".into(), "D".into()];
        assert_eq!(format_bibitem(&c), "A et al., ``T''.");

        c.authors.pop();
        assert_eq!(format_bibitem(&c), "A, B, C, ``T''.");
    }

    #[test]
    fn rekey_replaces_only_the_header_key() {
        let block = "@ARTICLE{2020MNRAS.491.1234A,\n  title = {{Galaxy, rotation}},\n}\n";
        let rekeyed = rekey_entry(block, "adams2020").unwrap();
        assert_eq!(rekeyed, "@ARTICLE{adams2020,\n  title = {{Galaxy, rotation}},\n}");
        assert_eq!(entry_key(&rekeyed), Some("adams2020"));
        assert!(rekey_entry("not bibtex", "k").is_none());
    }

    #[test]
    fn synthesized_entry_is_parseable() {
        let block = synthesize_bibtex(&paper(), "adams2020");
        assert!(block.starts_with("@article{adams2020,\n"));
        assert!(block.contains("  author = {Adams, B. and Baker, C.}"));
        assert!(block.contains("  title = {{Galaxy Rotation Curves}}"));
        assert!(block.contains("  year = {2020}"));
        assert!(block.ends_with("\n}"));
        assert_eq!(entry_key(&block), Some("adams2020"));
    }
}
