//! Citation-command regexes built from a configurable vocabulary.

use regex::Regex;

use citefill_shared::{CitefillError, Result};

/// The two citation patterns shared by the scanner and the filler.
///
/// Capture groups: `cmd` (command name), `star` (optional `*`), `opts` (up to
/// two bracketed annotations), `keys` (the raw key argument).
#[derive(Debug, Clone)]
pub struct CitationPatterns {
    /// Any citation command with a brace-free key argument.
    any: Regex,
    /// A citation command whose key argument is only separators and whitespace.
    empty: Regex,
}

impl CitationPatterns {
    pub fn new(commands: &[String]) -> Result<Self> {
        let alternation = command_alternation(commands)?;
        let prefix = format!(r"\\(?P<cmd>{alternation})(?P<star>\*?)(?P<opts>(?:\[[^\]\n]*\]){{0,2}})");

        let any = Regex::new(&format!(r"{prefix}\{{(?P<keys>[^{{}}]*)\}}"))
            .map_err(|e| CitefillError::config(format!("invalid citation pattern: {e}")))?;
        let empty = Regex::new(&format!(r"{prefix}\{{(?P<keys>[\s,]*)\}}"))
            .map_err(|e| CitefillError::config(format!("invalid citation pattern: {e}")))?;

        Ok(Self { any, empty })
    }

    pub fn any(&self) -> &Regex {
        &self.any
    }

    pub fn empty(&self) -> &Regex {
        &self.empty
    }
}

/// Longest-first alternation so `citeyearpar` is tried before `citeyear` and `cite`.
fn command_alternation(commands: &[String]) -> Result<String> {
    let mut names: Vec<&str> = commands.iter().map(String::as_str).collect();
    if names.is_empty() {
        return Err(CitefillError::config("citation command vocabulary is empty"));
    }
    if let Some(bad) = names
        .iter()
        .find(|n| n.is_empty() || !n.chars().all(|c| c.is_ascii_alphabetic()))
    {
        return Err(CitefillError::config(format!(
            "citation command '{bad}' must contain letters only"
        )));
    }

    names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    names.dedup();
    Ok(names.join("|"))
}

/// Split a raw key argument into trimmed slots (empty slots included).
pub(crate) fn key_slots(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).collect()
}

/// Non-empty keys of a raw key argument, in order.
pub(crate) fn existing_keys(raw: &str) -> Vec<String> {
    key_slots(raw)
        .into_iter()
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use citefill_shared::default_commands;

    fn patterns() -> CitationPatterns {
        CitationPatterns::new(&default_commands()).expect("valid vocabulary")
    }

    #[test]
    fn longest_command_wins() {
        let p = patterns();
        let caps = p.any().captures(r"\citeyearpar{x}").unwrap();
        assert_eq!(&caps["cmd"], "citeyearpar");
        let caps = p.any().captures(r"\citet*[see][p.~3]{a, b}").unwrap();
        assert_eq!(&caps["cmd"], "citet");
        assert_eq!(&caps["star"], "*");
        assert_eq!(&caps["opts"], "[see][p.~3]");
        assert_eq!(&caps["keys"], "a, b");
    }

    #[test]
    fn unknown_and_unterminated_commands_do_not_match() {
        let p = patterns();
        assert!(p.any().find(r"\citefoo{}").is_none());
        assert!(p.any().find(r"\cite{unterminated").is_none());
        assert!(p.empty().find(r"\cite{a}").is_none());
        assert!(p.empty().find(r"\cite{ , }").is_some());
    }

    #[test]
    fn vocabulary_is_validated() {
        assert!(CitationPatterns::new(&[]).is_err());
        assert!(CitationPatterns::new(&["ci(te".to_string()]).is_err());
    }

    #[test]
    fn key_helpers() {
        assert_eq!(key_slots("a, ,b,"), vec!["a", "", "b", ""]);
        assert_eq!(existing_keys("a, ,b,"), vec!["a".to_string(), "b".to_string()]);
        assert!(existing_keys("  ").is_empty());
    }
}
