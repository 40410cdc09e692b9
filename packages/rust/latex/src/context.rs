//! Markup-stripped text windows around citation sites.

use std::sync::LazyLock;

use regex::Regex;

/// Extract a cleaned context window of `window` characters on each side of `offset`.
///
/// `offset` is a byte offset; it is clamped to the text and moved back to a
/// char boundary. Commands with an argument are replaced by the argument,
/// bare commands and braces are dropped, and whitespace is collapsed.
pub fn extract_context(text: &str, offset: usize, window: usize) -> String {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }

    let start = text[..offset]
        .char_indices()
        .rev()
        .take(window)
        .last()
        .map_or(offset, |(i, _)| i);
    let end = text[offset..]
        .char_indices()
        .nth(window)
        .map_or(text.len(), |(i, _)| offset + i);

    clean_markup(&text[start..end])
}

/// Strip markup from a text fragment, keeping readable words.
pub fn clean_markup(fragment: &str) -> String {
    static COMMAND_WITH_ARG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+\{([^}]*)\}").expect("valid regex"));
    static BARE_COMMAND_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+").expect("valid regex"));
    static BRACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[{}]").expect("valid regex"));
    static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let result = COMMAND_WITH_ARG_RE.replace_all(fragment, "$1");
    let result = BARE_COMMAND_RE.replace_all(&result, "");
    let result = BRACES_RE.replace_all(&result, "");
    let result = WHITESPACE_RE.replace_all(&result, " ");

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_collapses_whitespace() {
        let text = "Stars form in \\emph{molecular clouds}\n\n  \\cite{} as shown by \\LaTeX{}.";
        let offset = text.find("\\cite").unwrap();
        let ctx = extract_context(text, offset, 200);
        assert_eq!(ctx, "Stars form in molecular clouds as shown by .");
    }

    #[test]
    fn window_is_bounded() {
        let text = format!("{}X{}", "a".repeat(500), "b".repeat(500));
        let offset = text.find('X').unwrap();
        let ctx = extract_context(&text, offset, 10);
        assert_eq!(ctx, format!("{}X{}", "a".repeat(10), "b".repeat(9)));
    }

    #[test]
    fn deterministic_and_char_safe() {
        let text = "Ångström units é \\cite{} — résumé";
        let offset = text.find("\\cite").unwrap();
        let a = extract_context(text, offset, 5);
        let b = extract_context(text, offset, 5);
        assert_eq!(a, b);
        // Offsets inside a multi-byte char and past the end never panic.
        let _ = extract_context(text, 1, 5);
        let _ = extract_context(text, 10_000, 5);
    }

    #[test]
    fn empty_text() {
        assert_eq!(extract_context("", 0, 200), "");
    }
}
