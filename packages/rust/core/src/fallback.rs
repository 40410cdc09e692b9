//! Local heuristics used when the analyzer or ranker is absent or failing.

use std::sync::LazyLock;

use regex::Regex;

use citefill_shared::{Candidate, CitationKind, ContextAnalysis, RankedCandidate};

const KEYWORD_STOPWORDS: &[&str] = &[
    "that", "this", "with", "from", "have", "been", "were", "which", "their", "there", "about",
    "would", "could", "should", "these", "those", "other",
];

const MAX_KEYWORDS: usize = 5;
const QUERY_KEYWORDS: usize = 3;
const MAX_CLAIM_CHARS: usize = 200;

/// Explanation attached to every fallback-ranked candidate.
pub const FALLBACK_EXPLANATION: &str = "Ranked by citation count";

/// Naive keyword analysis of a context.
///
/// Keywords are the first alphabetic words of four or more letters that are
/// not stopwords. The query ANDs the first three; with no keywords the
/// context itself is the query.
pub fn fallback_analysis(context: &str, reason: &str) -> ContextAnalysis {
    static WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{4,}\b").expect("valid regex"));

    let lowered = context.to_lowercase();
    let keywords: Vec<String> = WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| !KEYWORD_STOPWORDS.contains(w))
        .take(MAX_KEYWORDS)
        .map(String::from)
        .collect();

    let refined_query = if keywords.is_empty() {
        context.trim().to_string()
    } else {
        keyword_query(&keywords, " AND ")
    };

    ContextAnalysis {
        topic: keywords.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
        claim: context.chars().take(MAX_CLAIM_CHARS).collect(),
        citation_kind: CitationKind::General,
        keywords,
        refined_query,
        reasoning: format!("Fallback analysis due to: {reason}"),
    }
}

/// Join the leading keywords with `separator` (`" AND "`, `" OR "`).
pub fn keyword_query(keywords: &[String], separator: &str) -> String {
    keywords
        .iter()
        .take(QUERY_KEYWORDS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Order candidates by citation count, descending, keeping input order on ties.
///
/// Total over any input, including empty. Scores are `min(count / 1000, 0.5)`.
pub fn fallback_rank(candidates: &[Candidate], kind: CitationKind, top_k: usize) -> Vec<RankedCandidate> {
    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    // `sort_by_key` is stable
    ordered.sort_by_key(|c| std::cmp::Reverse(c.citation_count.unwrap_or(0)));

    ordered
        .into_iter()
        .take(top_k)
        .map(|c| RankedCandidate {
            candidate: c.clone(),
            relevance_score: (c.citation_count.unwrap_or(0) as f32 / 1000.0).min(0.5),
            explanation: FALLBACK_EXPLANATION.to_string(),
            citation_kind: kind,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, count: Option<u64>) -> Candidate {
        let mut c = Candidate::new(id, id);
        c.citation_count = count;
        c
    }

    #[test]
    fn keywords_skip_short_words_and_stopwords() {
        let analysis = fallback_analysis(
            "These observations of dark matter halos which were triaxial",
            "no analyzer",
        );
        assert_eq!(
            analysis.keywords,
            vec!["observations", "dark", "matter", "halos", "triaxial"]
        );
        assert_eq!(analysis.refined_query, "observations AND dark AND matter");
        assert_eq!(analysis.topic, "observations dark");
        assert_eq!(analysis.reasoning, "Fallback analysis due to: no analyzer");
        assert_eq!(analysis.citation_kind, CitationKind::General);
    }

    #[test]
    fn context_without_keywords_is_its_own_query() {
        let analysis = fallback_analysis("  a b c  ", "x");
        assert!(analysis.keywords.is_empty());
        assert_eq!(analysis.refined_query, "a b c");
    }

    #[test]
    fn ranks_by_citation_count_with_stable_ties() {
        let input = vec![
            candidate("low", Some(3)),
            candidate("tie-a", Some(50)),
            candidate("none", None),
            candidate("tie-b", Some(50)),
            candidate("high", Some(4000)),
        ];
        let ranked = fallback_rank(&input, CitationKind::Review, 10);
        let ids: Vec<_> = ranked.iter().map(|r| r.candidate.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "tie-a", "tie-b", "low", "none"]);
        assert_eq!(ranked[0].relevance_score, 0.5);
        assert!((ranked[1].relevance_score - 0.05).abs() < f32::EPSILON);
        assert!(ranked.iter().all(|r| r.citation_kind == CitationKind::Review));
        assert!(ranked.iter().all(|r| r.explanation == FALLBACK_EXPLANATION));
    }

    #[test]
    fn total_over_empty_and_single_inputs() {
        assert!(fallback_rank(&[], CitationKind::General, 5).is_empty());
        let one = fallback_rank(&[candidate("only", None)], CitationKind::General, 5);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].relevance_score, 0.0);
    }

    #[test]
    fn truncates_to_top_k() {
        let input: Vec<_> = (0..10).map(|i| candidate(&format!("c{i}"), Some(i))).collect();
        let ranked = fallback_rank(&input, CitationKind::General, 3);
        let ids: Vec<_> = ranked.iter().map(|r| r.candidate.id.as_str()).collect();
        assert_eq!(ids, vec!["c9", "c8", "c7"]);
    }
}
