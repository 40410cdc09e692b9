//! Core domain types shared by the scanner, writer, and orchestrator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CitefillError;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one resolution run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A retrieved work proposed as a fill for a citation site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Backend identifier (e.g. a bibcode or DOI). Used verbatim for raw-identifier keys.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Authority signal used by the fallback ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    /// Author names, typically `"Last, First"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// A ready-made BibTeX block, if the backend supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bibtex: Option<String>,
}

impl Candidate {
    /// Minimal candidate with only the required fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            year: None,
            citation_count: None,
            abstract_text: None,
            authors: Vec::new(),
            journal: None,
            volume: None,
            pages: None,
            doi: None,
            bibtex: None,
        }
    }

    /// Last name of the first author, or `"Unknown"`.
    pub fn first_author(&self) -> &str {
        self.authors
            .first()
            .and_then(|a| a.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
    }
}

// ---------------------------------------------------------------------------
// Analysis and ranking
// ---------------------------------------------------------------------------

/// What kind of reference a citation site calls for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Foundational,
    Methodological,
    Supporting,
    Contrasting,
    Review,
    #[default]
    General,
}

impl CitationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foundational => "foundational",
            Self::Methodological => "methodological",
            Self::Supporting => "supporting",
            Self::Contrasting => "contrasting",
            Self::Review => "review",
            Self::General => "general",
        }
    }
}

/// Output of the context-analysis collaborator (or its local fallback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub topic: String,
    pub claim: String,
    pub citation_kind: CitationKind,
    pub keywords: Vec<String>,
    /// Query to hand to the search collaborator.
    pub refined_query: String,
    pub reasoning: String,
}

/// A candidate with its relevance judgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    /// Always within `[0, 1]`.
    pub relevance_score: f32,
    pub explanation: String,
    pub citation_kind: CitationKind,
}

// ---------------------------------------------------------------------------
// Search filters
// ---------------------------------------------------------------------------

/// Inclusive publication-year range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        self.start <= year && year <= self.end
    }
}

impl std::str::FromStr for YearRange {
    type Err = CitefillError;

    /// Accepts `2020` or `2018-2022`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse_year = |part: &str| {
            part.trim()
                .parse::<i32>()
                .map_err(|e| CitefillError::parse(format!("invalid year '{part}': {e}")))
        };

        let (start, end) = match s.split_once('-') {
            Some((a, b)) => (parse_year(a)?, parse_year(b)?),
            None => {
                let y = parse_year(s)?;
                (y, y)
            }
        };

        if start > end {
            return Err(CitefillError::parse(format!(
                "year range '{s}' starts after it ends"
            )));
        }

        Ok(Self { start, end })
    }
}

/// Optional narrowing passed to every search call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Case-insensitive substring matched against author names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_range: Option<YearRange>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.year_range.is_none()
    }

    /// Whether a candidate passes both filters. Candidates without a year fail a year filter.
    pub fn matches(&self, candidate: &Candidate) -> bool {
        if self.is_empty() {
            return true;
        }
        if let Some(author) = &self.author {
            let needle = author.to_lowercase();
            if !candidate
                .authors
                .iter()
                .any(|a| a.to_lowercase().contains(&needle))
            {
                return false;
            }
        }

        match (&self.year_range, candidate.year) {
            (Some(range), Some(year)) => range.contains(year),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_v7() {
        let first = RunId::new();
        let second = RunId::new();
        assert_ne!(first, second);
        assert_eq!(first.0.get_version_num(), 7);
    }

    #[test]
    fn candidate_deserializes_abstract_field() {
        let json = r#"{"id":"2020ApJ...1A","title":"Stars","year":2020,"citation_count":42,"abstract":"We study stars."}"#;
        let c: Candidate = serde_json::from_str(json).expect("deserialize");
        assert_eq!(c.abstract_text.as_deref(), Some("We study stars."));
        assert_eq!(c.citation_count, Some(42));
        assert!(c.authors.is_empty());
    }

    #[test]
    fn first_author_takes_last_name() {
        let mut c = Candidate::new("x", "t");
        assert_eq!(c.first_author(), "Unknown");
        c.authors = vec!["Hubble, Edwin".into(), "Humason, Milton".into()];
        assert_eq!(c.first_author(), "Hubble");
    }

    #[test]
    fn year_range_parsing() {
        let single: YearRange = "2020".parse().unwrap();
        assert_eq!(single, YearRange { start: 2020, end: 2020 });

        let span: YearRange = "2018-2022".parse().unwrap();
        assert!(span.contains(2019));
        assert!(!span.contains(2023));

        assert!("2022-2018".parse::<YearRange>().is_err());
        assert!("soon".parse::<YearRange>().is_err());
    }

    #[test]
    fn filters_match_author_and_year() {
        let mut c = Candidate::new("x", "t");
        c.authors = vec!["Pan, Ke-Jung".into()];
        c.year = Some(2019);

        let filters = SearchFilters {
            author: Some("pan".into()),
            year_range: Some("2018-2020".parse().unwrap()),
        };
        assert!(filters.matches(&c));

        c.year = None;
        assert!(!filters.matches(&c));
        assert!(SearchFilters::default().matches(&c));
    }

    #[test]
    fn citation_kind_serializes_snake_case() {
        let json = serde_json::to_string(&CitationKind::Methodological).unwrap();
        assert_eq!(json, r#""methodological""#);
        assert_eq!(CitationKind::default().as_str(), "general");
    }
}
