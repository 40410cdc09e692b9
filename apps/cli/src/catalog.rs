//! JSON catalog standing in for a live search backend.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, instrument};

use citefill_core::CandidateSearch;
use citefill_shared::{Candidate, CitefillError, Result, SearchFilters};

/// Candidates loaded from a JSON array, searched by term overlap.
#[derive(Debug, Clone)]
pub(crate) struct CatalogSearch {
    candidates: Vec<Candidate>,
}

impl CatalogSearch {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| CitefillError::io(path, e))?;
        let candidates: Vec<Candidate> = serde_json::from_str(&raw).map_err(|e| {
            CitefillError::parse(format!("invalid catalog {}: {e}", path.display()))
        })?;
        debug!(candidates = candidates.len(), "catalog loaded");
        Ok(Self { candidates })
    }

    pub(crate) fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// Lowercased query terms and whether all of them must match.
fn parse_query(query: &str) -> (Vec<String>, bool) {
    let require_all = query.contains(" AND ");
    let terms = query
        .split_whitespace()
        .filter(|t| *t != "AND" && *t != "OR")
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();
    (terms, require_all)
}

#[async_trait]
impl CandidateSearch for CatalogSearch {
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        let (terms, require_all) = parse_query(query);

        let hits: Vec<Candidate> = self
            .candidates
            .iter()
            .filter(|c| filters.matches(c))
            .filter(|c| {
                if terms.is_empty() {
                    return true;
                }
                let haystack = format!(
                    "{} {}",
                    c.title,
                    c.abstract_text.as_deref().unwrap_or_default()
                )
                .to_lowercase();
                let mut found = terms.iter().map(|t| haystack.contains(t.as_str()));
                if require_all {
                    found.all(|f| f)
                } else {
                    found.any(|f| f)
                }
            })
            .take(limit)
            .cloned()
            .collect();

        debug!(query, hits = hits.len(), "catalog search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CatalogSearch {
        let mut halos = Candidate::new("halo2019", "Triaxial dark matter halos");
        halos.year = Some(2019);
        halos.authors = vec!["Vega, L.".into()];
        let mut winds = Candidate::new("wind2021", "Stellar winds");
        winds.abstract_text = Some("Winds from massive stars shape dark nebulae.".into());
        winds.year = Some(2021);
        CatalogSearch {
            candidates: vec![halos, winds],
        }
    }

    #[test]
    fn query_parsing() {
        assert_eq!(
            parse_query("dark AND matter"),
            (vec!["dark".to_string(), "matter".to_string()], true)
        );
        assert!(!parse_query("dark OR winds").1);
    }

    #[tokio::test]
    async fn and_requires_every_term() {
        let hits = catalog()
            .search("dark AND halos", &SearchFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "halo2019");
    }

    #[tokio::test]
    async fn or_matches_any_term_and_abstracts() {
        let hits = catalog()
            .search("dark OR nothing", &SearchFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);

        let limited = catalog()
            .search("dark OR nothing", &SearchFilters::default(), 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn filters_apply() {
        let filters = SearchFilters {
            author: Some("vega".into()),
            year_range: None,
        };
        let hits = catalog().search("dark", &filters, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "halo2019");
    }

    #[test]
    fn load_reports_bad_json() {
        let path = std::env::temp_dir().join(format!("cf_catalog_{}.json", uuid::Uuid::now_v7()));
        std::fs::write(&path, r#"[{"id":"a","title":"A","citation_count":3}]"#).unwrap();
        assert_eq!(CatalogSearch::load(&path).unwrap().len(), 1);

        std::fs::write(&path, "{not json").unwrap();
        let err = CatalogSearch::load(&path).unwrap_err();
        assert!(matches!(err, CitefillError::Parse { .. }));

        let _ = std::fs::remove_file(&path);
    }
}
