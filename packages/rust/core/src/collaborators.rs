//! External collaborators consumed by the resolution pipeline.
//!
//! Only search is mandatory. Without an analyzer or ranker the pipeline uses
//! the local heuristics in [`crate::fallback`].

use std::sync::Arc;

use async_trait::async_trait;

use citefill_shared::{Candidate, ContextAnalysis, RankedCandidate, Result, SearchFilters};

/// Turns a citation context into a structured analysis and a search query.
#[async_trait]
pub trait ContextAnalyzer: Send + Sync {
    async fn analyze(&self, context: &str) -> Result<ContextAnalysis>;
}

/// Retrieves candidate works for a query.
///
/// Implementations signal rate limits with [`citefill_shared::CitefillError::QuotaExhausted`].
#[async_trait]
pub trait CandidateSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Candidate>>;
}

/// Orders candidates by relevance to a context.
#[async_trait]
pub trait Ranker: Send + Sync {
    async fn rank(
        &self,
        candidates: &[Candidate],
        context: &str,
        analysis: Option<&ContextAnalysis>,
        top_k: usize,
    ) -> Result<Vec<RankedCandidate>>;
}

/// The set of collaborators one run works with.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn CandidateSearch>,
    pub analyzer: Option<Arc<dyn ContextAnalyzer>>,
    pub ranker: Option<Arc<dyn Ranker>>,
}

impl Collaborators {
    pub fn new(search: Arc<dyn CandidateSearch>) -> Self {
        Self {
            search,
            analyzer: None,
            ranker: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn ContextAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn Ranker>) -> Self {
        self.ranker = Some(ranker);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("analyzer", &self.analyzer.is_some())
            .field("ranker", &self.ranker.is_some())
            .finish_non_exhaustive()
    }
}
