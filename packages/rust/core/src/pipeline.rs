//! Document resolution pipeline: scan → analyze → search → rank → fill → write.
//!
//! Every site moves through the same state machine in both run modes. Only
//! the `Filled` transition's mutation is gated by [`RunMode`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use citefill_bibliography::{BibTarget, WriteOutcome, generate_key, write_entry};
use citefill_latex::{
    CitationFiller, CitationSite, Document, PositionJournal, Scanner, validate_key,
};
use citefill_shared::{
    Candidate, CitefillError, ContextAnalysis, RankedCandidate, ResolveConfig, Result, RunId,
    RunMode,
};

use crate::collaborators::Collaborators;
use crate::fallback::{fallback_analysis, fallback_rank, keyword_query};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Terminal state of one citation site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteState {
    /// A key was chosen. In auto-fill mode it was also written.
    Filled,
    Failed,
}

/// Why a site failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SiteNotFound,
    NoCandidates,
    QuotaExhausted,
    MalformedBibliographyTarget,
    InvalidKey,
    Collaborator,
    /// The run was cancelled before this site was resolved.
    Cancelled,
}

impl FailureKind {
    fn of(error: &CitefillError) -> Self {
        match error {
            CitefillError::SiteNotFound { .. } => Self::SiteNotFound,
            CitefillError::NoCandidates => Self::NoCandidates,
            CitefillError::QuotaExhausted(_) => Self::QuotaExhausted,
            CitefillError::MalformedBibliographyTarget { .. } => Self::MalformedBibliographyTarget,
            CitefillError::Validation { .. } => Self::InvalidKey,
            _ => Self::Collaborator,
        }
    }
}

/// A site-scoped failure with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl From<&CitefillError> for SiteFailure {
    fn from(error: &CitefillError) -> Self {
        Self {
            kind: FailureKind::of(error),
            reason: error.to_string(),
        }
    }
}

/// The result for exactly one discovered site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub site: CitationSite,
    pub state: SiteState,
    /// Key chosen for the site (empty on failure).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chosen_keys: Vec<String>,
    /// Whether the document and bibliography were changed for this site.
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bibliography: Option<WriteOutcome>,
    /// Ranked candidates, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<RankedCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ContextAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<SiteFailure>,
}

impl ResolutionOutcome {
    fn failed(site: CitationSite, failure: SiteFailure) -> Self {
        Self {
            site,
            state: SiteState::Failed,
            chosen_keys: Vec::new(),
            applied: false,
            bibliography: None,
            suggestions: Vec::new(),
            analysis: None,
            failure: Some(failure),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.state == SiteState::Filled
    }
}

/// Summary of one run over one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<PathBuf>,
    pub mode: RunMode,
    pub sites_found: usize,
    /// One entry per discovered site, in document order.
    pub outcomes: Vec<ResolutionOutcome>,
    /// True if the run stopped early; later sites carry a `cancelled` failure.
    pub cancelled: bool,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    pub fn filled_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_filled()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.filled_count()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a site is resolved (`index` is 1-based).
    fn site_started(&self, site: &CitationSite, index: usize, total: usize);
    /// Called once a site reaches a terminal state.
    fn site_finished(&self, outcome: &ResolutionOutcome, index: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn site_started(&self, _site: &CitationSite, _index: usize, _total: usize) {}
    fn site_finished(&self, _outcome: &ResolutionOutcome, _index: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Load a manuscript, resolve every incomplete citation, and persist once.
///
/// Site failures are recorded in the report. Document I/O failures and
/// on-disk changes made during the run abort it.
#[instrument(skip_all, fields(path = %path.display(), mode = ?config.mode))]
pub async fn resolve_document(
    path: &Path,
    config: &ResolveConfig,
    collaborators: &Collaborators,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    let mut doc = Document::open(path)?;
    let report = resolve(&mut doc, config, collaborators, progress, cancel).await?;

    if doc.is_dirty() {
        progress.phase("Saving manuscript");
        doc.persist()?;
    }

    Ok(report)
}

/// Resolve every incomplete citation in an in-memory document.
///
/// In auto-fill mode the buffer is edited and external bibliography files are
/// written, but the manuscript itself is left for the caller to persist.
pub async fn resolve(
    doc: &mut Document,
    config: &ResolveConfig,
    collaborators: &Collaborators,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    let run_id = RunId::new();
    info!(
        %run_id,
        mode = ?config.mode,
        filtered = !config.filters.is_empty(),
        "starting resolution run"
    );

    // --- Phase 1: Scan ---
    progress.phase("Scanning citations");
    let scanner = Scanner::from_config(&config.scan)?;
    let sites = scanner.scan(doc.text());
    let total = sites.len();
    info!(sites = total, "citation sites found");

    // --- Phase 2: Bibliography target ---
    let mut fill = match config.mode {
        RunMode::AutoFill => {
            progress.phase("Locating bibliography");
            Some(FillContext::new(doc, config)?)
        }
        RunMode::Suggest => None,
    };

    // --- Phase 3: Resolve sites ---
    progress.phase("Resolving citations");
    let resolver = SiteResolver::new(collaborators, config);
    let batch_size = match config.mode {
        RunMode::AutoFill => 1,
        RunMode::Suggest => config.suggest_concurrency.max(1),
    };

    let mut outcomes: Vec<ResolutionOutcome> = Vec::with_capacity(total);
    let mut pending = sites.into_iter().enumerate().peekable();
    let mut quota: Option<SiteFailure> = None;
    let mut cancelled = false;

    while pending.peek().is_some() {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let batch: Vec<(usize, CitationSite)> = pending.by_ref().take(batch_size).collect();
        for (i, site) in &batch {
            progress.site_started(site, i + 1, total);
        }

        let resolutions = join_all(batch.iter().map(|(_, site)| resolver.resolve_site(site))).await;

        for ((i, site), resolution) in batch.into_iter().zip(resolutions) {
            let outcome = match resolution {
                Ok(resolved) => match fill.as_mut() {
                    Some(ctx) => ctx.apply(doc, site, resolved)?,
                    None => resolved.into_suggestion(site),
                },
                Err(failure) => {
                    if failure.kind == FailureKind::QuotaExhausted && quota.is_none() {
                        warn!(reason = %failure.reason, "quota exhausted, short-circuiting remaining sites");
                        quota = Some(failure.clone());
                    }
                    ResolutionOutcome::failed(site, failure)
                }
            };
            progress.site_finished(&outcome, i + 1, total);
            outcomes.push(outcome);
        }

        if quota.is_some() {
            break;
        }
    }

    // Sites never dispatched still get exactly one outcome.
    let leftover = match &quota {
        Some(failure) => failure.clone(),
        None => SiteFailure {
            kind: FailureKind::Cancelled,
            reason: "run cancelled before this site was resolved".to_string(),
        },
    };
    for (i, site) in pending {
        let outcome = ResolutionOutcome::failed(site, leftover.clone());
        progress.site_finished(&outcome, i + 1, total);
        outcomes.push(outcome);
    }

    let report = RunReport {
        run_id,
        document: doc.path().map(Path::to_path_buf),
        mode: config.mode,
        sites_found: total,
        outcomes,
        cancelled,
        completed_at: Utc::now(),
    };

    info!(
        filled = report.filled_count(),
        failed = report.failed_count(),
        cancelled,
        "resolution run complete"
    );
    progress.done(&report);
    Ok(report)
}

// ---------------------------------------------------------------------------
// Per-site resolution (read-only)
// ---------------------------------------------------------------------------

/// A site that reached `Ranked`.
#[derive(Debug)]
struct Resolved {
    analysis: ContextAnalysis,
    ranked: Vec<RankedCandidate>,
    key: String,
}

impl Resolved {
    fn top(&self) -> &Candidate {
        // `ranked` is never empty once resolved.
        &self.ranked[0].candidate
    }

    fn into_suggestion(self, site: CitationSite) -> ResolutionOutcome {
        ResolutionOutcome {
            site,
            state: SiteState::Filled,
            chosen_keys: vec![self.key],
            applied: false,
            bibliography: None,
            suggestions: self.ranked,
            analysis: Some(self.analysis),
            failure: None,
        }
    }
}

struct SiteResolver<'a> {
    collaborators: &'a Collaborators,
    config: &'a ResolveConfig,
    /// Set after the ranker reports quota exhaustion.
    ranker_disabled: AtomicBool,
}

impl<'a> SiteResolver<'a> {
    fn new(collaborators: &'a Collaborators, config: &'a ResolveConfig) -> Self {
        Self {
            collaborators,
            config,
            ranker_disabled: AtomicBool::new(false),
        }
    }

    /// Scanning → ContextBuilt → CandidatesFetched → Ranked.
    #[instrument(skip_all, fields(line = site.line, column = site.column))]
    async fn resolve_site(&self, site: &CitationSite) -> std::result::Result<Resolved, SiteFailure> {
        let analysis = self.analyze(&site.context).await?;
        let candidates = self.fetch(&analysis).await?;
        let ranked = self.rank(&candidates, &site.context, &analysis).await;

        if ranked.is_empty() {
            return Err(SiteFailure::from(&CitefillError::NoCandidates));
        }

        let key = generate_key(&ranked[0].candidate, &self.config.key);
        validate_key(&key).map_err(|e| SiteFailure::from(&e))?;
        debug!(%key, candidates = candidates.len(), "site ranked");
        Ok(Resolved {
            analysis,
            ranked,
            key,
        })
    }

    async fn analyze(&self, context: &str) -> std::result::Result<ContextAnalysis, SiteFailure> {
        let Some(analyzer) = &self.collaborators.analyzer else {
            return Ok(fallback_analysis(context, "no context analyzer configured"));
        };

        match analyzer.analyze(context).await {
            Ok(analysis) => Ok(analysis),
            Err(e) if e.is_quota_exhausted() => Err(SiteFailure::from(&e)),
            Err(e) => {
                warn!(error = %e, "context analysis failed, using keyword fallback");
                Ok(fallback_analysis(context, &e.to_string()))
            }
        }
    }

    /// Search with the refined query, then once more with ORed keywords.
    async fn fetch(&self, analysis: &ContextAnalysis) -> std::result::Result<Vec<Candidate>, SiteFailure> {
        let limit = self.config.fetch_limit();
        let candidates = self.search(&analysis.refined_query, limit).await?;
        if !candidates.is_empty() {
            return Ok(candidates);
        }

        let retry = keyword_query(&analysis.keywords, " OR ");
        if !retry.is_empty() && retry != analysis.refined_query {
            debug!(query = %retry, "no results, retrying with keywords");
            let candidates = self.search(&retry, limit).await?;
            if !candidates.is_empty() {
                return Ok(candidates);
            }
        }

        Err(SiteFailure::from(&CitefillError::NoCandidates))
    }

    async fn search(&self, query: &str, limit: usize) -> std::result::Result<Vec<Candidate>, SiteFailure> {
        self.collaborators
            .search
            .search(query, &self.config.filters, limit)
            .await
            .map_err(|e| {
                if !e.is_quota_exhausted() {
                    warn!(error = %e, "candidate search failed");
                }
                SiteFailure::from(&e)
            })
    }

    /// Never fails: ranker errors fall back to the citation-count heuristic.
    async fn rank(
        &self,
        candidates: &[Candidate],
        context: &str,
        analysis: &ContextAnalysis,
    ) -> Vec<RankedCandidate> {
        let top_k = self.config.top_k;
        let fallback = || fallback_rank(candidates, analysis.citation_kind, top_k);

        let Some(ranker) = &self.collaborators.ranker else {
            return fallback();
        };
        if self.ranker_disabled.load(Ordering::Relaxed) {
            return fallback();
        }

        match ranker.rank(candidates, context, Some(analysis), top_k).await {
            Ok(ranked) if !ranked.is_empty() => ranked
                .into_iter()
                .take(top_k)
                .map(|mut r| {
                    r.relevance_score = if r.relevance_score.is_nan() {
                        0.0
                    } else {
                        r.relevance_score.clamp(0.0, 1.0)
                    };
                    r
                })
                .collect(),
            Ok(_) => {
                debug!("ranker returned nothing, using citation-count ranking");
                fallback()
            }
            Err(e) if e.is_quota_exhausted() => {
                warn!(error = %e, "ranker quota exhausted, disabling ranker for this run");
                self.ranker_disabled.store(true, Ordering::Relaxed);
                fallback()
            }
            Err(e) => {
                warn!(error = %e, "ranking failed, using citation-count ranking");
                fallback()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filled transition (auto-fill only)
// ---------------------------------------------------------------------------

/// Mutation state carried across sites in an auto-fill run.
struct FillContext {
    filler: CitationFiller,
    journal: PositionJournal,
    /// Resolved once; an unusable target fails each site rather than the run.
    target: std::result::Result<BibTarget, SiteFailure>,
}

impl FillContext {
    fn new(doc: &Document, config: &ResolveConfig) -> Result<Self> {
        let target = match BibTarget::resolve(doc, config.bib_file.as_deref()) {
            Ok(target) => {
                debug!(?target, "bibliography target resolved");
                Ok(target)
            }
            Err(e @ CitefillError::MalformedBibliographyTarget { .. }) => {
                warn!(error = %e, "bibliography target unusable, sites will not be filled");
                Err(SiteFailure::from(&e))
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            filler: CitationFiller::from_config(&config.scan)?,
            journal: PositionJournal::new(),
            target,
        })
    }

    /// Ranked → Filled: fill the site, then write its bibliography entry.
    ///
    /// Returns `Err` only for run-fatal errors.
    fn apply(&mut self, doc: &mut Document, site: CitationSite, resolved: Resolved) -> Result<ResolutionOutcome> {
        let target = match &self.target {
            Ok(target) => target,
            Err(failure) => return Ok(ResolutionOutcome::failed(site, failure.clone())),
        };

        let (line, column) = self.journal.translate(site.line, site.column);
        let edit = match self.filler.fill_at(doc, line, column, &[resolved.key.as_str()]) {
            Ok(edit) => edit,
            Err(e) if e.is_fatal_io() => return Err(e),
            Err(e) => {
                warn!(line = site.line, column = site.column, error = %e, "fill failed");
                return Ok(ResolutionOutcome::failed(site, SiteFailure::from(&e)));
            }
        };
        self.journal
            .record_splice(edit.line, edit.column, &edit.old_span, &edit.new_span);

        let write = write_entry(doc, target, &resolved.key, resolved.top())?;
        if let Some(insertion) = write.insertion {
            self.journal.record_insertion(insertion);
        }

        debug!(key = %resolved.key, bibliography = ?write.outcome, "site filled");
        let mut outcome = resolved.into_suggestion(site);
        outcome.applied = true;
        outcome.bibliography = Some(write.outcome);
        Ok(outcome)
    }
}
