//! Citation resolution for LaTeX manuscripts.
//!
//! Ties the scanner, the external collaborators and the bibliography writer
//! together into end-to-end runs (e.g., `resolve_document`).

pub mod collaborators;
pub mod fallback;
pub mod pipeline;

pub use collaborators::{CandidateSearch, Collaborators, ContextAnalyzer, Ranker};
pub use pipeline::{
    FailureKind, ProgressReporter, ResolutionOutcome, RunReport, SilentProgress, SiteFailure,
    SiteState, resolve, resolve_document,
};
