//! Shared types, error model, and configuration for citefill.
//!
//! This crate is the foundation depended on by all other citefill crates.
//! It provides:
//! - [`CitefillError`], the unified error type
//! - Domain types ([`Candidate`], [`ContextAnalysis`], [`RankedCandidate`], [`RunId`])
//! - Configuration ([`AppConfig`], [`ResolveConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CitationKeyConfig, KeyFormat, MAX_SUGGEST_CONCURRENCY, ResolveConfig,
    ResolveSettings, RunMode, ScanConfig, config_dir, config_file_path, default_commands,
    init_config, load_config, load_config_from,
};
pub use error::{CitefillError, Result};
pub use types::{
    Candidate, CitationKind, ContextAnalysis, RankedCandidate, RunId, SearchFilters, YearRange,
};
