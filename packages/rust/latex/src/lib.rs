//! LaTeX manuscript handling: scanning, context extraction, bibliography
//! detection and in-place citation filling.

pub mod bibmode;
pub mod context;
pub mod document;
pub mod filler;
pub mod journal;
mod patterns;
pub mod scanner;

pub use bibmode::{BibliographyMode, detect_bibliography};
pub use context::extract_context;
pub use document::{Document, Insertion, LineIndex};
pub use filler::{CitationFiller, FillEdit, validate_key};
pub use journal::PositionJournal;
pub use scanner::{CitationSite, Scanner};
