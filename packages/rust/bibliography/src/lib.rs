//! Bibliography artifacts: citation keys, entry formatting, and idempotent
//! writes to external `.bib` files or inline `thebibliography` environments.

pub mod format;
pub mod keygen;
pub mod writer;

pub use format::{format_bibitem, rekey_entry, synthesize_bibtex};
pub use keygen::generate_key;
pub use writer::{BibTarget, EntryWrite, WriteOutcome, add_bibitem, append_bib_entry, write_entry};
