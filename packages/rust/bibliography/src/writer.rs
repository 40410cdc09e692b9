//! Idempotent bibliography writes.
//!
//! External `.bib` files are appended to directly. Inline `\bibitem` entries
//! are inserted into the [`Document`] buffer and reach disk with the next
//! [`Document::persist`].

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use citefill_latex::bibmode::{END_DOCUMENT, THEBIBLIOGRAPHY_END, find_marker};
use citefill_latex::{BibliographyMode, Document, Insertion, detect_bibliography, validate_key};
use citefill_shared::{Candidate, CitefillError, Result};

use crate::format::{format_bibitem, rekey_entry, synthesize_bibtex};

/// Result of one bibliography write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The bibliography file or environment did not exist and was created.
    Created,
    /// The entry was added to an existing bibliography.
    Appended,
    /// An entry with this key was already there; nothing changed.
    AlreadyPresent,
}

/// Where entries for one manuscript go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BibTarget {
    /// A resolved, writable `.bib` path.
    External(PathBuf),
    /// `\bibitem` lines inside the manuscript.
    Inline,
}

impl BibTarget {
    /// Resolve the target for `doc`.
    ///
    /// An explicit path wins over detection. A detected reference is resolved
    /// relative to the manuscript's directory.
    pub fn resolve(doc: &Document, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::External(check_writable(path.to_path_buf())?));
        }
        match detect_bibliography(doc.text()) {
            BibliographyMode::ExternalFile { path } => {
                Ok(Self::External(resolve_target(doc.path(), &path)?))
            }
            BibliographyMode::InlineEnvironment { .. } | BibliographyMode::None => Ok(Self::Inline),
        }
    }
}

/// A completed entry write, with any lines it added to the manuscript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryWrite {
    pub outcome: WriteOutcome,
    pub insertion: Option<Insertion>,
}

/// Write the bibliography entry for `candidate` under `key`.
pub fn write_entry(
    doc: &mut Document,
    target: &BibTarget,
    key: &str,
    candidate: &Candidate,
) -> Result<EntryWrite> {
    match target {
        BibTarget::External(path) => {
            let block = candidate
                .bibtex
                .as_deref()
                .and_then(|b| rekey_entry(b, key))
                .unwrap_or_else(|| synthesize_bibtex(candidate, key));
            let outcome = append_bib_entry(path, key, &block)?;
            Ok(EntryWrite {
                outcome,
                insertion: None,
            })
        }
        BibTarget::Inline => {
            let (outcome, insertion) = add_bibitem(doc, key, &format_bibitem(candidate))?;
            Ok(EntryWrite { outcome, insertion })
        }
    }
}

/// Resolve a detected bibliography reference to a writable path.
pub fn resolve_target(manuscript: Option<&Path>, reference: &Path) -> Result<PathBuf> {
    if reference.as_os_str().is_empty() {
        return Err(CitefillError::malformed_target("bibliography reference is empty"));
    }
    let resolved = match manuscript.and_then(Path::parent) {
        Some(dir) if reference.is_relative() => dir.join(reference),
        _ => reference.to_path_buf(),
    };
    check_writable(resolved)
}

fn check_writable(path: PathBuf) -> Result<PathBuf> {
    if path.is_dir() {
        return Err(CitefillError::malformed_target(format!(
            "{} is a directory",
            path.display()
        )));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(CitefillError::malformed_target(format!(
                "directory {} does not exist",
                parent.display()
            )))
        }
        _ => Ok(path),
    }
}

/// Append a BibTeX block to `path` unless an entry keyed `key` is already there.
///
/// Creates the file when absent. Appended blocks are separated by a blank line.
#[instrument(skip_all, fields(path = %path.display(), key))]
pub fn append_bib_entry(path: &Path, key: &str, block: &str) -> Result<WriteOutcome> {
    validate_key(key)?;
    let block = block.trim();

    if !path.exists() {
        std::fs::write(path, format!("{block}\n")).map_err(|e| CitefillError::io(path, e))?;
        info!("bibliography file created");
        return Ok(WriteOutcome::Created);
    }

    let existing = std::fs::read_to_string(path).map_err(|e| CitefillError::io(path, e))?;
    if key_pattern(r"@\w+\s*\{\s*", key, r"\s*,")?.is_match(&existing) {
        debug!("entry already present");
        return Ok(WriteOutcome::AlreadyPresent);
    }

    let separator = if existing.is_empty() || existing.ends_with('\n') { "\n" } else { "\n\n" };
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| CitefillError::io(path, e))?;
    file.write_all(format!("{separator}{block}\n").as_bytes())
        .map_err(|e| CitefillError::io(path, e))?;

    info!("entry appended");
    Ok(WriteOutcome::Appended)
}

/// Add `\bibitem{key} text` to the manuscript's inline bibliography.
///
/// Goes before `\end{thebibliography}` when the environment exists (or right
/// after its opening line if it is never closed). Otherwise a new environment
/// is synthesized before `\end{document}`, or at end-of-file.
#[instrument(skip_all, fields(key))]
pub fn add_bibitem(doc: &mut Document, key: &str, text: &str) -> Result<(WriteOutcome, Option<Insertion>)> {
    validate_key(key)?;

    if key_pattern(r"\\bibitem(?:\[[^\]]*\])?\{\s*", key, r"\s*\}")?.is_match(doc.text()) {
        debug!("bibitem already present");
        return Ok((WriteOutcome::AlreadyPresent, None));
    }

    let item = format!("\\bibitem{{{key}}} {}\n", text.trim());

    if let BibliographyMode::InlineEnvironment { line } = detect_bibliography(doc.text()) {
        let begin = doc.line_index().line_start(line).unwrap_or_default();
        let before = match find_marker(doc.text(), THEBIBLIOGRAPHY_END, begin) {
            Some(offset) => doc.line_index().locate(doc.text(), offset).0,
            None => line + 1,
        };
        let insertion = doc.insert_before_line(before, &item);
        debug!(line = insertion.line, "bibitem inserted");
        return Ok((WriteOutcome::Appended, Some(insertion)));
    }

    let insertion = match find_marker(doc.text(), END_DOCUMENT, 0) {
        Some(offset) => {
            let end_line = doc.line_index().locate(doc.text(), offset).0;
            let env = format!("\n\\begin{{thebibliography}}{{99}}\n{item}\\end{{thebibliography}}\n\n");
            doc.insert_before_line(end_line, &env)
        }
        None => {
            let env = format!("\n\\begin{{thebibliography}}{{99}}\n{item}\\end{{thebibliography}}\n");
            doc.insert_before_line(usize::MAX, &env)
        }
    };
    info!(line = insertion.line, "bibliography environment created");
    Ok((WriteOutcome::Created, Some(insertion)))
}

fn key_pattern(prefix: &str, key: &str, suffix: &str) -> Result<Regex> {
    Regex::new(&format!("{prefix}{}{suffix}", regex::escape(key)))
        .map_err(|e| CitefillError::parse(format!("invalid key pattern: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cf_bib_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn append_is_idempotent() {
        let path = scratch("refs.bib");
        let block = "@article{smith2020,\n  title = {A}\n}";

        assert_eq!(append_bib_entry(&path, "smith2020", block).unwrap(), WriteOutcome::Created);
        assert_eq!(
            append_bib_entry(&path, "smith2020", block).unwrap(),
            WriteOutcome::AlreadyPresent
        );

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("@article{smith2020,").count(), 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn append_separates_entries_with_blank_line() {
        let path = scratch("refs.bib");
        std::fs::write(&path, "@book{old, title={B}}").unwrap();
        let outcome = append_bib_entry(&path, "new", "@misc{new, title={C}}\n\n").unwrap();
        assert_eq!(outcome, WriteOutcome::Appended);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "@book{old, title={B}}\n\n@misc{new, title={C}}\n"
        );
        // `newer` must not be mistaken for `new`.
        assert_eq!(
            append_bib_entry(&path, "newer", "@misc{newer, title={D}}").unwrap(),
            WriteOutcome::Appended
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn inline_entry_goes_before_environment_end() {
        let mut doc = Document::from_text(
            "Text.\n\\begin{thebibliography}{9}\n\\bibitem{a} A.\n\\end{thebibliography}\n\\end{document}\n",
        );
        let (outcome, insertion) = add_bibitem(&mut doc, "b", "B.").unwrap();
        assert_eq!(outcome, WriteOutcome::Appended);
        assert_eq!(insertion, Some(Insertion { line: 4, count: 1 }));
        assert_eq!(
            doc.text(),
            "Text.\n\\begin{thebibliography}{9}\n\\bibitem{a} A.\n\\bibitem{b} B.\n\\end{thebibliography}\n\\end{document}\n"
        );

        let (again, insertion) = add_bibitem(&mut doc, "b", "B.").unwrap();
        assert_eq!(again, WriteOutcome::AlreadyPresent);
        assert!(insertion.is_none());
    }

    #[test]
    fn unclosed_environment_gets_entry_after_opening_line() {
        let mut doc = Document::from_text("\\begin{thebibliography}{9}\n\\bibitem{a} A.\n");
        add_bibitem(&mut doc, "b", "B.").unwrap();
        assert_eq!(
            doc.text(),
            "\\begin{thebibliography}{9}\n\\bibitem{b} B.\n\\bibitem{a} A.\n"
        );
    }

    #[test]
    fn environment_is_synthesized_before_end_document() {
        let mut doc = Document::from_text("Body \\cite{k}.\n\\end{document}\n");
        let (outcome, insertion) = add_bibitem(&mut doc, "k", "K, 2020.").unwrap();
        assert_eq!(outcome, WriteOutcome::Created);
        assert_eq!(insertion, Some(Insertion { line: 2, count: 5 }));
        assert_eq!(
            doc.text(),
            "Body \\cite{k}.\n\n\\begin{thebibliography}{99}\n\\bibitem{k} K, 2020.\n\\end{thebibliography}\n\n\\end{document}\n"
        );
    }

    #[test]
    fn environment_is_appended_without_end_document() {
        let mut doc = Document::from_text("Body \\cite{k}.");
        add_bibitem(&mut doc, "k", "K.").unwrap();
        assert_eq!(
            doc.text(),
            "Body \\cite{k}.\n\n\\begin{thebibliography}{99}\n\\bibitem{k} K.\n\\end{thebibliography}\n"
        );
    }

    #[test]
    fn labelled_bibitems_count_as_duplicates() {
        let mut doc = Document::from_text("\\begin{thebibliography}{9}\n\\bibitem[Smith(2020)]{k} S.\n\\end{thebibliography}\n");
        let (outcome, _) = add_bibitem(&mut doc, "k", "S.").unwrap();
        assert_eq!(outcome, WriteOutcome::AlreadyPresent);
    }

    #[test]
    fn target_resolution() {
        let tex = scratch("paper.tex");
        std::fs::write(&tex, "\\bibliography{refs}\n").unwrap();
        let doc = Document::open(&tex).unwrap();
        let dir = tex.parent().unwrap().to_path_buf();
        assert_eq!(
            BibTarget::resolve(&doc, None).unwrap(),
            BibTarget::External(dir.join("refs.bib"))
        );

        let inline = Document::from_text("no bibliography");
        assert_eq!(BibTarget::resolve(&inline, None).unwrap(), BibTarget::Inline);

        let err = resolve_target(Some(tex.as_path()), Path::new("")).unwrap_err();
        assert!(matches!(err, CitefillError::MalformedBibliographyTarget { .. }));
        let err = resolve_target(Some(tex.as_path()), Path::new("missing/refs.bib")).unwrap_err();
        assert!(matches!(err, CitefillError::MalformedBibliographyTarget { .. }));
        let err = resolve_target(None, &dir).unwrap_err();
        assert!(matches!(err, CitefillError::MalformedBibliographyTarget { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_entry_rekeys_supplied_bibtex() {
        let bib = scratch("refs.bib");
        let mut doc = Document::from_text("");
        let mut candidate = Candidate::new("2020X", "Title");
        candidate.bibtex = Some("@article{2020X,\n  title = {Title}\n}".into());

        let write = write_entry(&mut doc, &BibTarget::External(bib.clone()), "title2020", &candidate).unwrap();
        assert_eq!(write.outcome, WriteOutcome::Created);
        assert!(std::fs::read_to_string(&bib).unwrap().starts_with("@article{title2020,"));

        let _ = std::fs::remove_dir_all(bib.parent().unwrap());
    }
}
