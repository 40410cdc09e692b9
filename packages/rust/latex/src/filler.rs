//! Citation filler: inserts resolved keys into a located citation command.

use tracing::{debug, instrument};

use citefill_shared::{CitefillError, Result, ScanConfig};

use crate::document::Document;
use crate::patterns::{CitationPatterns, existing_keys};
use crate::scanner::CitationSite;

/// Default distance (in chars) between a recorded column and the command start.
pub const DEFAULT_POSITION_TOLERANCE: usize = 5;

/// A completed fill, in the coordinates of the buffer before the edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillEdit {
    pub line: usize,
    /// Column where the matched command starts.
    pub column: usize,
    pub old_span: String,
    pub new_span: String,
    /// The merged key list written to the command.
    pub keys: Vec<String>,
}

/// Re-locates a citation command near a position and appends keys to it.
#[derive(Debug, Clone)]
pub struct CitationFiller {
    patterns: CitationPatterns,
    tolerance: usize,
}

impl CitationFiller {
    pub fn new(commands: &[String], tolerance: usize) -> Result<Self> {
        Ok(Self {
            patterns: CitationPatterns::new(commands)?,
            tolerance,
        })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        Self::new(&config.commands, config.position_tolerance)
    }

    /// Append `key` to the command at `site` (scan-time position).
    pub fn fill(&self, doc: &mut Document, site: &CitationSite, key: &str) -> Result<FillEdit> {
        self.fill_at(doc, site.line, site.column, &[key])
    }

    /// Fill, then write the whole buffer back to disk.
    ///
    /// Prefer [`CitationFiller::fill`] plus one [`Document::persist`] when filling many sites.
    pub fn fill_and_persist(
        &self,
        doc: &mut Document,
        site: &CitationSite,
        key: &str,
    ) -> Result<FillEdit> {
        let edit = self.fill(doc, site, key)?;
        doc.persist()?;
        Ok(edit)
    }

    /// Append `keys` to the citation command nearest `(line, column)`.
    ///
    /// Existing keys keep their order; repeated keys are kept. Only the matched
    /// span changes. Fails with `SiteNotFound` when no command starts within
    /// the tolerance on that line.
    #[instrument(skip(self, doc, keys), fields(key_count = keys.len()))]
    pub fn fill_at(
        &self,
        doc: &mut Document,
        line: usize,
        column: usize,
        keys: &[&str],
    ) -> Result<FillEdit> {
        if keys.is_empty() {
            return Err(CitefillError::validation("no citation key to fill"));
        }
        for key in keys {
            validate_key(key)?;
        }

        let not_found = || CitefillError::SiteNotFound { line, column };
        let text = doc.text();
        let index = doc.line_index();
        let line_range = index.line_range(text, line).ok_or_else(not_found)?;

        // Commands may carry their key argument onto later lines, so match from
        // the line start but only accept starts on this line.
        let located = self
            .patterns
            .any()
            .captures_iter(&text[line_range.start..])
            .map(|caps| {
                let start = line_range.start + caps.get(0).map_or(0, |m| m.start());
                (start, caps)
            })
            .take_while(|(start, _)| *start <= line_range.end)
            .map(|(start, caps)| {
                let col = text[line_range.start..start].chars().count() + 1;
                (col.abs_diff(column), col, start, caps)
            })
            .filter(|(distance, ..)| *distance <= self.tolerance)
            .min_by_key(|(distance, ..)| *distance);

        let Some((_, found_column, start, caps)) = located else {
            return Err(not_found());
        };

        let old_span = caps.get(0).map_or("", |m| m.as_str()).to_string();
        let mut merged = existing_keys(&caps["keys"]);
        merged.extend(keys.iter().map(|k| k.to_string()));

        let new_span = format!(
            "\\{}{}{}{{{}}}",
            &caps["cmd"],
            &caps["star"],
            &caps["opts"],
            merged.join(", ")
        );
        let end = start + old_span.len();

        debug!(line, found_column, old = %old_span, new = %new_span, "filling citation");
        doc.splice(start..end, &new_span);

        Ok(FillEdit {
            line,
            column: found_column,
            old_span,
            new_span,
            keys: merged,
        })
    }
}

/// Reject keys that would break the command or the bibliography.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CitefillError::validation("citation key must not be empty"));
    }
    if let Some(bad) = key
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '{' | '}' | ',' | '%' | '\\'))
    {
        return Err(CitefillError::validation(format!(
            "citation key '{key}' contains forbidden character {bad:?}"
        )));
    }
    Ok(())
}
