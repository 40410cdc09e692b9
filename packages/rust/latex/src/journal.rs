//! Translation of scan-time positions through later edits.
//!
//! Sites keep the `(line, column)` they were scanned at. The journal records
//! each edit applied during a run so the orchestrator can find where a site
//! sits in the current buffer before filling it.

use crate::document::Insertion;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Edit {
    /// A span starting at `(line, column)` was replaced.
    Splice {
        line: usize,
        column: usize,
        old: SpanShape,
        new: SpanShape,
    },
    /// `count` lines were inserted starting at `line`.
    Lines { line: usize, count: usize },
}

/// Line breaks in a span and the char length of its last line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpanShape {
    breaks: usize,
    tail: usize,
}

impl SpanShape {
    fn of(text: &str) -> Self {
        let breaks = text.matches('\n').count();
        let tail = text.rsplit('\n').next().map_or(0, |t| t.chars().count());
        Self { breaks, tail }
    }
}

/// Ordered record of edits applied to one document during a run.
#[derive(Debug, Clone, Default)]
pub struct PositionJournal {
    edits: Vec<Edit>,
}

impl PositionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `old` at `(line, column)` was replaced with `new`.
    pub fn record_splice(&mut self, line: usize, column: usize, old: &str, new: &str) {
        self.edits.push(Edit::Splice {
            line,
            column,
            old: SpanShape::of(old),
            new: SpanShape::of(new),
        });
    }

    /// Record lines added by a bibliography write.
    pub fn record_insertion(&mut self, insertion: Insertion) {
        if insertion.count > 0 {
            self.edits.push(Edit::Lines {
                line: insertion.line,
                count: insertion.count,
            });
        }
    }

    /// Map a scan-time position to the current buffer.
    ///
    /// Positions at or before an edit's start are unchanged by it.
    pub fn translate(&self, line: usize, column: usize) -> (usize, usize) {
        self.edits
            .iter()
            .fold((line, column), |(l, c), edit| match *edit {
                Edit::Lines { line: at, count } => {
                    if l >= at {
                        (l + count, c)
                    } else {
                        (l, c)
                    }
                }
                Edit::Splice {
                    line: at_line,
                    column: at_col,
                    old,
                    new,
                } => {
                    let old_end_line = at_line + old.breaks;
                    if l < at_line || (l == at_line && c <= at_col) {
                        (l, c)
                    } else if l > old_end_line {
                        (l - old.breaks + new.breaks, c)
                    } else {
                        // On the last line of the replaced span, after it.
                        let old_end_col = if old.breaks == 0 { at_col + old.tail } else { old.tail + 1 };
                        let new_end_col = if new.breaks == 0 { at_col + new.tail } else { new.tail + 1 };
                        let after = c.saturating_sub(old_end_col);
                        (at_line + new.breaks, new_end_col + after)
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_journal_is_identity() {
        let journal = PositionJournal::new();
        assert_eq!(journal.translate(4, 9), (4, 9));
    }

    #[test]
    fn same_line_splice_shifts_later_columns() {
        let mut journal = PositionJournal::new();
        // `\cite{}` at column 3 became `\cite{smith2020}`
        journal.record_splice(1, 3, "\\cite{}", "\\cite{smith2020}");
        assert_eq!(journal.translate(1, 20), (1, 29));
        assert_eq!(journal.translate(1, 3), (1, 3));
        assert_eq!(journal.translate(1, 1), (1, 1));
        assert_eq!(journal.translate(2, 5), (2, 5));
    }

    #[test]
    fn inserted_lines_shift_following_lines() {
        let mut journal = PositionJournal::new();
        journal.record_insertion(Insertion { line: 10, count: 3 });
        assert_eq!(journal.translate(9, 1), (9, 1));
        assert_eq!(journal.translate(10, 4), (13, 4));
        journal.record_insertion(Insertion { line: 1, count: 0 });
        assert_eq!(journal.translate(2, 2), (2, 2));
    }

    #[test]
    fn multi_line_span_collapsing_to_one_line() {
        let mut journal = PositionJournal::new();
        // `\cite{a,\n  }` (line 2, col 5) became `\cite{a, b}`
        journal.record_splice(2, 5, "\\cite{a,\n  }", "\\cite{a, b}");
        // Old line 3, column 7: three chars past the end of `  }`
        assert_eq!(journal.translate(3, 7), (2, 5 + 11 + 3));
        assert_eq!(journal.translate(7, 1), (6, 1));
    }

    #[test]
    fn edits_compose_in_order() {
        let mut journal = PositionJournal::new();
        journal.record_splice(1, 1, "\\cite{}", "\\cite{ab}");
        journal.record_splice(1, 12, "\\cite{}", "\\cite{cd}");
        // Originally at column 20: +2 after the first edit, then +2 after the second.
        assert_eq!(journal.translate(1, 20), (1, 24));
    }
}
