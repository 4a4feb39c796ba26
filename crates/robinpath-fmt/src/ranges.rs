//! Range coalescing and the minimal-edit-set assembly: deciding, for each
//! top-level statement, whether it is untouched (skip) or needs to be
//! replaced (compute its effective byte range and canonical text), then
//! applying every edit back-to-front so earlier offsets stay valid.

use robinpath_core::ast::Statement;
use robinpath_core::pos::{CodePos, LineIndex, Point};

use crate::error::FmtError;
use crate::printer::print_statement;

/// A single planned replacement: `text[start..end]` becomes `replacement`.
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

/// The effective source range a statement occupies, including any
/// attached-above comment group, per §4.3.1. Orphan `CommentStatement`s
/// are themselves ordinary top-level statements and use their own
/// `code_pos` unmodified — they carry no separate attachment.
///
/// A statement whose `comments` were explicitly cleared to `Some(&[])` (as
/// opposed to never having had any, `None`) carries no position for the
/// comment group an edit just deleted, so it's recovered by scanning the
/// original text instead, per §4.3.3.
fn effective_range(original: &str, stmt: &Statement) -> CodePos {
    let own = stmt.code_pos();
    match stmt.comments() {
        Some([]) => extend_for_emptied_comments(original, own, decorator_anchor_row(stmt)),
        Some(comments) => comments
            .iter()
            .map(|c| c.code_pos)
            .fold(own, CodePos::merge),
        None => own,
    }
}

/// The row a statement's own decorators (if any) start on — comment
/// removal scans upward from here, since decorators are reprinted from
/// their own field and are never themselves swept up as "comment text".
fn decorator_anchor_row(stmt: &Statement) -> u32 {
    let decorators = match stmt {
        Statement::Command(c) => c.decorators.as_ref(),
        Statement::DefineFunction(f) => f.decorators.as_ref(),
        _ => None,
    };
    decorators
        .and_then(|ds| ds.first())
        .map(|d| d.code_pos.start.row)
        .unwrap_or(stmt.code_pos().start.row)
}

/// Scan upward from `anchor_row`, collecting a contiguous run of blank and
/// `#`-comment lines (at most 10). The run is only absorbed into `pos` if
/// it contains at least one actual comment line — pure blank runs are
/// ordinary file spacing and are left alone, not deleted.
fn extend_for_emptied_comments(original: &str, pos: CodePos, anchor_row: u32) -> CodePos {
    if anchor_row == 0 {
        return pos;
    }
    let lines: Vec<&str> = original.split('\n').collect();
    let mut top = anchor_row;
    let mut saw_comment = false;
    let mut row = anchor_row;
    let mut scanned = 0u32;
    while row > 0 && scanned < 10 {
        let candidate = row - 1;
        let trimmed = lines.get(candidate as usize).copied().unwrap_or("").trim();
        if trimmed.starts_with('#') {
            saw_comment = true;
            top = candidate;
            row = candidate;
            scanned += 1;
        } else if trimmed.is_empty() {
            row = candidate;
            scanned += 1;
            if saw_comment {
                top = candidate;
            }
        } else {
            break;
        }
    }
    if saw_comment {
        CodePos { start: Point::new(top, 0), end: pos.end }
    } else {
        pos
    }
}

/// Extend `pos` to cover a trailing inline comment, if the statement has
/// one — the printer always re-emits it as part of the same line.
fn extend_for_inline_comment(pos: CodePos, stmt: &Statement) -> CodePos {
    match stmt.comments() {
        Some(comments) => comments
            .iter()
            .filter(|c| c.inline)
            .map(|c| c.code_pos)
            .fold(pos, CodePos::merge),
        None => pos,
    }
}

/// Build the minimal edit set for `statements` against `original`. A
/// statement contributes an edit only when its canonically-printed text
/// differs from the bytes already sitting in its effective range.
pub fn plan_edits(original: &str, statements: &[Statement]) -> Result<Vec<Edit>, FmtError> {
    let line_index = LineIndex::new(original);
    let mut edits = Vec::new();
    for stmt in statements {
        let mut pos = effective_range(original, stmt);
        pos = extend_for_inline_comment(pos, stmt);
        let (start, mut end) = line_index.offset_range(pos);
        if start > original.len() || end > original.len() || start > end {
            return Err(FmtError::PositionOutOfRange(pos.to_string()));
        }
        // Extend through the line's own newline so the canonical text
        // (which ends without one) can supply it explicitly, matching
        // §4.3.1's "trailing newline preserved by appending \n".
        let mut needs_trailing_newline = false;
        if end < original.len() {
            if let Some(nl) = original[end..].find('\n') {
                if original[end..end + nl].trim().is_empty() {
                    end += nl + 1;
                    needs_trailing_newline = true;
                }
            }
        }
        let canonical = print_statement(stmt, indent_depth(pos))?;
        let canonical = if needs_trailing_newline && !canonical.ends_with('\n') {
            format!("{canonical}\n")
        } else {
            canonical
        };
        if original[start..end] == canonical {
            continue;
        }
        edits.push(Edit { start, end, replacement: canonical });
    }
    Ok(edits)
}

/// Indentation depth implied by a statement's own starting column: every
/// nesting level is exactly 2 columns per [`crate::printer`]'s convention.
fn indent_depth(pos: CodePos) -> usize {
    (pos.start.col / 2) as usize
}

/// Apply `edits` to `original`, sorted by start offset descending so
/// earlier-in-file offsets are never invalidated by a later replacement.
pub fn apply_edits(original: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| b.start.cmp(&a.start));
    let mut text = original.to_string();
    for edit in edits {
        text.replace_range(edit.start..edit.end, &edit.replacement);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use robinpath_core::parser::parse;

    #[test]
    fn untouched_program_yields_no_edits() {
        let src = "log \"hi\"\n$x = 1\n";
        let ast = parse(src).unwrap();
        let edits = plan_edits(src, &ast.statements).unwrap();
        assert!(edits.is_empty(), "expected no edits for an unmodified AST");
    }

    #[test]
    fn edited_literal_reflows_to_canonical_text() {
        let src = "$x=1\n";
        let mut ast = parse(src).unwrap();
        if let Statement::Assignment(a) = &mut ast.statements[0] {
            if let robinpath_core::ast::AssignmentRhs::Literal { value, .. } = &mut a.rhs {
                *value = robinpath_core::ast::LiteralArg::Number(2.0);
            }
        }
        let edits = plan_edits(src, &ast.statements).unwrap();
        assert_eq!(edits.len(), 1);
        let out = apply_edits(src, edits);
        assert_eq!(out, "$x = 2\n");
    }
}
