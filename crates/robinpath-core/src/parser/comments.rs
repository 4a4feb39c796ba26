//! Comment association: attaching comment tokens to the statements they
//! document or trail.

use super::lines::LogicalLine;
use crate::ast::{CommentStatement, CommentWithPosition};
use crate::pos::CodePos;
use crate::token::Token;

pub enum LineItem<'a> {
    Orphan(CommentStatement, usize),
    Content {
        attached: Option<CommentWithPosition>,
        inline: Option<CommentWithPosition>,
        line: &'a LogicalLine,
        line_index: usize,
    },
}

fn comment_pos(tok: &Token) -> CodePos {
    let row = tok.line - 1;
    let end_col = tok.column + tok.text.chars().count() as u32;
    CodePos::new(row, tok.column, row, end_col)
}

fn combine(group: &[&Token]) -> (String, CodePos) {
    let text = group
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let pos = group
        .iter()
        .map(|t| comment_pos(t))
        .reduce(|a, b| a.merge(b))
        .unwrap();
    (text, pos)
}

/// Walk `lines` and produce the ordered item list: orphan comment groups
/// materialized as their own nodes, and content lines paired with any
/// comments attached to them.
pub fn associate_comments(lines: &[LogicalLine]) -> Vec<LineItem<'_>> {
    let mut items = Vec::new();
    let mut pending: Vec<&Token> = Vec::new();
    let mut pending_blank_after = false;

    let flush_orphan = |pending: &mut Vec<&Token>, extra_blank_rows: u32, at_line: usize, items: &mut Vec<LineItem>| {
        if pending.is_empty() {
            return;
        }
        let (text, mut pos) = combine(pending);
        if extra_blank_rows > 0 {
            pos = pos.with_end_row(pos.end_row() + extra_blank_rows);
        }
        let comment = CommentWithPosition { text: text.clone(), code_pos: pos, inline: false };
        items.push(LineItem::Orphan(
            CommentStatement { comments: vec![comment], line_number: pos.start_row() + 1, code_pos: pos },
            at_line,
        ));
        pending.clear();
    };

    let mut i = 0;
    let mut pending_start_line = 0usize;
    while i < lines.len() {
        let line = &lines[i];
        if line.is_blank() {
            pending_blank_after = true;
            i += 1;
            continue;
        }
        if line.is_comment_only() {
            if !pending.is_empty() && pending_blank_after {
                flush_orphan(&mut pending, 0, pending_start_line, &mut items);
            }
            if pending.is_empty() {
                pending_start_line = i;
            }
            for t in &line.tokens {
                pending.push(t);
            }
            pending_blank_after = false;
            i += 1;
            continue;
        }
        // Content line.
        if !pending.is_empty() && pending_blank_after {
            // Count the run of blank lines between the last pending
            // comment and this content line so the orphan absorbs them.
            let blanks = count_preceding_blanks(lines, i);
            flush_orphan(&mut pending, blanks, pending_start_line, &mut items);
        }
        let attached = if !pending.is_empty() {
            let (text, pos) = combine(&pending);
            pending.clear();
            Some(CommentWithPosition { text, code_pos: pos, inline: false })
        } else {
            None
        };
        let inline = line.inline_comment().map(|t| CommentWithPosition {
            text: t.text.clone(),
            code_pos: comment_pos(t),
            inline: true,
        });
        items.push(LineItem::Content { attached, inline, line, line_index: i });
        pending_blank_after = false;
        i += 1;
    }
    // Trailing orphan group with nothing after it.
    if !pending.is_empty() {
        flush_orphan(&mut pending, 0, pending_start_line, &mut items);
    }
    items
}

fn count_preceding_blanks(lines: &[LogicalLine], content_idx: usize) -> u32 {
    let mut n = 0u32;
    let mut j = content_idx;
    while j > 0 && lines[j - 1].is_blank() {
        n += 1;
        j -= 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::lines::split_lines;

    #[test]
    fn attached_above_has_no_blank_before_statement() {
        let toks = Lexer::tokenize("# hello\n$a = 1\n").unwrap();
        let lines = split_lines(&toks);
        let items = associate_comments(&lines);
        assert_eq!(items.len(), 1);
        match &items[0] {
            LineItem::Content { attached, .. } => {
                assert_eq!(attached.as_ref().unwrap().text, "# hello");
            }
            _ => panic!("expected content"),
        }
    }

    #[test]
    fn orphan_group_when_blank_separates() {
        let toks = Lexer::tokenize("# hello\n\n$a = 1\n").unwrap();
        let lines = split_lines(&toks);
        let items = associate_comments(&lines);
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], LineItem::Orphan(..)));
        match &items[1] {
            LineItem::Content { attached, .. } => assert!(attached.is_none()),
            _ => panic!("expected content"),
        }
    }

    #[test]
    fn inline_comment_detected() {
        let toks = Lexer::tokenize("$a = 1  # inline\n").unwrap();
        let lines = split_lines(&toks);
        let items = associate_comments(&lines);
        match &items[0] {
            LineItem::Content { inline, .. } => {
                assert_eq!(inline.as_ref().unwrap().text, "# inline");
            }
            _ => panic!("expected content"),
        }
    }

    #[test]
    fn multiple_groups_only_last_attaches() {
        let src = "# first\n\n# second\n$a = 1\n";
        let toks = Lexer::tokenize(src).unwrap();
        let lines = split_lines(&toks);
        let items = associate_comments(&lines);
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], LineItem::Orphan(..)));
        match &items[1] {
            LineItem::Content { attached, .. } => {
                assert_eq!(attached.as_ref().unwrap().text, "# second");
            }
            _ => panic!("expected content"),
        }
    }
}
