//! Statement dispatch: turns a slice of [`LogicalLine`]s into a tree of
//! [`Statement`] nodes. A single recursive-descent pass handles every block
//! kind (`def`/`if`/`for`/`do`/`together`/`on`) uniformly; flattening
//! top-level `def`s and `on`s out of the tree happens afterwards in
//! [`super::lift`].

use super::args::{parse_args, parse_one, parse_var_text};
use super::comments::{associate_comments, LineItem};
use super::lines::LogicalLine;
use crate::ast::{
    Arg, Assignment, AssignmentRhs, BreakStatement, Command, CommentWithPosition,
    ContinueStatement, Decorator, DefineFunction, ElseifBranch, ForLoop, IfBlock, IfTrueFalse,
    InlineIf, LiteralArg, OnBlock, ReturnStatement, ScopeBlock, ShorthandAssignment,
    Statement, SyntaxType, Target, TogetherBlock,
};
use crate::error::{ParseError, ParseErrorKind};
use crate::pos::{CodePos, Point};
use crate::token::{Token, TokenKind};
use crate::value::LiteralValueType;

fn tok_start(tok: &Token) -> Point {
    Point::new(tok.line - 1, tok.column)
}

fn tok_end(tok: &Token) -> Point {
    Point::new(tok.line - 1, tok.column + tok.text.chars().count() as u32)
}

fn span(tokens: &[Token]) -> CodePos {
    let start = tok_start(&tokens[0]);
    let end = tok_end(&tokens[tokens.len() - 1]);
    CodePos { start, end }
}

fn line_text_at(source: &str, line: u32) -> String {
    source.lines().nth((line.saturating_sub(1)) as usize).unwrap_or_default().to_string()
}

fn err_at(tok: &Token, kind: ParseErrorKind, source: &str) -> ParseError {
    ParseError { line: tok.line, col: tok.column, kind, line_text: line_text_at(source, tok.line) }
}

/// Parse the statements making up a body (top-level program, or the inside
/// of any block construct).
pub fn parse_body(lines: &[LogicalLine], source: &str) -> Result<Vec<Statement>, ParseError> {
    let items = associate_comments(lines);
    let mut out = Vec::new();
    let mut consumed_until = 0usize;
    let mut idx = 0usize;
    while idx < items.len() {
        match &items[idx] {
            LineItem::Orphan(cs, line_idx) => {
                if *line_idx < consumed_until {
                    idx += 1;
                    continue;
                }
                out.push(Statement::CommentStatement(cs.clone()));
                idx += 1;
            }
            LineItem::Content { line_index, .. } if *line_index < consumed_until => {
                idx += 1;
            }
            LineItem::Content { .. } => {
                let is_decorator = matches!(&items[idx], LineItem::Content { line, .. } if is_decorator_line(line));
                if is_decorator {
                    let (stmt, next_idx, next_line) = parse_decorator_run(&items, idx, lines, source)?;
                    out.push(stmt);
                    idx = next_idx;
                    consumed_until = next_line;
                } else if let LineItem::Content { attached, inline, line, line_index } = &items[idx] {
                    let (stmt, next_line) =
                        dispatch_line(line, *line_index, lines, attached.clone(), inline.clone(), source)?;
                    out.push(stmt);
                    consumed_until = next_line;
                    idx += 1;
                } else {
                    unreachable!()
                }
            }
        }
    }
    Ok(out)
}

fn is_decorator_line(line: &LogicalLine) -> bool {
    line.content_tokens()
        .first()
        .map(|t| t.kind == TokenKind::Identifier && t.text.starts_with('@'))
        .unwrap_or(false)
}

/// Collect a run of `@decorator` lines and attach them to the following
/// `def`/`var`/`const` statement. Decorator runs bind to a definition or
/// declaration, never to an arbitrary command.
fn parse_decorator_run<'a>(
    items: &[LineItem<'a>],
    start: usize,
    lines: &[LogicalLine],
    source: &str,
) -> Result<(Statement, usize, usize), ParseError> {
    let mut decorators = Vec::new();
    let mut comment_pool: Vec<CommentWithPosition> = Vec::new();
    let mut idx = start;
    let mut first_tok: Option<Token> = None;
    loop {
        match items.get(idx) {
            Some(LineItem::Content { line, attached, .. }) if is_decorator_line(line) => {
                let tokens = line.content_tokens();
                let name_tok = &tokens[0];
                if first_tok.is_none() {
                    first_tok = Some(name_tok.clone());
                }
                if let Some(a) = attached {
                    comment_pool.push(a.clone());
                }
                let args = parse_args(&tokens[1..], source)?;
                decorators.push(Decorator {
                    name: name_tok.text.trim_start_matches('@').to_string(),
                    args,
                    code_pos: span(tokens),
                });
                idx += 1;
            }
            Some(LineItem::Orphan(cs, _)) => {
                // Blank-separated comment inside a decorator run still
                // materializes as its own node; it does not break the run.
                let _ = cs;
                idx += 1;
            }
            _ => break,
        }
    }
    let anchor = first_tok.expect("decorator run must start with at least one decorator");
    match items.get(idx) {
        Some(LineItem::Content { line, attached, inline, line_index }) => {
            let tokens = line.content_tokens();
            let first = &tokens[0];
            if first.is_keyword_text("def") {
                if let Some(a) = attached {
                    comment_pool.push(a.clone());
                }
                let (mut def, next_line) = parse_define_function(line, *line_index, lines, source)?;
                def.decorators = Some(decorators);
                if !comment_pool.is_empty() {
                    def.comments = Some(comment_pool);
                }
                Ok((Statement::DefineFunction(def), idx + 1, next_line))
            } else if first.is_keyword_text("var") || first.is_keyword_text("const") {
                if let Some(a) = attached {
                    comment_pool.push(a.clone());
                }
                let (mut stmt, next_line) = dispatch_line(
                    line,
                    *line_index,
                    lines,
                    None,
                    inline.clone(),
                    source,
                )?;
                if let Statement::Command(ref mut c) = stmt {
                    c.decorators = Some(decorators);
                    if !comment_pool.is_empty() {
                        c.comments = Some(comment_pool);
                    }
                }
                Ok((stmt, idx + 1, next_line))
            } else {
                Err(err_at(&anchor, ParseErrorKind::OrphanedDecorator, source))
            }
        }
        _ => Err(err_at(&anchor, ParseErrorKind::OrphanedDecorator, source)),
    }
}

/// Find the line index (into `lines`) of the keyword that closes the block
/// opened at `header_idx`, skipping nested blocks opened with the same
/// keyword pair.
fn find_block_end(
    lines: &[LogicalLine],
    header_idx: usize,
    open_kw: &str,
    end_kw: &str,
    source: &str,
) -> Result<usize, ParseError> {
    let mut depth = 1i32;
    let mut idx = header_idx + 1;
    while idx < lines.len() {
        if let Some(first) = lines[idx].content_tokens().first() {
            if first.is_keyword_text(open_kw) {
                depth += 1;
            } else if first.is_keyword_text(end_kw) {
                depth -= 1;
                if depth == 0 {
                    return Ok(idx);
                }
            }
        }
        idx += 1;
    }
    let anchor = lines[header_idx].content_tokens()[0].clone();
    Err(err_at(&anchor, ParseErrorKind::UnterminatedBlock(end_kw.to_string()), source))
}

/// Dispatch a single content line. Returns the statement and the index of
/// the next unconsumed line (which may be several lines past `line_index`
/// when the line opens a block).
fn dispatch_line(
    line: &LogicalLine,
    line_index: usize,
    lines: &[LogicalLine],
    attached: Option<CommentWithPosition>,
    inline: Option<CommentWithPosition>,
    source: &str,
) -> Result<(Statement, usize), ParseError> {
    let tokens = line.content_tokens();
    let first = &tokens[0];

    if first.kind == TokenKind::Keyword {
        match first.text.as_str() {
            "together" => {
                let end = find_block_end(lines, line_index, "together", "endtogether", source)?;
                let body = parse_body(&lines[line_index + 1..end], source)?;
                let mut blocks = Vec::new();
                for stmt in body {
                    match stmt {
                        Statement::ScopeBlock(b) => blocks.push(b),
                        Statement::CommentStatement(_) => {}
                        other => {
                            return Err(ParseError {
                                line: first.line,
                                col: first.column,
                                kind: ParseErrorKind::UnexpectedToken(format!("{other:?}")),
                                line_text: line_text_at(source, first.line),
                            })
                        }
                    }
                }
                let code_pos = CodePos { start: tok_start(first), end: tok_end(&lines[end].content_tokens()[0]) };
                let stmt = Statement::TogetherBlock(TogetherBlock { blocks, code_pos });
                return Ok((stmt, end + 1));
            }
            "do" => {
                let end = find_block_end(lines, line_index, "do", "enddo", source)?;
                let (param_names, into) = parse_do_header(&tokens[1..], source)?;
                let body = parse_body(&lines[line_index + 1..end], source)?;
                let code_pos = CodePos { start: tok_start(first), end: tok_end(&lines[end].content_tokens()[0]) };
                let stmt = Statement::ScopeBlock(ScopeBlock { param_names, body, into, code_pos });
                return Ok((stmt, end + 1));
            }
            "for" => {
                let end = find_block_end(lines, line_index, "for", "endfor", source)?;
                let (var_name, iterable_expr) = parse_for_header(&tokens[1..], source, first)?;
                let body = parse_body(&lines[line_index + 1..end], source)?;
                let code_pos = CodePos { start: tok_start(first), end: tok_end(&lines[end].content_tokens()[0]) };
                let stmt = Statement::ForLoop(ForLoop { var_name, iterable_expr, body, code_pos });
                return Ok((stmt, end + 1));
            }
            "def" => {
                let (def, next) = parse_define_function(line, line_index, lines, source)?;
                return Ok((Statement::DefineFunction(def), next));
            }
            "on" => {
                let end = find_block_end(lines, line_index, "on", "endon", source)?;
                let event_name = tokens
                    .get(1)
                    .map(|t| match &t.value {
                        crate::token::TokenValue::Str(s) => s.clone(),
                        _ => t.text.clone(),
                    })
                    .ok_or_else(|| err_at(first, ParseErrorKind::ExpectedKeyword("event name".into()), source))?;
                let body = parse_body(&lines[line_index + 1..end], source)?;
                let code_pos = CodePos { start: tok_start(first), end: tok_end(&lines[end].content_tokens()[0]) };
                let stmt = Statement::OnBlock(OnBlock { event_name, body, code_pos });
                return Ok((stmt, end + 1));
            }
            "return" => {
                let value = if tokens.len() > 1 {
                    Some(parse_one(&tokens[1..], 0, source)?.0)
                } else {
                    None
                };
                let code_pos = span(tokens);
                return Ok((Statement::ReturnStatement(ReturnStatement { value, code_pos }), line_index + 1));
            }
            "break" => {
                return Ok((Statement::BreakStatement(BreakStatement { code_pos: span(tokens) }), line_index + 1));
            }
            "continue" => {
                return Ok((Statement::ContinueStatement(ContinueStatement { code_pos: span(tokens) }), line_index + 1));
            }
            "iftrue" | "iffalse" => {
                let command = dispatch_simple(&tokens[1..], source)?;
                let code_pos = span(tokens);
                let node = IfTrueFalse { command: Box::new(command), code_pos };
                let stmt = if first.text == "iftrue" { Statement::IfTrue(node) } else { Statement::IfFalse(node) };
                return Ok((stmt, line_index + 1));
            }
            "if" => {
                return parse_if(tokens, line_index, lines, attached, source);
            }
            _ => {}
        }
    }

    let mut stmt = dispatch_simple(tokens, source)?;
    attach_comments(&mut stmt, attached, inline);
    Ok((stmt, line_index + 1))
}

fn attach_comments(stmt: &mut Statement, attached: Option<CommentWithPosition>, inline: Option<CommentWithPosition>) {
    let mut group = Vec::new();
    if let Some(a) = attached {
        group.push(a);
    }
    if let Some(i) = inline {
        group.push(i);
    }
    if group.is_empty() {
        return;
    }
    match stmt {
        Statement::Command(c) => c.comments = Some(group),
        Statement::Assignment(a) => a.comments = Some(group),
        _ => {}
    }
}

/// Parse a single statement with no lookahead into surrounding lines: used
/// for `if ... then <cmd>`, `iftrue`/`iffalse`, and nothing else can embed a
/// block-opening construct here.
fn dispatch_simple(tokens: &[Token], source: &str) -> Result<Statement, ParseError> {
    if tokens.is_empty() {
        return Err(ParseError {
            line: 0,
            col: 0,
            kind: ParseErrorKind::UnexpectedToken("<end of line>".into()),
            line_text: String::new(),
        });
    }
    let first = &tokens[0];
    if first.kind == TokenKind::Keyword {
        match first.text.as_str() {
            "return" => {
                let value = if tokens.len() > 1 { Some(parse_one(&tokens[1..], 0, source)?.0) } else { None };
                return Ok(Statement::ReturnStatement(ReturnStatement { value, code_pos: span(tokens) }));
            }
            "break" => return Ok(Statement::BreakStatement(BreakStatement { code_pos: span(tokens) })),
            "continue" => return Ok(Statement::ContinueStatement(ContinueStatement { code_pos: span(tokens) })),
            _ => {}
        }
    }
    if first.kind == TokenKind::Variable {
        if tokens.len() == 1 {
            let (name, path) = parse_var_text(&first.text);
            if path.is_some() {
                return Err(err_at(first, ParseErrorKind::InvalidAssignmentTarget, source));
            }
            return Ok(Statement::ShorthandAssignment(ShorthandAssignment { target_name: name, code_pos: span(tokens) }));
        }
        if tokens.get(1).map(|t| t.kind) == Some(TokenKind::Assign) {
            return parse_assignment(first, &tokens[2..], None, None, span(tokens), source);
        }
        return Err(err_at(first, ParseErrorKind::UnexpectedToken(first.text.clone()), source));
    }
    let (cmd, _extra) = parse_command_tokens(tokens, source, true, None)?;
    Ok(Statement::Command(cmd))
}

fn parse_if(
    tokens: &[Token],
    line_index: usize,
    lines: &[LogicalLine],
    attached: Option<CommentWithPosition>,
    source: &str,
) -> Result<(Statement, usize), ParseError> {
    let if_kw = &tokens[0];
    // `if <cond> then <command>` on one line.
    if let Some(then_idx) = find_top_level_then(tokens) {
        let cond_tokens = &tokens[1..then_idx];
        let condition_expr = header_text(cond_tokens, source);
        let command = dispatch_simple(&tokens[then_idx + 1..], source)?;
        let code_pos = span(tokens);
        let stmt = Statement::InlineIf(InlineIf { condition_expr, command: Box::new(command), code_pos });
        return Ok((stmt, line_index + 1));
    }
    let condition_expr = header_text(&tokens[1..], source);
    let end = find_block_end(lines, line_index, "if", "endif", source)?;
    let (then_end, elseif_ranges, else_range) = split_if_branches(&lines[line_index + 1..end]);
    let base = line_index + 1;
    let then_branch = parse_body(&lines[base..base + then_end], source)?;
    let mut elseif_branches = Vec::new();
    for (header, body_start, body_end) in elseif_ranges {
        let header_line = &lines[base + header];
        let header_tokens = header_line.content_tokens();
        let cond = header_text(&header_tokens[1..], source);
        let body = parse_body(&lines[base + body_start..base + body_end], source)?;
        let code_pos = span(header_tokens);
        elseif_branches.push(ElseifBranch { condition: cond, body, code_pos });
    }
    let else_branch = match else_range {
        Some((start, end_rel)) => Some(parse_body(&lines[base + start..base + end_rel], source)?),
        None => None,
    };
    let code_pos = CodePos { start: tok_start(if_kw), end: tok_end(&lines[end].content_tokens()[0]) };
    let stmt = Statement::IfBlock(IfBlock {
        condition_expr,
        then_branch,
        elseif_branches,
        else_branch,
        comments: attached.map(|a| vec![a]),
        code_pos,
    });
    Ok((stmt, end + 1))
}

fn find_top_level_then(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0i32;
    for (i, t) in tokens.iter().enumerate() {
        match t.kind {
            TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => depth -= 1,
            TokenKind::Identifier if depth == 0 && t.text == "then" => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split the lines strictly between an `if` header and its `endif` into the
/// then-branch extent, any `elseif` header/body extents, and an optional
/// `else` body extent. All indices are relative to the slice passed in.
fn split_if_branches(
    lines: &[LogicalLine],
) -> (usize, Vec<(usize, usize, usize)>, Option<(usize, usize)>) {
    let mut depth = 0i32;
    let mut markers = Vec::new(); // (index, "elseif" | "else")
    for (i, line) in lines.iter().enumerate() {
        if let Some(first) = line.content_tokens().first() {
            if first.is_keyword_text("if") {
                depth += 1;
            } else if first.is_keyword_text("endif") {
                depth -= 1;
            } else if depth == 0 && first.is_keyword_text("elseif") {
                markers.push((i, "elseif"));
            } else if depth == 0 && first.is_keyword_text("else") {
                markers.push((i, "else"));
            }
        }
    }
    let then_end = markers.first().map(|(i, _)| *i).unwrap_or(lines.len());
    let mut elseif_ranges = Vec::new();
    let mut else_range = None;
    for (k, (idx, kind)) in markers.iter().enumerate() {
        let body_start = idx + 1;
        let body_end = markers.get(k + 1).map(|(j, _)| *j).unwrap_or(lines.len());
        if *kind == "elseif" {
            elseif_ranges.push((*idx, body_start, body_end));
        } else {
            else_range = Some((body_start, body_end));
        }
    }
    (then_end, elseif_ranges, else_range)
}

fn header_text(tokens: &[Token], source: &str) -> String {
    if tokens.is_empty() {
        return String::new();
    }
    let start = tokens[0].start_offset as usize;
    let end = tokens[tokens.len() - 1].end_offset as usize;
    source[start..end].trim().to_string()
}

fn parse_for_header(tokens: &[Token], source: &str, for_kw: &Token) -> Result<(String, String), ParseError> {
    let var_tok = tokens
        .first()
        .filter(|t| t.kind == TokenKind::Variable)
        .ok_or_else(|| err_at(for_kw, ParseErrorKind::UnexpectedToken("expected $name after for".into()), source))?;
    let (var_name, path) = parse_var_text(&var_tok.text);
    if path.is_some() {
        return Err(err_at(var_tok, ParseErrorKind::InvalidParam(var_tok.text.clone()), source));
    }
    let in_tok = tokens
        .get(1)
        .filter(|t| t.is_keyword_text("in"))
        .ok_or_else(|| err_at(for_kw, ParseErrorKind::ExpectedKeyword("in".into()), source))?;
    let _ = in_tok;
    let iterable_expr = header_text(&tokens[2..], source);
    Ok((var_name, iterable_expr))
}

fn parse_do_header(tokens: &[Token], source: &str) -> Result<(Option<Vec<String>>, Option<Target>), ParseError> {
    let mut params = Vec::new();
    let mut i = 0;
    while i < tokens.len() && tokens[i].kind == TokenKind::Variable {
        let (name, path) = parse_var_text(&tokens[i].text);
        if path.is_some() {
            return Err(err_at(&tokens[i], ParseErrorKind::InvalidParam(tokens[i].text.clone()), source));
        }
        params.push(name);
        i += 1;
    }
    let param_names = if params.is_empty() { None } else { Some(params) };
    let into = if tokens.get(i).map(|t| t.kind == TokenKind::Identifier && t.text == "into").unwrap_or(false) {
        let var = tokens
            .get(i + 1)
            .filter(|t| t.kind == TokenKind::Variable)
            .ok_or_else(|| err_at(&tokens[i], ParseErrorKind::ExpectedKeyword("$target after into".into()), source))?;
        let (name, path) = parse_var_text(&var.text);
        Some(Target { name, path })
    } else {
        None
    };
    Ok((param_names, into))
}

fn parse_define_function(
    line: &LogicalLine,
    line_index: usize,
    lines: &[LogicalLine],
    source: &str,
) -> Result<(DefineFunction, usize), ParseError> {
    let tokens = line.content_tokens();
    let header_tok = &tokens[0];
    let name_tok = tokens
        .get(1)
        .filter(|t| t.kind == TokenKind::Identifier)
        .ok_or_else(|| err_at(header_tok, ParseErrorKind::ExpectedKeyword("function name".into()), source))?;
    let mut param_names = Vec::new();
    for t in &tokens[2..] {
        if t.kind != TokenKind::Variable {
            return Err(err_at(t, ParseErrorKind::InvalidParam(t.text.clone()), source));
        }
        let (name, path) = parse_var_text(&t.text);
        if path.is_some() {
            return Err(err_at(t, ParseErrorKind::InvalidParam(t.text.clone()), source));
        }
        param_names.push(name);
    }
    let end = find_block_end(lines, line_index, "def", "enddef", source)?;
    let body = parse_body(&lines[line_index + 1..end], source)?;
    let code_pos = CodePos { start: tok_start(header_tok), end: tok_end(&lines[end].content_tokens()[0]) };
    Ok((
        DefineFunction { name: name_tok.text.clone(), param_names, body, decorators: None, comments: None, code_pos },
        end + 1,
    ))
}

/// Fold a possibly-dotted `module.fn` bareword command name starting at
/// `tokens[i]`. Only a single `.` level is recognized: `name`/`module` is
/// a flat two-part name, not an arbitrary path.
fn fold_command_name(tokens: &[Token]) -> (String, Option<String>, usize) {
    if tokens.len() >= 3 && tokens[1].kind == TokenKind::Dot && tokens[2].kind == TokenKind::Identifier {
        (tokens[2].text.clone(), Some(tokens[0].text.clone()), 3)
    } else {
        (tokens[0].text.clone(), None, 1)
    }
}

fn split_into(tokens: &[Token]) -> (&[Token], Option<Target>) {
    if tokens.len() >= 2 {
        let len = tokens.len();
        if tokens[len - 2].kind == TokenKind::Identifier
            && tokens[len - 2].text == "into"
            && tokens[len - 1].kind == TokenKind::Variable
        {
            let (name, path) = parse_var_text(&tokens[len - 1].text);
            return (&tokens[..len - 2], Some(Target { name, path }));
        }
    }
    (tokens, None)
}

/// Parse a command invocation (space form or parenthesized) from a token
/// slice. `allow_into` suppresses `into` recognition for assignment RHS
/// commands, whose result is already routed to the assignment's own target.
/// `next_line_ctx`, when given, lets a parenthesized call's `into` spill
/// onto the following logical line.
fn parse_command_tokens(
    tokens: &[Token],
    source: &str,
    allow_into: bool,
    next_line_ctx: Option<(&[LogicalLine], usize)>,
) -> Result<(Command, usize), ParseError> {
    let code_pos = span(tokens);
    let (name, module, next_idx) = fold_command_name(tokens);
    if tokens.get(next_idx).map(|t| t.kind) == Some(TokenKind::LParen) {
        let close = super_find_matching(tokens, next_idx, TokenKind::LParen, TokenKind::RParen)
            .ok_or_else(|| err_at(&tokens[next_idx], ParseErrorKind::UnterminatedBracket('('), source))?;
        let inner = &tokens[next_idx + 1..close];
        let args = parse_args(inner, source)?;
        let has_newline = source[tokens[next_idx].end_offset as usize..tokens[close].start_offset as usize].contains('\n');
        let has_named = args.iter().any(|a| matches!(a, Arg::NamedArgs { .. }));
        let syntax_type = if has_newline {
            SyntaxType::MultilineParentheses
        } else if has_named {
            SyntaxType::NamedParentheses
        } else {
            SyntaxType::Parentheses
        };
        let after = &tokens[close + 1..];
        let mut extra_lines = 0usize;
        let into = if !allow_into {
            None
        } else if after.is_empty() {
            match next_line_ctx {
                Some((lines, header_idx)) => {
                    if let Some(line) = lines.get(header_idx + 1) {
                        let ct = line.content_tokens();
                        if ct.len() == 2
                            && ct[0].kind == TokenKind::Identifier
                            && ct[0].text == "into"
                            && ct[1].kind == TokenKind::Variable
                        {
                            let (name, path) = parse_var_text(&ct[1].text);
                            extra_lines = 1;
                            Some(Target { name, path })
                        } else {
                            None
                        }
                    } else {
                        None
                    }
                }
                None => None,
            }
        } else {
            let (_, target) = split_into(after);
            target
        };
        Ok((
            Command { name, module, args, syntax_type, decorators: None, into, callback: None, comments: None, code_pos },
            extra_lines,
        ))
    } else {
        let rest = &tokens[next_idx..];
        let (args_tokens, into) = if allow_into { split_into(rest) } else { (rest, None) };
        let args = parse_args(args_tokens, source)?;
        Ok((
            Command {
                name,
                module,
                args,
                syntax_type: SyntaxType::Space,
                decorators: None,
                into,
                callback: None,
                comments: None,
                code_pos,
            },
            0,
        ))
    }
}

fn super_find_matching(tokens: &[Token], open_idx: usize, open: TokenKind, close: TokenKind) -> Option<usize> {
    let mut depth = 0i32;
    for (k, t) in tokens.iter().enumerate().skip(open_idx) {
        if t.kind == open {
            depth += 1;
        } else if t.kind == close {
            depth -= 1;
            if depth == 0 {
                return Some(k);
            }
        }
    }
    None
}

fn pseudo_command(name: &str, arg: Arg, code_pos: CodePos) -> Command {
    Command {
        name: name.to_string(),
        module: None,
        args: vec![arg],
        syntax_type: SyntaxType::Space,
        decorators: None,
        into: None,
        callback: None,
        comments: None,
        code_pos,
    }
}

fn parse_assignment(
    var_tok: &Token,
    rhs_tokens: &[Token],
    attached: Option<CommentWithPosition>,
    inline: Option<CommentWithPosition>,
    code_pos: CodePos,
    source: &str,
) -> Result<Statement, ParseError> {
    let (target_name, target_path) = parse_var_text(&var_tok.text);
    if rhs_tokens.is_empty() {
        return Err(err_at(var_tok, ParseErrorKind::UnexpectedToken("=".into()), source));
    }
    let rhs_pos = span(rhs_tokens);
    let rhs = if rhs_tokens.len() == 1 {
        let t = &rhs_tokens[0];
        match t.kind {
            TokenKind::Variable if t.text == "$" => AssignmentRhs::IsLastValue,
            TokenKind::Variable => {
                let (name, path) = parse_var_text(&t.text);
                AssignmentRhs::Command(pseudo_command("_var", Arg::Var { name, path }, rhs_pos))
            }
            TokenKind::Number => {
                let n = match t.value {
                    crate::token::TokenValue::Number(n) => n,
                    _ => 0.0,
                };
                AssignmentRhs::Literal { value: LiteralArg::Number(n), value_type: LiteralValueType::Number }
            }
            TokenKind::String => {
                let s = match &t.value {
                    crate::token::TokenValue::Str(s) => s.clone(),
                    _ => String::new(),
                };
                AssignmentRhs::Literal { value: LiteralArg::String(s), value_type: LiteralValueType::String }
            }
            TokenKind::Boolean => {
                let b = match t.value {
                    crate::token::TokenValue::Bool(b) => b,
                    _ => false,
                };
                AssignmentRhs::Literal { value: LiteralArg::Bool(b), value_type: LiteralValueType::Bool }
            }
            TokenKind::Null => AssignmentRhs::Literal { value: LiteralArg::Null, value_type: LiteralValueType::Null },
            _ => classify_multi_token_rhs(rhs_tokens, source)?,
        }
    } else {
        classify_multi_token_rhs(rhs_tokens, source)?
    };
    Ok(Statement::Assignment(Assignment {
        target_name,
        target_path,
        rhs,
        comments: merge_comment_group(attached, inline),
        code_pos,
    }))
}

fn merge_comment_group(
    attached: Option<CommentWithPosition>,
    inline: Option<CommentWithPosition>,
) -> Option<Vec<CommentWithPosition>> {
    let mut group = Vec::new();
    if let Some(a) = attached {
        group.push(a);
    }
    if let Some(i) = inline {
        group.push(i);
    }
    if group.is_empty() {
        None
    } else {
        Some(group)
    }
}

fn classify_multi_token_rhs(tokens: &[Token], source: &str) -> Result<AssignmentRhs, ParseError> {
    let pos = span(tokens);
    if tokens.iter().all(|t| t.kind == TokenKind::String) {
        let text: String = tokens
            .iter()
            .map(|t| match &t.value {
                crate::token::TokenValue::Str(s) => s.as_str(),
                _ => "",
            })
            .collect();
        return Ok(AssignmentRhs::Literal { value: LiteralArg::String(text), value_type: LiteralValueType::String });
    }
    let first = &tokens[0];
    if first.kind == TokenKind::Variable && first.text == "$" && tokens.get(1).map(|t| t.kind) == Some(TokenKind::LParen)
    {
        let close = super_find_matching(tokens, 1, TokenKind::LParen, TokenKind::RParen)
            .ok_or_else(|| err_at(first, ParseErrorKind::UnterminatedBracket('('), source))?;
        let code = source[tokens[1].end_offset as usize..tokens[close].start_offset as usize].to_string();
        return Ok(AssignmentRhs::Command(pseudo_command("_subexpr", Arg::Subexpr { code }, pos)));
    }
    if first.kind == TokenKind::LBrace {
        let close = super_find_matching(tokens, 0, TokenKind::LBrace, TokenKind::RBrace)
            .ok_or_else(|| err_at(first, ParseErrorKind::UnterminatedBracket('{'), source))?;
        let code = source[first.end_offset as usize..tokens[close].start_offset as usize].to_string();
        return Ok(AssignmentRhs::Command(pseudo_command("_object", Arg::Object { code }, pos)));
    }
    if first.kind == TokenKind::LBracket {
        let close = super_find_matching(tokens, 0, TokenKind::LBracket, TokenKind::RBracket)
            .ok_or_else(|| err_at(first, ParseErrorKind::UnterminatedBracket('['), source))?;
        let code = source[first.end_offset as usize..tokens[close].start_offset as usize].to_string();
        return Ok(AssignmentRhs::Command(pseudo_command("_array", Arg::Array { code }, pos)));
    }
    let (cmd, _) = parse_command_tokens(tokens, source, false, None)?;
    Ok(AssignmentRhs::Command(cmd))
}
