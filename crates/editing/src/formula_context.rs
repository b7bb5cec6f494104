//! Formula context analysis.
//!
//! The single source of truth for formula assistance: one forward pass
//! over the formula up to the cursor produces a [`FormulaContext`], and
//! autocomplete, argument hints, highlighting and diagnostics all derive
//! from it. Same inputs, same outputs - nothing here consults a clock or
//! randomness.

use std::ops::Range;

use gridkit_core::addr::parse_a1_anchored;

use crate::functions::{self, ArgSpec, FunctionSpec};

/// Characters that put the caret in "expects a reference" position.
pub const REFERENCE_TRIGGERS: &[char] = &[
    '=', '+', '-', '*', '/', '(', ',', ':', '^', '&', '<', '>', ';',
];

// =============================================================================
// Context
// =============================================================================

/// One open function call surrounding the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionFrame {
    /// Uppercased call name; empty for a grouping-only parenthesis.
    pub name: String,
    /// Byte position of the opening parenthesis.
    pub open_paren: usize,
    /// 0-based index of the argument the cursor is in.
    pub arg_index: usize,
    /// Byte position where the current argument starts.
    pub arg_start: usize,
    /// Library metadata when the name is a known function.
    pub info: Option<&'static FunctionSpec>,
}

impl FunctionFrame {
    pub fn is_grouping(&self) -> bool {
        self.name.is_empty()
    }
}

/// The editing context at a cursor position within a formula.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormulaContext {
    pub is_formula: bool,
    pub formula: String,
    /// Byte offset, clamped into the formula.
    pub cursor: usize,
    /// The token accumulating at the cursor, leading whitespace stripped.
    pub current_token: String,
    /// Byte position where that token starts.
    pub token_start: usize,
    /// Open calls, outermost first.
    pub function_stack: Vec<FunctionFrame>,
    pub inside_string: bool,
    /// The caret sits right after an operator or separator.
    pub expects_reference: bool,
    /// Same position, and the token reads like the start of a name.
    pub typing_function_name: bool,
    pub paren_depth: usize,
    pub error: Option<String>,
}

impl FormulaContext {
    /// Innermost real function call (grouping parens skipped).
    pub fn current_function(&self) -> Option<&FunctionFrame> {
        self.function_stack.iter().rev().find(|f| !f.is_grouping())
    }
}

fn clamp_boundary(text: &str, pos: usize) -> usize {
    let mut p = pos.min(text.len());
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | ' ' | '\t')
}

fn is_call_name(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Analyze a formula at a cursor position.
///
/// Single O(n) forward pass over `formula[1..cursor]`, skipping the
/// leading `=`. Out-of-range cursors clamp to the formula length.
pub fn analyze(formula: &str, cursor: usize) -> FormulaContext {
    let cursor = clamp_boundary(formula, cursor);
    let mut ctx = FormulaContext {
        is_formula: formula.starts_with('='),
        formula: formula.to_string(),
        cursor,
        token_start: 1.min(formula.len()),
        ..Default::default()
    };
    if !ctx.is_formula {
        ctx.token_start = 0;
        return ctx;
    }

    let mut in_string = false;
    let mut string_char = '"';
    let mut chars = formula.char_indices().peekable();
    chars.next(); // skip '='

    while let Some((pos, c)) = chars.next() {
        if pos >= cursor {
            break;
        }

        if in_string {
            if c == string_char {
                if chars.peek().map(|(_, n)| *n) == Some(string_char) {
                    chars.next(); // doubled quote is an escape
                } else {
                    in_string = false;
                    ctx.token_start = pos + c.len_utf8();
                }
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                in_string = true;
                string_char = c;
            }
            '(' => {
                let token = formula[ctx.token_start..pos].trim();
                if is_call_name(token) {
                    let name = token.to_ascii_uppercase();
                    let info = functions::lookup(&name);
                    ctx.function_stack.push(FunctionFrame {
                        name,
                        open_paren: pos,
                        arg_index: 0,
                        arg_start: pos + 1,
                        info,
                    });
                } else {
                    ctx.function_stack.push(FunctionFrame {
                        name: String::new(),
                        open_paren: pos,
                        arg_index: 0,
                        arg_start: pos + 1,
                        info: None,
                    });
                }
                ctx.paren_depth += 1;
                ctx.token_start = pos + 1;
            }
            ')' => {
                if ctx.function_stack.pop().is_none() {
                    ctx.error = Some("unexpected closing parenthesis".to_string());
                }
                ctx.paren_depth = ctx.paren_depth.saturating_sub(1);
                ctx.token_start = pos + 1;
            }
            ',' if ctx.paren_depth >= 1 => {
                if let Some(top) = ctx.function_stack.last_mut() {
                    top.arg_index += 1;
                    top.arg_start = pos + 1;
                }
                ctx.token_start = pos + 1;
            }
            c if is_token_char(c) => {}
            _ => {
                ctx.token_start = pos + c.len_utf8();
            }
        }
    }

    ctx.inside_string = in_string;
    ctx.token_start = ctx.token_start.min(cursor);
    if !in_string {
        ctx.current_token = formula[ctx.token_start..cursor].trim_start().to_string();
    }

    // Preceding-character booleans
    if ctx.token_start >= 1 && !in_string {
        let preceding = formula[..ctx.token_start].chars().next_back();
        if let Some(p) = preceding {
            if REFERENCE_TRIGGERS.contains(&p) {
                ctx.expects_reference = true;
                ctx.typing_function_name = ctx
                    .current_token
                    .chars()
                    .next()
                    .map(|c| c.is_ascii_alphabetic() || c == '_')
                    .unwrap_or(false);
            }
        }
    }

    ctx
}

// =============================================================================
// Suggestions
// =============================================================================

/// A scored autocomplete candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub function: &'static FunctionSpec,
    pub score: i32,
}

/// The most recently accepted function names, newest first, capped at 10.
#[derive(Debug, Clone, Default)]
pub struct RecentFunctions {
    names: Vec<String>,
}

impl RecentFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted function, moving it to the front.
    pub fn touch(&mut self, name: &str) {
        let upper = name.to_ascii_uppercase();
        self.names.retain(|n| *n != upper);
        self.names.insert(0, upper);
        self.names.truncate(10);
    }

    fn boost(&self, name: &str) -> i32 {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| 50 - 5 * idx as i32)
            .unwrap_or(0)
    }
}

fn looks_like_cell_ref(token: &str) -> bool {
    parse_a1_anchored(token).is_some()
}

/// Rank library functions against the context's current token.
///
/// Exact match 1000, prefix `100 - len(name)` (shorter names win ties),
/// substring 10; a recency boost of `50 - 5 * index` is added for the ten
/// most recently accepted functions. Tokens that read as cell references
/// produce nothing. The top 10 are returned, best first.
pub fn suggest(ctx: &FormulaContext, recent: &RecentFunctions) -> Vec<Suggestion> {
    if !ctx.is_formula || ctx.inside_string {
        return Vec::new();
    }
    let token = ctx.current_token.trim();
    if looks_like_cell_ref(token) {
        return Vec::new();
    }
    let upper = token.to_ascii_uppercase();

    let mut out: Vec<Suggestion> = functions::FUNCTIONS
        .iter()
        .filter_map(|f| {
            let base = if !upper.is_empty() && f.name == upper {
                1000
            } else if f.name.starts_with(&upper) {
                100 - f.name.len() as i32
            } else if !upper.is_empty() && f.name.contains(&upper) {
                10
            } else {
                return None;
            };
            Some(Suggestion {
                function: f,
                score: base + recent.boost(f.name),
            })
        })
        .collect();

    out.sort_by(|a, b| b.score.cmp(&a.score).then(a.function.name.cmp(b.function.name)));
    out.truncate(10);
    out
}

// =============================================================================
// Argument hints
// =============================================================================

/// Signature help for the argument under the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentHint {
    pub function: &'static FunctionSpec,
    pub arg_index: usize,
    pub arg: &'static ArgSpec,
    /// Full signature with the active argument wrapped in `«…»`.
    pub signature: String,
}

/// Hint for the innermost known function call, if any.
pub fn argument_hint(ctx: &FormulaContext) -> Option<ArgumentHint> {
    let frame = ctx.current_function()?;
    let info = frame.info?;
    if info.args.is_empty() {
        return None;
    }

    let active = if frame.arg_index < info.args.len() {
        frame.arg_index
    } else if info.args.last().map(|a| a.repeating).unwrap_or(false) {
        info.args.len() - 1
    } else {
        return None;
    };

    let mut parts: Vec<String> = Vec::with_capacity(info.args.len());
    for (i, arg) in info.args.iter().enumerate() {
        let mut text = if arg.optional {
            format!("[{}]", arg.name)
        } else {
            arg.name.to_string()
        };
        if i == active {
            text = format!("\u{ab}{}\u{bb}", text);
        }
        parts.push(text);
    }
    let mut signature = format!("{}({}", info.name, parts.join(", "));
    if info.args.last().map(|a| a.repeating).unwrap_or(false) {
        signature.push_str(", ...");
    }
    signature.push(')');

    Some(ArgumentHint {
        function: info,
        arg_index: frame.arg_index,
        arg: &info.args[active],
        signature,
    })
}

// =============================================================================
// Highlight spans
// =============================================================================

/// Token classification for view-layer colorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Function,
    Reference,
    Name,
    Number,
    Str,
    Boolean,
    Operator,
    Paren,
    Comma,
    Colon,
    Unknown,
}

/// Classify a formula into typed byte spans. Whitespace is omitted.
pub fn highlight_spans(formula: &str) -> Vec<(Range<usize>, TokenKind)> {
    let mut spans = Vec::new();
    let bytes = formula.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' => {
                i += 1;
            }
            '=' if i == 0 => {
                spans.push((start..i + 1, TokenKind::Operator));
                i += 1;
            }
            '+' | '-' | '*' | '/' | '^' | '&' | '=' | '<' | '>' | '%' => {
                // Fold two-char comparisons into one span
                if (c == '<' && matches!(bytes.get(i + 1), Some(b'=') | Some(b'>')))
                    || (c == '>' && bytes.get(i + 1) == Some(&b'='))
                {
                    spans.push((start..i + 2, TokenKind::Operator));
                    i += 2;
                } else {
                    spans.push((start..i + 1, TokenKind::Operator));
                    i += 1;
                }
            }
            '(' | ')' => {
                spans.push((start..i + 1, TokenKind::Paren));
                i += 1;
            }
            ',' | ';' => {
                spans.push((start..i + 1, TokenKind::Comma));
                i += 1;
            }
            ':' => {
                spans.push((start..i + 1, TokenKind::Colon));
                i += 1;
            }
            '"' => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'"' {
                        if bytes.get(i + 1) == Some(&b'"') {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                spans.push((start..i, TokenKind::Str));
            }
            '0'..='9' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                spans.push((start..i, TokenKind::Number));
            }
            'A'..='Z' | 'a'..='z' | '_' | '$' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric()
                        || bytes[i] == b'_'
                        || bytes[i] == b'$'
                        || bytes[i] == b'.')
                {
                    i += 1;
                }
                let text = &formula[start..i];
                let upper = text.to_ascii_uppercase();
                let kind = if upper == "TRUE" || upper == "FALSE" {
                    TokenKind::Boolean
                } else if looks_like_cell_ref(text) {
                    TokenKind::Reference
                } else if functions::lookup(text).is_some() {
                    TokenKind::Function
                } else {
                    TokenKind::Name
                };
                spans.push((start..i, kind));
            }
            _ => {
                let len = formula[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                spans.push((start..i + len, TokenKind::Unknown));
                i += len;
            }
        }
    }

    spans
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Whether a diagnostic should surface immediately or wait: the user may
/// still be typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Hard,
    Transient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<Range<usize>>,
}

/// Check a formula for definite mistakes: unknown functions, unbalanced
/// parentheses, trailing operators. Errors the user is likely mid-typing
/// through (cursor at the end) come back Transient.
pub fn check(formula: &str, cursor: usize) -> Option<Diagnostic> {
    if !formula.starts_with('=') {
        return None;
    }
    let at_end = cursor >= formula.len();
    let spans = highlight_spans(formula);

    // Unknown function: a Name span followed by '('
    for (idx, (range, kind)) in spans.iter().enumerate() {
        if *kind == TokenKind::Name {
            let next_is_paren = spans
                .get(idx + 1)
                .map(|(r, k)| *k == TokenKind::Paren && &formula[r.clone()] == "(")
                .unwrap_or(false);
            if next_is_paren {
                return Some(Diagnostic {
                    kind: DiagnosticKind::Hard,
                    message: format!(
                        "Unknown function: {}",
                        formula[range.clone()].to_ascii_uppercase()
                    ),
                    span: Some(range.clone()),
                });
            }
        }
    }

    // Paren balance
    let mut depth: i32 = 0;
    for (range, kind) in &spans {
        if *kind == TokenKind::Paren {
            if &formula[range.clone()] == "(" {
                depth += 1;
            } else {
                depth -= 1;
                if depth < 0 {
                    return Some(Diagnostic {
                        kind: DiagnosticKind::Hard,
                        message: "Unexpected closing parenthesis".to_string(),
                        span: Some(range.clone()),
                    });
                }
            }
        }
    }
    if depth > 0 {
        return Some(Diagnostic {
            kind: if at_end {
                DiagnosticKind::Transient
            } else {
                DiagnosticKind::Hard
            },
            message: "Missing closing parenthesis".to_string(),
            span: None,
        });
    }

    // Trailing operator
    if let Some((range, TokenKind::Operator)) = spans.last() {
        if range.start > 0 {
            return Some(Diagnostic {
                kind: if at_end {
                    DiagnosticKind::Transient
                } else {
                    DiagnosticKind::Hard
                },
                message: "Expected operand after operator".to_string(),
                span: Some(range.clone()),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_non_formula() {
        let ctx = analyze("hello", 3);
        assert!(!ctx.is_formula);
        assert!(ctx.function_stack.is_empty());
    }

    #[test]
    fn test_analyze_typing_function_name() {
        let ctx = analyze("=SU", 3);
        assert!(ctx.is_formula);
        assert_eq!(ctx.current_token, "SU");
        assert!(ctx.typing_function_name);
        assert!(ctx.expects_reference);
    }

    #[test]
    fn test_analyze_function_stack_and_args() {
        let ctx = analyze("=SUM(A1,", 8);
        let frame = ctx.current_function().unwrap();
        assert_eq!(frame.name, "SUM");
        assert_eq!(frame.arg_index, 1);
        assert_eq!(ctx.paren_depth, 1);
    }

    #[test]
    fn test_analyze_nested_calls() {
        let ctx = analyze("=IF(SUM(A1,B1),", 10);
        // Cursor inside SUM's arg list
        let frame = ctx.current_function().unwrap();
        assert_eq!(frame.name, "SUM");
        assert_eq!(ctx.function_stack.len(), 2);
        assert_eq!(ctx.function_stack[0].name, "IF");

        // Past SUM's closing paren, back inside IF at arg 1
        let ctx = analyze("=IF(SUM(A1,B1),", 15);
        let frame = ctx.current_function().unwrap();
        assert_eq!(frame.name, "IF");
        assert_eq!(frame.arg_index, 1);
    }

    #[test]
    fn test_analyze_grouping_paren_is_not_a_call() {
        let ctx = analyze("=(1+2", 5);
        assert_eq!(ctx.paren_depth, 1);
        assert!(ctx.current_function().is_none());
        assert_eq!(ctx.function_stack.len(), 1);
        assert!(ctx.function_stack[0].is_grouping());
    }

    #[test]
    fn test_analyze_inside_string() {
        let ctx = analyze("=\"hel", 5);
        assert!(ctx.inside_string);
        let ctx = analyze("=\"ab\"&", 6);
        assert!(!ctx.inside_string);
    }

    #[test]
    fn test_analyze_doubled_quote_escape() {
        // "ab""cd" is one literal; cursor past it is outside the string
        let ctx = analyze("=\"ab\"\"cd\"&A", 11);
        assert!(!ctx.inside_string);
        assert_eq!(ctx.current_token, "A");
    }

    #[test]
    fn test_analyze_comma_outside_call_ignored() {
        let ctx = analyze("=SUM(1),", 8);
        assert!(ctx.current_function().is_none());
        assert_eq!(ctx.paren_depth, 0);
    }

    #[test]
    fn test_analyze_cursor_clamps() {
        let ctx = analyze("=A1", 99);
        assert_eq!(ctx.cursor, 3);
        assert_eq!(ctx.current_token, "A1");
    }

    #[test]
    fn test_analyze_unmatched_close_sets_error() {
        let ctx = analyze("=1)", 3);
        assert!(ctx.error.is_some());
        assert_eq!(ctx.paren_depth, 0);
    }

    #[test]
    fn test_expects_reference_after_operator() {
        let ctx = analyze("=A1+", 4);
        assert!(ctx.expects_reference);
        assert!(!ctx.typing_function_name);
    }

    #[test]
    fn test_suggest_exact_beats_prefix() {
        let recent = RecentFunctions::new();
        let ctx = analyze("=SUM", 4);
        let out = suggest(&ctx, &recent);
        assert_eq!(out[0].function.name, "SUM");
        assert_eq!(out[0].score, 1000);
        assert!(out.iter().any(|s| s.function.name == "SUMIF"));
    }

    #[test]
    fn test_suggest_shorter_prefix_wins_ties() {
        let recent = RecentFunctions::new();
        let ctx = analyze("=SU", 3);
        let out = suggest(&ctx, &recent);
        // SUM (len 3) scores above SUMIF (len 5)
        let sum_pos = out.iter().position(|s| s.function.name == "SUM").unwrap();
        let sumif_pos = out.iter().position(|s| s.function.name == "SUMIF").unwrap();
        assert!(sum_pos < sumif_pos);
    }

    #[test]
    fn test_suggest_rejects_cell_refs() {
        let recent = RecentFunctions::new();
        for token in ["=A1", "=$B$2"] {
            let ctx = analyze(token, token.len());
            assert!(suggest(&ctx, &recent).is_empty(), "{token}");
        }
    }

    #[test]
    fn test_suggest_recency_boost() {
        let mut recent = RecentFunctions::new();
        recent.touch("VLOOKUP");
        let ctx = analyze("=V", 2);
        let out = suggest(&ctx, &recent);
        assert_eq!(out[0].function.name, "VLOOKUP");
        // boost is 50 - 5*0 = 50 on top of prefix 100 - 7
        assert_eq!(out[0].score, 100 - 7 + 50);
    }

    #[test]
    fn test_suggest_caps_at_ten() {
        let recent = RecentFunctions::new();
        let ctx = analyze("=", 1);
        let out = suggest(&ctx, &recent);
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_suggest_silent_inside_string() {
        let recent = RecentFunctions::new();
        let ctx = analyze("=\"SUM", 5);
        assert!(suggest(&ctx, &recent).is_empty());
    }

    #[test]
    fn test_argument_hint_marks_active_arg() {
        let ctx = analyze("=IF(A1>2,", 9);
        let hint = argument_hint(&ctx).unwrap();
        assert_eq!(hint.function.name, "IF");
        assert_eq!(hint.arg.name, "value_if_true");
        assert_eq!(
            hint.signature,
            "IF(logical_test, \u{ab}value_if_true\u{bb}, [value_if_false])"
        );
    }

    #[test]
    fn test_argument_hint_repeating_tail() {
        let ctx = analyze("=SUM(A1,B1,C1,", 14);
        let hint = argument_hint(&ctx).unwrap();
        assert_eq!(hint.arg.name, "number2");
        assert!(hint.signature.ends_with(", ...)"));
    }

    #[test]
    fn test_argument_hint_none_without_call() {
        let ctx = analyze("=A1+B1", 6);
        assert!(argument_hint(&ctx).is_none());
    }

    #[test]
    fn test_argument_hint_overflow_without_repeat() {
        // IF takes 3 args; cursor in a 4th
        let ctx = analyze("=IF(1,2,3,", 10);
        assert!(argument_hint(&ctx).is_none());
    }

    #[test]
    fn test_highlight_spans_kinds() {
        let spans = highlight_spans("=SUM(A1:B2)+\"x\"");
        let kinds: Vec<TokenKind> = spans.iter().map(|(_, k)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Operator, // =
                TokenKind::Function, // SUM
                TokenKind::Paren,
                TokenKind::Reference, // A1
                TokenKind::Colon,
                TokenKind::Reference, // B2
                TokenKind::Paren,
                TokenKind::Operator, // +
                TokenKind::Str,
            ]
        );
    }

    #[test]
    fn test_check_unknown_function() {
        let diag = check("=SUMM(A1)", 5).unwrap();
        assert_eq!(diag.kind, DiagnosticKind::Hard);
        assert!(diag.message.contains("SUMM"));
    }

    #[test]
    fn test_check_missing_paren_transient_at_end() {
        let diag = check("=SUM(A1", 7).unwrap();
        assert_eq!(diag.kind, DiagnosticKind::Transient);
        let diag = check("=SUM(A1", 3).unwrap();
        assert_eq!(diag.kind, DiagnosticKind::Hard);
    }

    #[test]
    fn test_check_unexpected_close_paren() {
        let diag = check("=A1)", 4).unwrap();
        assert_eq!(diag.kind, DiagnosticKind::Hard);
    }

    #[test]
    fn test_check_clean_formula() {
        assert!(check("=SUM(A1:B2)", 11).is_none());
        assert!(check("plain text", 5).is_none());
    }

    #[test]
    fn test_determinism() {
        let a = analyze("=IF(SUM(A1:B2),\"x\",3)", 14);
        let b = analyze("=IF(SUM(A1:B2),\"x\",3)", 14);
        assert_eq!(a, b);
    }
}
