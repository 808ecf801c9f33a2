//! Template Expression Engine.
//!
//! Parses and evaluates `${ expr }` embedded in YAML string scalars, plus
//! the structural operators (`$merge`, `$concat`, `$if`/`$then`/`$else`,
//! `$forEach`/`$return`/`$filter`) recognised at map-key position. See
//! [`eval`] for the strict/partial evaluation split and [`value`] for the
//! `TemplateValue` tagged union.

mod eval;
mod helpers;
mod lexer;
mod parser;
mod structural;
mod value;

pub use eval::{EvalMode, Evaluator};
pub use lexer::{tokenize, Token};
pub use parser::{parse, BinaryOp, Expr, PathSegment, UnaryOp};
pub use structural::expand_structural;
pub use value::TemplateValue;

use crate::context::ContextReader;
use crate::error::{SourceLocation, TemplateError};

/// A single `${ … }` span found inside a literal string, with its byte
/// range in the original string and the parsed expression.
#[derive(Debug, Clone)]
pub struct InterpolationSpan {
    pub range: std::ops::Range<usize>,
    pub expr: Expr,
}

/// Splits a literal string into literal runs and `${...}` spans, honouring
/// the `$$` escape for a literal dollar sign. A string consisting of
/// exactly one `${...}` span (and nothing else) is eligible for native
/// (non-string) substitution by the caller.
pub fn scan_interpolations(s: &str) -> Result<Vec<InterpolationSpan>, TemplateError> {
    let mut spans = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let start = i;
            let mut depth = 1usize;
            let mut j = i + 2;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth != 0 {
                return Err(TemplateError::Syntax {
                    message: "unterminated `${` expression".into(),
                    location: SourceLocation::default(),
                });
            }
            let inner = &s[start + 2..j - 1];
            let tokens = tokenize(inner)?;
            let expr = parse(&tokens)?;
            spans.push(InterpolationSpan { range: start..j, expr });
            i = j;
        } else {
            i += 1;
        }
    }
    Ok(spans)
}

/// Returns true if `s` is exactly one `${...}` expression with no
/// surrounding literal text, i.e. eligible to yield its expression's
/// native type rather than being string-concatenated.
pub fn is_whole_expression(s: &str) -> bool {
    s.starts_with("${") && s.ends_with('}') && scan_interpolations(s).map(|spans| {
        spans.len() == 1 && spans[0].range == (0..s.len())
    }).unwrap_or(false)
}

/// Evaluates every `${...}` span in `s` and concatenates the results as
/// strings, or returns the single expression's native value when `s` is
/// exactly one span. `$$` is unescaped to a literal `$`.
pub fn render_string(
    s: &str,
    ctx: &dyn ContextReader,
    mode: EvalMode,
) -> Result<Option<TemplateValue>, TemplateError> {
    if s.contains("$$") && !s.contains("${") {
        return Ok(Some(TemplateValue::String(s.replace("$$", "$").into())));
    }
    let spans = scan_interpolations(s)?;
    if spans.is_empty() {
        return Ok(Some(TemplateValue::String(s.replace("$$", "$").into())));
    }
    let evaluator = Evaluator::new(ctx, mode);
    if spans.len() == 1 && spans[0].range == (0..s.len()) {
        return evaluator.eval(&spans[0].expr);
    }
    let mut out = String::with_capacity(s.len());
    let mut cursor = 0;
    for span in &spans {
        out.push_str(&s[cursor..span.range.start].replace("$$", "$"));
        match evaluator.eval(&span.expr)? {
            Some(v) => out.push_str(&v.to_display_string()),
            None => return Ok(None),
        }
        cursor = span.range.end;
    }
    out.push_str(&s[cursor..].replace("$$", "$"));
    Ok(Some(TemplateValue::String(out.into())))
}
