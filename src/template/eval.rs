//! Expression evaluation: strict vs partial resolution.
//!
//! `Ok(None)` means "absent" — only ever returned in [`EvalMode::Partial`].
//! In [`EvalMode::Strict`], an unresolved path becomes a
//! [`TemplateError::UnresolvedReference`] instead, *except* inside the
//! logical operators, which always catch their left operand's absence to
//! implement the fallback grammar (`||`/`&&`) regardless of mode. This is
//! the resolution the engine makes explicit for the two open design
//! questions about partial-mode short-circuiting: `||` with an absent left
//! operand yields `absent` in partial mode (never falls through to the
//! right operand), and yields the right operand in strict mode.

use super::helpers;
use super::parser::{BinaryOp, Expr, PathSegment, UnaryOp};
use super::value::TemplateValue;
use crate::context::ContextReader;
use crate::error::{SourceLocation, TemplateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Strict,
    Partial,
}

pub struct Evaluator<'a> {
    ctx: &'a dyn ContextReader,
    mode: EvalMode,
}

type EvalResult = Result<Option<TemplateValue>, TemplateError>;

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a dyn ContextReader, mode: EvalMode) -> Self {
        Evaluator { ctx, mode }
    }

    pub fn eval(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(v) => Ok(Some(v.clone())),
            Expr::Path(segments) => self.eval_path(segments),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.eval(item)? {
                        Some(v) => out.push(v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(TemplateValue::List(out)))
            }
            Expr::Call(name, args) => self.eval_call(name, args),
            Expr::Unary(op, inner) => self.eval_unary(*op, inner),
            Expr::Binary(op, lhs, rhs) => self.eval_binary(*op, lhs, rhs),
            Expr::Ternary(cond, then_branch, else_branch) => {
                match self.eval(cond)? {
                    Some(c) if c.is_truthy() => self.eval(then_branch),
                    Some(_) => self.eval(else_branch),
                    None => Ok(None),
                }
            }
        }
    }

    fn eval_path(&self, segments: &[PathSegment]) -> EvalResult {
        let mut path = String::new();
        for (i, seg) in segments.iter().enumerate() {
            match seg {
                PathSegment::Field(f) => {
                    if i > 0 {
                        path.push('.');
                    }
                    path.push_str(f);
                }
                PathSegment::Index(idx) => {
                    path.push('[');
                    path.push_str(&idx.to_string());
                    path.push(']');
                }
                PathSegment::Computed(expr) => {
                    let key = match self.eval(expr)? {
                        Some(v) => v.to_display_string(),
                        None => return Ok(None),
                    };
                    path.push('[');
                    path.push_str(&key);
                    path.push(']');
                }
            }
        }
        match self.ctx.resolve(&path) {
            Some(v) => Ok(Some(v)),
            None => self.absent(&path),
        }
    }

    fn absent(&self, path: &str) -> EvalResult {
        match self.mode {
            EvalMode::Partial => Ok(None),
            EvalMode::Strict => Err(TemplateError::UnresolvedReference {
                path: path.to_string(),
                location: SourceLocation::default(),
            }),
        }
    }

    fn eval_call(&self, name: &str, args: &[Expr]) -> EvalResult {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.eval(arg)? {
                Some(v) => values.push(v),
                None => return Ok(None),
            }
        }
        helpers::call(name, &values).map(Some)
    }

    fn eval_unary(&self, op: UnaryOp, inner: &Expr) -> EvalResult {
        let v = match self.eval(inner)? {
            Some(v) => v,
            None => return Ok(None),
        };
        match op {
            UnaryOp::Not => Ok(Some(TemplateValue::Bool(!v.is_truthy()))),
            UnaryOp::Neg => match v.as_number() {
                Some(n) => Ok(Some(TemplateValue::Number(-n))),
                None => Err(TemplateError::WrongType {
                    name: "unary-".into(),
                    message: "operand is not a number".into(),
                }),
            },
        }
    }

    /// Evaluates `expr`, but converts an unresolved-reference failure into
    /// `Ok(None)` *regardless of mode* — this is the mechanism `||`/`&&`
    /// use to implement fallback even in strict mode. Syntax/arity/cycle
    /// errors still propagate.
    fn eval_or_absent(&self, expr: &Expr) -> EvalResult {
        if self.mode == EvalMode::Strict {
            match self.eval(expr) {
                Err(TemplateError::UnresolvedReference { .. }) => Ok(None),
                other => other,
            }
        } else {
            self.eval(expr)
        }
    }

    fn eval_binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> EvalResult {
        match op {
            BinaryOp::Or => {
                let left = self.eval_or_absent(lhs)?;
                match left {
                    None => {
                        // Absent left: partial mode masks to absent (open
                        // question resolution); strict mode falls through
                        // to the right operand.
                        match self.mode {
                            EvalMode::Partial => Ok(None),
                            EvalMode::Strict => self.eval(rhs),
                        }
                    }
                    Some(v) if v.is_truthy() => Ok(Some(v)),
                    Some(_) => self.eval(rhs),
                }
            }
            BinaryOp::And => {
                let left = self.eval_or_absent(lhs)?;
                match left {
                    None => Ok(None),
                    Some(v) if !v.is_truthy() => Ok(Some(TemplateValue::Bool(false))),
                    Some(_) => self.eval(rhs),
                }
            }
            _ => {
                let left = match self.eval(lhs)? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                let right = match self.eval(rhs)? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                self.eval_strict_binary(op, &left, &right).map(Some)
            }
        }
    }

    fn eval_strict_binary(&self, op: BinaryOp, l: &TemplateValue, r: &TemplateValue) -> Result<TemplateValue, TemplateError> {
        use BinaryOp::*;
        match op {
            Eq => Ok(TemplateValue::Bool(values_equal(l, r))),
            NotEq => Ok(TemplateValue::Bool(!values_equal(l, r))),
            Lt | Lte | Gt | Gte => {
                let (a, b) = numeric_pair(op, l, r)?;
                let result = match op {
                    Lt => a < b,
                    Lte => a <= b,
                    Gt => a > b,
                    Gte => a >= b,
                    _ => unreachable!(),
                };
                Ok(TemplateValue::Bool(result))
            }
            Add => match (l, r) {
                (TemplateValue::String(a), _) => Ok(TemplateValue::string(format!("{a}{}", r.to_display_string()))),
                (_, TemplateValue::String(b)) => Ok(TemplateValue::string(format!("{}{b}", l.to_display_string()))),
                (TemplateValue::List(a), TemplateValue::List(b)) => {
                    let mut out = a.clone();
                    out.extend(b.clone());
                    Ok(TemplateValue::List(out))
                }
                _ => {
                    let (a, b) = numeric_pair(op, l, r)?;
                    Ok(TemplateValue::Number(a + b))
                }
            },
            Sub => {
                let (a, b) = numeric_pair(op, l, r)?;
                Ok(TemplateValue::Number(a - b))
            }
            Mul => {
                let (a, b) = numeric_pair(op, l, r)?;
                Ok(TemplateValue::Number(a * b))
            }
            Div => {
                let (a, b) = numeric_pair(op, l, r)?;
                if b == 0.0 {
                    return Err(TemplateError::WrongType { name: "/".into(), message: "division by zero".into() });
                }
                Ok(TemplateValue::Number(a / b))
            }
            Mod => {
                let (a, b) = numeric_pair(op, l, r)?;
                Ok(TemplateValue::Number(a % b))
            }
            Or | And => unreachable!("handled in eval_binary"),
        }
    }
}

fn numeric_pair(op: BinaryOp, l: &TemplateValue, r: &TemplateValue) -> Result<(f64, f64), TemplateError> {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(TemplateError::WrongType {
            name: format!("{op:?}"),
            message: "both operands must be numbers".into(),
        }),
    }
}

fn values_equal(l: &TemplateValue, r: &TemplateValue) -> bool {
    l == r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::template::{parse, tokenize};

    fn eval_str(ctx: &dyn ContextReader, mode: EvalMode, s: &str) -> EvalResult {
        let expr = parse(&tokenize(s).unwrap()).unwrap();
        Evaluator::new(ctx, mode).eval(&expr)
    }

    #[test]
    fn strict_or_falls_through_to_right_when_left_absent() {
        let ctx = StaticContext::from_pairs([("var.b", "fallback")]);
        let v = eval_str(&ctx, EvalMode::Strict, "var.a || var.b").unwrap();
        assert_eq!(v.unwrap(), TemplateValue::string("fallback"));
    }

    #[test]
    fn partial_or_masks_to_absent_when_left_absent() {
        let ctx = StaticContext::from_pairs([("var.b", "fallback")]);
        let v = eval_str(&ctx, EvalMode::Partial, "var.a || var.b").unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn or_returns_left_when_truthy() {
        let ctx = StaticContext::from_pairs([("var.a", "present")]);
        let v = eval_str(&ctx, EvalMode::Strict, "var.a || var.b");
        assert_eq!(v.unwrap().unwrap(), TemplateValue::string("present"));
    }

    #[test]
    fn and_short_circuits_on_falsy_left() {
        let mut ctx = StaticContext::new();
        ctx.set("var.a", TemplateValue::Bool(false));
        let v = eval_str(&ctx, EvalMode::Strict, "var.a && var.b").unwrap();
        assert_eq!(v.unwrap(), TemplateValue::Bool(false));
    }

    #[test]
    fn strict_mode_fails_on_unresolved_non_logical_reference() {
        let ctx = StaticContext::new();
        let err = eval_str(&ctx, EvalMode::Strict, "var.missing");
        assert!(matches!(err, Err(TemplateError::UnresolvedReference { .. })));
    }

    #[test]
    fn partial_mode_yields_absent_for_unresolved_reference() {
        let ctx = StaticContext::new();
        let v = eval_str(&ctx, EvalMode::Partial, "var.missing").unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn ternary_selects_branch() {
        let mut ctx = StaticContext::new();
        ctx.set("var.flag", TemplateValue::Bool(true));
        let v = eval_str(&ctx, EvalMode::Strict, "var.flag ? 1 : 2").unwrap().unwrap();
        assert_eq!(v, TemplateValue::Number(1.0));
    }

    #[test]
    fn relational_requires_numbers() {
        let ctx = StaticContext::new();
        let err = eval_str(&ctx, EvalMode::Strict, "\"a\" > 1");
        assert!(matches!(err, Err(TemplateError::WrongType { .. })));
    }

    #[test]
    fn additive_concatenates_strings() {
        let ctx = StaticContext::new();
        let v = eval_str(&ctx, EvalMode::Strict, "\"a\" + \"b\"").unwrap().unwrap();
        assert_eq!(v, TemplateValue::string("ab"));
    }
}
