//! Structural operators recognised at map-key position, evaluated before
//! string interpolation of sibling keys: `$merge`, `$concat`, `$if`/
//! `$then`/`$else`, `$forEach`/`$return`/`$filter`.

use serde_yaml::Value as Yaml;

use super::eval::{EvalMode, Evaluator};
use super::parser::parse;
use super::render_string;
use super::value::TemplateValue;
use crate::context::{ContextReader, StaticContext};
use crate::error::TemplateError;

const RESERVED_KEYS: &[&str] = &["$merge", "$concat", "$if", "$then", "$else", "$forEach", "$return", "$filter"];

/// Recursively expands structural operators and interpolates string
/// scalars in `value`, returning the concrete YAML tree. Any other
/// `$`-prefixed map key is a validation error (reserved for future use).
pub fn expand_structural(value: &Yaml, ctx: &dyn ContextReader, mode: EvalMode) -> Result<Yaml, TemplateError> {
    match value {
        Yaml::Mapping(map) => expand_mapping(map, ctx, mode),
        Yaml::Sequence(seq) => {
            let mut out = Vec::new();
            expand_sequence_into(seq, ctx, mode, &mut out)?;
            Ok(Yaml::Sequence(out))
        }
        Yaml::String(s) => match render_string(s, ctx, mode)? {
            Some(v) => Ok(template_value_to_yaml(&v)),
            None => Ok(Yaml::Null),
        },
        other => Ok(other.clone()),
    }
}

fn expand_mapping(map: &serde_yaml::Mapping, ctx: &dyn ContextReader, mode: EvalMode) -> Result<Yaml, TemplateError> {
    if let Some(cond) = map.get(Yaml::String("$if".into())) {
        return expand_if(cond, map, ctx, mode);
    }
    if let Some(iterable) = map.get(Yaml::String("$forEach".into())) {
        return expand_for_each(iterable, map, ctx, mode);
    }

    let mut merges = Vec::new();
    let mut explicit = serde_yaml::Mapping::new();

    for (k, v) in map {
        let key_str = k.as_str().unwrap_or_default();
        if key_str == "$merge" {
            merges.push(expand_structural(v, ctx, mode)?);
            continue;
        }
        if key_str.starts_with('$') && RESERVED_KEYS.contains(&key_str) {
            // $then/$else/$return/$filter/$concat only make sense nested
            // under their owning operator; seeing one here bare means it
            // was already consumed above, so skip silently.
            continue;
        }
        if key_str.starts_with('$') {
            return Err(reserved_key_error(key_str));
        }
        let expanded_key = match k {
            Yaml::String(s) => template_value_to_yaml(&match render_string(s, ctx, mode)? {
                Some(v) => v,
                None => continue,
            }),
            other => other.clone(),
        };
        let expanded_val = expand_structural(v, ctx, mode)?;
        if expanded_val == Yaml::Null && matches!(v, Yaml::Mapping(m) if m.contains_key(Yaml::String("$if".into()))) {
            // `$if` with no matching `$else` yields absent: drop the key
            // entirely rather than keeping it with a null value.
            continue;
        }
        explicit.insert(expanded_key, expanded_val);
    }

    // Explicit keys always win over merged keys, regardless of declaration
    // order; multiple `$merge`s merge among themselves in declaration
    // order first.
    let mut result = serde_yaml::Mapping::new();
    for merged in merges {
        if let Yaml::Mapping(m) = merged {
            for (k, v) in m {
                result.insert(k, v);
            }
        }
    }
    for (k, v) in explicit {
        result.insert(k, v);
    }
    Ok(Yaml::Mapping(result))
}

fn reserved_key_error(key: &str) -> TemplateError {
    TemplateError::ReservedKey { key: key.trim_start_matches('$').to_string() }
}

fn expand_if(cond: &Yaml, map: &serde_yaml::Mapping, ctx: &dyn ContextReader, mode: EvalMode) -> Result<Yaml, TemplateError> {
    let cond_str = cond.as_str().unwrap_or_default();
    let cond_value = render_string(&format!("${{{cond_str}}}"), ctx, mode)?;
    let truthy = match &cond_value {
        Some(v) => v.is_truthy(),
        None => return Ok(Yaml::Null),
    };
    if truthy {
        match map.get(Yaml::String("$then".into())) {
            Some(v) => expand_structural(v, ctx, mode),
            None => Ok(Yaml::Null),
        }
    } else {
        match map.get(Yaml::String("$else".into())) {
            Some(v) => expand_structural(v, ctx, mode),
            // Missing $else yields "absent" — the key is removed from the
            // parent by the caller treating Null specially there; here we
            // surface Null and let the mapping/sequence expander drop it.
            None => Ok(Yaml::Null),
        }
    }
}

fn expand_for_each(iterable: &Yaml, map: &serde_yaml::Mapping, ctx: &dyn ContextReader, mode: EvalMode) -> Result<Yaml, TemplateError> {
    let iter_str = iterable.as_str().unwrap_or_default();
    let items = match resolve_path_as_list(iter_str, ctx, mode)? {
        Some(items) => items,
        None => return Ok(Yaml::Null),
    };

    let return_tpl = map.get(Yaml::String("$return".into()));
    let filter_expr = map.get(Yaml::String("$filter".into())).and_then(|v| v.as_str()).map(str::to_string);

    let mut out = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        let mut item_ctx = StaticContext::new();
        item_ctx.set("item.value", item.clone());
        item_ctx.set("item.key", TemplateValue::Number(idx as f64));
        let chained = crate::context::ChainedContext::new(&item_ctx, ctx);

        if let Some(filter) = &filter_expr {
            let tokens = super::lexer::tokenize(filter)?;
            let expr = parse(&tokens)?;
            let keep = Evaluator::new(&chained, mode).eval(&expr)?;
            match keep {
                Some(v) if !v.is_truthy() => continue,
                None => continue,
                _ => {}
            }
        }

        match return_tpl {
            Some(tpl) => {
                let expanded = expand_structural(tpl, &chained, mode)?;
                if expanded != Yaml::Null {
                    out.push(expanded);
                }
            }
            None => out.push(template_value_to_yaml(&item)),
        }
    }
    Ok(Yaml::Sequence(out))
}

fn resolve_path_as_list(path_expr: &str, ctx: &dyn ContextReader, mode: EvalMode) -> Result<Option<Vec<TemplateValue>>, TemplateError> {
    let tokens = super::lexer::tokenize(path_expr)?;
    let expr = parse(&tokens)?;
    let value = Evaluator::new(ctx, mode).eval(&expr)?;
    Ok(value.map(|v| match v {
        TemplateValue::List(l) => l,
        other => vec![other],
    }))
}

fn expand_sequence_into(seq: &[Yaml], ctx: &dyn ContextReader, mode: EvalMode, out: &mut Vec<Yaml>) -> Result<(), TemplateError> {
    for item in seq {
        if let Yaml::Mapping(map) = item {
            if let Some(concat) = map.get(Yaml::String("$concat".into())) {
                let expanded = expand_structural(concat, ctx, mode)?;
                if let Yaml::Sequence(items) = expanded {
                    out.extend(items);
                }
                continue;
            }
        }
        let expanded = expand_structural(item, ctx, mode)?;
        if expanded != Yaml::Null {
            out.push(expanded);
        }
    }
    Ok(())
}

fn template_value_to_yaml(v: &TemplateValue) -> Yaml {
    match v {
        TemplateValue::Null => Yaml::Null,
        TemplateValue::Bool(b) => Yaml::Bool(*b),
        TemplateValue::Number(n) => serde_yaml::to_value(n).unwrap_or(Yaml::Null),
        TemplateValue::String(s) => Yaml::String(s.to_string()),
        TemplateValue::List(l) => Yaml::Sequence(l.iter().map(template_value_to_yaml).collect()),
        TemplateValue::Map(m) => {
            let mut mapping = serde_yaml::Mapping::new();
            for (k, v) in m {
                mapping.insert(Yaml::String(k.to_string()), template_value_to_yaml(v));
            }
            Yaml::Mapping(mapping)
        }
    }
}
