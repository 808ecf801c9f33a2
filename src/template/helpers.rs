//! Fixed helper-function registry. Each helper has a declared arity;
//! wrong arity or wrong argument type fails with `TemplateError`.

use super::value::TemplateValue;
use crate::error::TemplateError;
use base64::Engine;

type HelperResult = Result<TemplateValue, TemplateError>;

pub fn call(name: &str, args: &[TemplateValue]) -> HelperResult {
    match name {
        "camelCase" => unary_str(name, args, to_camel_case),
        "kebabCase" => unary_str(name, args, |s| to_delim_case(s, '-')),
        "snakeCase" => unary_str(name, args, |s| to_delim_case(s, '_')),
        "lower" => unary_str(name, args, |s| s.to_lowercase()),
        "upper" => unary_str(name, args, |s| s.to_uppercase()),
        "trim" => unary_str(name, args, |s| s.trim().to_string()),
        "isEmpty" => {
            arity(name, args, 1)?;
            Ok(TemplateValue::Bool(!args[0].is_truthy()))
        }
        "join" => {
            arity(name, args, 2)?;
            let list = args[0].as_list().ok_or_else(|| wrong_type(name, "first argument must be a list"))?;
            let sep = args[1].as_str().ok_or_else(|| wrong_type(name, "second argument must be a string"))?;
            let joined = list.iter().map(|v| v.to_display_string()).collect::<Vec<_>>().join(sep);
            Ok(TemplateValue::string(joined))
        }
        "split" => {
            arity(name, args, 2)?;
            let s = args[0].as_str().ok_or_else(|| wrong_type(name, "first argument must be a string"))?;
            let sep = args[1].as_str().ok_or_else(|| wrong_type(name, "second argument must be a string"))?;
            Ok(TemplateValue::List(s.split(sep).map(TemplateValue::string).collect()))
        }
        "replace" => {
            arity(name, args, 3)?;
            let s = args[0].as_str().ok_or_else(|| wrong_type(name, "first argument must be a string"))?;
            let from = args[1].as_str().ok_or_else(|| wrong_type(name, "second argument must be a string"))?;
            let to = args[2].as_str().ok_or_else(|| wrong_type(name, "third argument must be a string"))?;
            Ok(TemplateValue::string(s.replace(from, to)))
        }
        "slice" => {
            arity(name, args, 3)?;
            let s = args[0].as_str().ok_or_else(|| wrong_type(name, "first argument must be a string"))?;
            let start = args[1].as_number().ok_or_else(|| wrong_type(name, "start must be a number"))? as usize;
            let end = args[2].as_number().ok_or_else(|| wrong_type(name, "end must be a number"))? as usize;
            let chars: Vec<char> = s.chars().collect();
            let end = end.min(chars.len());
            let start = start.min(end);
            Ok(TemplateValue::string(chars[start..end].iter().collect::<String>()))
        }
        "jsonEncode" => {
            arity(name, args, 1)?;
            Ok(TemplateValue::string(serde_json::to_string(&args[0].to_json()).unwrap_or_default()))
        }
        "jsonDecode" => {
            arity(name, args, 1)?;
            let s = args[0].as_str().ok_or_else(|| wrong_type(name, "argument must be a string"))?;
            let parsed: serde_json::Value = serde_json::from_str(s)
                .map_err(|e| wrong_type(name, &format!("invalid JSON: {e}")))?;
            Ok(TemplateValue::from_json(&parsed))
        }
        "yamlEncode" => {
            arity(name, args, 1)?;
            Ok(TemplateValue::string(serde_yaml::to_string(&args[0].to_json()).unwrap_or_default()))
        }
        "yamlDecode" => {
            arity(name, args, 1)?;
            let s = args[0].as_str().ok_or_else(|| wrong_type(name, "argument must be a string"))?;
            let parsed: serde_yaml::Value = serde_yaml::from_str(s)
                .map_err(|e| wrong_type(name, &format!("invalid YAML: {e}")))?;
            Ok(TemplateValue::from_yaml(&parsed))
        }
        "base64Encode" => unary_str(name, args, |s| base64::engine::general_purpose::STANDARD.encode(s)),
        "base64Decode" => {
            arity(name, args, 1)?;
            let s = args[0].as_str().ok_or_else(|| wrong_type(name, "argument must be a string"))?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|e| wrong_type(name, &format!("invalid base64: {e}")))?;
            let decoded = String::from_utf8(bytes).map_err(|e| wrong_type(name, &format!("invalid UTF-8: {e}")))?;
            Ok(TemplateValue::string(decoded))
        }
        "indent" => {
            arity(name, args, 2)?;
            let s = args[0].as_str().ok_or_else(|| wrong_type(name, "first argument must be a string"))?;
            let n = args[1].as_number().ok_or_else(|| wrong_type(name, "second argument must be a number"))? as usize;
            let prefix = " ".repeat(n);
            Ok(TemplateValue::string(
                s.lines().map(|l| format!("{prefix}{l}")).collect::<Vec<_>>().join("\n"),
            ))
        }
        "formatDate" => {
            arity(name, args, 1)?;
            let fmt = args[0].as_str().ok_or_else(|| wrong_type(name, "argument must be a format string"))?;
            Ok(TemplateValue::string(chrono::Local::now().format(fmt).to_string()))
        }
        "uuidv4" => {
            arity(name, args, 0)?;
            Ok(TemplateValue::string(uuid::Uuid::new_v4().to_string()))
        }
        other => Err(TemplateError::Arity { name: other.to_string(), expected: 0, got: args.len() }),
    }
}

fn arity(name: &str, args: &[TemplateValue], expected: usize) -> Result<(), TemplateError> {
    if args.len() != expected {
        return Err(TemplateError::Arity { name: name.to_string(), expected, got: args.len() });
    }
    Ok(())
}

fn wrong_type(name: &str, message: &str) -> TemplateError {
    TemplateError::WrongType { name: name.to_string(), message: message.to_string() }
}

fn unary_str(name: &str, args: &[TemplateValue], f: impl Fn(&str) -> String) -> HelperResult {
    arity(name, args, 1)?;
    let s = args[0].as_str().ok_or_else(|| wrong_type(name, "argument must be a string"))?;
    Ok(TemplateValue::string(f(s)))
}

fn to_delim_case(s: &str, delim: char) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in s.chars() {
        if c == '-' || c == '_' || c.is_whitespace() {
            if !out.is_empty() {
                out.push(delim);
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            out.push(delim);
        }
        out.push(c.to_ascii_lowercase());
        prev_lower = c.is_lowercase() || c.is_numeric();
    }
    out
}

fn to_camel_case(s: &str) -> String {
    let snake = to_delim_case(s, '_');
    let mut parts = snake.split('_');
    let mut out = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
