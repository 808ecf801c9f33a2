//! `TemplateValue`: the tagged union every expression evaluates to.

use std::sync::Arc;

/// A resolved template value. Collections preserve insertion order, which
/// matters for `$merge` and for deterministic `join`/`jsonEncode` output.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    List(Vec<TemplateValue>),
    Map(Vec<(Arc<str>, TemplateValue)>),
}

impl TemplateValue {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        TemplateValue::String(s.into())
    }

    /// "Truthy" per the grammar: empty strings, empty collections, `null`,
    /// `0`, and `false` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Null => false,
            TemplateValue::Bool(b) => *b,
            TemplateValue::Number(n) => *n != 0.0,
            TemplateValue::String(s) => !s.is_empty(),
            TemplateValue::List(l) => !l.is_empty(),
            TemplateValue::Map(m) => !m.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TemplateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            TemplateValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TemplateValue]> {
        match self {
            TemplateValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Arc<str>, TemplateValue)]> {
        match self {
            TemplateValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn get_map_field(&self, key: &str) -> Option<&TemplateValue> {
        self.as_map()?.iter().find(|(k, _)| &**k == key).map(|(_, v)| v)
    }

    /// Renders the value as it would appear when concatenated into a
    /// surrounding string template.
    pub fn to_display_string(&self) -> String {
        match self {
            TemplateValue::Null => String::new(),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Number(n) => format_number(*n),
            TemplateValue::String(s) => s.to_string(),
            TemplateValue::List(_) | TemplateValue::Map(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TemplateValue::Null => serde_json::Value::Null,
            TemplateValue::Bool(b) => serde_json::Value::Bool(*b),
            TemplateValue::Number(n) => serde_json::json!(n),
            TemplateValue::String(s) => serde_json::Value::String(s.to_string()),
            TemplateValue::List(l) => serde_json::Value::Array(l.iter().map(|v| v.to_json()).collect()),
            TemplateValue::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m {
                    obj.insert(k.to_string(), v.to_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => TemplateValue::Null,
            serde_json::Value::Bool(b) => TemplateValue::Bool(*b),
            serde_json::Value::Number(n) => TemplateValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => TemplateValue::String(s.as_str().into()),
            serde_json::Value::Array(a) => TemplateValue::List(a.iter().map(TemplateValue::from_json).collect()),
            serde_json::Value::Object(o) => {
                TemplateValue::Map(o.iter().map(|(k, v)| (k.as_str().into(), TemplateValue::from_json(v))).collect())
            }
        }
    }

    pub fn from_yaml(v: &serde_yaml::Value) -> Self {
        match v {
            serde_yaml::Value::Null => TemplateValue::Null,
            serde_yaml::Value::Bool(b) => TemplateValue::Bool(*b),
            serde_yaml::Value::Number(n) => TemplateValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_yaml::Value::String(s) => TemplateValue::String(s.as_str().into()),
            serde_yaml::Value::Sequence(seq) => TemplateValue::List(seq.iter().map(TemplateValue::from_yaml).collect()),
            serde_yaml::Value::Mapping(map) => TemplateValue::Map(
                map.iter()
                    .filter_map(|(k, v)| k.as_str().map(|k| (Arc::from(k), TemplateValue::from_yaml(v))))
                    .collect(),
            ),
            serde_yaml::Value::Tagged(t) => TemplateValue::from_yaml(&t.value),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
