//! Path evaluation and `{{expr}}` interpolation against an execution scope.
//!
//! Paths are dotted, with bracketed segments for indices and quoted keys:
//! `trigger.items[0].name`, `outputs["fetch-user"].body`. The first segment
//! selects the root (`trigger`, `outputs`, `variables`, `loop`, `current`, `error`).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static TEMPLATE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").ok());

/// Anything that can resolve a path under one of the named roots.
pub trait Scope {
    /// Resolves `segments` under `root`; `None` means undefined.
    fn resolve(
        &self,
        root: &str,
        segments: &[String],
    ) -> Option<Value>;
}

/// A plain JSON object works as a scope; its top-level keys are the roots.
impl Scope for Value {
    fn resolve(
        &self,
        root: &str,
        segments: &[String],
    ) -> Option<Value> {
        self.get(root).and_then(|v| walk(v, segments))
    }
}

/// Splits a path on `.` outside brackets; bracket contents become their own segment.
pub fn tokenize(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                let inner = inner.trim();
                let unquoted = inner.trim_matches(|c| c == '"' || c == '\'');
                segments.push(unquoted.to_string());
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Follows `segments` down from `value`. Arrays accept numeric indices and `length`.
pub fn walk(
    value: &Value,
    segments: &[String],
) -> Option<Value> {
    let mut current = value;
    for (i, segment) in segments.iter().enumerate() {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(idx) => items.get(idx)?,
                Err(_) if segment == "length" && i + 1 == segments.len() => return Some(Value::from(items.len())),
                Err(_) => return None,
            },
            Value::String(s) if segment == "length" && i + 1 == segments.len() => return Some(Value::from(s.chars().count())),
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Resolves `path` against `scope`. Never fails; undefined yields `None`.
pub fn evaluate(
    path: &str,
    scope: &dyn Scope,
) -> Option<Value> {
    let segments = tokenize(path.trim());
    let (root, rest) = segments.split_first()?;
    scope.resolve(root, rest)
}

/// [`evaluate`] with a fallback for undefined paths.
pub fn evaluate_or(
    path: &str,
    scope: &dyn Scope,
    default: Value,
) -> Value {
    evaluate(path, scope).unwrap_or(default)
}

/// Renders every `{{expr}}` inside `value`.
///
/// A string made of exactly one expression keeps the resolved value's type;
/// embedded expressions are stringified. Unresolved expressions stay literal.
pub fn render(
    value: &Value,
    scope: &dyn Scope,
) -> Value {
    match value {
        Value::String(s) => render_str(s, scope),
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, scope)).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), render(v, scope))).collect::<Map<_, _>>()),
        other => other.clone(),
    }
}

/// Renders a template string and always returns text.
pub fn render_string(
    template: &str,
    scope: &dyn Scope,
) -> String {
    stringify(&render_str(template, scope))
}

fn render_str(
    template: &str,
    scope: &dyn Scope,
) -> Value {
    let Some(re) = TEMPLATE_PATTERN.as_ref() else {
        return Value::String(template.to_string());
    };
    if !template.contains("{{") {
        return Value::String(template.to_string());
    }

    if let Some(caps) = re.captures(template.trim())
        && caps.get(0).map(|m| m.as_str().len()) == Some(template.trim().len())
    {
        return match evaluate(&caps[1], scope) {
            Some(v) => v,
            None => Value::String(template.to_string()),
        };
    }

    let rendered = re.replace_all(template, |caps: &regex::Captures| match evaluate(&caps[1], scope) {
        Some(v) => stringify(&v),
        None => caps[0].to_string(),
    });
    Value::String(rendered.into_owned())
}

/// Text form used for interpolation: strings verbatim, everything else as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JavaScript truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
