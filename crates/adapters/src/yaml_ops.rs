//! Structured YAML/JSON merge and variable templating — the only two
//! content-transforming operations the engine performs, both funneled
//! through this adapter (spec §1, §6).

use std::collections::BTreeMap;

use serde_yaml::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse document")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to serialize document")]
    Serialize(serde_yaml::Error),

    #[error("undefined template variable {0:?}")]
    UndefinedVariable(String),

    #[error("unterminated conditional block for {0:?}")]
    UnterminatedConditional(String),
}

/// A loaded structured document — wraps `serde_yaml::Value` so JSON and
/// YAML share the same merge/dump machinery (JSON is valid YAML).
#[derive(Debug, Clone, PartialEq)]
pub struct Doc(pub Value);

impl Doc {
    pub fn load(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self(serde_yaml::from_slice(bytes)?))
    }

    /// Canonical dump: insertion order preserved (serde_yaml::Mapping is
    /// order-preserving), trailing newline, UTF-8, LF line endings.
    pub fn dump(&self) -> Result<Vec<u8>, Error> {
        let mut text = serde_yaml::to_string(&self.0).map_err(Error::Serialize)?;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        // serde_yaml never emits CRLF, but normalize defensively in case a
        // loaded document carried literal \r\n in a block scalar.
        let text = text.replace("\r\n", "\n");
        Ok(text.into_bytes())
    }
}

/// Merge `overlay` onto `base` per the identity-preserving rules:
/// - mappings deep-merge key-wise; user-authored keys absent from overlay
///   are always retained
/// - scalars: overlay wins
/// - lists of mappings with a stable identity key (`id`, `name`, `repo`):
///   entries with matching identity deep-merge; others append in
///   base-then-overlay-new order
/// - lists of scalars: set-union, base order preserved
pub fn merge(base: Doc, overlay: Doc) -> Doc {
    Doc(merge_value(base.0, overlay.0))
}

const IDENTITY_KEYS: [&str; 3] = ["id", "name", "repo"];

fn merge_value(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            let mut result = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.get(&key) {
                    Some(base_value) => merge_value(base_value.clone(), overlay_value),
                    None => overlay_value,
                };
                result.insert(key, merged);
            }
            Value::Mapping(result)
        }
        (Value::Sequence(base_seq), Value::Sequence(overlay_seq)) => merge_sequence(base_seq, overlay_seq),
        // Scalars (and any type mismatch): overlay wins.
        (_, overlay) => overlay,
    }
}

fn identity_of(value: &Value) -> Option<(&'static str, Value)> {
    let Value::Mapping(map) = value else { return None };
    for key in IDENTITY_KEYS {
        if let Some(v) = map.get(Value::String(key.to_string())) {
            return Some((key, v.clone()));
        }
    }
    None
}

fn merge_sequence(base: Vec<Value>, overlay: Vec<Value>) -> Value {
    let all_scalars = base.iter().chain(overlay.iter()).all(|v| identity_of(v).is_none() && !matches!(v, Value::Mapping(_)));

    if all_scalars {
        let mut result = base.clone();
        for item in overlay {
            if !result.contains(&item) {
                result.push(item);
            }
        }
        return Value::Sequence(result);
    }

    // Lists of mappings: merge by identity key where present, append new.
    let mut result = Vec::with_capacity(base.len() + overlay.len());
    let mut consumed = vec![false; overlay.len()];

    for base_item in base {
        let base_id = identity_of(&base_item);
        if let Some((key, id)) = &base_id {
            if let Some((idx, overlay_item)) = overlay
                .iter()
                .enumerate()
                .find(|(i, v)| !consumed[*i] && identity_of(v).as_ref().is_some_and(|(k, v)| k == key && v == id))
            {
                consumed[idx] = true;
                result.push(merge_value(base_item, overlay_item.clone()));
                continue;
            }
        }
        result.push(base_item);
    }

    for (idx, overlay_item) in overlay.into_iter().enumerate() {
        if !consumed[idx] {
            result.push(overlay_item);
        }
    }

    Value::Sequence(result)
}

/// Render `${name}` references against `vars`, and `${?name}…${/name}`
/// conditional blocks (body included iff `name` is truthy: present and
/// not `"false"`/empty). Undefined variables are a hard error — no
/// arbitrary expressions, no other control flow.
pub fn template(source: &str, vars: &BTreeMap<String, String>) -> Result<String, Error> {
    let without_conditionals = render_conditionals(source, vars)?;
    render_variables(&without_conditionals, vars)
}

fn render_conditionals(source: &str, vars: &BTreeMap<String, String>) -> Result<String, Error> {
    let mut output = String::with_capacity(source.len());
    let mut rest = source;

    loop {
        let Some(start) = rest.find("${?") else {
            output.push_str(rest);
            break;
        };

        output.push_str(&rest[..start]);
        let after_open = &rest[start + 3..];
        let Some(name_end) = after_open.find('}') else {
            return Err(Error::UnterminatedConditional(after_open.to_string()));
        };
        let name = &after_open[..name_end];
        let body_start = &after_open[name_end + 1..];

        let close_tag = format!("${{/{name}}}");
        let Some(close_idx) = body_start.find(&close_tag) else {
            return Err(Error::UnterminatedConditional(name.to_string()));
        };

        let body = &body_start[..close_idx];
        if is_truthy(vars.get(name)) {
            output.push_str(&render_conditionals(body, vars)?);
        }

        rest = &body_start[close_idx + close_tag.len()..];
    }

    Ok(output)
}

fn is_truthy(value: Option<&String>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "false")
}

fn render_variables(source: &str, vars: &BTreeMap<String, String>) -> Result<String, Error> {
    let mut output = String::with_capacity(source.len());
    let mut rest = source;

    loop {
        let Some(start) = rest.find("${") else {
            output.push_str(rest);
            break;
        };

        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find('}') else {
            output.push_str(&rest[start..]);
            break;
        };

        let name = &after_open[..end];
        let value = vars.get(name).ok_or_else(|| Error::UndefinedVariable(name.to_string()))?;
        output.push_str(value);

        rest = &after_open[end + 1..];
    }

    Ok(output)
}
