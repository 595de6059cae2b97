use serde_json::{Map, Number, Value};

use super::registry::{MethodSpec, ParamKind, ParamSpec};

/// Builds the method-specific request parameters: every declared parameter is
/// present, overrides are coerced to the declared type and clamped, and keys the
/// method does not declare are dropped.
pub fn resolve_params(method: &MethodSpec, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut resolved = Map::new();
    for param in &method.params {
        let value = overrides
            .get(&param.name)
            .and_then(|raw| coerce(param, raw))
            .unwrap_or_else(|| default_value(param));
        resolved.insert(param.name.clone(), value);
    }
    resolved
}

pub fn default_value(param: &ParamSpec) -> Value {
    match &param.kind {
        ParamKind::Float { default, .. } => float_value(*default),
        ParamKind::Int { default, .. } => Value::from(*default),
        ParamKind::Choice { default, .. } => Value::String(default.clone()),
        ParamKind::Flag { default } => Value::Bool(*default),
    }
}

fn coerce(param: &ParamSpec, raw: &Value) -> Option<Value> {
    match &param.kind {
        ParamKind::Float { min, max, .. } => {
            value_as_f64(raw).map(|value| float_value(value.clamp(*min, *max)))
        }
        ParamKind::Int { min, max, .. } => {
            value_as_i64(raw).map(|value| Value::from(value.clamp(*min, *max)))
        }
        ParamKind::Choice { options, .. } => {
            let text = match raw {
                Value::String(value) => value.trim().to_string(),
                Value::Number(value) => value.to_string(),
                _ => return None,
            };
            options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(&text))
                .map(|option| Value::String(option.clone()))
        }
        ParamKind::Flag { .. } => value_as_bool(raw).map(Value::Bool),
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|value| value.is_finite())
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value.trunc() as i64)),
        Value::String(text) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|value| value.trunc() as i64))
        }
        _ => None,
    }
}

fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|value| value != 0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
