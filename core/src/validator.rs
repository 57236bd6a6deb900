use serde_json::Value;

use crate::error::CoreError;
use crate::error::Result;

/// The coercion target for a single tool parameter. Mirrors the type
/// vocabulary the original integration's parameter validator supported:
/// primitives, lists, objects, and an optional wrapper around any of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Optional(Box<ExpectedType>),
    /// A sum of candidate types, e.g. a parameter declared `int | str`. Each
    /// variant is tried in order; the first that coerces successfully wins.
    /// If every variant fails, the individual errors are aggregated into one.
    Union(Vec<ExpectedType>),
}

/// Coerces `value` for `param_name` into `expected`, following the same
/// forgiving rules as the original integration: strings are stringified,
/// numeric strings are parsed, common truthy/falsy tokens become booleans,
/// JSON-looking strings are parsed as lists/objects and comma-separated
/// strings fall back to lists.
pub fn validate_parameter(param_name: &str, value: &Value, expected: &ExpectedType) -> Result<Value> {
    if value.is_null() {
        return match expected {
            ExpectedType::Optional(_) => Ok(Value::Null),
            _ => Err(invalid(param_name, "value is required but was null")),
        };
    }

    match expected {
        ExpectedType::Optional(inner) => validate_parameter(param_name, value, inner),
        ExpectedType::Str => Ok(Value::String(stringify(value))),
        ExpectedType::Int => coerce_int(param_name, value),
        ExpectedType::Float => coerce_float(param_name, value),
        ExpectedType::Bool => coerce_bool(param_name, value),
        ExpectedType::List => coerce_list(param_name, value),
        ExpectedType::Dict => coerce_dict(param_name, value),
        ExpectedType::Union(variants) => coerce_union(param_name, value, variants),
    }
}

/// Tries each candidate type in order, returning the first successful
/// coercion. On total failure, aggregates every variant's error into one
/// message rather than surfacing only the last attempt's.
fn coerce_union(param_name: &str, value: &Value, variants: &[ExpectedType]) -> Result<Value> {
    let mut errors = Vec::with_capacity(variants.len());
    for variant in variants {
        match validate_parameter(param_name, value, variant) {
            Ok(coerced) => return Ok(coerced),
            Err(err) => errors.push(err.to_string()),
        }
    }
    Err(invalid(
        param_name,
        &format!("value did not match any of the expected types: {}", errors.join("; ")),
    ))
}

fn invalid(param_name: &str, reason: &str) -> CoreError {
    CoreError::InvalidParameter {
        name: param_name.to_string(),
        reason: reason.to_string(),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_int(param_name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::Number(n) => Err(invalid(
            param_name,
            &format!("expected an integer, got float {n}"),
        )),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(invalid(param_name, "expected an integer, got empty string"));
            }
            trimmed
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| invalid(param_name, &format!("cannot parse '{s}' as an integer")))
        }
        Value::Bool(b) => Ok(Value::Number((*b as i64).into())),
        other => Err(invalid(param_name, &format!("cannot coerce {other} to an integer"))),
    }
}

fn coerce_float(param_name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Number(n) => Ok(Value::Number(n.clone())),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(invalid(param_name, "expected a number, got empty string"));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid(param_name, &format!("cannot parse '{s}' as a number")))
        }
        Value::Bool(b) => Ok(Value::Number(serde_json::Number::from(if *b { 1 } else { 0 }))),
        other => Err(invalid(param_name, &format!("cannot coerce {other} to a number"))),
    }
}

fn coerce_bool(param_name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().unwrap_or(0.0) != 0.0)),
        Value::String(s) => {
            let normalized = s.trim().to_lowercase();
            match normalized.as_str() {
                "true" | "yes" | "1" | "t" | "y" => Ok(Value::Bool(true)),
                "false" | "no" | "0" | "f" | "n" => Ok(Value::Bool(false)),
                other => Err(invalid(param_name, &format!("cannot parse '{other}' as a boolean"))),
            }
        }
        other => Err(invalid(param_name, &format!("cannot coerce {other} to a boolean"))),
    }
}

fn coerce_list(param_name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Array(_) => Ok(value.clone()),
        Value::String(s) => {
            if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(s) {
                return Ok(parsed);
            }
            let items: Vec<Value> = s
                .split(',')
                .map(|item| item.trim())
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect();
            Ok(Value::Array(items))
        }
        other => Err(invalid(param_name, &format!("cannot coerce {other} to a list"))),
    }
}

fn coerce_dict(param_name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => Ok(parsed),
            _ => Err(invalid(param_name, &format!("'{s}' is not a JSON object"))),
        },
        other => Err(invalid(param_name, &format!("cannot coerce {other} to an object"))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_allows_null() {
        let result = validate_parameter(
            "comment",
            &Value::Null,
            &ExpectedType::Optional(Box::new(ExpectedType::Str)),
        );
        assert_eq!(result.unwrap(), Value::Null);
    }

    #[test]
    fn required_rejects_null() {
        let result = validate_parameter("course_id", &Value::Null, &ExpectedType::Str);
        assert!(result.is_err());
    }

    #[test]
    fn int_rejects_blank_string() {
        let result = validate_parameter("page", &json!("   "), &ExpectedType::Int);
        assert!(result.is_err());
    }

    #[test]
    fn int_parses_numeric_string() {
        let result = validate_parameter("page", &json!("42"), &ExpectedType::Int).unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn bool_accepts_common_tokens_case_insensitively() {
        for (token, expected) in [("YES", true), ("No", false), ("1", true), ("f", false)] {
            let result = validate_parameter("flag", &json!(token), &ExpectedType::Bool).unwrap();
            assert_eq!(result, json!(expected), "token {token}");
        }
    }

    #[test]
    fn list_parses_json_array_string() {
        let result = validate_parameter("ids", &json!("[1,2,3]"), &ExpectedType::List).unwrap();
        assert_eq!(result, json!([1, 2, 3]));
    }

    #[test]
    fn list_falls_back_to_comma_split_and_trims_empties() {
        let result = validate_parameter("ids", &json!("a, b,,c "), &ExpectedType::List).unwrap();
        assert_eq!(result, json!(["a", "b", "c"]));
    }

    #[test]
    fn dict_rejects_non_object_json_string() {
        let result = validate_parameter("payload", &json!("[1,2]"), &ExpectedType::Dict);
        assert!(result.is_err());
    }

    #[test]
    fn union_returns_first_matching_variant() {
        let expected = ExpectedType::Union(vec![ExpectedType::Int, ExpectedType::Str]);
        let result = validate_parameter("score", &json!("42"), &expected).unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn union_falls_through_to_a_later_variant() {
        let expected = ExpectedType::Union(vec![ExpectedType::Int, ExpectedType::Str]);
        let result = validate_parameter("score", &json!("excused"), &expected).unwrap();
        assert_eq!(result, json!("excused"));
    }

    #[test]
    fn union_aggregates_errors_when_every_variant_fails() {
        let expected = ExpectedType::Union(vec![ExpectedType::Int, ExpectedType::Bool]);
        let err = validate_parameter("flag", &json!("not-a-number-or-bool"), &expected).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("did not match any of the expected types"));
    }
}
