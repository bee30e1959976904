//! Minimal JSON Schema validation.
//!
//! Supports the keywords config schemas in this project use: `type`,
//! `required`, `properties`, `additionalProperties`, `items`, `enum`,
//! `minLength`, `maxLength`, `minimum` and `maximum`. Unknown keywords are
//! ignored, matching JSON Schema draft-07.

use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Validates `instance` against `schema`, reporting every violation found.
pub fn validate(schema: &Value, instance: &Value) -> Result<()> {
    let mut violations = Vec::new();
    check(schema, instance, "$", &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(violations.join("; ")))
    }
}

fn check(schema: &Value, instance: &Value, path: &str, out: &mut Vec<String>) {
    let rules = match schema {
        Value::Object(rules) => rules,
        // `true` accepts everything, `false` rejects everything
        Value::Bool(false) => {
            out.push(format!("{}: not allowed", path));
            return;
        }
        _ => return,
    };

    if let Some(expected) = rules.get("type") {
        if !type_matches(expected, instance) {
            out.push(format!("{}: expected type {}, got {}", path, expected, type_name(instance)));
            return;
        }
    }

    if let Some(Value::Array(allowed)) = rules.get("enum") {
        if !allowed.contains(instance) {
            out.push(format!("{}: value {} is not one of {}", path, instance, Value::Array(allowed.clone())));
        }
    }

    match instance {
        Value::String(s) => check_string(rules, s, path, out),
        Value::Number(n) => {
            if let Some(value) = n.as_f64() {
                check_number(rules, value, path, out);
            }
        }
        Value::Object(fields) => check_object(rules, fields, path, out),
        Value::Array(elements) => {
            if let Some(item_schema) = rules.get("items") {
                for (index, element) in elements.iter().enumerate() {
                    check(item_schema, element, &format!("{}[{}]", path, index), out);
                }
            }
        }
        _ => {}
    }
}

fn check_string(rules: &Map<String, Value>, s: &str, path: &str, out: &mut Vec<String>) {
    let len = s.chars().count() as u64;
    if let Some(min) = rules.get("minLength").and_then(Value::as_u64) {
        if len < min {
            out.push(format!("{}: string shorter than {} characters", path, min));
        }
    }
    if let Some(max) = rules.get("maxLength").and_then(Value::as_u64) {
        if len > max {
            out.push(format!("{}: string longer than {} characters", path, max));
        }
    }
}

fn check_number(rules: &Map<String, Value>, value: f64, path: &str, out: &mut Vec<String>) {
    if let Some(min) = rules.get("minimum").and_then(Value::as_f64) {
        if value < min {
            out.push(format!("{}: {} is below minimum {}", path, value, min));
        }
    }
    if let Some(max) = rules.get("maximum").and_then(Value::as_f64) {
        if value > max {
            out.push(format!("{}: {} is above maximum {}", path, value, max));
        }
    }
}

fn check_object(
    rules: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
    out: &mut Vec<String>,
) {
    if let Some(Value::Array(required)) = rules.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                out.push(format!("{}: missing required property '{}'", path, name));
            }
        }
    }

    let properties = rules.get("properties").and_then(Value::as_object);
    let additional = rules.get("additionalProperties");

    for (name, value) in fields {
        let child = format!("{}.{}", path, name);
        match properties.and_then(|p| p.get(name)) {
            Some(property_schema) => check(property_schema, value, &child, out),
            None => match additional {
                Some(Value::Bool(false)) => {
                    out.push(format!("{}: unexpected property '{}'", path, name));
                }
                Some(extra_schema @ Value::Object(_)) => check(extra_schema, value, &child, out),
                _ => {}
            },
        }
    }
}

fn type_matches(expected: &Value, instance: &Value) -> bool {
    match expected {
        Value::String(name) => is_type(name, instance),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| is_type(name, instance)),
        _ => true,
    }
}

fn is_type(name: &str, instance: &Value) -> bool {
    match name {
        "string" => instance.is_string(),
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "boolean" => instance.is_boolean(),
        "null" => instance.is_null(),
        "number" => instance.is_number(),
        "integer" => instance.is_i64() || instance.is_u64(),
        _ => false,
    }
}

fn type_name(instance: &Value) -> &'static str {
    match instance {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
