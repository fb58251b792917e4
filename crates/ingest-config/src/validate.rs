use ingest_domain::{ConfigField, ConfigFieldType, ConfigSpec, FieldError};
use regex::Regex;
use serde_json::Value;

/// Validate `raw` against `spec`, returning the typed config (the raw tree
/// with defaults filled in for missing optional fields) on success.
///
/// Unknown fields in `raw` are preserved — validation augments the tree in
/// place rather than rebuilding a stripped-down one, so downstream plugins
/// may still read fields the spec doesn't describe.
pub fn validate_config(raw: &Value, spec: &ConfigSpec) -> Result<Value, Vec<FieldError>> {
    let mut typed = raw.clone();
    let mut errors = Vec::new();
    validate_fields(&spec.fields, &mut typed, "", &mut errors);
    if errors.is_empty() {
        Ok(typed)
    } else {
        Err(errors)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn validate_fields(fields: &[ConfigField], node: &mut Value, prefix: &str, errors: &mut Vec<FieldError>) {
    if !node.is_object() {
        *node = Value::Object(serde_json::Map::new());
    }

    for field in fields {
        let path = join(prefix, &field.name);
        let map = node.as_object_mut().expect("just ensured object");
        let missing = !matches!(map.get(&field.name), Some(v) if !v.is_null());

        if missing {
            if field.required {
                errors.push(FieldError::new(path, "is required"));
                continue;
            }
            match &field.default {
                Some(default) => {
                    map.insert(field.name.clone(), default.clone());
                }
                None => continue,
            }
        }

        let map = node.as_object_mut().expect("just ensured object");
        let value = map.get(&field.name).cloned().expect("just inserted or present");
        validate_field_type(field, &value, &path, errors);

        if let Some(nested_fields) = &field.fields {
            let map = node.as_object_mut().expect("just ensured object");
            if let Some(child) = map.get_mut(&field.name) {
                if field.is_array {
                    if let Value::Array(items) = child {
                        for (i, item) in items.iter_mut().enumerate() {
                            validate_fields(nested_fields, item, &format!("{path}[{i}]"), errors);
                        }
                    }
                } else {
                    validate_fields(nested_fields, child, &path, errors);
                }
            }
        }
    }
}

fn validate_field_type(field: &ConfigField, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    match field.r#type {
        ConfigFieldType::String | ConfigFieldType::Password => match value {
            Value::String(s) => validate_string_constraints(field, s, path, errors),
            _ => errors.push(FieldError::new(path, "must be a string")),
        },
        ConfigFieldType::Int => match value.as_i64() {
            Some(n) => validate_numeric_constraints(field, n as f64, path, errors),
            None => errors.push(FieldError::new(path, "must be an integer")),
        },
        ConfigFieldType::Bool => {
            if !value.is_boolean() {
                errors.push(FieldError::new(path, "must be a boolean"));
            }
        }
        ConfigFieldType::Select => match value {
            Value::String(s) => check_option(field, s, path, errors),
            _ => errors.push(FieldError::new(path, "must be a string")),
        },
        ConfigFieldType::Multiselect => match value {
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => check_option(field, s, path, errors),
                        _ => {
                            errors.push(FieldError::new(path, "must be an array of strings"));
                            break;
                        }
                    }
                }
            }
            _ => errors.push(FieldError::new(path, "must be an array")),
        },
        ConfigFieldType::Object => {
            let ok = if field.is_array { value.is_array() } else { value.is_object() };
            if !ok {
                errors.push(FieldError::new(path, if field.is_array { "must be an array" } else { "must be an object" }));
            }
        }
    }
}

fn check_option(field: &ConfigField, s: &str, path: &str, errors: &mut Vec<FieldError>) {
    if let Some(options) = &field.options {
        if !options.iter().any(|o| o == s) {
            errors.push(FieldError::new(path, format!("must be one of: {}", options.join(", "))));
        }
    }
}

fn validate_string_constraints(field: &ConfigField, s: &str, path: &str, errors: &mut Vec<FieldError>) {
    let Some(v) = &field.validation else { return };
    if let Some(min_len) = v.min_len {
        if s.chars().count() < min_len {
            errors.push(FieldError::new(path, format!("must be at least {min_len} characters")));
        }
    }
    if let Some(max_len) = v.max_len {
        if s.chars().count() > max_len {
            errors.push(FieldError::new(path, format!("must be at most {max_len} characters")));
        }
    }
    if let Some(pattern) = &v.pattern {
        if pattern == "url" {
            if !(s.starts_with("http://") || s.starts_with("https://")) {
                errors.push(FieldError::new(path, "must be a valid URL"));
            }
        } else if let Ok(re) = Regex::new(pattern) {
            if !re.is_match(s) {
                errors.push(FieldError::new(path, format!("must match pattern: {pattern}")));
            }
        }
    }
}

fn validate_numeric_constraints(field: &ConfigField, n: f64, path: &str, errors: &mut Vec<FieldError>) {
    let Some(v) = &field.validation else { return };
    if let Some(min) = v.min {
        if n < min {
            errors.push(FieldError::new(path, format!("must be at least {min}")));
        }
    }
    if let Some(max) = v.max {
        if n > max {
            errors.push(FieldError::new(path, format!("must be at most {max}")));
        }
    }
}
