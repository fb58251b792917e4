use serde_json::Value;

use crate::envelope::Encryptor;
use crate::error::SecretsError;

/// Apply `f` to every string leaf reachable by following `path` (dot-separated,
/// e.g. `credentials.region`) into `root`. If the leaf is an array, `f` is
/// applied to every string element. Missing paths are a no-op.
fn visit_path(root: &mut Value, path: &str, f: &impl Fn(&str) -> Result<String, SecretsError>) -> Result<(), SecretsError> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else { return Ok(()) };
    visit_rec(root, first, segments, f)
}

fn visit_rec<'a>(
    node: &mut Value,
    key: &str,
    mut rest: impl Iterator<Item = &'a str>,
    f: &impl Fn(&str) -> Result<String, SecretsError>,
) -> Result<(), SecretsError> {
    let Value::Object(map) = node else { return Ok(()) };
    let Some(child) = map.get_mut(key) else { return Ok(()) };

    match rest.next() {
        Some(next_key) => visit_rec(child, next_key, rest, f),
        None => apply_leaf(child, f),
    }
}

fn apply_leaf(value: &mut Value, f: &impl Fn(&str) -> Result<String, SecretsError>) -> Result<(), SecretsError> {
    match value {
        Value::String(s) => {
            *s = f(s)?;
            Ok(())
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Value::String(s) = item {
                    *s = f(s)?;
                }
            }
            Ok(())
        }
        // Non-string leaves (numbers, bools, null, nested objects) are left
        // untouched — only string-typed fields are ever marked sensitive.
        _ => Ok(()),
    }
}

/// Encrypt every string leaf addressed by `fields` (dotted paths) in `config`.
/// Missing fields and already-encrypted values are no-ops.
pub fn encrypt_map(encryptor: &Encryptor, config: &Value, fields: &[String]) -> Result<Value, SecretsError> {
    let mut out = config.clone();
    for path in fields {
        visit_path(&mut out, path, &|s| encryptor.encrypt(s))?;
    }
    Ok(out)
}

/// Inverse of [`encrypt_map`]. Missing fields and already-plaintext values are
/// no-ops.
pub fn decrypt_map(encryptor: &Encryptor, config: &Value, fields: &[String]) -> Result<Value, SecretsError> {
    let mut out = config.clone();
    for path in fields {
        visit_path(&mut out, path, &|s| encryptor.decrypt(s))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encrypts_and_decrypts_nested_field() {
        let enc = Encryptor::new([9u8; 32]);
        let config = json!({
            "region": "us-east-1",
            "credentials": { "access_key": "AK", "secret_key": "super-secret" },
        });
        let fields = vec!["credentials.secret_key".to_string()];

        let encrypted = encrypt_map(&enc, &config, &fields).unwrap();
        assert_ne!(encrypted["credentials"]["secret_key"], config["credentials"]["secret_key"]);
        assert_eq!(encrypted["credentials"]["access_key"], "AK");

        let decrypted = decrypt_map(&enc, &encrypted, &fields).unwrap();
        assert_eq!(decrypted, config);
    }

    #[test]
    fn missing_field_is_noop() {
        let enc = Encryptor::new([3u8; 32]);
        let config = json!({ "region": "us-east-1" });
        let out = encrypt_map(&enc, &config, &["credentials.secret_key".to_string()]).unwrap();
        assert_eq!(out, config);
    }

    #[test]
    fn array_of_sensitive_strings() {
        let enc = Encryptor::new([5u8; 32]);
        let config = json!({ "tokens": ["a", "b"] });
        let encrypted = encrypt_map(&enc, &config, &["tokens".to_string()]).unwrap();
        let decrypted = decrypt_map(&enc, &encrypted, &["tokens".to_string()]).unwrap();
        assert_eq!(decrypted, config);
    }
}
