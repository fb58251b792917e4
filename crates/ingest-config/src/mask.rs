use ingest_domain::ConfigSpec;
use serde_json::Value;

/// Fixed replacement used for every masked leaf, regardless of its original
/// value — callers must never infer anything (even length) about a secret
/// from its masked form.
pub const MASK: &str = "********";

/// Deep-copy `raw`, replacing every leaf addressed by a `sensitive` field in
/// `spec` with [`MASK`].
pub fn mask_sensitive_fields(raw: &Value, spec: &ConfigSpec) -> Value {
    let mut out = raw.clone();
    for (path, field) in spec.walk() {
        if field.sensitive {
            mask_path(&mut out, &path);
        }
    }
    out
}

fn mask_path(root: &mut Value, path: &str) {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else { return };
    mask_rec(root, first, segments);
}

fn mask_rec<'a>(node: &mut Value, key: &str, mut rest: impl Iterator<Item = &'a str>) {
    let Value::Object(map) = node else { return };
    let Some(child) = map.get_mut(key) else { return };
    match rest.next() {
        Some(next) => mask_rec(child, next, rest),
        None => mask_leaf(child),
    }
}

fn mask_leaf(value: &mut Value) {
    match value {
        Value::String(_) => *value = Value::String(MASK.to_string()),
        Value::Array(items) => {
            for item in items.iter_mut() {
                if item.is_string() {
                    *item = Value::String(MASK.to_string());
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_domain::ConfigField;
    use serde_json::json;

    #[test]
    fn masks_sensitive_leaves_only() {
        let spec = ConfigSpec::new(vec![
            ConfigField::string("bucket"),
            ConfigField::password("api_key"),
            ConfigField::object("credentials", vec![ConfigField::password("secret")]),
        ]);
        let raw = json!({
            "bucket": "my-bucket",
            "api_key": "sk-live-123",
            "credentials": { "secret": "s3cr3t" },
        });
        let masked = mask_sensitive_fields(&raw, &spec);
        assert_eq!(masked["bucket"], "my-bucket");
        assert_eq!(masked["api_key"], MASK);
        assert_eq!(masked["credentials"]["secret"], MASK);
    }
}
