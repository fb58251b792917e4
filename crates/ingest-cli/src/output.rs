use serde_json::Value;

/// Render a list of schedules as a fixed-width table.
pub fn render_schedules_table(schedules: &[Value]) -> String {
    if schedules.is_empty() {
        return "No schedules.\n".to_string();
    }
    let mut out = format!("{:<38} {:<20} {:<16} {:<8} {}\n", "ID", "NAME", "PLUGIN", "ENABLED", "NEXT RUN");
    out.push_str(&"-".repeat(100));
    out.push('\n');
    for s in schedules {
        out.push_str(&format!(
            "{:<38} {:<20} {:<16} {:<8} {}\n",
            s.get("id").and_then(Value::as_str).unwrap_or("-"),
            s.get("name").and_then(Value::as_str).unwrap_or("-"),
            s.get("plugin_id").and_then(Value::as_str).unwrap_or("-"),
            s.get("enabled").map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            s.get("next_run_at").and_then(Value::as_str).unwrap_or("-"),
        ));
    }
    out
}

/// Render a list of job runs as a fixed-width table.
pub fn render_jobs_table(jobs: &[Value]) -> String {
    if jobs.is_empty() {
        return "No job runs.\n".to_string();
    }
    let mut out = format!("{:<38} {:<10} {:<24} {}\n", "ID", "STATUS", "STARTED", "ERROR");
    out.push_str(&"-".repeat(100));
    out.push('\n');
    for j in jobs {
        out.push_str(&format!(
            "{:<38} {:<10} {:<24} {}\n",
            j.get("id").and_then(Value::as_str).unwrap_or("-"),
            j.get("status").and_then(Value::as_str).unwrap_or("-"),
            j.get("started_at").and_then(Value::as_str).unwrap_or("-"),
            j.get("error_message").and_then(Value::as_str).unwrap_or(""),
        ));
    }
    out
}

/// Render a validation response `{valid, errors: [{field, message}]}`.
pub fn render_validation(body: &Value) -> String {
    let valid = body.get("valid").and_then(Value::as_bool).unwrap_or(false);
    if valid {
        return "valid\n".to_string();
    }
    let mut out = String::from("invalid:\n");
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        for e in errors {
            let field = e.get("field").and_then(Value::as_str).unwrap_or("?");
            let message = e.get("message").and_then(Value::as_str).unwrap_or("?");
            out.push_str(&format!("  {field}: {message}\n"));
        }
    }
    out
}
