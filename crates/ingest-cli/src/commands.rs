use std::io::Read as IoRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use ingest_config::ProcessConfig;
use ingest_plugin::{DemoSource, PluginRegistry};
use ingest_secrets::Encryptor;
use ingest_store::{InMemoryCatalog, InMemoryStore};
use serde_json::Value;

use crate::output;

// ── Serve ─────────────────────────────────────────────────────────────────────

pub async fn serve(process: ProcessConfig) -> Result<()> {
    let encryptor = process
        .encryption_key
        .as_deref()
        .map(Encryptor::from_base64)
        .transpose()
        .context("invalid ENCRYPTION_KEY")?
        .map(Arc::new);
    if encryptor.is_none() {
        tracing::warn!("no ENCRYPTION_KEY configured; schedules with sensitive config fields cannot be created");
    }

    let registry = Arc::new(PluginRegistry::new());
    registry.register(Arc::new(DemoSource::new())).await.context("registering builtin plugins")?;

    let token = process.token.clone().unwrap_or_else(|| {
        tracing::warn!("no INGEST_TOKEN configured; generating an ephemeral one for this process");
        Encryptor::generate_key()
    });

    // `database_url` selects Postgres; its absence falls back to the
    // in-memory store for local/demo use. Both `ScheduleStore` and
    // `RunStore` are implemented by the same backing store, so the scheduler
    // and HTTP layer share one handle.
    if let Some(url) = &process.database_url {
        let store = Arc::new(ingest_store::PostgresStore::connect(url).await.context("connecting to Postgres")?);
        run_with_store(store, registry, encryptor, token, process).await
    } else {
        tracing::warn!("no DATABASE_URL configured; using the in-memory store (state does not survive a restart)");
        let store = Arc::new(InMemoryStore::new());
        run_with_store(store, registry, encryptor, token, process).await
    }
}

async fn run_with_store<S>(
    store: Arc<S>,
    registry: Arc<PluginRegistry>,
    encryptor: Option<Arc<Encryptor>>,
    token: String,
    process: ProcessConfig,
) -> Result<()>
where
    S: ingest_store::ScheduleStore + ingest_store::RunStore + 'static,
{
    let catalog = Arc::new(InMemoryCatalog::new());
    let scheduler_config = ingest_scheduler::SchedulerConfig::from(&process);

    let scheduler = ingest_scheduler::Scheduler::new(
        store.clone(),
        store.clone(),
        catalog.clone(),
        registry.clone(),
        encryptor.clone(),
        scheduler_config,
    );
    let handle = scheduler.start().await.context("starting scheduler")?;

    let app = ingest_api::build_app(store.clone(), store.clone(), catalog, registry, encryptor, Arc::new(token));

    let listener = tokio::net::TcpListener::bind(process.bind.as_str()).await.with_context(|| format!("binding {}", process.bind))?;
    tracing::info!(bind = %process.bind, "ingestion orchestrator listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await.context("server error")?;

    handle.stop().await;
    Ok(())
}

// ── Keys ──────────────────────────────────────────────────────────────────────

pub fn generate_encryption_key() -> Result<()> {
    println!("{}", Encryptor::generate_key());
    Ok(())
}

// ── Schedules ─────────────────────────────────────────────────────────────────

pub async fn schedule_create(
    url: &str,
    token: Option<String>,
    name: String,
    plugin_id: String,
    cron_expression: String,
    config_file: Option<String>,
    disabled: bool,
) -> Result<()> {
    let config = read_config_json(config_file)?;
    let body = serde_json::json!({
        "name": name,
        "plugin_id": plugin_id,
        "cron_expression": cron_expression,
        "config": config,
        "enabled": !disabled,
    });
    let resp: Value = post(url, token, "/ingestion/schedules", &body).await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

pub async fn schedule_list(url: &str, token: Option<String>, enabled: Option<bool>, limit: i64, offset: i64) -> Result<()> {
    let mut query = vec![format!("limit={limit}"), format!("offset={offset}")];
    if let Some(e) = enabled {
        query.push(format!("enabled={e}"));
    }
    let path = format!("/ingestion/schedules?{}", query.join("&"));
    let schedules: Vec<Value> = get(url, token, &path).await?;
    print!("{}", output::render_schedules_table(&schedules));
    Ok(())
}

pub async fn schedule_get(url: &str, token: Option<String>, id: String) -> Result<()> {
    let schedule: Value = get(url, token, &format!("/ingestion/schedules/{id}")).await?;
    println!("{}", serde_json::to_string_pretty(&schedule)?);
    Ok(())
}

pub async fn schedule_delete(url: &str, token: Option<String>, id: String) -> Result<()> {
    delete(url, token, &format!("/ingestion/schedules/{id}")).await?;
    println!("deleted {id}");
    Ok(())
}

pub async fn schedule_run(url: &str, token: Option<String>, id: String) -> Result<()> {
    let job_run: Value = post(url, token, &format!("/ingestion/schedules/{id}/run"), &Value::Null).await?;
    println!("{}", serde_json::to_string_pretty(&job_run)?);
    Ok(())
}

// ── Jobs ──────────────────────────────────────────────────────────────────────

pub async fn job_list(
    url: &str,
    token: Option<String>,
    schedule_id: Option<String>,
    status: Option<String>,
    limit: i64,
    offset: i64,
) -> Result<()> {
    let mut query = vec![format!("limit={limit}"), format!("offset={offset}")];
    if let Some(s) = schedule_id {
        query.push(format!("schedule_id={s}"));
    }
    if let Some(s) = status {
        query.push(format!("status={s}"));
    }
    let path = format!("/ingestion/jobs?{}", query.join("&"));
    let jobs: Vec<Value> = get(url, token, &path).await?;
    print!("{}", output::render_jobs_table(&jobs));
    Ok(())
}

pub async fn job_cancel(url: &str, token: Option<String>, id: String) -> Result<()> {
    let job_run: Value = post(url, token, &format!("/ingestion/jobs/{id}/cancel"), &Value::Null).await?;
    println!("{}", serde_json::to_string_pretty(&job_run)?);
    Ok(())
}

// ── Validate / plugins / destroy ──────────────────────────────────────────────

pub async fn validate(url: &str, token: Option<String>, plugin_id: String, config_file: Option<String>) -> Result<()> {
    let config = read_config_json(config_file)?;
    let body = serde_json::json!({ "plugin_id": plugin_id, "config": config });
    let resp: Value = post_allow_4xx(url, token, "/ingestion/validate", &body).await?;
    print!("{}", output::render_validation(&resp));
    Ok(())
}

pub async fn plugins(url: &str, token: Option<String>) -> Result<()> {
    let plugins: Value = get(url, token, "/plugins").await?;
    println!("{}", serde_json::to_string_pretty(&plugins)?);
    Ok(())
}

pub async fn destroy(url: &str, token: Option<String>, pipeline_name: String, yes: bool) -> Result<()> {
    if !yes {
        print!("This will remove every asset, lineage edge, and documentation entry ever produced by '{pipeline_name}'. Type the pipeline name to confirm: ");
        use std::io::Write as IoWrite;
        std::io::stdout().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).context("reading confirmation")?;
        if line.trim() != pipeline_name {
            anyhow::bail!("aborted: '{}' not destroyed", pipeline_name);
        }
    }
    let run: Value = delete_with_body(url, token, &format!("/pipelines/{pipeline_name}")).await?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn client(token: Option<String>) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(t) = token {
        let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {t}")).context("token contains invalid header characters")?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }
    reqwest::Client::builder().default_headers(headers).build().context("building HTTP client")
}

async fn get<T: serde::de::DeserializeOwned>(url: &str, token: Option<String>, path: &str) -> Result<T> {
    let resp = client(token)?
        .get(format!("{}{path}", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    read_ok_json(resp).await
}

async fn post<T: serde::de::DeserializeOwned>(url: &str, token: Option<String>, path: &str, body: &Value) -> Result<T> {
    let resp = client(token)?
        .post(format!("{}{path}", url.trim_end_matches('/')))
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    read_ok_json(resp).await
}

// `POST /ingestion/validate` returns a well-formed `{valid: false, errors}`
// body on 400, which is the success case for this command — don't treat it
// as a transport error.
async fn post_allow_4xx<T: serde::de::DeserializeOwned>(url: &str, token: Option<String>, path: &str, body: &Value) -> Result<T> {
    let resp = client(token)?
        .post(format!("{}{path}", url.trim_end_matches('/')))
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    resp.json().await.context("failed to parse server response")
}

async fn delete(url: &str, token: Option<String>, path: &str) -> Result<()> {
    let resp = client(token)?
        .delete(format!("{}{path}", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    if !resp.status().is_success() {
        anyhow::bail!("server returned {}", resp.status());
    }
    Ok(())
}

async fn delete_with_body<T: serde::de::DeserializeOwned>(url: &str, token: Option<String>, path: &str) -> Result<T> {
    let resp = client(token)?
        .delete(format!("{}{path}", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    read_ok_json(resp).await
}

async fn read_ok_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        let message = body.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        anyhow::bail!("server returned {status}: {message}");
    }
    resp.json().await.context("failed to parse server response")
}

fn read_config_json(path: Option<String>) -> Result<Value> {
    let raw = match path {
        Some(p) => std::fs::read_to_string(&p).with_context(|| format!("reading {p}"))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading config from stdin")?;
            buf
        }
    };
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&raw).context("config is not valid JSON")
}
