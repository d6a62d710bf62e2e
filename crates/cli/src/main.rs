//! `cardforge` -- batch image generation driver.
//!
//! Reads a manifest of (source asset, workflow template) pairs, drives each
//! entry through the generation backend under a bounded worker pool, and
//! writes the resulting artifacts plus a final accounting to stdout. Exits
//! non-zero unless every job completed.
//!
//! # Environment variables
//!
//! | Variable                     | Required | Default     | Description                                  |
//! |------------------------------|----------|-------------|----------------------------------------------|
//! | `CARDFORGE_BACKEND_URL`      | yes      | --          | Backend HTTP base URL, e.g. `http://host:8188` |
//! | `CARDFORGE_MANIFEST`         | yes      | --          | Path to the JSON manifest                    |
//! | `CARDFORGE_PUSH_URL`         | no       | (disabled)  | WebSocket base URL for push status events    |
//! | `CARDFORGE_TEMPLATE_DIR`     | no       | `templates` | Directory of `<id>.json` workflow graphs     |
//! | `CARDFORGE_OUTPUT_DIR`       | no       | `output`    | Directory artifacts are written into         |
//! | `CARDFORGE_WORKERS`          | no       | `4`         | Concurrent worker count                      |
//! | `CARDFORGE_MAX_ATTEMPTS`     | no       | `3`         | Submission attempts per job                  |
//! | `CARDFORGE_UNIT_COST`        | no       | `0.0`       | Cost attributed to each completed job        |
//! | `CARDFORGE_JOB_TIMEOUT_SECS` | no       | `600`       | Per-attempt deadline for a backend verdict   |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardforge_batch::{BatchConfig, BatchCoordinator, BatchReport, DEFAULT_POOL_SIZE};
use cardforge_core::manifest::Manifest;
use cardforge_core::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use cardforge_core::template::TemplateSet;
use cardforge_transport::{HttpBackend, PushListener};

/// Resolved run parameters.
struct CliConfig {
    backend_url: String,
    push_url: Option<String>,
    manifest_path: PathBuf,
    template_dir: PathBuf,
    batch: BatchConfig,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardforge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config();

    tracing::info!(
        backend_url = %config.backend_url,
        manifest = %config.manifest_path.display(),
        workers = config.batch.pool_size,
        max_attempts = config.batch.retry.max_attempts,
        "Starting cardforge",
    );

    match run(config).await {
        Ok(report) => {
            print!("{}", report.render());
            std::process::exit(if report.all_completed() { 0 } else { 1 });
        }
        Err(e) => {
            tracing::error!(error = %e, "Run aborted before the batch started");
            std::process::exit(1);
        }
    }
}

/// Load inputs, wire up cancellation and the optional push channel, and run
/// the batch. Errors here abort the run before any job starts; once the
/// coordinator takes over, per-job failures only show up in the report.
async fn run(config: CliConfig) -> anyhow::Result<BatchReport> {
    let manifest = Manifest::load(&config.manifest_path)
        .with_context(|| format!("loading manifest {}", config.manifest_path.display()))?;
    let templates = TemplateSet::load_dir(&config.template_dir)
        .with_context(|| format!("loading templates from {}", config.template_dir.display()))?;
    if templates.is_empty() {
        anyhow::bail!(
            "no workflow templates found in {}",
            config.template_dir.display()
        );
    }

    let backend = Arc::new(HttpBackend::new(&config.backend_url).context("backend client")?);

    let mut coordinator = BatchCoordinator::new(backend, templates, config.batch);

    let push_listener = config.push_url.map(|push_url| {
        tracing::info!(push_url = %push_url, "Push channel enabled");
        PushListener::spawn(push_url, coordinator.cancel_token())
    });
    if let Some(listener) = &push_listener {
        coordinator = coordinator.with_push_events(listener.events());
    }

    // Ctrl-C cancels cooperatively: pending jobs fail without remote calls,
    // in-flight jobs get the grace period.
    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling batch");
            cancel.cancel();
        }
    });

    let report = coordinator.run(manifest).await;

    if let Some(listener) = push_listener {
        coordinator.cancel_token().cancel();
        listener.shutdown().await;
    }

    Ok(report)
}

/// Read run parameters from the environment, exiting on missing or
/// malformed required values.
fn load_config() -> CliConfig {
    let backend_url = require_var("CARDFORGE_BACKEND_URL");
    let manifest_path = PathBuf::from(require_var("CARDFORGE_MANIFEST"));

    let push_url = std::env::var("CARDFORGE_PUSH_URL").ok();
    let template_dir =
        PathBuf::from(var_or("CARDFORGE_TEMPLATE_DIR", "templates"));
    let output_dir = PathBuf::from(var_or("CARDFORGE_OUTPUT_DIR", "output"));

    let pool_size: usize = parse_var("CARDFORGE_WORKERS", DEFAULT_POOL_SIZE);
    let max_attempts: u32 = parse_var("CARDFORGE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS);
    let unit_cost: f64 = parse_var("CARDFORGE_UNIT_COST", 0.0);
    let job_timeout_secs: u64 = parse_var("CARDFORGE_JOB_TIMEOUT_SECS", 600);

    CliConfig {
        backend_url,
        push_url,
        manifest_path,
        template_dir,
        batch: BatchConfig {
            pool_size: pool_size.max(1),
            retry: RetryPolicy {
                max_attempts: max_attempts.max(1),
                ..Default::default()
            },
            job_timeout: Duration::from_secs(job_timeout_secs),
            unit_cost,
            output_dir,
            ..Default::default()
        },
    }
}

fn require_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| {
        tracing::error!("{name} environment variable is required");
        std::process::exit(1);
    })
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
