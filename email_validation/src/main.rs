use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use dotenv::dotenv;
use email_validation::{
    utils, validator, JobStatus, JobTracker, PipelineConfig, StatusStore, ValidatorConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Validate the email column of a CSV file", long_about = None)]
struct Args {
    /// CSV file to validate; the first row must name the columns
    #[arg(short, long, env = "EMAIL_VALIDATION_FILE")]
    file: PathBuf,

    /// Maximum number of validations in flight
    #[arg(short, long, env = "EMAIL_VALIDATION_CONCURRENCY", default_value = "5")]
    concurrency: NonZeroUsize,

    /// Validation service endpoint; the built-in mock is used when absent
    #[arg(long, env = "EMAIL_VALIDATION_URL")]
    validator_url: Option<Url>,

    /// Request timeout for the validation service, in milliseconds
    #[arg(long, env = "EMAIL_VALIDATION_TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,

    /// Artificial latency of the mock validator, in milliseconds
    #[arg(long, env = "EMAIL_VALIDATION_MOCK_DELAY_MS", default_value_t = 100)]
    mock_delay_ms: u64,

    /// Column holding the record name
    #[arg(long, env = "EMAIL_VALIDATION_NAME_FIELD", default_value = "name")]
    name_field: String,

    /// Column holding the email to validate
    #[arg(long, env = "EMAIL_VALIDATION_EMAIL_FIELD", default_value = "email")]
    email_field: String,

    /// Write the final job status as JSON to this file
    #[arg(short, long, env = "EMAIL_VALIDATION_OUTPUT")]
    output: Option<PathBuf>,

    /// How often to check job progress, in milliseconds
    #[arg(long, default_value_t = 200)]
    poll_interval_ms: u64,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            concurrency: self.concurrency,
            name_field: self.name_field.clone(),
            email_field: self.email_field.clone(),
        }
    }

    fn validator_config(&self) -> ValidatorConfig {
        match &self.validator_url {
            Some(endpoint) => ValidatorConfig::Http {
                endpoint: endpoint.clone(),
                timeout: Duration::from_millis(self.timeout_ms),
            },
            None => ValidatorConfig::Mock {
                delay: Duration::from_millis(self.mock_delay_ms),
            },
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let validator = validator::from_config(&args.validator_config())
        .context("failed to set up validator")?;
    let tracker = JobTracker::new(args.pipeline_config(), Arc::from(validator), StatusStore::new());

    let job = tracker.submit_file(&args.file).await?;
    info!(tracking_id = %job.id, file = %args.file.display(), "processing started");

    let interval = Duration::from_millis(args.poll_interval_ms.max(1));
    let mut last_progress = None;
    let status = loop {
        match tracker.status(&job.id) {
            Some(status) if status.is_terminal() => break status,
            Some(JobStatus::Processing { progress }) if last_progress != Some(progress) => {
                info!(tracking_id = %job.id, progress, "processing");
                last_progress = Some(progress);
            }
            _ => {}
        }
        tokio::time::sleep(interval).await;
    };
    // The terminal status is already published; this only surfaces panics.
    let _ = job.task.await.context("validation task panicked")?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    if let Some(path) = &args.output {
        utils::save_json(&status, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if let JobStatus::Failed { error } = status {
        bail!("validation job {} failed: {error}", job.id);
    }
    Ok(())
}
