//! Drives one validation job from a record source to a published summary.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::gate::{ConcurrencyGate, GateError, Permit};
use crate::source::{FlowControl, RecordSource, SourceError};
use crate::status::{progress_percent, JobStatus, StatusStore, Summary, TrackingId};
use crate::validator::EmailValidator;
use crate::{FailureDetail, Record, ValidationOutcome};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("record source failed: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Mutable counters owned by one running job.
#[derive(Debug, Default)]
struct Tally {
    total: u64,
    processed: u64,
    failures: Vec<FailureDetail>,
    published: u8,
}

impl Tally {
    /// Progress to publish next. Never lower than what was already published,
    /// since `total` keeps growing while records are still being read.
    fn advance(&mut self) -> u8 {
        self.published = self.published.max(progress_percent(self.processed, self.total));
        self.published
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    validator: Arc<dyn EmailValidator>,
    store: StatusStore,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        validator: Arc<dyn EmailValidator>,
        store: StatusStore,
    ) -> Self {
        Self {
            config,
            validator,
            store,
        }
    }

    /// Opens a record source over `reader` using the configured column names.
    pub fn source<R: AsyncRead + Unpin>(&self, reader: R) -> RecordSource<R> {
        RecordSource::with_fields(reader, &self.config.name_field, &self.config.email_field)
    }

    /// Runs the job to completion and publishes its terminal status under `id`.
    ///
    /// The source is consumed and dropped before this returns, whether the
    /// job completed or failed.
    pub async fn run<R: AsyncRead + Unpin>(
        &self,
        id: TrackingId,
        mut source: RecordSource<R>,
    ) -> Result<Summary, PipelineError> {
        let gate = ConcurrencyGate::new(self.config.concurrency.get())?;
        let flow = source.flow();
        let tally = Arc::new(Mutex::new(Tally::default()));

        // A job submitted through `JobTracker` already shows its initial status.
        self.store.init(
            id,
            JobStatus::Processing {
                progress: progress_percent(0, 1),
            },
        );
        info!(tracking_id = %id, concurrency = gate.capacity(), "validation job started");

        let mut tasks = JoinSet::new();
        let read_result: Result<(), PipelineError> = loop {
            let record = match source.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            };

            tally.lock().await.total += 1;

            apply_backpressure(&gate, &flow);
            let permit = match gate.admit().await {
                Ok(permit) => permit,
                Err(e) => break Err(e.into()),
            };

            tasks.spawn(validate_record(Dispatch {
                id,
                record,
                permit,
                gate: gate.clone(),
                flow: flow.clone(),
                validator: Arc::clone(&self.validator),
                tally: Arc::clone(&tally),
                store: self.store.clone(),
            }));
            apply_backpressure(&gate, &flow);
        };
        drop(source);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(tracking_id = %id, error = %e, "validation task aborted");
            }
        }

        if let Err(e) = read_result {
            error!(tracking_id = %id, error = %e, "validation job failed");
            self.store.set(
                id,
                JobStatus::Failed {
                    error: e.to_string(),
                },
            );
            return Err(e);
        }

        let summary = {
            let mut tally = tally.lock().await;
            Summary::new(tally.total, std::mem::take(&mut tally.failures))
        };
        info!(
            tracking_id = %id,
            total = summary.total_records,
            failed = summary.failed_records,
            "validation job completed"
        );
        self.store.set(id, JobStatus::completed(summary.clone()));
        Ok(summary)
    }
}

/// Pauses the source while every gate slot is taken, resumes it otherwise.
///
/// Re-checks after pausing: a validation may have released its slot, and
/// resumed, between the first check and the pause.
fn apply_backpressure(gate: &ConcurrencyGate, flow: &FlowControl) {
    if gate.is_full() {
        flow.pause();
        if gate.is_full() {
            return;
        }
    }
    flow.resume();
}

/// Everything one in-flight validation needs.
struct Dispatch {
    id: TrackingId,
    record: Record,
    permit: Permit,
    gate: ConcurrencyGate,
    flow: FlowControl,
    validator: Arc<dyn EmailValidator>,
    tally: Arc<Mutex<Tally>>,
    store: StatusStore,
}

async fn validate_record(dispatch: Dispatch) {
    let Dispatch {
        id,
        record,
        permit,
        gate,
        flow,
        validator,
        tally,
        store,
    } = dispatch;

    // Run the call in its own task so a panicking validator is recorded as a
    // service fault instead of losing the record.
    let email = record.email.clone();
    let call = tokio::spawn(async move { validator.validate(&email).await });

    let outcome = match call.await {
        Ok(Ok(verdict)) if verdict.valid => ValidationOutcome::Valid,
        Ok(Ok(_)) => {
            debug!(tracking_id = %id, email = %record.email, "invalid email");
            ValidationOutcome::Invalid(record)
        }
        Ok(Err(e)) => {
            warn!(tracking_id = %id, email = %record.email, error = %e, "validator failed");
            ValidationOutcome::ServiceError(record)
        }
        Err(e) => {
            warn!(tracking_id = %id, email = %record.email, error = %e, "validator task aborted");
            ValidationOutcome::ServiceError(record)
        }
    };

    {
        let mut tally = tally.lock().await;
        if let Some(detail) = outcome.into_detail() {
            tally.failures.push(detail);
        }
        tally.processed += 1;
        let progress = tally.advance();
        store.set(id, JobStatus::Processing { progress });
    }

    gate.release(permit);
    if !gate.is_full() {
        flow.resume();
    }
}
