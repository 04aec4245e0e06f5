//! Job submission and status lookup.
//!
//! A job is started from any async reader, runs in the background on the
//! tokio runtime, and is observed through the shared [`StatusStore`].

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::PipelineConfig;
use crate::pipeline::{Pipeline, PipelineError};
use crate::status::{progress_percent, JobStatus, StatusStore, Summary, TrackingId};
use crate::validator::EmailValidator;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A submitted job: its id plus a handle to the background run.
pub struct JobHandle {
    pub id: TrackingId,
    pub task: JoinHandle<Result<Summary, PipelineError>>,
}

#[derive(Clone)]
pub struct JobTracker {
    pipeline: Arc<Pipeline>,
    store: StatusStore,
}

impl JobTracker {
    pub fn new(
        config: PipelineConfig,
        validator: Arc<dyn EmailValidator>,
        store: StatusStore,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(config, validator, store.clone())),
            store,
        }
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Starts validating `reader` in the background and returns right away.
    ///
    /// The job is visible as `processing` at 0% before this returns.
    pub fn submit<R>(&self, reader: R) -> JobHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let id = TrackingId::new();
        self.store.set(
            id,
            JobStatus::Processing {
                progress: progress_percent(0, 1),
            },
        );
        info!(tracking_id = %id, "validation job submitted");

        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::spawn(async move {
            let source = pipeline.source(reader);
            pipeline.run(id, source).await
        });

        JobHandle { id, task }
    }

    /// Opens `path` and submits it. Nothing is tracked if the open fails.
    pub async fn submit_file(&self, path: impl AsRef<Path>) -> Result<JobHandle, JobError> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|source| JobError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(self.submit(file))
    }

    pub fn status(&self, id: &TrackingId) -> Option<JobStatus> {
        self.store.get(id)
    }
}
