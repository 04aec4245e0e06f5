use std::num::NonZeroUsize;
use std::time::Duration;

use url::Url;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_MOCK_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a single validation job.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of validations in flight.
    pub concurrency: NonZeroUsize,
    /// Header of the column holding the record name.
    pub name_field: String,
    /// Header of the column holding the value sent to the validator.
    pub email_field: String,
}

impl PipelineConfig {
    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN),
            name_field: "name".to_string(),
            email_field: "email".to_string(),
        }
    }
}

/// Which validator backs the pipeline.
#[derive(Debug, Clone)]
pub enum ValidatorConfig {
    Mock { delay: Duration },
    Http { endpoint: Url, timeout: Duration },
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig::Mock {
            delay: DEFAULT_MOCK_DELAY,
        }
    }
}
