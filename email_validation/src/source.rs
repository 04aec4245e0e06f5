//! Streaming record reader with pause/resume flow control.
//!
//! Input is delimited text whose first non-blank row names the fields.
//! Each later row is read lazily from the underlying stream and mapped onto
//! those names by position. Rows are split by a CSV state machine fed
//! straight from the byte stream, so quoted fields may contain delimiters and
//! line breaks, and field bytes that are not UTF-8 are decoded lossily.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use csv::ByteRecord;
use csv_core::ReadRecordResult;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tracing::debug;

use crate::Record;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
}

/// Shared pause switch for a [`RecordSource`].
///
/// Handles are cheap to clone; every clone controls the same source.
#[derive(Debug, Clone)]
pub struct FlowControl {
    paused: Arc<watch::Sender<bool>>,
    delivered: Arc<AtomicU64>,
}

impl FlowControl {
    fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stops delivery of further records. No-op when already paused.
    pub fn pause(&self) {
        let changed = self.paused.send_if_modified(|paused| !std::mem::replace(paused, true));
        if changed {
            debug!("record source paused");
        }
    }

    /// Lets delivery continue. No-op when not paused.
    pub fn resume(&self) {
        let changed = self.paused.send_if_modified(|paused| std::mem::replace(paused, false));
        if changed {
            debug!("record source resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Records handed to the consumer so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    async fn wait_until_resumed(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

/// Column positions resolved from the header row.
#[derive(Debug)]
struct Columns {
    name: Option<usize>,
    email: Option<usize>,
}

impl Columns {
    fn from_header(header: &ByteRecord, name_field: &str, email_field: &str) -> Self {
        let names: Vec<String> = header.iter().map(decode).collect();
        let position = |wanted: &str| {
            names
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == wanted)
        };
        Self {
            name: position(name_field),
            email: position(email_field),
        }
    }

    fn extract(&self, row: &ByteRecord) -> Record {
        let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(decode).unwrap_or_default();
        Record {
            name: field(self.name),
            email: field(self.email),
        }
    }
}

fn decode(field: &[u8]) -> String {
    String::from_utf8_lossy(field).into_owned()
}

fn is_blank(row: &ByteRecord) -> bool {
    row.iter().all(|field| field.iter().all(u8::is_ascii_whitespace))
}

/// Splits an async byte stream into CSV rows.
struct RowReader<R> {
    input: BufReader<R>,
    parser: csv_core::Reader,
    output: Vec<u8>,
    ends: Vec<usize>,
}

impl<R: AsyncRead + Unpin> RowReader<R> {
    fn new(reader: R) -> Self {
        Self {
            input: BufReader::new(reader),
            parser: csv_core::Reader::new(),
            output: vec![0; 1024],
            ends: vec![0; 16],
        }
    }

    async fn read_row(&mut self) -> io::Result<Option<ByteRecord>> {
        let mut out_len = 0;
        let mut ends_len = 0;
        loop {
            // An empty chunk tells the parser the input is exhausted.
            let chunk = self.input.fill_buf().await?;
            let (result, consumed, written, ended) = self.parser.read_record(
                chunk,
                &mut self.output[out_len..],
                &mut self.ends[ends_len..],
            );
            self.input.consume(consumed);
            out_len += written;
            ends_len += ended;

            match result {
                ReadRecordResult::InputEmpty => {}
                ReadRecordResult::OutputFull => {
                    let len = self.output.len();
                    self.output.resize(len * 2, 0);
                }
                ReadRecordResult::OutputEndsFull => {
                    let len = self.ends.len();
                    self.ends.resize(len * 2, 0);
                }
                ReadRecordResult::Record => return Ok(Some(self.row(ends_len))),
                ReadRecordResult::End => return Ok(None),
            }
        }
    }

    fn row(&self, ends_len: usize) -> ByteRecord {
        let mut row = ByteRecord::new();
        let mut start = 0;
        for &end in &self.ends[..ends_len] {
            row.push_field(&self.output[start..end]);
            start = end;
        }
        row
    }
}

/// Lazy, forward-only sequence of [`Record`]s read from an async byte stream.
pub struct RecordSource<R> {
    rows: RowReader<R>,
    columns: Option<Columns>,
    name_field: String,
    email_field: String,
    flow: FlowControl,
    finished: bool,
}

impl<R: AsyncRead + Unpin> RecordSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_fields(reader, "name", "email")
    }

    pub fn with_fields(reader: R, name_field: &str, email_field: &str) -> Self {
        Self {
            rows: RowReader::new(reader),
            columns: None,
            name_field: name_field.to_string(),
            email_field: email_field.to_string(),
            flow: FlowControl::new(),
            finished: false,
        }
    }

    pub fn flow(&self) -> FlowControl {
        self.flow.clone()
    }

    pub fn pause(&self) {
        self.flow.pause();
    }

    pub fn resume(&self) {
        self.flow.resume();
    }

    /// Next record, waiting while the source is paused.
    ///
    /// Returns `Ok(None)` once the stream is exhausted and on every call after
    /// that. A read error also ends the sequence.
    pub async fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        if self.finished {
            return Ok(None);
        }
        self.flow.wait_until_resumed().await;

        loop {
            let row = match self.rows.read_row().await {
                Ok(Some(row)) => row,
                Ok(None) => {
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e.into());
                }
            };

            if is_blank(&row) {
                continue;
            }

            match &self.columns {
                None => {
                    self.columns = Some(Columns::from_header(
                        &row,
                        &self.name_field,
                        &self.email_field,
                    ));
                }
                Some(columns) => {
                    self.flow.delivered.fetch_add(1, Ordering::AcqRel);
                    return Ok(Some(columns.extract(&row)));
                }
            }
        }
    }
}
