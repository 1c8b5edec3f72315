//! Salesforce Bulk API jobs: creation, upload, state changes, waiting and results.
//!
//! This module drives the lifecycle of bulk jobs on three endpoint families:
//! - **Ingest**: Bulk 2.0 jobs that insert, update, upsert or delete records
//! - **Query**: Bulk 2.0 jobs that run a SOQL query and page out its results
//! - **Classic**: Bulk 1.0 jobs fed through batches
//!
//! # Example
//!
//! ```no_run
//! use salesforce_bulk::bulkapi::{Client as BulkClient, Options};
//! use salesforce_bulk::session;
//! use std::path::PathBuf;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = session::Builder::new()
//!     .config_path(PathBuf::from("session.json"))
//!     .build()?;
//! let bulk_client = BulkClient::new(session).await?;
//!
//! let job = bulk_client
//!     .query()
//!     .create_job(Options::query("SELECT Id, Name FROM Account"))
//!     .await?;
//! job.wait(CancellationToken::new()).await?;
//!
//! let mut locator = None;
//! loop {
//!     let page = job.results(locator.as_deref(), Some(10_000)).await?;
//!     println!("{} records", page.records.len());
//!     match page.locator {
//!         Some(next) => locator = Some(next),
//!         None => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod batch;
mod client;
pub mod codec;
mod job;
mod jobs;
mod types;
mod wait;

pub use batch::{Batch, BatchInfo, BatchResult, BatchState, JobBatches, RecordError};
pub use client::{Client, Resource};
pub use codec::{Formatter, Record, RecordStream};
pub use job::Job;
pub use jobs::{Jobs, Parameters};
pub use types::{
    ColumnDelimiter, ConcurrencyMode, ContentType, Endpoint, FailedRecord, Fields, Info, JobRecord,
    JobType, LineEnding, Operation, Options, Response, ResultsPage, State, SuccessfulRecord,
    UnprocessedRecord,
};
pub use wait::WaitConfig;

use crate::error::HttpError;
use crate::session;

/// Error type for bulk job operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Job options failed validation; no request was sent.
    #[error("Invalid job options: {reason}")]
    InvalidOptions { reason: String },

    /// The operation is not available for this job or endpoint.
    #[error("Unsupported operation: {reason}")]
    Usage { reason: String },

    /// The session could not be refreshed.
    #[error("Session error: {source}")]
    Session {
        #[source]
        source: session::Error,
    },

    /// The request could not be sent or its response not read.
    #[error("Transport error while {phase}: {source}")]
    Transport {
        phase: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with an unexpected status.
    #[error("Bulk API error while {phase}: {source}")]
    Api {
        phase: &'static str,
        #[source]
        source: HttpError,
    },

    /// A JSON payload could not be encoded or decoded.
    #[error("JSON error while {phase}: {source}")]
    Json {
        phase: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Delimited data could not be encoded or decoded.
    #[error("CSV error while {phase}: {source}")]
    Csv {
        phase: &'static str,
        #[source]
        source: csv::Error,
    },

    /// A result set lacks one of its bookkeeping columns.
    #[error("Result data is missing the {column} column")]
    MissingColumn { column: &'static str },

    /// A bookkeeping column holds a value that cannot be interpreted.
    #[error("Invalid {column} value: {value:?}")]
    InvalidColumn { column: &'static str, value: String },

    /// A URL returned by the server could not be resolved.
    #[error("Invalid URL {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Records cannot be encoded without a header row.
    #[error("Record fields are required")]
    EmptyFields,

    /// There were no records to encode.
    #[error("Records are required")]
    EmptyRecords,

    /// The caller cancelled a wait; an abort was requested for the job.
    #[error("Wait for job was cancelled")]
    Cancelled,

    /// The job reached a terminal state other than `JobComplete`.
    #[error("Job {} ended in state {}", .info.id, .info.state)]
    JobTerminated { info: Box<Info> },

    /// The polling task stopped without reporting an outcome.
    #[error("Wait for job was interrupted")]
    WaitInterrupted,
}

impl Error {
    /// The translated server error, if the server rejected the request.
    pub fn api_error(&self) -> Option<&HttpError> {
        match self {
            Error::Api { source, .. } => Some(source),
            _ => None,
        }
    }
}
