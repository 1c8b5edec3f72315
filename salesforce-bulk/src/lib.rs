//! Unofficial Rust client for the Salesforce Bulk API.
//!
//! This crate drives the lifecycle of Bulk API jobs: creating ingest and query
//! jobs, uploading delimited data, closing or aborting them, waiting for the
//! server to finish processing, and reading back categorized results.
//!
//! # Examples
//!
//! ```no_run
//! use salesforce_bulk::bulkapi::{Client as BulkClient, Operation, Options};
//! use salesforce_bulk::session::{self, SessionConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = session::Builder::new()
//!     .config(SessionConfig {
//!         instance_url: "https://your-instance.salesforce.com".to_string(),
//!         access_token: "...".to_string(),
//!         api_version: None,
//!         connect_timeout_secs: None,
//!         request_timeout_secs: None,
//!     })
//!     .build()?;
//!
//! let bulk_client = BulkClient::new(session).await?;
//! let job = bulk_client
//!     .ingest()
//!     .create_job(Options::ingest("Account", Operation::Insert))
//!     .await?;
//!
//! job.upload(b"Name\nAcme\n".to_vec()).await?;
//! job.close().await?;
//! let info = job.wait(CancellationToken::new()).await?;
//! println!("processed {} records", info.number_records_processed);
//! # Ok(())
//! # }
//! ```

/// Default Salesforce API version (Winter '26 - API version 65.0).
pub const DEFAULT_API_VERSION: &str = "65.0";

/// Default connection timeout for HTTP requests (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default request timeout for HTTP requests (120 seconds).
///
/// Result downloads for large jobs stream for a long time, so this is generous.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// TCP keepalive interval for pooled connections (60 seconds).
pub const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 60;

/// Maximum idle connections kept per host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

/// Idle pooled connections are dropped after this many seconds.
pub const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Session configuration and the transport collaborator used by bulk jobs.
pub mod session;

/// Translation of Salesforce error responses into structured errors.
pub mod error;

/// Salesforce Bulk API job lifecycle, polling and result decoding.
pub mod bulkapi;
