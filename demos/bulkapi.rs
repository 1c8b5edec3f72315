//! Example of running Bulk API ingest and query jobs end to end.
//!
//! This example demonstrates:
//!
//! Ingest Operations:
//! - Encoding records and creating an ingest job
//! - Uploading data and closing the job
//! - Waiting for processing with Ctrl-C cancellation
//! - Retrieving successful, failed, and unprocessed records
//!
//! Query Operations:
//! - Creating a query job
//! - Paging through query results
//! - Listing jobs
//!
//! Set `SALESFORCE_INSTANCE_URL` and `SALESFORCE_ACCESS_TOKEN` before running.

use futures_util::StreamExt;
use salesforce_bulk::bulkapi::codec::encode;
use salesforce_bulk::bulkapi::{Client as BulkClient, Fields, Operation, Options, Parameters};
use salesforce_bulk::session::{self, SessionConfig};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,salesforce_bulk=debug".into()),
        )
        .init();

    let session = session::Builder::new()
        .config(SessionConfig {
            instance_url: std::env::var("SALESFORCE_INSTANCE_URL")?,
            access_token: std::env::var("SALESFORCE_ACCESS_TOKEN")?,
            api_version: None,
            connect_timeout_secs: None,
            request_timeout_secs: None,
        })
        .build()?;
    let bulk_client = BulkClient::new(session).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    info!("Creating an ingest job");
    let job = bulk_client
        .ingest()
        .create_job(Options::ingest("Account", Operation::Insert))
        .await?;
    info!("Created job: {}", job.id());

    let records: Vec<Fields> = ["Acme", "Globex", "Initech"]
        .iter()
        .map(|name| {
            let mut record = Fields::new();
            record.insert("Name".to_string(), json!(name));
            record.insert("Site".to_string(), json!("demo"));
            record
        })
        .collect();
    let data = encode(
        job.delimiter(),
        job.line_ending(),
        vec!["Name".to_string(), "Site".to_string()],
        &records,
    )?;

    info!("Uploading {} records", records.len());
    job.upload(data).await?;
    job.close().await?;

    info!("Waiting for job to complete");
    let info = match job.wait(cancel.clone()).await {
        Ok(info) => info,
        Err(err) => {
            error!("Ingest job did not complete: {err}");
            return Ok(());
        }
    };
    info!(
        "Processed {} records, {} failed",
        info.number_records_processed, info.number_records_failed
    );

    let mut successful = job.successful_records_stream().await?;
    while let Some(record) = successful.next().await {
        let record = record?;
        info!("Created {} (new: {})", record.record.id, record.created);
    }
    for record in job.failed_records().await? {
        error!("Failed: {} {:?}", record.error, record.record.fields);
    }
    info!("Unprocessed records: {}", job.unprocessed_records().await?.len());

    info!("Creating a query job");
    let query_job = bulk_client
        .query()
        .create_job(Options::query("SELECT Id, Name FROM Account LIMIT 100"))
        .await?;
    query_job.wait(cancel).await?;

    let mut locator: Option<String> = None;
    loop {
        let page = query_job.results(locator.as_deref(), Some(50)).await?;
        for record in &page.records {
            info!("Account: {:?}", record.get("Name"));
        }
        match page.locator {
            Some(next) => locator = Some(next),
            None => break,
        }
    }

    info!("Listing ingest jobs");
    let mut jobs = bulk_client.ingest().all_jobs(Parameters::default()).await?;
    loop {
        for job in jobs.records() {
            info!("Job ID: {}, State: {}", job.id, job.state);
        }
        if jobs.done() {
            break;
        }
        jobs = jobs.next().await?;
    }

    job.delete().await?;
    query_job.delete().await?;
    info!("Deleted jobs");

    Ok(())
}
