//! Bulk API client that wraps the session.

use super::job::Job;
use super::jobs::{Jobs, Parameters};
use super::types::{Endpoint, Options};
use super::Error;
use crate::session::Session;
use std::fmt;
use std::sync::Arc;

/// Client for the Salesforce Bulk API.
///
/// The client shares one session between every resource and job handle it
/// hands out.
///
/// # Example
///
/// ```no_run
/// use salesforce_bulk::bulkapi::Client as BulkClient;
/// use salesforce_bulk::session::{self, SessionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = session::Builder::new()
///     .config(SessionConfig {
///         instance_url: "https://your-instance.salesforce.com".to_string(),
///         access_token: "...".to_string(),
///         api_version: None,
///         connect_timeout_secs: None,
///         request_timeout_secs: None,
///     })
///     .build()?;
///
/// let bulk_client = BulkClient::new(session).await?;
///
/// let ingest = bulk_client.ingest();
/// let query = bulk_client.query();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    session: Arc<dyn Session>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .finish()
    }
}

impl Client {
    /// Creates a new Bulk API client, refreshing the session once.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn new<S: Session + 'static>(session: S) -> Result<Self, Error> {
        Self::with_session(Arc::new(session)).await
    }

    /// Creates a new Bulk API client from a shared session.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn with_session(session: Arc<dyn Session>) -> Result<Self, Error> {
        session
            .refresh()
            .await
            .map_err(|source| Error::Session { source })?;
        Ok(Self { session })
    }

    /// Returns the session used for every request.
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// Bulk 2.0 ingest jobs.
    pub fn ingest(&self) -> Resource {
        self.resource(Endpoint::Ingest)
    }

    /// Bulk 2.0 query jobs.
    pub fn query(&self) -> Resource {
        self.resource(Endpoint::Query)
    }

    /// Bulk 1.0 jobs.
    pub fn classic(&self) -> Resource {
        self.resource(Endpoint::Classic)
    }

    pub fn resource(&self, endpoint: Endpoint) -> Resource {
        Resource {
            session: Arc::clone(&self.session),
            endpoint,
        }
    }
}

/// Factory for the jobs of one endpoint family.
#[derive(Clone)]
pub struct Resource {
    session: Arc<dyn Session>,
    endpoint: Endpoint,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Resource {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Validates the options and creates a job.
    ///
    /// Invalid options fail with [`Error::InvalidOptions`] before any request
    /// is sent.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use salesforce_bulk::bulkapi::Client as BulkClient;
    /// use salesforce_bulk::bulkapi::Options;
    ///
    /// # async fn example(bulk_client: BulkClient) -> Result<(), Box<dyn std::error::Error>> {
    /// let job = bulk_client
    ///     .ingest()
    ///     .create_job(Options::upsert("Account", "External_Id__c"))
    ///     .await?;
    /// println!("Created job: {}", job.id());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_job(&self, options: Options) -> Result<Job, Error> {
        Job::create(Arc::clone(&self.session), self.endpoint, options).await
    }

    /// Fetches an existing job by ID.
    pub async fn get_job(&self, id: &str) -> Result<Job, Error> {
        Job::fetch(Arc::clone(&self.session), self.endpoint, id).await
    }

    /// Lists the first page of jobs.
    pub async fn all_jobs(&self, parameters: Parameters) -> Result<Jobs, Error> {
        Jobs::fetch(Arc::clone(&self.session), self.endpoint, parameters).await
    }
}
