//! Paginated listing of the jobs on an endpoint.

use super::job::{expect, json, send};
use super::types::{Endpoint, JobType, Response};
use super::Error;
use crate::session::Session;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Filters for listing jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Parameters {
    /// Only list jobs with PK chunking enabled.
    pub is_pk_chunking_enabled: bool,
    /// Only list jobs of this type.
    pub job_type: Option<JobType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JobsPage {
    done: bool,
    records: Vec<Response>,
    next_records_url: Option<String>,
}

/// One page of job descriptions.
///
/// # Example
///
/// ```no_run
/// # use salesforce_bulk::bulkapi::{Client as BulkClient, Parameters};
/// # async fn example(bulk_client: BulkClient) -> Result<(), Box<dyn std::error::Error>> {
/// let mut jobs = bulk_client.ingest().all_jobs(Parameters::default()).await?;
/// loop {
///     for job in jobs.records() {
///         println!("{} {}", job.id, job.state);
///     }
///     if jobs.done() {
///         break;
///     }
///     jobs = jobs.next().await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Jobs {
    session: Arc<dyn Session>,
    page: JobsPage,
}

impl fmt::Debug for Jobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jobs")
            .field("done", &self.page.done)
            .field("records", &self.page.records.len())
            .field("next_records_url", &self.page.next_records_url)
            .finish()
    }
}

impl Jobs {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub(crate) async fn fetch(
        session: Arc<dyn Session>,
        endpoint: Endpoint,
        parameters: Parameters,
    ) -> Result<Self, Error> {
        if endpoint == Endpoint::Classic {
            return Err(Error::Usage {
                reason: "classic jobs cannot be listed".to_string(),
            });
        }
        let url = endpoint.url(session.as_ref());
        let job_type = parameters.job_type.map(|t| t.as_str()).unwrap_or_default();
        let builder = session.client().get(&url).query(&[
            (
                "isPkChunkingEnabled",
                parameters.is_pk_chunking_enabled.to_string().as_str(),
            ),
            ("jobType", job_type),
        ]);
        Self::load(session, builder).await
    }

    async fn load(session: Arc<dyn Session>, builder: reqwest::RequestBuilder) -> Result<Self, Error> {
        let response = send(session.as_ref(), builder, "listing jobs").await?;
        let response = expect(response, &[StatusCode::OK], "listing jobs").await?;
        let page: JobsPage = json(response, "listing jobs").await?;
        tracing::debug!(records = page.records.len(), done = page.done, "listed bulk jobs");
        Ok(Self { session, page })
    }

    /// Returns true if this is the last page.
    pub fn done(&self) -> bool {
        self.page.done
    }

    /// Job descriptions on this page, in server order.
    pub fn records(&self) -> &[Response] {
        &self.page.records
    }

    /// Fetches the following page.
    ///
    /// Fails without a request when this is the last page.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn next(&self) -> Result<Jobs, Error> {
        if self.page.done {
            return Err(Error::Usage {
                reason: "there are no more job records".to_string(),
            });
        }
        let next = self
            .page
            .next_records_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::Usage {
                reason: "the server did not return a next records url".to_string(),
            })?;
        let url = resolve(self.session.instance_url(), next)?;
        let builder = self.session.client().get(url);
        Self::load(Arc::clone(&self.session), builder).await
    }
}

/// Resolves a possibly instance-relative URL.
fn resolve(instance_url: &str, next: &str) -> Result<url::Url, Error> {
    match url::Url::parse(next) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => url::Url::parse(instance_url)
            .and_then(|base| base.join(next))
            .map_err(|source| Error::Url {
                url: next.to_string(),
                source,
            }),
        Err(source) => Err(Error::Url {
            url: next.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_url() {
        let url = resolve(
            "https://na1.salesforce.com",
            "/services/data/v65.0/jobs/ingest?queryLocator=01gD",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://na1.salesforce.com/services/data/v65.0/jobs/ingest?queryLocator=01gD"
        );
    }

    #[test]
    fn test_resolve_absolute_url() {
        let url = resolve("https://na1.salesforce.com", "https://other.example.com/page2").unwrap();
        assert_eq!(url.as_str(), "https://other.example.com/page2");
    }

    #[test]
    fn test_page_deserialize() {
        let page: JobsPage = serde_json::from_str(
            r#"{
                "done": false,
                "records": [{"id": "750A", "state": "Open", "operation": "insert"}],
                "nextRecordsUrl": "/services/data/v65.0/jobs/ingest?queryLocator=01gB"
            }"#,
        )
        .unwrap();
        assert!(!page.done);
        assert_eq!(page.records[0].id, "750A");
        assert_eq!(
            page.next_records_url.as_deref(),
            Some("/services/data/v65.0/jobs/ingest?queryLocator=01gB")
        );
    }
}
