//! A handle on one server-side bulk job.

use super::codec::{self, Header, RecordStream};
use super::types::{
    ColumnDelimiter, ConcurrencyMode, ContentType, Endpoint, FailedRecord, Info,
    JobRecord, LineEnding, Operation, Options, Response, ResultsPage, State, SuccessfulRecord,
    UnprocessedRecord,
};
use super::Error;
use crate::error::HttpError;
use crate::session::Session;
use futures_util::TryStreamExt;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const CREATED_COLUMN: &str = "sf__Created";
const ID_COLUMN: &str = "sf__Id";
const ERROR_COLUMN: &str = "sf__Error";

const LOCATOR_HEADER: &str = "Sforce-Locator";
const NUMBER_OF_RECORDS_HEADER: &str = "Sforce-NumberOfRecords";

/// Request body for creating a job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobRequest {
    operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    object: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_id_field_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    column_delimiter: Option<ColumnDelimiter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<ContentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line_ending: Option<LineEnding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    concurrency_mode: Option<ConcurrencyMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignment_rule_id: Option<String>,
}

#[derive(Serialize)]
struct StateRequest {
    state: State,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidOptions {
        reason: reason.into(),
    }
}

/// Validates options and fills in the endpoint's defaults.
fn create_request(endpoint: Endpoint, options: Options) -> Result<CreateJobRequest, Error> {
    let operation = options
        .operation
        .ok_or_else(|| invalid("operation is required"))?;
    if operation == Operation::Unknown {
        return Err(invalid("operation is not supported"));
    }
    if options.content_type == Some(ContentType::Unknown) {
        return Err(invalid("content type is not supported"));
    }
    if options.line_ending == Some(LineEnding::Unknown) {
        return Err(invalid("line ending is not supported"));
    }
    if options.concurrency_mode == Some(ConcurrencyMode::Unknown) {
        return Err(invalid("concurrency mode is not supported"));
    }
    let object = non_empty(options.object);
    let query = non_empty(options.query);
    let external_id_field_name = non_empty(options.external_id_field_name);

    match (endpoint, operation.is_query()) {
        (Endpoint::Ingest, true) => {
            return Err(invalid(format!(
                "{operation} operation is not valid for ingest jobs"
            )))
        }
        (Endpoint::Query, false) => {
            return Err(invalid(format!(
                "{operation} operation is not valid for query jobs"
            )))
        }
        _ => {}
    }

    if operation == Operation::Upsert && external_id_field_name.is_none() {
        return Err(invalid(
            "external id field name is required for upsert operation",
        ));
    }
    if operation.is_query() && query.is_none() {
        return Err(invalid(format!("query is required for {operation} operation")));
    }
    if (!operation.is_query() || endpoint == Endpoint::Classic) && object.is_none() {
        return Err(invalid(format!("object is required for {operation} operation")));
    }

    let request = match endpoint {
        Endpoint::Classic => CreateJobRequest {
            operation,
            object,
            query: None,
            external_id_field_name,
            column_delimiter: None,
            content_type: Some(options.content_type.unwrap_or(ContentType::Json)),
            line_ending: None,
            concurrency_mode: Some(
                options
                    .concurrency_mode
                    .unwrap_or(ConcurrencyMode::Parallel),
            ),
            assignment_rule_id: non_empty(options.assignment_rule_id),
        },
        Endpoint::Ingest | Endpoint::Query => CreateJobRequest {
            operation,
            object: if operation.is_query() { None } else { object },
            query,
            external_id_field_name,
            column_delimiter: Some(options.column_delimiter.unwrap_or_default()),
            content_type: Some(options.content_type.unwrap_or(ContentType::Csv)),
            line_ending: Some(options.line_ending.unwrap_or_default()),
            concurrency_mode: None,
            assignment_rule_id: non_empty(options.assignment_rule_id),
        },
    };
    Ok(request)
}

/// A bulk job on the server.
///
/// Each method performs one request and returns a fresh result; the handle
/// itself keeps the description the server returned when the job was created
/// or fetched. Handles are cheap to clone and share the session.
#[derive(Clone)]
pub struct Job {
    session: Arc<dyn Session>,
    endpoint: Endpoint,
    response: Response,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.response.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.response.state)
            .finish_non_exhaustive()
    }
}

impl Job {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub(crate) async fn create(
        session: Arc<dyn Session>,
        endpoint: Endpoint,
        options: Options,
    ) -> Result<Self, Error> {
        let request = create_request(endpoint, options)?;
        let url = endpoint.url(session.as_ref());
        tracing::debug!(?endpoint, operation = %request.operation, "creating bulk job");

        let builder = session.client().post(&url).json(&request);
        let response = send(session.as_ref(), builder, "creating job").await?;
        let response = expect(response, &[StatusCode::OK, StatusCode::CREATED], "creating job").await?;
        let response: Response = json(response, "creating job").await?;
        tracing::info!(job_id = %response.id, state = %response.state, "bulk job created");

        Ok(Self {
            session,
            endpoint,
            response,
        })
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub(crate) async fn fetch(
        session: Arc<dyn Session>,
        endpoint: Endpoint,
        id: &str,
    ) -> Result<Self, Error> {
        let url = format!("{}/{}", endpoint.url(session.as_ref()), id);
        let builder = session.client().get(&url);
        let response = send(session.as_ref(), builder, "fetching job").await?;
        let response = expect(response, &[StatusCode::OK], "fetching job").await?;
        let response = json(response, "fetching job").await?;

        Ok(Self {
            session,
            endpoint,
            response,
        })
    }

    /// The job ID assigned by the server.
    pub fn id(&self) -> &str {
        &self.response.id
    }

    /// The description returned when this handle was created or fetched.
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// The column delimiter of this job's data.
    pub fn delimiter(&self) -> ColumnDelimiter {
        self.response.column_delimiter
    }

    pub fn line_ending(&self) -> LineEnding {
        self.response.line_ending
    }

    pub(crate) fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub(crate) fn url(&self, path: &str) -> String {
        let base = format!("{}/{}", self.endpoint.url(self.session.as_ref()), self.response.id);
        if path.is_empty() {
            base
        } else {
            format!("{base}/{path}")
        }
    }

    pub(crate) async fn send(
        &self,
        builder: RequestBuilder,
        phase: &'static str,
    ) -> Result<reqwest::Response, Error> {
        send(self.session.as_ref(), builder, phase).await
    }

    /// Fetches a fresh status snapshot.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn info(&self) -> Result<Info, Error> {
        let builder = self.session.client().get(self.url(""));
        let response = self.send(builder, "fetching job info").await?;
        let response = expect(response, &[StatusCode::OK], "fetching job info").await?;
        json(response, "fetching job info").await
    }

    /// Marks the data upload as complete so the server starts processing.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn close(&self) -> Result<Response, Error> {
        self.set_state(self.endpoint.close_state(), "closing job").await
    }

    /// Stops processing of the job. Records already processed stay committed.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn abort(&self) -> Result<Response, Error> {
        self.set_state(State::Aborted, "aborting job").await
    }

    async fn set_state(&self, state: State, phase: &'static str) -> Result<Response, Error> {
        tracing::debug!(job_id = %self.id(), %state, "changing bulk job state");
        let builder = self
            .session
            .client()
            .request(self.endpoint.state_method(), self.url(""))
            .json(&StateRequest { state });
        let response = self.send(builder, phase).await?;
        let response = expect(response, &[StatusCode::OK], phase).await?;
        json(response, phase).await
    }

    /// Deletes the job and its data from the server.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn delete(&self) -> Result<(), Error> {
        if self.endpoint == Endpoint::Classic {
            return Err(Error::Usage {
                reason: "classic jobs cannot be deleted".to_string(),
            });
        }
        let builder = self.session.client().delete(self.url(""));
        let response = self.send(builder, "deleting job").await?;
        expect(response, &[StatusCode::NO_CONTENT], "deleting job").await?;
        tracing::info!(job_id = %self.id(), "bulk job deleted");
        Ok(())
    }

    /// Uploads the job's data in one request.
    ///
    /// The body must be encoded with this job's delimiter and line ending and
    /// start with a header row; see [`Formatter`](super::Formatter).
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn upload(&self, body: impl Into<reqwest::Body>) -> Result<(), Error> {
        if !self.endpoint.supports_upload() {
            return Err(Error::Usage {
                reason: format!("{:?} jobs do not accept data uploads", self.endpoint),
            });
        }
        let builder = self
            .session
            .client()
            .put(self.url("batches"))
            .header(reqwest::header::CONTENT_TYPE, ContentType::Csv.mime())
            .body(body);
        let response = self.send(builder, "uploading job data").await?;
        expect(response, &[StatusCode::CREATED], "uploading job data").await?;
        tracing::debug!(job_id = %self.id(), "bulk job data uploaded");
        Ok(())
    }

    /// Fetches one page of query results.
    ///
    /// Pass the locator of the previous page to continue; `max_records`
    /// bounds the page size.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn results(
        &self,
        locator: Option<&str>,
        max_records: Option<u32>,
    ) -> Result<ResultsPage, Error> {
        if !self.endpoint.supports_results() {
            return Err(Error::Usage {
                reason: "results are only available for query jobs".to_string(),
            });
        }

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(locator) = locator.filter(|l| !l.is_empty()) {
            params.push(("locator", locator.to_string()));
        }
        if let Some(max_records) = max_records.filter(|m| *m > 0) {
            params.push(("maxRecords", max_records.to_string()));
        }

        let builder = self
            .session
            .client()
            .get(self.url("results"))
            .header(reqwest::header::ACCEPT, ContentType::Csv.mime())
            .query(&params);
        let response = self.send(builder, "fetching results").await?;
        let response = expect(response, &[StatusCode::OK], "fetching results").await?;

        let locator = header_value(&response, LOCATOR_HEADER)
            .filter(|value| !value.is_empty() && value != "null");
        let number_of_records = header_value(&response, NUMBER_OF_RECORDS_HEADER)
            .and_then(|value| value.parse().ok());
        let records = codec::decode_response(response, self.delimiter(), |header, row| {
            Ok(header.fields(row, &[]))
        })
        .collect_all()
        .await?;

        Ok(ResultsPage {
            records,
            locator,
            number_of_records,
        })
    }

    /// Records the server wrote, as a stream.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn successful_records_stream(&self) -> Result<RecordStream<SuccessfulRecord>, Error> {
        let response = self.record_results("successfulResults/").await?;
        Ok(codec::decode_response(response, self.delimiter(), successful_record))
    }

    /// Records the server wrote.
    pub async fn successful_records(&self) -> Result<Vec<SuccessfulRecord>, Error> {
        self.successful_records_stream().await?.try_collect().await
    }

    /// Records the server rejected, as a stream.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn failed_records_stream(&self) -> Result<RecordStream<FailedRecord>, Error> {
        let response = self.record_results("failedResults/").await?;
        Ok(codec::decode_response(response, self.delimiter(), failed_record))
    }

    /// Records the server rejected.
    pub async fn failed_records(&self) -> Result<Vec<FailedRecord>, Error> {
        self.failed_records_stream().await?.try_collect().await
    }

    /// Records the server never processed, as a stream.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn unprocessed_records_stream(
        &self,
    ) -> Result<RecordStream<UnprocessedRecord>, Error> {
        let response = self.record_results("unprocessedrecords/").await?;
        Ok(codec::decode_response(response, self.delimiter(), |header, row| {
            Ok(UnprocessedRecord {
                fields: header.fields(row, &[]),
            })
        }))
    }

    /// Records the server never processed.
    pub async fn unprocessed_records(&self) -> Result<Vec<UnprocessedRecord>, Error> {
        self.unprocessed_records_stream().await?.try_collect().await
    }

    async fn record_results(&self, path: &str) -> Result<reqwest::Response, Error> {
        if !self.endpoint.supports_record_results() {
            return Err(Error::Usage {
                reason: "record results are only available for ingest jobs".to_string(),
            });
        }
        let builder = self
            .session
            .client()
            .get(self.url(path))
            .header(reqwest::header::ACCEPT, ContentType::Csv.mime());
        let response = self.send(builder, "fetching record results").await?;
        expect(response, &[StatusCode::OK], "fetching record results").await
    }
}

fn successful_record(header: &Header, row: &csv::StringRecord) -> Result<SuccessfulRecord, Error> {
    let created_idx = header.require(CREATED_COLUMN)?;
    let id_idx = header.require(ID_COLUMN)?;
    let created = row.get(created_idx).unwrap_or_default();
    let created = created
        .parse::<bool>()
        .map_err(|_| Error::InvalidColumn {
            column: CREATED_COLUMN,
            value: created.to_string(),
        })?;

    Ok(SuccessfulRecord {
        created,
        record: JobRecord {
            id: row.get(id_idx).unwrap_or_default().to_string(),
            fields: header.fields(row, &[created_idx, id_idx]),
        },
    })
}

fn failed_record(header: &Header, row: &csv::StringRecord) -> Result<FailedRecord, Error> {
    let error_idx = header.require(ERROR_COLUMN)?;
    let id_idx = header.require(ID_COLUMN)?;

    Ok(FailedRecord {
        error: row.get(error_idx).unwrap_or_default().to_string(),
        record: JobRecord {
            id: row.get(id_idx).unwrap_or_default().to_string(),
            fields: header.fields(row, &[error_idx, id_idx]),
        },
    })
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub(crate) async fn send(
    session: &dyn Session,
    builder: RequestBuilder,
    phase: &'static str,
) -> Result<reqwest::Response, Error> {
    let request = session
        .authorize(builder)
        .build()
        .map_err(|source| Error::Transport { phase, source })?;
    tracing::debug!(method = %request.method(), url = %request.url(), phase, "sending bulk request");
    session
        .client()
        .execute(request)
        .await
        .map_err(|source| Error::Transport { phase, source })
}

/// Passes through responses with an accepted status and translates the rest.
pub(crate) async fn expect(
    response: reqwest::Response,
    accepted: &[StatusCode],
    phase: &'static str,
) -> Result<reqwest::Response, Error> {
    if accepted.contains(&response.status()) {
        return Ok(response);
    }
    let source = HttpError::from_response(response).await;
    tracing::debug!(phase, status = %source.status, "bulk request rejected");
    Err(Error::Api { phase, source })
}

pub(crate) async fn json<T: DeserializeOwned>(
    response: reqwest::Response,
    phase: &'static str,
) -> Result<T, Error> {
    let body = response
        .bytes()
        .await
        .map_err(|source| Error::Transport { phase, source })?;
    serde_json::from_slice(&body).map_err(|source| Error::Json { phase, source })
}
