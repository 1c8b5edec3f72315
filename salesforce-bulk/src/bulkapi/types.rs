//! Value types exchanged with the Bulk API job endpoints.

use crate::session::Session;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Deref;

/// An ordered mapping from field name to value; one row of job data.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// The job endpoint family a [`Job`](super::Job) talks to.
///
/// Ingest and query jobs share the Bulk 2.0 surface under the data service;
/// classic jobs use the Bulk 1.0 async surface and are fed through batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Bulk 2.0 ingest jobs (`/jobs/ingest`).
    Ingest,
    /// Bulk 2.0 query jobs (`/jobs/query`).
    Query,
    /// Bulk 1.0 jobs (`/services/async/{version}/job`).
    Classic,
}

impl Endpoint {
    /// Base URL of this endpoint family for a session.
    pub fn url(&self, session: &dyn Session) -> String {
        match self {
            Endpoint::Ingest => format!("{}/jobs/ingest", session.data_service_url()),
            Endpoint::Query => format!("{}/jobs/query", session.data_service_url()),
            Endpoint::Classic => format!(
                "{}/services/async/{}/job",
                session.instance_url().trim_end_matches('/'),
                session.api_version()
            ),
        }
    }

    /// HTTP method used to change a job's state.
    pub(crate) fn state_method(&self) -> reqwest::Method {
        match self {
            Endpoint::Classic => reqwest::Method::POST,
            Endpoint::Ingest | Endpoint::Query => reqwest::Method::PATCH,
        }
    }

    /// State requested when closing a job.
    pub(crate) fn close_state(&self) -> State {
        match self {
            Endpoint::Classic => State::Closed,
            Endpoint::Ingest | Endpoint::Query => State::UploadComplete,
        }
    }

    /// Query results pages are only served for query jobs.
    pub fn supports_results(&self) -> bool {
        matches!(self, Endpoint::Query)
    }

    /// Monolithic data upload is only available for Bulk 2.0 ingest jobs.
    pub fn supports_upload(&self) -> bool {
        matches!(self, Endpoint::Ingest)
    }

    /// Categorized successful/failed/unprocessed record sets.
    pub fn supports_record_results(&self) -> bool {
        matches!(self, Endpoint::Ingest)
    }

    /// Bulk 1.0 jobs stay `Closed` and never report `JobComplete`, so they
    /// cannot be waited on; poll their batches instead.
    pub fn supports_wait(&self) -> bool {
        !matches!(self, Endpoint::Classic)
    }

    /// Batches are the Bulk 1.0 unit of upload.
    pub fn supports_batches(&self) -> bool {
        matches!(self, Endpoint::Classic)
    }
}

/// The bulk job type reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    /// Big objects ingest job.
    #[serde(rename = "BigObjectIngest")]
    BigObjects,
    /// Bulk 1.0 job.
    Classic,
    /// Bulk 2.0 ingest job.
    V2Ingest,
    /// Bulk 2.0 query job.
    V2Query,
    /// A job type this client does not know.
    #[serde(other)]
    Unknown,
}

impl JobType {
    /// The wire name of the job type.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::BigObjects => "BigObjectIngest",
            JobType::Classic => "Classic",
            JobType::V2Ingest => "V2Ingest",
            JobType::V2Query => "V2Query",
            JobType::Unknown => "Unknown",
        }
    }
}

/// The column delimiter used for CSV job data.
///
/// Deserializing is total: names the server may send that are not listed
/// here, and a missing or null value, resolve to [`ColumnDelimiter::Comma`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnDelimiter {
    /// The (`) character.
    Backquote,
    /// The (^) character.
    Caret,
    /// The (,) character.
    #[default]
    Comma,
    /// The (|) character.
    Pipe,
    /// The (;) character.
    Semicolon,
    /// The tab character.
    Tab,
}

impl ColumnDelimiter {
    /// Resolves a symbolic delimiter name, falling back to comma.
    pub fn from_name(name: &str) -> Self {
        match name {
            "TAB" => ColumnDelimiter::Tab,
            "BACKQUOTE" => ColumnDelimiter::Backquote,
            "CARET" => ColumnDelimiter::Caret,
            "PIPE" => ColumnDelimiter::Pipe,
            "SEMICOLON" => ColumnDelimiter::Semicolon,
            _ => ColumnDelimiter::Comma,
        }
    }

    /// The single delimiter character.
    pub fn as_char(&self) -> char {
        match self {
            ColumnDelimiter::Backquote => '`',
            ColumnDelimiter::Caret => '^',
            ColumnDelimiter::Comma => ',',
            ColumnDelimiter::Pipe => '|',
            ColumnDelimiter::Semicolon => ';',
            ColumnDelimiter::Tab => '\t',
        }
    }

    pub(crate) fn as_byte(&self) -> u8 {
        self.as_char() as u8
    }
}

impl<'de> Deserialize<'de> for ColumnDelimiter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.map(|name| Self::from_name(&name)).unwrap_or_default())
    }
}

/// The format of the data being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Comma separated values; the only format Bulk 2.0 accepts.
    #[serde(rename = "CSV")]
    Csv,
    /// JSON records, used by Bulk 1.0 batches.
    #[serde(rename = "JSON")]
    Json,
    /// Any other format the server reports, such as `XML` or `ZIP_CSV` on
    /// Bulk 1.0 jobs.
    #[serde(other)]
    Unknown,
}

impl ContentType {
    /// MIME type for uploads in this format.
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Csv => "text/csv",
            ContentType::Json => "application/json",
            ContentType::Unknown => "application/octet-stream",
        }
    }
}

/// The line ending used for CSV job data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LineEnding {
    /// The (\n) character.
    #[default]
    #[serde(rename = "LF")]
    Linefeed,
    /// The (\r\n) characters.
    #[serde(rename = "CRLF")]
    CarriageReturnLinefeed,
    /// A line ending this client does not know; written as (\n).
    #[serde(other)]
    Unknown,
}

impl LineEnding {
    pub(crate) fn terminator(&self) -> csv::Terminator {
        match self {
            LineEnding::Linefeed | LineEnding::Unknown => csv::Terminator::Any(b'\n'),
            LineEnding::CarriageReturnLinefeed => csv::Terminator::CRLF,
        }
    }
}

/// How Salesforce processes the batches of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConcurrencyMode {
    /// Batches are processed one after the other.
    Serial,
    /// Batches are processed simultaneously.
    Parallel,
    #[serde(other)]
    Unknown,
}

/// The processing operation for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Insert new records.
    #[serde(alias = "Insert")]
    Insert,
    /// Delete records by ID.
    #[serde(alias = "Delete")]
    Delete,
    /// Delete records by ID, bypassing the recycle bin.
    #[serde(alias = "HardDelete")]
    HardDelete,
    /// Update records by ID.
    #[serde(alias = "Update")]
    Update,
    /// Insert or update records keyed by an external ID field.
    #[serde(alias = "Upsert")]
    Upsert,
    /// Query live records.
    #[serde(alias = "Query")]
    Query,
    /// Query live, deleted and archived records.
    #[serde(alias = "QueryAll")]
    QueryAll,
    /// An operation this client does not know. Never accepted when creating
    /// a job.
    #[serde(other)]
    Unknown,
}

impl Operation {
    /// Returns true for `query` and `queryAll`.
    pub fn is_query(&self) -> bool {
        matches!(self, Operation::Query | Operation::QueryAll)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Insert => "insert",
            Operation::Delete => "delete",
            Operation::HardDelete => "hardDelete",
            Operation::Update => "update",
            Operation::Upsert => "upsert",
            Operation::Query => "query",
            Operation::QueryAll => "queryAll",
            Operation::Unknown => "unknown",
        })
    }
}

/// The processing state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum State {
    /// Created; data can be uploaded.
    #[default]
    Open,
    /// Bulk 1.0: processing started, no new batches accepted.
    Closed,
    /// All data was uploaded; the job is queued for processing.
    UploadComplete,
    /// The server is processing the job.
    InProgress,
    /// The job was aborted.
    Aborted,
    /// The job was processed.
    JobComplete,
    /// The job could not be processed.
    Failed,
    /// A state this client does not know; treated as still processing.
    #[serde(other)]
    Unknown,
}

impl State {
    /// Returns true once the server will not move the job any further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::JobComplete | State::Failed | State::Aborted)
    }

    /// The wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Open => "Open",
            State::Closed => "Closed",
            State::UploadComplete => "UploadComplete",
            State::InProgress => "InProgress",
            State::Aborted => "Aborted",
            State::JobComplete => "JobComplete",
            State::Failed => "Failed",
            State::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for creating a job.
///
/// `operation` is always required. Ingest operations need `object`, query
/// operations need `query`, and `upsert` needs `external_id_field_name`.
/// Unset formatting options take the endpoint's defaults.
///
/// # Examples
///
/// ```
/// use salesforce_bulk::bulkapi::{ColumnDelimiter, Operation, Options};
///
/// let options = Options {
///     column_delimiter: Some(ColumnDelimiter::Pipe),
///     ..Options::ingest("Contact", Operation::Update)
/// };
/// let query = Options::query("SELECT Id, Name FROM Account");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    /// The processing operation.
    pub operation: Option<Operation>,
    /// The sObject being processed.
    pub object: Option<String>,
    /// SOQL text for query operations.
    pub query: Option<String>,
    /// External ID field used to match records on upsert.
    pub external_id_field_name: Option<String>,
    /// Column delimiter of the job data.
    pub column_delimiter: Option<ColumnDelimiter>,
    /// Format of the job data.
    pub content_type: Option<ContentType>,
    /// Line ending of the job data.
    pub line_ending: Option<LineEnding>,
    /// Bulk 1.0 batch concurrency.
    pub concurrency_mode: Option<ConcurrencyMode>,
    /// Assignment rule applied to inserted Case or Lead records.
    pub assignment_rule_id: Option<String>,
}

impl Options {
    /// Options for an ingest operation on an object.
    pub fn ingest(object: impl Into<String>, operation: Operation) -> Self {
        Self {
            operation: Some(operation),
            object: Some(object.into()),
            ..Self::default()
        }
    }

    /// Options for an upsert keyed by an external ID field.
    pub fn upsert(object: impl Into<String>, external_id_field_name: impl Into<String>) -> Self {
        Self {
            operation: Some(Operation::Upsert),
            object: Some(object.into()),
            external_id_field_name: Some(external_id_field_name.into()),
            ..Self::default()
        }
    }

    /// Options for a SOQL query.
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            operation: Some(Operation::Query),
            query: Some(query.into()),
            ..Self::default()
        }
    }
}

/// Job description returned by create, close, abort and list calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Response {
    pub api_version: f32,
    pub column_delimiter: ColumnDelimiter,
    pub concurrency_mode: Option<ConcurrencyMode>,
    pub content_type: Option<ContentType>,
    pub content_url: Option<String>,
    pub created_by_id: String,
    pub created_date: String,
    pub external_id_field_name: Option<String>,
    pub id: String,
    pub job_type: Option<JobType>,
    pub line_ending: LineEnding,
    pub object: Option<String>,
    pub operation: Option<Operation>,
    pub state: State,
    pub system_modstamp: String,
}

/// Point-in-time snapshot of a job's processing status.
///
/// A fresh snapshot is fetched on every call to [`Job::info`](super::Job::info).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Info {
    #[serde(flatten)]
    pub response: Response,
    pub apex_processing_time: i64,
    pub api_active_processing_time: i64,
    pub number_records_failed: i64,
    pub number_records_processed: i64,
    pub retries: i64,
    pub total_processing_time: i64,
    pub error_message: Option<String>,
}

impl Deref for Info {
    type Target = Response;

    fn deref(&self) -> &Response {
        &self.response
    }
}

/// A row the server did not process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnprocessedRecord {
    pub fields: Fields,
}

/// A processed row together with its Salesforce ID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub fields: Fields,
}

/// A row that was written, and whether it was created rather than updated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessfulRecord {
    pub created: bool,
    pub record: JobRecord,
}

/// A row that was rejected, and why.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailedRecord {
    pub error: String,
    pub record: JobRecord,
}

/// One page of query job results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsPage {
    /// Records of this page in server order.
    pub records: Vec<Fields>,
    /// Locator for the next page; `None` on the last page.
    pub locator: Option<String>,
    /// Record count reported by the server for this page.
    pub number_of_records: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimiter_resolution() {
        let cases = [
            ("TAB", '\t'),
            ("BACKQUOTE", '`'),
            ("CARET", '^'),
            ("COMMA", ','),
            ("PIPE", '|'),
            ("SEMICOLON", ';'),
            ("", ','),
            ("COLON", ','),
            ("pipe", ','),
        ];
        for (name, want) in cases {
            assert_eq!(ColumnDelimiter::from_name(name).as_char(), want, "{name}");
        }
    }

    #[test]
    fn test_delimiter_deserialize_is_total() {
        let cases = [
            ("\"PIPE\"", ColumnDelimiter::Pipe),
            ("\"TAB\"", ColumnDelimiter::Tab),
            ("\"\"", ColumnDelimiter::Comma),
            ("\"COLON\"", ColumnDelimiter::Comma),
            ("null", ColumnDelimiter::Comma),
        ];
        for (json, want) in cases {
            let delimiter: ColumnDelimiter = serde_json::from_str(json).unwrap();
            assert_eq!(delimiter, want, "{json}");
        }
    }

    #[test]
    fn test_response_tolerates_unknown_values() {
        let response: Response = serde_json::from_str(
            r#"{
                "id": "750X",
                "columnDelimiter": "",
                "concurrencyMode": "Sequential",
                "contentType": "ZIP_CSV",
                "jobType": "Classic",
                "lineEnding": "CR",
                "operation": "merge",
                "state": "Queued"
            }"#,
        )
        .unwrap();
        assert_eq!(response.id, "750X");
        assert_eq!(response.column_delimiter, ColumnDelimiter::Comma);
        assert_eq!(response.concurrency_mode, Some(ConcurrencyMode::Unknown));
        assert_eq!(response.content_type, Some(ContentType::Unknown));
        assert_eq!(response.job_type, Some(JobType::Classic));
        assert_eq!(response.line_ending, LineEnding::Unknown);
        assert_eq!(response.operation, Some(Operation::Unknown));
        assert_eq!(response.state, State::Unknown);
        assert!(!response.state.is_terminal());
    }

    #[test]
    fn test_delimiter_serde_names() {
        for delimiter in [
            ColumnDelimiter::Backquote,
            ColumnDelimiter::Caret,
            ColumnDelimiter::Comma,
            ColumnDelimiter::Pipe,
            ColumnDelimiter::Semicolon,
            ColumnDelimiter::Tab,
        ] {
            let json = serde_json::to_string(&delimiter).unwrap();
            assert_eq!(ColumnDelimiter::from_name(json.trim_matches('"')), delimiter);
        }
    }

    #[test]
    fn test_operation_wire_names() {
        assert_eq!(serde_json::to_string(&Operation::QueryAll).unwrap(), "\"queryAll\"");
        assert_eq!(serde_json::to_string(&Operation::HardDelete).unwrap(), "\"hardDelete\"");
        let op: Operation = serde_json::from_str("\"Insert\"").unwrap();
        assert_eq!(op, Operation::Insert);
        assert!(Operation::QueryAll.is_query());
        assert!(!Operation::Upsert.is_query());
    }

    #[test]
    fn test_terminal_states() {
        assert!(State::JobComplete.is_terminal());
        assert!(State::Failed.is_terminal());
        assert!(State::Aborted.is_terminal());
        assert!(!State::Open.is_terminal());
        assert!(!State::UploadComplete.is_terminal());
        assert!(!State::InProgress.is_terminal());
        assert!(!State::Closed.is_terminal());
        assert!(!State::Unknown.is_terminal());
    }

    #[test]
    fn test_response_deserialize() {
        let response: Response = serde_json::from_str(
            r#"{
                "apiVersion": 44.0,
                "columnDelimiter": "COMMA",
                "concurrencyMode": "Parallel",
                "contentType": "CSV",
                "contentUrl": "services/v44.0/jobs",
                "createdById": "1234",
                "createdDate": "1/1/1970",
                "externalIdFieldName": "namename",
                "id": "9876",
                "jobType": "V2Ingest",
                "lineEnding": "LF",
                "object": "Account",
                "operation": "Insert",
                "state": "Open",
                "systemModstamp": "1/1/1980"
            }"#,
        )
        .unwrap();
        assert_eq!(response.id, "9876");
        assert_eq!(response.job_type, Some(JobType::V2Ingest));
        assert_eq!(response.operation, Some(Operation::Insert));
        assert_eq!(response.state, State::Open);
        assert_eq!(response.external_id_field_name.as_deref(), Some("namename"));
    }

    #[test]
    fn test_info_flattens_response() {
        let info: Info = serde_json::from_str(
            r#"{
                "id": "9876",
                "state": "JobComplete",
                "columnDelimiter": "PIPE",
                "numberRecordsProcessed": 12,
                "numberRecordsFailed": 2,
                "totalProcessingTime": 300,
                "errorMessage": "partial"
            }"#,
        )
        .unwrap();
        assert_eq!(info.id, "9876");
        assert_eq!(info.state, State::JobComplete);
        assert_eq!(info.column_delimiter, ColumnDelimiter::Pipe);
        assert_eq!(info.number_records_processed, 12);
        assert_eq!(info.number_records_failed, 2);
        assert_eq!(info.error_message.as_deref(), Some("partial"));
    }

    #[test]
    fn test_endpoint_capabilities() {
        assert!(Endpoint::Query.supports_results());
        assert!(!Endpoint::Ingest.supports_results());
        assert!(Endpoint::Ingest.supports_upload());
        assert!(!Endpoint::Classic.supports_upload());
        assert!(Endpoint::Classic.supports_batches());
        assert!(Endpoint::Ingest.supports_wait());
        assert!(Endpoint::Query.supports_wait());
        assert!(!Endpoint::Classic.supports_wait());
        assert_eq!(Endpoint::Classic.close_state(), State::Closed);
        assert_eq!(Endpoint::Ingest.close_state(), State::UploadComplete);
        assert_eq!(Endpoint::Classic.state_method(), reqwest::Method::POST);
        assert_eq!(Endpoint::Query.state_method(), reqwest::Method::PATCH);
    }
}
