//! Bulk 1.0 batches of a classic job.

use super::codec;
use super::job::{expect, json, Job};
use super::types::{ContentType, FailedRecord, Fields, JobRecord, SuccessfulRecord};
use super::Error;
use reqwest::StatusCode;
use serde::Deserialize;

/// The processing state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum BatchState {
    #[default]
    Queued,
    InProgress,
    Completed,
    Failed,
    NotProcessed,
}

/// Batch description returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchInfo {
    pub apex_processing_time: i64,
    pub api_active_processing_time: i64,
    pub created_date: String,
    pub id: String,
    #[serde(alias = "jobID")]
    pub job_id: String,
    pub number_records_failed: i64,
    pub number_records_processed: i64,
    pub state: BatchState,
    pub state_message: Option<String>,
    pub system_modstamp: String,
    pub total_processing_time: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BatchInfoList {
    batch_info: Vec<BatchInfo>,
}

/// One error reported for a batch record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordError {
    pub message: String,
    pub fields: Vec<String>,
    pub status_code: String,
    pub extended_error_detail: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResultRow {
    id: Option<String>,
    success: bool,
    created: bool,
    errors: Vec<RecordError>,
}

/// Outcome of every record in a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub successful: Vec<SuccessfulRecord>,
    pub failed: Vec<FailedRecord>,
}

/// The batches of a classic job, as of the last listing.
#[derive(Debug, Clone)]
pub struct JobBatches {
    job: Job,
    batches: Vec<BatchInfo>,
}

/// A handle on one batch.
#[derive(Debug, Clone)]
pub struct Batch {
    job: Job,
    info: BatchInfo,
}

impl Job {
    /// Lists the batches of a classic job.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn batches(&self) -> Result<JobBatches, Error> {
        if !self.endpoint().supports_batches() {
            return Err(Error::Usage {
                reason: "batches are only available for classic jobs".to_string(),
            });
        }
        let builder = self.session().client().get(self.url("batch"));
        let response = self.send(builder, "listing batches").await?;
        let response = expect(response, &[StatusCode::OK], "listing batches").await?;
        let list: BatchInfoList = json(response, "listing batches").await?;

        Ok(JobBatches {
            job: self.clone(),
            batches: list.batch_info,
        })
    }
}

impl JobBatches {
    /// Batch descriptions, in server order.
    pub fn infos(&self) -> &[BatchInfo] {
        &self.batches
    }

    /// Handles for every listed batch.
    pub fn all(&self) -> Vec<Batch> {
        self.batches
            .iter()
            .map(|info| Batch {
                job: self.job.clone(),
                info: info.clone(),
            })
            .collect()
    }

    /// Adds a batch of records to the job, encoded in the job's content type.
    ///
    /// CSV batches use the job's delimiter and line ending, with one column
    /// per field name in order of first appearance.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create(&self, records: &[Fields]) -> Result<Batch, Error> {
        let response = self.job.response();
        let content_type = response.content_type.unwrap_or(ContentType::Json);
        let body = match content_type {
            ContentType::Json => serde_json::to_vec(records).map_err(|source| Error::Json {
                phase: "creating batch",
                source,
            })?,
            ContentType::Csv => codec::encode(
                response.column_delimiter,
                response.line_ending,
                columns(records),
                records,
            )?,
            ContentType::Unknown => {
                return Err(Error::Usage {
                    reason: "records can only be batched for CSV or JSON jobs".to_string(),
                })
            }
        };
        self.create_raw(content_type, body).await
    }

    /// Adds a batch whose body is already encoded in `content_type`.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create_raw(
        &self,
        content_type: ContentType,
        body: impl Into<reqwest::Body>,
    ) -> Result<Batch, Error> {
        if content_type == ContentType::Unknown {
            return Err(Error::Usage {
                reason: "batch content type must be CSV or JSON".to_string(),
            });
        }
        let builder = self
            .job
            .session()
            .client()
            .post(self.job.url("batch"))
            .header(reqwest::header::CONTENT_TYPE, content_type.mime())
            .body(body);
        let response = self.job.send(builder, "creating batch").await?;
        let response = expect(response, &[StatusCode::CREATED], "creating batch").await?;
        let info: BatchInfo = json(response, "creating batch").await?;
        tracing::debug!(job_id = %self.job.id(), batch_id = %info.id, "batch created");

        Ok(Batch {
            job: self.job.clone(),
            info,
        })
    }

    /// Fetches a batch by ID.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn get(&self, id: &str) -> Result<Batch, Error> {
        let batch = Batch {
            job: self.job.clone(),
            info: BatchInfo {
                id: id.to_string(),
                ..BatchInfo::default()
            },
        };
        let info = batch.refresh().await?;
        Ok(Batch { info, ..batch })
    }
}

impl Batch {
    /// The description this handle was created with.
    pub fn info(&self) -> &BatchInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Fetches a fresh batch description.
    pub async fn refresh(&self) -> Result<BatchInfo, Error> {
        let builder = self.job.session().client().get(self.url(""));
        let response = self.job.send(builder, "fetching batch").await?;
        let response = expect(response, &[StatusCode::OK], "fetching batch").await?;
        json(response, "fetching batch").await
    }

    /// The records submitted with this batch, in submission order.
    pub async fn request_records(&self) -> Result<Vec<Fields>, Error> {
        let builder = self.job.session().client().get(self.url("request"));
        let response = self.job.send(builder, "fetching batch request").await?;
        let response = expect(response, &[StatusCode::OK], "fetching batch request").await?;
        json(response, "fetching batch request").await
    }

    /// Splits the batch records into successful and failed ones.
    ///
    /// Result rows are matched to the submitted records by position.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn results(&self) -> Result<BatchResult, Error> {
        let builder = self.job.session().client().get(self.url("result"));
        let response = self.job.send(builder, "fetching batch results").await?;
        let response = expect(response, &[StatusCode::OK], "fetching batch results").await?;
        let rows: Vec<ResultRow> = json(response, "fetching batch results").await?;
        let requests = self.request_records().await?;

        Ok(merge_results(rows, requests))
    }

    fn url(&self, path: &str) -> String {
        let base = self.job.url(&format!("batch/{}", self.info.id));
        if path.is_empty() {
            base
        } else {
            format!("{base}/{path}")
        }
    }
}

fn columns(records: &[Fields]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for name in records.iter().flat_map(|record| record.keys()) {
        if !columns.contains(name) {
            columns.push(name.clone());
        }
    }
    columns
}

fn merge_results(rows: Vec<ResultRow>, requests: Vec<Fields>) -> BatchResult {
    let mut result = BatchResult::default();
    let requests = requests.into_iter().map(Some).chain(std::iter::repeat(None));

    for (row, fields) in rows.into_iter().zip(requests) {
        let record = JobRecord {
            id: row.id.unwrap_or_default(),
            fields: fields.unwrap_or_default(),
        };
        if row.success {
            result.successful.push(SuccessfulRecord {
                created: row.created,
                record,
            });
        } else {
            let error = row
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.status_code))
                .collect::<Vec<_>>()
                .join("\n");
            result.failed.push(FailedRecord { error, record });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_info_list_deserialize() {
        let list: BatchInfoList = serde_json::from_str(
            r#"{"batchInfo":[{
                "id": "751D",
                "jobId": "750D",
                "state": "InProgress",
                "numberRecordsProcessed": 3
            }]}"#,
        )
        .unwrap();
        assert_eq!(list.batch_info.len(), 1);
        assert_eq!(list.batch_info[0].state, BatchState::InProgress);
        assert_eq!(list.batch_info[0].job_id, "750D");
    }

    #[test]
    fn test_merge_results_by_position() {
        let rows: Vec<ResultRow> = serde_json::from_value(json!([
            {"id": "001A", "success": true, "created": true, "errors": []},
            {"id": null, "success": false, "created": false, "errors": [
                {"message": "Name missing", "fields": ["Name"], "statusCode": "REQUIRED_FIELD_MISSING"},
                {"message": "Bad site", "fields": [], "statusCode": "INVALID_FIELD"}
            ]}
        ]))
        .unwrap();
        let requests: Vec<Fields> = serde_json::from_value(json!([
            {"Name": "Acme"},
            {"Site": "nowhere"}
        ]))
        .unwrap();

        let result = merge_results(rows, requests);
        assert_eq!(result.successful.len(), 1);
        assert!(result.successful[0].created);
        assert_eq!(result.successful[0].record.id, "001A");
        assert_eq!(result.successful[0].record.fields.get("Name"), Some(&json!("Acme")));

        assert_eq!(result.failed.len(), 1);
        assert_eq!(
            result.failed[0].error,
            "Name missing (REQUIRED_FIELD_MISSING)\nBad site (INVALID_FIELD)"
        );
        assert_eq!(result.failed[0].record.id, "");
        assert_eq!(result.failed[0].record.fields.get("Site"), Some(&json!("nowhere")));
    }

    #[test]
    fn test_columns_in_first_appearance_order() {
        let records: Vec<Fields> = serde_json::from_value(json!([
            {"Name": "Acme", "Site": "north"},
            {"Phone": "555", "Name": "Globex"}
        ]))
        .unwrap();
        assert_eq!(columns(&records), vec!["Name", "Site", "Phone"]);
    }

    #[test]
    fn test_merge_results_with_short_request() {
        let rows: Vec<ResultRow> =
            serde_json::from_value(json!([{"id": "001A", "success": true}, {"id": "001B", "success": true}]))
                .unwrap();
        let result = merge_results(rows, Vec::new());
        assert_eq!(result.successful.len(), 2);
        assert!(result.successful[1].record.fields.is_empty());
    }
}
