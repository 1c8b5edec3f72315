//! Structured errors decoded from non-2xx Salesforce responses.
//!
//! Salesforce reports failures as a JSON array of `{errorCode, message, fields}`
//! objects (some endpoints use `statusCode` instead of `errorCode`). When a body
//! does not decode that way its raw text is kept verbatim.

use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;

/// A single error entry reported by the Salesforce API.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "RawApiError")]
#[error("{}: {} ({})", .error_code, .message, .fields.join(", "))]
pub struct ApiError {
    /// Error code such as `MALFORMED_ID` or `INVALID_SESSION_ID`.
    pub error_code: String,
    /// Human readable message.
    pub message: String,
    /// Fields the error refers to, if any.
    pub fields: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawApiError {
    error_code: Option<String>,
    status_code: Option<String>,
    message: Option<String>,
    fields: Option<Vec<String>>,
}

impl From<RawApiError> for ApiError {
    fn from(raw: RawApiError) -> Self {
        Self {
            error_code: raw.error_code.or(raw.status_code).unwrap_or_default(),
            message: raw.message.unwrap_or_default(),
            fields: raw.fields.unwrap_or_default(),
        }
    }
}

/// Every error entry from one response, in the order the server sent them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct ApiErrors(Vec<ApiError>);

impl ApiErrors {
    /// Returns the entries as a slice.
    pub fn as_slice(&self) -> &[ApiError] {
        &self.0
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, ApiError> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the server sent an empty array.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if any entry carries the given error code.
    pub fn contains_code(&self, code: &str) -> bool {
        self.0.iter().any(|e| e.error_code == code)
    }
}

impl From<Vec<ApiError>> for ApiErrors {
    fn from(errors: Vec<ApiError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for ApiErrors {
    type Item = ApiError;
    type IntoIter = std::vec::IntoIter<ApiError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ApiErrors {
    type Item = &'a ApiError;
    type IntoIter = std::slice::Iter<'a, ApiError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ApiErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiErrors {}

/// Body of a failed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorBody {
    /// The body decoded as a list of Salesforce errors.
    Structured(ApiErrors),
    /// The body could not be decoded; this is its text.
    Raw(String),
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorBody::Structured(errors) => write!(f, "{errors}"),
            ErrorBody::Raw(text) => f.write_str(text),
        }
    }
}

/// A non-2xx response translated into a domain error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}: {body}")]
pub struct HttpError {
    /// HTTP status of the response.
    pub status: StatusCode,
    /// Decoded response body.
    pub body: ErrorBody,
}

impl HttpError {
    /// Builds an error from a status and the full response body.
    pub fn from_body(status: StatusCode, body: &[u8]) -> Self {
        let body = match serde_json::from_slice::<ApiErrors>(body) {
            Ok(errors) => ErrorBody::Structured(errors),
            Err(_) => ErrorBody::Raw(String::from_utf8_lossy(body).into_owned()),
        };
        Self { status, body }
    }

    /// Consumes a failed response, reading its full body.
    ///
    /// The body is always drained, so the connection is released on return.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        match response.bytes().await {
            Ok(bytes) => Self::from_body(status, &bytes),
            Err(err) => Self {
                status,
                body: ErrorBody::Raw(format!("could not read the body with error: {err}")),
            },
        }
    }

    /// The structured entries, when the body decoded as such.
    pub fn errors(&self) -> Option<&ApiErrors> {
        match &self.body {
            ErrorBody::Structured(errors) => Some(errors),
            ErrorBody::Raw(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_error_display() {
        let error = HttpError::from_body(
            StatusCode::BAD_REQUEST,
            br#"[{"errorCode":"MALFORMED_ID","message":"bad id","fields":["Id"]}]"#,
        );
        assert_eq!(error.to_string(), "400 Bad Request: MALFORMED_ID: bad id (Id)");
    }

    #[test]
    fn test_multiple_errors_are_preserved() {
        let error = HttpError::from_body(
            StatusCode::BAD_REQUEST,
            br#"[
                {"errorCode":"REQUIRED_FIELD_MISSING","message":"missing","fields":["Name","Site"]},
                {"statusCode":"INVALID_FIELD","message":"nope"}
            ]"#,
        );
        assert_eq!(
            error.to_string(),
            "400 Bad Request: REQUIRED_FIELD_MISSING: missing (Name, Site), INVALID_FIELD: nope ()"
        );

        let errors = error.errors().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains_code("INVALID_FIELD"));
        assert_eq!(errors.as_slice()[0].fields, vec!["Name", "Site"]);
    }

    #[test]
    fn test_error_code_wins_over_status_code() {
        let errors: ApiErrors = serde_json::from_str(
            r#"[{"statusCode":"STATUS","errorCode":"ERROR","message":"m"}]"#,
        )
        .unwrap();
        assert_eq!(errors.as_slice()[0].error_code, "ERROR");
    }

    #[test]
    fn test_raw_body_fallback() {
        let error = HttpError::from_body(StatusCode::INTERNAL_SERVER_ERROR, b"upstream exploded");
        assert_eq!(error.body, ErrorBody::Raw("upstream exploded".to_string()));
        assert!(error.errors().is_none());
        assert_eq!(
            error.to_string(),
            "500 Internal Server Error: upstream exploded"
        );
    }

    #[test]
    fn test_non_string_code_falls_back_to_raw() {
        let body = br#"[{"errorCode":42,"message":"m"}]"#;
        let error = HttpError::from_body(StatusCode::BAD_REQUEST, body);
        assert!(matches!(error.body, ErrorBody::Raw(_)));
    }

    #[test]
    fn test_object_body_falls_back_to_raw() {
        let body = br#"{"errorCode":"X","message":"m"}"#;
        let error = HttpError::from_body(StatusCode::NOT_FOUND, body);
        assert_eq!(error.body, ErrorBody::Raw(String::from_utf8_lossy(body).into_owned()));
    }
}
