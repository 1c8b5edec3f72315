use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while building or refreshing a session.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read the session configuration file from disk.
    #[error("Failed to read session config at {path}: {source}")]
    ReadConfig {
        /// Path to the configuration file that failed to read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse the session configuration JSON.
    #[error("Failed to parse session config JSON: {source}")]
    ParseConfig {
        #[source]
        source: serde_json::Error,
    },
    /// Invalid instance URL.
    #[error("Invalid URL format: {source}")]
    ParseUrl {
        #[source]
        source: url::ParseError,
    },
    /// Required builder parameter was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
    /// The session has no access token to authorize requests with.
    #[error("Access token is empty")]
    EmptyAccessToken,
    /// Failed to build the underlying HTTP client.
    #[error("Failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },
}

/// The transport collaborator consumed by bulk jobs.
///
/// A session knows where the org lives, how to authorize a request and which
/// HTTP client executes it. Implementations must be cheap to share between
/// job handles.
#[async_trait]
pub trait Session: Send + Sync + fmt::Debug {
    /// Salesforce hostname as a URL, e.g. `https://na42.salesforce.com`.
    fn instance_url(&self) -> &str;

    /// API version without the leading `v`, e.g. `65.0`.
    fn api_version(&self) -> &str;

    /// Versioned base URL for the data service.
    fn data_service_url(&self) -> String {
        format!(
            "{}/services/data/v{}",
            self.instance_url().trim_end_matches('/'),
            self.api_version()
        )
    }

    /// Adds authorization to an outgoing request.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder;

    /// HTTP client used to execute requests.
    fn client(&self) -> &reqwest::Client;

    /// Ensures the session is usable before the first call.
    async fn refresh(&self) -> Result<(), Error>;
}

/// Session configuration.
///
/// # Examples
///
/// ```
/// use salesforce_bulk::session::SessionConfig;
///
/// let config = SessionConfig {
///     instance_url: "https://your-instance.salesforce.com".to_string(),
///     access_token: "00D...".to_string(),
///     api_version: Some("62.0".to_string()),
///     connect_timeout_secs: None,
///     request_timeout_secs: None,
/// };
/// ```
#[derive(Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Salesforce instance URL (e.g., `https://mydomain.my.salesforce.com`).
    pub instance_url: String,
    /// OAuth2 access token used as the bearer credential.
    pub access_token: String,
    /// API version, defaults to [`crate::DEFAULT_API_VERSION`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Connect timeout, defaults to [`crate::DEFAULT_CONNECT_TIMEOUT_SECS`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    /// Request timeout, defaults to [`crate::DEFAULT_REQUEST_TIMEOUT_SECS`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("instance_url", &self.instance_url)
            .field("access_token", &"[redacted]")
            .field("api_version", &self.api_version)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Source for loading the session configuration.
#[derive(Debug, Clone)]
pub enum ConfigFrom {
    /// Load the configuration from a JSON file.
    Path(PathBuf),
    /// Use the configuration provided directly.
    Value(SessionConfig),
}

impl ConfigFrom {
    fn load(self) -> Result<SessionConfig, Error> {
        match self {
            ConfigFrom::Value(config) => Ok(config),
            ConfigFrom::Path(path) => {
                let contents = fs::read_to_string(&path)
                    .map_err(|source| Error::ReadConfig { path, source })?;
                serde_json::from_str(&contents).map_err(|source| Error::ParseConfig { source })
            }
        }
    }
}

/// Session authorized with a pre-issued bearer access token.
///
/// Use [`Builder`] to construct one.
#[derive(Clone)]
pub struct AccessTokenSession {
    instance_url: String,
    api_version: String,
    access_token: String,
    http_client: reqwest::Client,
}

impl fmt::Debug for AccessTokenSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenSession")
            .field("instance_url", &self.instance_url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Session for AccessTokenSession {
    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.access_token)
    }

    fn client(&self) -> &reqwest::Client {
        &self.http_client
    }

    async fn refresh(&self) -> Result<(), Error> {
        if self.access_token.trim().is_empty() {
            return Err(Error::EmptyAccessToken);
        }
        Ok(())
    }
}

/// Builder for constructing an [`AccessTokenSession`].
///
/// # Examples
///
/// ```no_run
/// use salesforce_bulk::session;
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = session::Builder::new()
///     .config_path(PathBuf::from("session.json"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Builder {
    config_from: Option<ConfigFrom>,
    http_client: Option<reqwest::Client>,
}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the configuration from a JSON file.
    ///
    /// ```json
    /// {
    ///   "instance_url": "https://your-instance.salesforce.com",
    ///   "access_token": "00D...",
    ///   "api_version": "65.0"
    /// }
    /// ```
    pub fn config_path(mut self, path: PathBuf) -> Self {
        self.config_from = Some(ConfigFrom::Path(path));
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config_from = Some(ConfigFrom::Value(config));
        self
    }

    /// Uses a caller-provided HTTP client instead of building one.
    ///
    /// Timeouts from the configuration are ignored in that case.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No configuration was provided ([`Error::MissingRequiredAttribute`])
    /// - The configuration file cannot be read ([`Error::ReadConfig`])
    /// - The configuration JSON is invalid ([`Error::ParseConfig`])
    /// - The instance URL is malformed ([`Error::ParseUrl`])
    pub fn build(self) -> Result<AccessTokenSession, Error> {
        let config = self
            .config_from
            .ok_or_else(|| Error::MissingRequiredAttribute("config or config_path".to_string()))?
            .load()?;

        url::Url::parse(&config.instance_url).map_err(|source| Error::ParseUrl { source })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(
                    config
                        .connect_timeout_secs
                        .unwrap_or(crate::DEFAULT_CONNECT_TIMEOUT_SECS),
                ))
                .timeout(Duration::from_secs(
                    config
                        .request_timeout_secs
                        .unwrap_or(crate::DEFAULT_REQUEST_TIMEOUT_SECS),
                ))
                .tcp_keepalive(Duration::from_secs(crate::DEFAULT_TCP_KEEPALIVE_SECS))
                .pool_max_idle_per_host(crate::DEFAULT_POOL_MAX_IDLE_PER_HOST)
                .pool_idle_timeout(Duration::from_secs(crate::DEFAULT_POOL_IDLE_TIMEOUT_SECS))
                .build()
                .map_err(|source| Error::HttpClientBuild { source })?,
        };

        Ok(AccessTokenSession {
            instance_url: config.instance_url.trim_end_matches('/').to_string(),
            api_version: config
                .api_version
                .unwrap_or_else(|| crate::DEFAULT_API_VERSION.to_string()),
            access_token: config.access_token,
            http_client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn config() -> SessionConfig {
        SessionConfig {
            instance_url: "https://test.salesforce.com".to_string(),
            access_token: "test_token".to_string(),
            api_version: None,
            connect_timeout_secs: None,
            request_timeout_secs: None,
        }
    }

    #[test]
    fn test_build_without_config() {
        let session = Builder::new().build();
        assert!(matches!(
            session,
            Err(Error::MissingRequiredAttribute(attr)) if attr == "config or config_path"
        ));
    }

    #[test]
    fn test_build_with_missing_file() {
        let mut path = env::temp_dir();
        path.push(format!("nonexistent_session_{}.json", std::process::id()));
        let session = Builder::new().config_path(path).build();
        assert!(matches!(session, Err(Error::ReadConfig { .. })));
    }

    #[test]
    fn test_build_with_invalid_json() {
        let mut path = env::temp_dir();
        path.push(format!("invalid_session_{}.json", std::process::id()));
        let _ = fs::write(&path, r#"{"instance_url":"https://test.salesforce.com"}"#);
        let session = Builder::new().config_path(path.clone()).build();
        let _ = fs::remove_file(path);
        assert!(matches!(session, Err(Error::ParseConfig { .. })));
    }

    #[test]
    fn test_build_with_invalid_url() {
        let mut cfg = config();
        cfg.instance_url = "mydomain.salesforce.com".to_string();
        let session = Builder::new().config(cfg).build();
        assert!(matches!(session, Err(Error::ParseUrl { .. })));
    }

    #[test]
    fn test_build_from_file() {
        let mut path = env::temp_dir();
        path.push(format!("valid_session_{}.json", std::process::id()));
        let _ = fs::write(
            &path,
            r#"{
                "instance_url": "https://test.salesforce.com/",
                "access_token": "abc",
                "api_version": "59.0"
            }"#,
        );
        let session = Builder::new().config_path(path.clone()).build();
        let _ = fs::remove_file(path);
        let session = session.unwrap();
        assert_eq!(session.instance_url(), "https://test.salesforce.com");
        assert_eq!(
            session.data_service_url(),
            "https://test.salesforce.com/services/data/v59.0"
        );
    }

    #[test]
    fn test_default_api_version() {
        let session = Builder::new().config(config()).build().unwrap();
        assert_eq!(session.api_version(), crate::DEFAULT_API_VERSION);
    }

    #[tokio::test]
    async fn test_refresh_with_empty_token() {
        let mut cfg = config();
        cfg.access_token = "  ".to_string();
        let session = Builder::new().config(cfg).build().unwrap();
        assert!(matches!(
            session.refresh().await,
            Err(Error::EmptyAccessToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_with_token() {
        let session = Builder::new().config(config()).build().unwrap();
        assert!(session.refresh().await.is_ok());
    }

    #[test]
    fn test_authorize_adds_bearer_header() {
        let session = Builder::new().config(config()).build().unwrap();
        let request = session
            .authorize(session.client().get("https://test.salesforce.com"))
            .build()
            .unwrap();
        assert_eq!(
            request
                .headers()
                .get(reqwest::header::AUTHORIZATION)
                .unwrap()
                .to_str()
                .unwrap(),
            "Bearer test_token"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = Builder::new().config(config()).build().unwrap();
        let debug_str = format!("{session:?}");
        assert!(debug_str.contains("AccessTokenSession"));
        assert!(!debug_str.contains("test_token"));

        let debug_str = format!("{:?}", config());
        assert!(!debug_str.contains("test_token"));
    }

    #[test]
    fn test_config_serde_optional_fields() {
        let json = serde_json::to_string(&config()).unwrap();
        assert!(!json.contains("api_version"));
        assert!(!json.contains("timeout"));
    }

    #[test]
    fn test_error_display_messages() {
        let error = Error::MissingRequiredAttribute("test_field".to_string());
        assert_eq!(error.to_string(), "Missing required attribute: test_field");

        let error = Error::EmptyAccessToken;
        assert_eq!(error.to_string(), "Access token is empty");
    }
}
