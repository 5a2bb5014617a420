//! JSON-over-HTTP transport with per-call timeouts and typed failures.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Default AutoGLM API server address.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8765";

/// Default timeout for health, status and stop calls in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Default timeout for task submission in seconds.
pub const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 30;

/// Transport errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("No data received")]
    Empty,
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Invalid server URL: {0}")]
    InvalidConfiguration(String),
}

impl TransportError {
    /// Whether the server could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Network(_) | TransportError::Timeout(_))
    }

    fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            TransportError::Timeout(timeout)
        } else if error.is_decode() {
            TransportError::Decode(error.to_string())
        } else {
            TransportError::Network(error.to_string())
        }
    }
}

/// Validate a server base URL.
///
/// Accepts absolute `http`/`https` URLs with a host. Trailing slashes are
/// dropped so endpoint paths can be appended directly.
pub fn parse_base_url(raw: &str) -> Result<String, TransportError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| TransportError::InvalidConfiguration(format!("'{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(TransportError::InvalidConfiguration(format!(
            "'{}': unsupported scheme '{}'",
            raw,
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(TransportError::InvalidConfiguration(format!(
            "'{}': missing host",
            raw
        )));
    }

    Ok(trimmed.to_string())
}

/// Transport bound to one AutoGLM API server.
///
/// No retries happen here; the status poller retries by ticking again and
/// one-shot calls do not retry at all.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    /// Create a transport for the given base URL.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            client: Client::new(),
        })
    }

    /// Normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse(&raw).map_err(|e| TransportError::InvalidConfiguration(format!("'{}': {}", raw, e)))
    }

    /// `GET` a path and decode the JSON response.
    pub async fn get<T>(&self, path: &str, timeout: Duration) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        self.send::<(), T>(Method::GET, path, None, timeout).await
    }

    /// `POST` a JSON body and decode the JSON response.
    pub async fn post<B, T>(&self, path: &str, body: &B, timeout: Duration) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::POST, path, Some(body), timeout).await
    }

    /// `POST` a JSON body and decode the JSON response, keeping the status.
    ///
    /// For replies whose meaning depends on the status as well as the body.
    pub async fn post_with_status<B, T>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<(StatusCode, T), TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_status(Method::POST, path, Some(body), timeout)
            .await
    }

    /// `POST` without a body, ignoring whatever the server answers.
    ///
    /// Only failing to reach the server is an error.
    pub async fn post_ignoring_body(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<StatusCode, TransportError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        tracing::debug!(path, status = response.status().as_u16(), "AutoGLM response ignored");
        Ok(response.status())
    }

    /// Send a request and decode the JSON response.
    ///
    /// A non-2xx response whose body still decodes as `T` is returned as data,
    /// since the server reports rejections as JSON with an `error` field.
    pub async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_status(method, path, body, timeout)
            .await
            .map(|(_, value)| value)
    }

    /// Like [`send`](Self::send), but also returns the response status.
    pub async fn send_with_status<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<(StatusCode, T), TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let mut request = self.client.request(method.clone(), url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        tracing::debug!(%method, path, status = status.as_u16(), len = bytes.len(), "AutoGLM response");

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(if status.is_success() {
                TransportError::Empty
            } else {
                TransportError::Http {
                    status: status.as_u16(),
                    body: String::new(),
                }
            });
        }

        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => Ok((status, value)),
            Err(e) if status.is_success() => Err(TransportError::Decode(e.to_string())),
            Err(_) => Err(TransportError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).trim().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ExecuteReply, ServerHealth, TaskRequest, TaskResult};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_parse_base_url() {
        assert_eq!(
            parse_base_url("http://127.0.0.1:8765/").unwrap(),
            "http://127.0.0.1:8765"
        );
        assert_eq!(
            parse_base_url("  https://autoglm.local/api ").unwrap(),
            "https://autoglm.local/api"
        );
        assert!(matches!(
            parse_base_url("127.0.0.1:8765"),
            Err(TransportError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            parse_base_url("ftp://127.0.0.1"),
            Err(TransportError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            parse_base_url(""),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_get_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "agent_initialized": true,
                "devices": []
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let health: ServerHealth = transport.get("/health", TIMEOUT).await.unwrap();
        assert!(health.is_ok());
        assert!(health.agent_initialized);
    }

    #[tokio::test]
    async fn test_post_sends_wire_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .and(body_json(json!({"task": "打开微信", "device_id": "10.0.0.2:5555", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "started",
                "task": "打开微信",
                "message": "Task execution started. Use /status to check progress."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let request = TaskRequest::new("打开微信").with_device_id("10.0.0.2:5555");
        let result: TaskResult = transport.post("/execute", &request, TIMEOUT).await.unwrap();
        assert_eq!(result.status, "started");
        assert_eq!(result.task, "打开微信");
    }

    #[tokio::test]
    async fn test_error_status_with_json_body_is_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": "Another task is already running",
                "current_task": "open settings"
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let (status, reply): (StatusCode, ExecuteReply) = transport
            .post_with_status("/execute", &TaskRequest::new("x"), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CONFLICT);
        match reply {
            ExecuteReply::Rejected(rejection) => {
                assert_eq!(rejection.error, "Another task is already running");
                assert_eq!(rejection.current_task.as_deref(), Some("open settings"));
            }
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_status_with_foreign_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"detail": "Service Unavailable"})),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport
            .post::<_, ExecuteReply>("/execute", &TaskRequest::new("x"), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport
            .get::<serde_json::Value>("/status", TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Empty);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\": "))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport.get::<ServerHealth>("/health", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn test_error_status_without_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport.get::<ServerHealth>("/health", TIMEOUT).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Http {
                status: 502,
                body: "Bad Gateway".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"running": true, "step": 0}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let timeout = Duration::from_millis(50);
        let err = transport
            .get::<serde_json::Value>("/status", timeout)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout(timeout));
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };

        let transport = HttpTransport::new(&uri).unwrap();
        let err = transport.get::<ServerHealth>("/health", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
    }

    #[tokio::test]
    async fn test_post_ignoring_body_accepts_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/stop"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "No task is running"})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let status = transport.post_ignoring_body("/stop", TIMEOUT).await.unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
