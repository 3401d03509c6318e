//! HTTP boundary: record ingestion and queries over hyper
//!
//! Routes:
//! - `GET /health` reports liveness
//! - `POST /log` validates a JSON record and hands it to the [`Logger`]
//! - `GET /logs?level=&service=&from=&to=` runs a query through the [`Querier`]

use crate::config::ServerConfig;
use crate::console_sink::ConsoleSink;
use crate::file_sink::FileSink;
use crate::file_source::FileSource;
use crate::logger::Logger;
use crate::querier::Querier;
use crate::schema::{LogLevel, LogRecord, QueryParams};
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Largest request body accepted by `POST /log`
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

fn full<T: Into<Bytes>>(chunk: T) -> Full<Bytes> {
    Full::new(chunk.into())
}

/// Pipelines shared by every request
pub struct AppState {
    pub logger: Logger,
    pub querier: Querier,
}

impl AppState {
    pub fn new(logger: Logger, querier: Querier) -> Self {
        Self { logger, querier }
    }

    /// Build the pipelines described by `config`
    ///
    /// Returns the file sink handle alongside the state so the caller can
    /// shut it down once the server has stopped.
    pub fn from_config(config: &ServerConfig) -> Result<(Arc<FileSink>, Self)> {
        let storage = &config.storage;

        let file_sink = Arc::new(FileSink::new(&storage.log_file).with_context(|| {
            format!("Failed to open log file {}", storage.log_file.display())
        })?);
        let mut logger = Logger::new(file_sink.clone());
        if storage.console {
            logger.add_sink(Arc::new(ConsoleSink::stdout()));
        }

        let primary = FileSource::new(&storage.log_file).with_context(|| {
            format!("Failed to open log file {}", storage.log_file.display())
        })?;
        let mut querier = Querier::new(Arc::new(primary));
        for path in &storage.extra_sources {
            let source = FileSource::new(path)
                .with_context(|| format!("Failed to open source {}", path.display()))?;
            querier.add_source(Arc::new(source));
        }

        Ok((file_sink, Self::new(logger, querier)))
    }
}

/// A failure rendered as `{"success": false, "error": ...}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        json_response(
            self.status,
            &json!({
                "success": false,
                "error": self.message,
            }),
        )
    }
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(full(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl Server {
    pub async fn bind(addr: SocketAddr, state: Arc<AppState>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("Failed to bind server")?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Connections already accepted keep running on the runtime; flushing
    /// the logger afterwards is the caller's job.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        tracing::info!("Server listening on http://{}", addr);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    tracing::debug!("Accepted connection from {}", peer_addr);

                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, state).await {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(stream: TcpStream, state: Arc<AppState>) -> Result<()> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| handle(req, state.clone()));

        http1::Builder::new()
            .serve_connection(io, service)
            .await?;

        Ok(())
    }
}

/// Route one request
pub async fn handle<B>(req: Request<B>, state: Arc<AppState>) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    tracing::info!("{} {}", method, path);

    let result = match (&method, path.as_str()) {
        (&Method::GET, "/health") => Ok(json_response(StatusCode::OK, &json!({"status": "ok"}))),
        (&Method::POST, "/log") => ingest(req, &state).await,
        (&Method::GET, "/logs") => query(req.uri().query().map(str::to_string), &state).await,
        (_, "/health" | "/log" | "/logs") => Err(ApiError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {} not allowed on {}", method, path),
        )),
        _ => Err(ApiError::new(StatusCode::NOT_FOUND, format!("No route for {}", path))),
    };

    Ok(result.unwrap_or_else(|e| {
        if e.status.is_server_error() {
            tracing::error!(status = %e.status, "{} {} failed: {}", method, path, e.message);
        } else {
            tracing::debug!(status = %e.status, "{} {} rejected: {}", method, path, e.message);
        }
        e.into_response()
    }))
}

fn is_json(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

async fn ingest<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if !is_json(req.headers().get(CONTENT_TYPE)) {
        return Err(ApiError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected application/json",
        ));
    }

    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
            } else {
                ApiError::bad_request("Failed to read request body")
            }
        })?
        .to_bytes();

    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;

    let record = record_from_json(&value)?;
    state.logger.log(&record);

    Ok(json_response(StatusCode::OK, &json!({"success": true})))
}

/// Check required fields and build a record from a `POST /log` body
pub fn record_from_json(value: &Value) -> Result<LogRecord, ApiError> {
    let body = value
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Body must be a JSON object"))?;

    for (field, label) in [
        ("service", "Service"),
        ("level", "Level"),
        ("message", "Message"),
        ("timestamp", "Timestamp"),
    ] {
        if !body.contains_key(field) {
            return Err(ApiError::bad_request(format!(
                "{} is required, but it is missing in body",
                label
            )));
        }
    }

    let service = body["service"]
        .as_str()
        .ok_or_else(|| ApiError::bad_request("Service must be a string"))?;
    let level = body["level"]
        .as_str()
        .ok_or_else(|| ApiError::bad_request("Level must be a string"))?
        .parse::<LogLevel>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let message = body["message"]
        .as_str()
        .ok_or_else(|| ApiError::bad_request("Message must be a string"))?;
    let timestamp = body["timestamp"]
        .as_i64()
        .ok_or_else(|| ApiError::bad_request("Timestamp must be an integer"))?;

    let record = LogRecord::new(timestamp, service, level, message);
    record
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(record)
}

/// Raw `GET /logs` query string, percent-decoded but not yet validated
#[derive(Debug, Default, Deserialize)]
struct LogsQuery {
    level: Option<String>,
    service: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

/// Build query parameters from a URI query string
///
/// Values are form-decoded; unknown keys are ignored.
pub fn params_from_query(query: Option<&str>) -> Result<QueryParams, ApiError> {
    let raw: LogsQuery = serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| ApiError::bad_request(format!("Invalid query string: {}", e)))?;

    let mut params = QueryParams::new();
    if let Some(level) = raw.level {
        params.level = Some(
            level
                .parse()
                .map_err(|e: crate::schema::UnknownLevel| ApiError::bad_request(e.to_string()))?,
        );
    }
    params.service = raw.service;
    if let Some(from) = raw.from {
        params.from = Some(parse_bound("from", &from)?);
    }
    if let Some(to) = raw.to {
        params.to = Some(parse_bound("to", &to)?);
    }

    if params.is_inverted() {
        return Err(ApiError::bad_request("'from' must not be greater than 'to'"));
    }
    Ok(params)
}

fn parse_bound(name: &str, value: &str) -> Result<i64, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid '{}' bound: {}", name, value)))
}

async fn query(
    query_string: Option<String>,
    state: &Arc<AppState>,
) -> Result<Response<Full<Bytes>>, ApiError> {
    let params = params_from_query(query_string.as_deref())?;

    // Full scans block, so keep them off the async workers
    let state = state.clone();
    let records = tokio::task::spawn_blocking(move || state.querier.query(&params))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "query task failed");
            ApiError::internal()
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "query failed");
            ApiError::internal()
        })?;

    let body = serde_json::to_value(&records).map_err(|_| ApiError::internal())?;
    Ok(json_response(StatusCode::OK, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Sink;
    use std::path::Path;
    use tempfile::TempDir;

    fn state_for(dir: &Path) -> (Arc<FileSink>, Arc<AppState>) {
        let mut config = ServerConfig::default();
        config.storage.log_file = dir.join("records.log");
        let (sink, state) = AppState::from_config(&config).unwrap();
        (sink, Arc::new(state))
    }

    fn post_log(body: &str) -> Request<Full<Bytes>> {
        Request::post("/log")
            .header(CONTENT_TYPE, "application/json")
            .body(full(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let temp_dir = TempDir::new().unwrap();
        let (_sink, state) = state_for(temp_dir.path());

        let req = Request::get("/health").body(full("")).unwrap();
        let response = handle(req, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let temp_dir = TempDir::new().unwrap();
        let (_sink, state) = state_for(temp_dir.path());

        let req = Request::get("/nope").body(full("")).unwrap();
        let response = handle(req, state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let req = Request::delete("/logs").body(full("")).unwrap();
        let response = handle(req, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_log_requires_json_content_type() {
        let temp_dir = TempDir::new().unwrap();
        let (_sink, state) = state_for(temp_dir.path());

        let req = Request::post("/log")
            .header(CONTENT_TYPE, "text/plain")
            .body(full("{}"))
            .unwrap();
        let response = handle(req, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Expected application/json"));
    }

    #[tokio::test]
    async fn test_log_missing_fields() {
        let temp_dir = TempDir::new().unwrap();
        let (_sink, state) = state_for(temp_dir.path());

        let cases = [
            (r#"{"level":"info","message":"m","timestamp":1}"#, "Service is required, but it is missing in body"),
            (r#"{"service":"a","message":"m","timestamp":1}"#, "Level is required, but it is missing in body"),
            (r#"{"service":"a","level":"info","timestamp":1}"#, "Message is required, but it is missing in body"),
            (r#"{"service":"a","level":"info","message":"m"}"#, "Timestamp is required, but it is missing in body"),
        ];
        for (body, expected) in cases {
            let response = handle(post_log(body), state.clone()).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(response).await["error"], json!(expected));
        }
    }

    #[tokio::test]
    async fn test_log_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let (_sink, state) = state_for(temp_dir.path());

        for body in [
            "not json",
            "[1,2]",
            r#"{"service":"a","level":"loud","message":"m","timestamp":1}"#,
            r#"{"service":"a","level":"info","message":"m","timestamp":"1"}"#,
            r#"{"service":"a b","level":"info","message":"m","timestamp":1}"#,
            r#"{"service":"","level":"info","message":"m","timestamp":1}"#,
            r#"{"service":"a","level":"info","message":"line\nbreak","timestamp":1}"#,
        ] {
            let response = handle(post_log(body), state.clone()).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        }
    }

    #[tokio::test]
    async fn test_log_rejects_oversized_body() {
        let temp_dir = TempDir::new().unwrap();
        let (_sink, state) = state_for(temp_dir.path());

        let body = "x".repeat(MAX_BODY_BYTES + 1);
        let response = handle(post_log(&body), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["success"], json!(false));
    }

    #[tokio::test]
    async fn test_log_then_query() {
        let temp_dir = TempDir::new().unwrap();
        let (sink, state) = state_for(temp_dir.path());

        for body in [
            r#"{"service":"auth","level":"info","message":"login ok","timestamp":100}"#,
            r#"{"service":"auth","level":"ERROR","message":"login failed","timestamp":200}"#,
        ] {
            let response = handle(post_log(body), state.clone()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, json!({"success": true}));
        }

        tokio::task::spawn_blocking(move || sink.flush())
            .await
            .unwrap()
            .unwrap();

        let req = Request::get("/logs?service=auth&level=error").body(full("")).unwrap();
        let response = handle(req, state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!([{"timestamp": 200, "service": "auth", "level": "ERROR", "message": "login failed"}])
        );

        let req = Request::get("/logs").body(full("")).unwrap();
        let response = handle(req, state).await.unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_params_from_query() {
        let params = params_from_query(Some("level=warn&service=api&from=10&to=20&page=3")).unwrap();
        assert_eq!(params.level, Some(LogLevel::Warn));
        assert_eq!(params.service.as_deref(), Some("api"));
        assert_eq!(params.from, Some(10));
        assert_eq!(params.to, Some(20));

        assert_eq!(params_from_query(None).unwrap(), QueryParams::new());
        assert!(params_from_query(Some("level=verbose")).is_err());
        assert!(params_from_query(Some("from=abc")).is_err());

        let inverted = params_from_query(Some("from=200&to=100")).unwrap_err();
        assert_eq!(inverted.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_params_from_query_decodes_values() {
        let params = params_from_query(Some("service=caf%C3%A9&level=Warn")).unwrap();
        assert_eq!(params.service.as_deref(), Some("café"));
        assert!(params.matches(&LogRecord::new(1, "café", LogLevel::Warn, "x")));

        let params = params_from_query(Some("service=a%2Bb&from=%2D5&to=5")).unwrap();
        assert_eq!(params.service.as_deref(), Some("a+b"));
        assert_eq!(params.from, Some(-5));

        let params = params_from_query(Some("service=a+b")).unwrap();
        assert_eq!(params.service.as_deref(), Some("a b"));
    }

    #[test]
    fn test_content_type_detection() {
        assert!(is_json(Some(&HeaderValue::from_static("application/json"))));
        assert!(is_json(Some(&HeaderValue::from_static("Application/JSON; charset=utf-8"))));
        assert!(!is_json(Some(&HeaderValue::from_static("text/json"))));
        assert!(!is_json(None));
    }
}
