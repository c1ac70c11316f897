//! HTTP execution seam.
//!
//! `ApiClient` builds requests and interprets responses; an `HttpBackend`
//! only moves bytes. `ReqwestBackend` is the production implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, Method};
use thiserror::Error;
use tracing::debug;

/// HTTP request timeout in seconds.
/// Uploads of large scans on mobile links need the headroom.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Size of each chunk handed to the socket; progress is reported per chunk.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Called with (bytes sent, total bytes) as an upload body is consumed.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Clone)]
pub struct FilePart {
    pub field: &'static str,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    File(FilePart),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            bearer: None,
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn file(mut self, part: FilePart) -> Self {
        self.body = RequestBody::File(part);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The request produced no HTTP response.
#[derive(Error, Debug, Clone)]
pub enum TransportFailure {
    #[error("request timed out")]
    Timeout,

    #[error("could not connect: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(
        &self,
        request: HttpRequest,
        progress: Option<ProgressFn>,
    ) -> Result<HttpResponse, TransportFailure>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct ReqwestBackend {
    client: Client,
    base_url: String,
}

impl ReqwestBackend {
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            // The server keeps its own session cookie alongside the bearer token
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn classify(error: reqwest::Error) -> TransportFailure {
        if error.is_timeout() {
            TransportFailure::Timeout
        } else if error.is_connect() {
            TransportFailure::Connect(error.to_string())
        } else {
            TransportFailure::Other(error.to_string())
        }
    }

    /// Multipart form whose file body is streamed in chunks, reporting
    /// progress as reqwest pulls each chunk.
    fn multipart_form(part: FilePart, progress: Option<ProgressFn>) -> Result<Form, TransportFailure> {
        let total = part.bytes.len() as u64;
        let chunks = body_chunks(Bytes::from(part.bytes));

        let mut sent = 0u64;
        let stream = futures::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            if let Some(ref report) = progress {
                report(sent, total);
            }
            Ok::<_, std::io::Error>(chunk)
        });

        let file = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(part.file_name)
            .mime_str(&part.mime_type)
            .map_err(|e| TransportFailure::Other(format!("invalid mime type: {}", e)))?;

        Ok(Form::new().part(part.field, file))
    }
}

/// Split a body into views of at most `UPLOAD_CHUNK_SIZE` bytes sharing one buffer.
fn body_chunks(data: Bytes) -> Vec<Bytes> {
    (0..data.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(data.len())))
        .collect()
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(
        &self,
        request: HttpRequest,
        progress: Option<ProgressFn>,
    ) -> Result<HttpResponse, TransportFailure> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method, &url)
            .header(header::ACCEPT, "application/json");

        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::File(part) => builder.multipart(Self::multipart_form(part, progress)?),
        };

        let response = builder.send().await.map_err(Self::classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(Self::classify)?.to_vec();

        debug!(url = %url, status = status, bytes = body.len(), "Response received");
        Ok(HttpResponse { status, body })
    }
}
