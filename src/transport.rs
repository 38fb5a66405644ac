use std::fmt;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tokio_util::io::ReaderStream;

use crate::body::Body;
use crate::message::Message;
use crate::request::Request;

/// Default cap on in-memory response buffering before spilling to disk.
pub const DEFAULT_MAX_MEMORY_SIZE: usize = 2 * 1024 * 1024;

/// The request could not be translated into wire settings.
pub const ERR_MALFORMED_REQUEST: i32 = 1;
/// Connection setup failed (DNS, refused, TLS).
pub const ERR_CONNECT: i32 = 2;
/// The transfer timed out.
pub const ERR_TIMEOUT: i32 = 3;
/// The transfer failed after the connection was established.
pub const ERR_SEND: i32 = 4;
/// The response body could not be read or buffered.
pub const ERR_BODY: i32 = 5;

/// Raw outcome of one successful transport execution.
///
/// Headers are reported as unparsed "Name: value" lines so they stay
/// available even when the body transfer was suppressed or aborted.
#[derive(Debug)]
pub struct RawReply {
    /// Numeric HTTP status code.
    pub status: u16,
    /// Raw header lines in wire order.
    pub header_lines: Vec<String>,
    /// Response body, buffered in memory or spilled to a temp file.
    pub body: Body,
}

/// A failure below HTTP semantics: DNS, connection refused, timeout.
///
/// Carries a transport-specific numeric code and a human-readable
/// message; there is no response to inspect.
#[derive(Error, Debug, Clone)]
#[error("transport error {code}: {message}")]
pub struct TransportError {
    /// Transport-specific error code (see the `ERR_*` constants).
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl TransportError {
    /// Create a new transport error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        let code = if error.is_timeout() {
            ERR_TIMEOUT
        } else if error.is_connect() {
            ERR_CONNECT
        } else if error.is_builder() || error.is_request() {
            ERR_MALFORMED_REQUEST
        } else {
            ERR_SEND
        };
        Self::new(code, error.to_string())
    }
}

/// Callback receiving each raw response header line as it is collected.
pub type HeaderObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Executes exactly one HTTP request.
///
/// This trait is the boundary between the client engines and the wire:
/// implementations translate a [`Request`] into an actual transfer and
/// report either a [`RawReply`] or a [`TransportError`]. Injecting a
/// scripted implementation substitutes the transport entirely, which is
/// how the engine tests below run without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a single request.
    async fn execute(&self, request: &Request) -> Result<RawReply, TransportError>;
}

/// Default transport over a pooled `reqwest` client.
///
/// The inner client reuses connections across sequential requests; every
/// execution builds its transfer settings from scratch, so nothing leaks
/// between unrelated requests except the configured defaults (user agent,
/// default headers, timeout).
pub struct HttpTransport {
    client: reqwest::Client,
    user_agent: String,
    default_headers: Vec<(String, String)>,
    max_memory_size: usize,
    header_observer: Option<HeaderObserver>,
}

impl HttpTransport {
    /// Create a transport with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a transport builder.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    /// The user agent sent when a request does not set its own.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// The in-memory response buffering cap.
    pub fn max_memory_size(&self) -> usize {
        self.max_memory_size
    }

    fn build_headers(&self, request: &Request) -> Result<HeaderMap, TransportError> {
        let bad = |what: &str, detail: &dyn fmt::Display| {
            TransportError::new(
                ERR_MALFORMED_REQUEST,
                format!("invalid {}: {}", what, detail),
            )
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| bad("user agent", &e))?,
        );
        for (name, value) in &self.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| bad("header name", &e))?;
            let value = HeaderValue::from_str(value).map_err(|e| bad("header value", &e))?;
            headers.append(name, value);
        }
        for (name, values) in request.headers().iter() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| bad("header name", &e))?;
            // Request headers replace any configured default, but keep
            // their own repeated values distinct.
            let mut first = true;
            for value in values {
                let value = HeaderValue::from_str(value).map_err(|e| bad("header value", &e))?;
                if first {
                    headers.insert(name.clone(), value);
                    first = false;
                } else {
                    headers.append(name.clone(), value);
                }
            }
        }
        Ok(headers)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &Request) -> Result<RawReply, TransportError> {
        let method = reqwest::Method::from_bytes(request.method().as_bytes()).map_err(|e| {
            TransportError::new(ERR_MALFORMED_REQUEST, format!("invalid method: {}", e))
        })?;

        let mut builder = self
            .client
            .request(method, request.url().clone())
            .headers(self.build_headers(request)?);

        match request.body() {
            Body::Empty => {}
            Body::Bytes(bytes) => builder = builder.body(bytes.clone()),
            Body::Stream(_) => {
                if let Some(reader) = request.body().take_reader() {
                    builder = builder.body(reqwest::Body::wrap_stream(ReaderStream::new(reader)));
                }
            }
            Body::Writer(_) => {
                let bytes = request
                    .body()
                    .read_to_bytes()
                    .await
                    .map_err(|e| TransportError::new(ERR_BODY, e.to_string()))?;
                builder = builder.body(bytes);
            }
        }

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;

        let status = response.status().as_u16();
        let mut header_lines = Vec::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            let line = format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
            if let Some(observer) = &self.header_observer {
                observer(&line);
            }
            header_lines.push(line);
        }

        let body = if request.method() == "HEAD" {
            Body::Empty
        } else {
            let mut spool = SpoolBuffer::new(self.max_memory_size);
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(TransportError::from_reqwest)?;
                spool
                    .write_chunk(&chunk)
                    .map_err(|e| TransportError::new(ERR_BODY, e.to_string()))?;
            }
            spool
                .into_body()
                .map_err(|e| TransportError::new(ERR_BODY, e.to_string()))?
        };

        Ok(RawReply {
            status,
            header_lines,
            body,
        })
    }
}

/// Builder for [`HttpTransport`].
pub struct HttpTransportBuilder {
    user_agent: String,
    default_headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    max_memory_size: usize,
    header_observer: Option<HeaderObserver>,
}

impl HttpTransportBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            user_agent: format!("httpwire/{}", env!("CARGO_PKG_VERSION")),
            default_headers: Vec::new(),
            timeout: None,
            max_memory_size: DEFAULT_MAX_MEMORY_SIZE,
            header_observer: None,
        }
    }

    /// Set the default user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request unless the request overrides
    /// it.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Set an overall per-transfer timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cap on in-memory response buffering; larger bodies spill to a
    /// temp file.
    pub fn max_memory_size(mut self, bytes: usize) -> Self {
        self.max_memory_size = bytes;
        self
    }

    /// Observe every raw response header line as it is collected.
    pub fn header_observer(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.header_observer = Some(Arc::new(observer));
        self
    }

    /// Build the transport.
    pub fn build(self) -> HttpTransport {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().expect("failed to build transport client");

        HttpTransport {
            client,
            user_agent: self.user_agent,
            default_headers: self.default_headers,
            max_memory_size: self.max_memory_size,
            header_observer: self.header_observer,
        }
    }
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates a response body, keeping up to a fixed number of bytes in
/// memory and spilling the whole buffer to an unnamed temp file once the
/// cap is exceeded.
pub struct SpoolBuffer {
    max_memory: usize,
    state: SpoolState,
}

enum SpoolState {
    Memory(Vec<u8>),
    Disk(std::fs::File),
}

impl SpoolBuffer {
    /// Create a spool holding at most `max_memory` bytes in memory.
    pub fn new(max_memory: usize) -> Self {
        Self {
            max_memory,
            state: SpoolState::Memory(Vec::new()),
        }
    }

    /// Append a chunk, spilling to disk when the cap is crossed.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match std::mem::replace(&mut self.state, SpoolState::Memory(Vec::new())) {
            SpoolState::Memory(buf) if buf.len() + chunk.len() > self.max_memory => {
                let mut file = tempfile::tempfile()?;
                file.write_all(&buf)?;
                file.write_all(chunk)?;
                self.state = SpoolState::Disk(file);
            }
            SpoolState::Memory(mut buf) => {
                buf.extend_from_slice(chunk);
                self.state = SpoolState::Memory(buf);
            }
            SpoolState::Disk(mut file) => {
                file.write_all(chunk)?;
                self.state = SpoolState::Disk(file);
            }
        }
        Ok(())
    }

    /// Whether the buffer has spilled to disk.
    pub fn is_spilled(&self) -> bool {
        matches!(self.state, SpoolState::Disk(_))
    }

    /// Finish writing and hand the accumulated bytes back as a [`Body`].
    pub fn into_body(self) -> io::Result<Body> {
        match self.state {
            SpoolState::Memory(buf) => Ok(Body::Bytes(Bytes::from(buf))),
            SpoolState::Disk(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                Ok(Body::from_reader(tokio::fs::File::from_std(file)))
            }
        }
    }
}
