use std::fmt;

use bytes::Bytes;

use crate::body::Body;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::message::{split_header_line, Message};
use crate::status;
use crate::transport::RawReply;

/// A single HTTP response.
///
/// The status code must lie in the range 100–999; assignment outside the
/// range fails. When no explicit reason phrase is set, the canonical one
/// from the status table is used.
///
/// # Examples
///
/// ```rust
/// use httpwire::Response;
///
/// let response = Response::new(404).unwrap();
/// assert_eq!(response.reason_phrase(), "Not Found");
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    status: u16,
    reason: Option<String>,
    headers: Headers,
    body: Body,
    http_version: String,
}

impl Response {
    /// Create a response with the given status code.
    pub fn new(status: u16) -> Result<Self> {
        let mut response = Self {
            status: 0,
            reason: None,
            headers: Headers::new(),
            body: Body::Empty,
            http_version: "1.1".to_string(),
        };
        response.set_status(status)?;
        Ok(response)
    }

    /// The numeric status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Set the status code.
    ///
    /// Fails with [`Error::InvalidStatus`] for codes outside 100–999. Any
    /// explicit reason phrase is cleared.
    pub fn set_status(&mut self, status: u16) -> Result<()> {
        if !(100..=999).contains(&status) {
            return Err(Error::InvalidStatus(status));
        }
        self.status = status;
        self.reason = None;
        Ok(())
    }

    /// The reason phrase: the explicit one if set, otherwise the canonical
    /// phrase for the status code, otherwise "Unknown".
    pub fn reason_phrase(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => status::reason_phrase(self.status).unwrap_or("Unknown"),
        }
    }

    /// Set an explicit reason phrase.
    pub fn set_reason_phrase(&mut self, phrase: impl Into<String>) {
        self.reason = Some(phrase.into());
    }

    /// Whether the status signals an HTTP error (400 or higher).
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Read the full body into memory.
    pub async fn body_bytes(&self) -> Result<Bytes> {
        Ok(self.body.read_to_bytes().await?)
    }

    /// Read the full body as text.
    pub async fn body_string(&self) -> Result<String> {
        Ok(self.body.read_to_string().await?)
    }

    /// Build a response from a raw transport reply: validated status, raw
    /// header lines parsed into the header map, body attached as-is.
    pub(crate) fn from_reply(reply: RawReply) -> Result<Self> {
        let mut response = Response::new(reply.status)?;
        for line in &reply.header_lines {
            if let Some((name, value)) = split_header_line(line) {
                response.add_header(name, value);
            }
        }
        response.set_body(reply.body);
        Ok(response)
    }
}

impl Message for Response {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn body(&self) -> &Body {
        &self.body
    }

    fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    fn http_version(&self) -> &str {
        &self.http_version
    }

    fn set_http_version(&mut self, version: &str) {
        self.http_version = version.to_string();
    }
}

impl fmt::Display for Response {
    /// Serializes the response in its wire form, for debugging. Streaming
    /// bodies are omitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP/{} {} {}\r\n",
            self.http_version,
            self.status,
            self.reason_phrase()
        )?;
        for (name, values) in self.headers.iter() {
            for value in values {
                write!(f, "{}: {}\r\n", name, value)?;
            }
        }
        write!(f, "\r\n")?;
        write!(f, "{}", self.body.wire_text())
    }
}
