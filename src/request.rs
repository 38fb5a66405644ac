use std::fmt;

use url::Url;

use crate::body::Body;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::message::{split_header_line, Message};

/// A single HTTP request.
///
/// The method is kept as a plain case-sensitive string and is not
/// validated; the target URL must be absolute. Cloning a request is cheap
/// and shares a streaming body with the original.
///
/// # Examples
///
/// ```rust
/// use httpwire::{Message, Request};
///
/// let mut request = Request::get("http://example.org/").unwrap();
/// request.set_header("X-Foo", "bar");
/// assert_eq!(request.header("x-foo").as_deref(), Some("bar"));
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    method: String,
    url: Url,
    headers: Headers,
    body: Body,
    http_version: String,
}

impl Request {
    /// Create a request from a method and an absolute URL string.
    pub fn new(method: impl Into<String>, url: &str) -> Result<Self> {
        Ok(Self::with_url(method, Url::parse(url)?))
    }

    /// Create a request from a method and an already-parsed URL.
    pub fn with_url(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into(),
            url,
            headers: Headers::new(),
            body: Body::Empty,
            http_version: "1.1".to_string(),
        }
    }

    /// Create a GET request.
    pub fn get(url: &str) -> Result<Self> {
        Self::new("GET", url)
    }

    /// Create a POST request.
    pub fn post(url: &str) -> Result<Self> {
        Self::new("POST", url)
    }

    /// Create a PUT request.
    pub fn put(url: &str) -> Result<Self> {
        Self::new("PUT", url)
    }

    /// Create a DELETE request.
    pub fn delete(url: &str) -> Result<Self> {
        Self::new("DELETE", url)
    }

    /// Create a HEAD request.
    pub fn head(url: &str) -> Result<Self> {
        Self::new("HEAD", url)
    }

    /// Create a PATCH request.
    pub fn patch(url: &str) -> Result<Self> {
        Self::new("PATCH", url)
    }

    /// The HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Set the HTTP method. The string is used as-is on the wire.
    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    /// The absolute target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Set the target URL.
    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    /// Set the body, builder-style.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.set_body(body.into());
        self
    }

    /// Set a JSON body and the matching content type, builder-style.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::Malformed(e.to_string()))?;
        self.set_body(Body::from(bytes));
        self.set_header("Content-Type", "application/json");
        Ok(self)
    }

    /// Set a header, builder-style.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Re-parse a request from its serialized wire form.
    ///
    /// This is the inverse of the [`Display`](std::fmt::Display)
    /// serialization, except that a redacted `Authorization` header stays
    /// redacted.
    pub fn from_wire(input: &str) -> Result<Self> {
        let (head, body) = match input.split_once("\r\n\r\n") {
            Some(parts) => parts,
            None => (input, ""),
        };
        let mut lines = head.split("\r\n");
        let request_line = lines
            .next()
            .ok_or_else(|| Error::Malformed("empty request".to_string()))?;

        let mut parts = request_line.split(' ');
        let method = parts
            .next()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| Error::Malformed("missing request method".to_string()))?;
        let url = parts
            .next()
            .ok_or_else(|| Error::Malformed("missing request URL".to_string()))?;
        let version = parts
            .next()
            .and_then(|v| v.strip_prefix("HTTP/"))
            .ok_or_else(|| Error::Malformed("missing HTTP version".to_string()))?;

        let mut request = Request::new(method, url)?;
        request.set_http_version(version);
        for line in lines {
            if let Some((name, value)) = split_header_line(line) {
                request.add_header(name, value);
            }
        }
        if !body.is_empty() {
            request.set_body(Body::from(body));
        }
        Ok(request)
    }
}

impl Message for Request {
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

impl fmt::Display for Request {
    /// Serializes the request in its wire form.
    ///
    /// The value of the `Authorization` header is redacted to
    /// `<scheme> REDACTED` so the output is safe to log. Streaming bodies
    /// are omitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} HTTP/{}\r\n",
            self.method, self.url, self.http_version
        )?;
        for (name, values) in self.headers.iter() {
            for value in values {
                if name.eq_ignore_ascii_case("authorization") {
                    let scheme = value.split(' ').next().unwrap_or("");
                    write!(f, "{}: {} REDACTED\r\n", name, scheme)?;
                } else {
                    write!(f, "{}: {}\r\n", name, value)?;
                }
            }
        }
        write!(f, "\r\n")?;
        write!(f, "{}", self.body.wire_text())
    }
}
