use crate::body::Body;
use crate::headers::Headers;

/// Accessor surface shared by [`Request`](crate::Request) and
/// [`Response`](crate::Response).
pub trait Message {
    /// All headers of the message.
    fn headers(&self) -> &Headers;

    /// Mutable access to the headers.
    fn headers_mut(&mut self) -> &mut Headers;

    /// The message body.
    fn body(&self) -> &Body;

    /// Replace the message body.
    fn set_body(&mut self, body: Body);

    /// HTTP version, e.g. "1.1".
    fn http_version(&self) -> &str;

    /// Set the HTTP version.
    fn set_http_version(&mut self, version: &str);

    /// Get a header, coalescing multiple values with commas.
    fn header(&self, name: &str) -> Option<String> {
        self.headers().get(name)
    }

    /// Get every value recorded for a header.
    fn header_values(&self, name: &str) -> &[String] {
        self.headers().get_all(name)
    }

    /// Check whether a header exists.
    fn has_header(&self, name: &str) -> bool {
        self.headers().contains(name)
    }

    /// Set a header, replacing any existing values.
    fn set_header(&mut self, name: &str, value: &str) {
        self.headers_mut().set(name, value);
    }

    /// Add a header value without overwriting existing ones.
    fn add_header(&mut self, name: &str, value: &str) {
        self.headers_mut().add(name, value);
    }

    /// Remove a header. Returns whether it existed.
    fn remove_header(&mut self, name: &str) -> bool {
        self.headers_mut().remove(name)
    }
}

/// Splits a raw "Name: value" header line, trimming whitespace on both
/// sides. Lines without a colon (status lines, blanks) yield `None`.
pub(crate) fn split_header_line(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
        .map(|(name, value)| (name.trim(), value.trim()))
}
