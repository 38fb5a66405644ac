use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Boxed async reader backing the streaming body variant.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Lazy body producer writing its output into a caller-supplied sink.
pub type BodyWriter = Arc<dyn Fn(&mut dyn Write) -> io::Result<()> + Send + Sync>;

/// Message body.
///
/// A body is either absent, an in-memory byte buffer, a read-once async
/// stream, or a lazy closure that produces its output on demand.
///
/// A `Stream` body can only be read once; cloning a message shares the
/// underlying reader, so whichever copy reads first consumes it.
#[derive(Clone, Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// In-memory bytes.
    Bytes(Bytes),
    /// Read-once async reader, shared between clones.
    Stream(Arc<Mutex<Option<BodyReader>>>),
    /// Closure producing the body on demand.
    Writer(BodyWriter),
}

impl Body {
    /// Create an empty body.
    pub fn empty() -> Self {
        Body::Empty
    }

    /// Create a streaming body from an async reader.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Body::Stream(Arc::new(Mutex::new(Some(Box::new(reader)))))
    }

    /// Create a lazy body from a closure writing into a sink.
    pub fn from_writer(
        writer: impl Fn(&mut dyn Write) -> io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Body::Writer(Arc::new(writer))
    }

    /// Check whether this is the absent-body variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Take the reader out of a streaming body, leaving it consumed.
    ///
    /// Returns `None` for the other variants or when the reader was
    /// already taken.
    pub fn take_reader(&self) -> Option<BodyReader> {
        match self {
            Body::Stream(reader) => reader.lock().expect("body reader lock poisoned").take(),
            _ => None,
        }
    }

    /// Read the full body into memory.
    ///
    /// A `Stream` body is consumed by this call; subsequent reads yield an
    /// empty buffer.
    pub async fn read_to_bytes(&self) -> io::Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Bytes(bytes) => Ok(bytes.clone()),
            Body::Stream(_) => match self.take_reader() {
                Some(mut reader) => {
                    let mut buf = Vec::new();
                    reader.read_to_end(&mut buf).await?;
                    Ok(Bytes::from(buf))
                }
                None => Ok(Bytes::new()),
            },
            Body::Writer(writer) => {
                let mut buf = Vec::new();
                writer(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Read the full body as text, replacing invalid UTF-8.
    pub async fn read_to_string(&self) -> io::Result<String> {
        let bytes = self.read_to_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Renders the in-memory variants for wire serialization.
    ///
    /// Streaming bodies are omitted since reading them here would consume
    /// the reader.
    pub(crate) fn wire_text(&self) -> String {
        match self {
            Body::Empty | Body::Stream(_) => String::new(),
            Body::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Body::Writer(writer) => {
                let mut buf = Vec::new();
                if writer(&mut buf).is_err() {
                    return String::new();
                }
                String::from_utf8_lossy(&buf).into_owned()
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Body::Stream(_) => write!(f, "Stream"),
            Body::Writer(_) => write!(f, "Writer"),
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Bytes(Bytes::from(text.into_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}
