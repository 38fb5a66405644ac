//! httpwire - an HTTP message abstraction and client runtime
//!
//! httpwire models HTTP requests and responses as plain, inspectable
//! values and executes them over a pluggable transport. The client offers
//! two execution models: a synchronous `send` that follows redirects and
//! re-attempts failed transfers under the control of lifecycle hooks, and
//! a multiplexed asynchronous mode where any number of in-flight requests
//! are advanced by polling, without one transfer blocking the next.
//!
//! ## Features
//!
//! - **Case-insensitive, order-preserving headers** with multi-value
//!   support
//! - **Streaming bodies** in both directions, with large responses
//!   spilling to disk past a configurable memory cap
//! - **Engine-side redirect following** with a configurable maximum
//! - **Retry steering via hooks**: error and exception observers vote on
//!   re-attempting a transfer
//! - **Multiplexed async execution** with `send_async` / `poll` / `wait`
//!   and explicit cancellation
//! - **Pluggable transport** so tests can script transfers entirely
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use httpwire::{Client, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new();
//!     let response = client.send(Request::get("https://example.org/")?).await?;
//!
//!     println!("Status: {}", response.status());
//!     println!("Body: {}", response.body_string().await?);
//!
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod client;
pub mod error;
pub mod headers;
pub mod hooks;
pub mod message;
pub mod request;
pub mod response;
pub mod status;
pub mod transport;

// Re-export main types for convenience
pub use body::Body;
pub use client::{Client, ClientBuilder, RequestHandle};
pub use error::{Error, Result};
pub use headers::Headers;
pub use hooks::{Hooks, RetryDecision};
pub use message::Message;
pub use request::Request;
pub use response::Response;
pub use transport::{HttpTransport, RawReply, Transport, TransportError};

// Re-export common foreign types
pub use bytes::Bytes;
pub use url::Url;
