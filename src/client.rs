use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{AbortHandle, Abortable, Aborted, BoxFuture};
use futures::stream::FuturesUnordered;
use futures::task::noop_waker;
use futures::{FutureExt, Stream};

use crate::error::{Error, Result};
use crate::hooks::{Hooks, RetryDecision};
use crate::message::Message;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{
    HttpTransport, RawReply, Transport, TransportError, DEFAULT_MAX_MEMORY_SIZE,
};

/// Default cap on the number of redirects followed per `send`.
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Statuses whose `Location` header the synchronous engine follows.
const REDIRECT_STATUSES: [u16; 4] = [301, 302, 307, 308];

/// Callback invoked with the response of a completed async request.
pub type SuccessCallback = Box<dyn FnOnce(Response) + Send>;

/// Callback invoked with the failure of a completed async request.
pub type ErrorCallback = Box<dyn FnOnce(Error, Request) + Send>;

/// Identifies one in-flight asynchronous request, for [`Client::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(u64);

/// HTTP client executing requests over a pluggable [`Transport`].
///
/// The client provides two execution models. [`Client::send`] runs one
/// request to completion, following redirects itself and re-attempting
/// the transfer when an error hook votes to retry. [`Client::send_async`]
/// multiplexes any number of in-flight requests over one polling loop:
/// [`Client::poll`] advances all of them without blocking and
/// [`Client::wait`] blocks until everything has settled.
///
/// Lifecycle hooks observe and steer both engines; see [`Hooks`].
///
/// # Examples
///
/// ```rust,no_run
/// use httpwire::{Client, Request};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new();
///     let response = client.send(Request::get("http://example.org/")?).await?;
///     println!("{} {}", response.status(), response.reason_phrase());
///     Ok(())
/// }
/// ```
pub struct Client {
    transport: Arc<dyn Transport>,
    hooks: Hooks,
    max_redirects: u32,
    throw_exceptions: bool,
    multi: Mutex<Multiplexer>,
}

impl Client {
    /// Create a client with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Observe outbound requests just before execution.
    pub fn on_before_request(&mut self, hook: impl Fn(&mut Request) + Send + Sync + 'static) {
        self.hooks.on_before_request(hook);
    }

    /// Observe the final request/response pair of completed executions.
    pub fn on_after_request(
        &mut self,
        hook: impl Fn(&Request, &Response) + Send + Sync + 'static,
    ) {
        self.hooks.on_after_request(hook);
    }

    /// Observe HTTP error responses (status 400 or higher).
    pub fn on_error(
        &mut self,
        hook: impl Fn(&Request, &Response, &mut RetryDecision) + Send + Sync + 'static,
    ) {
        self.hooks.on_error(hook);
    }

    /// Observe HTTP error responses with one specific status code.
    pub fn on_error_status(
        &mut self,
        status: u16,
        hook: impl Fn(&Request, &Response, &mut RetryDecision) + Send + Sync + 'static,
    ) {
        self.hooks.on_error_status(status, hook);
    }

    /// Observe transport-level failures.
    pub fn on_exception(
        &mut self,
        hook: impl Fn(&Request, &TransportError, &mut RetryDecision) + Send + Sync + 'static,
    ) {
        self.hooks.on_exception(hook);
    }

    /// Whether a final error status makes [`Client::send`] return an error.
    pub fn set_throw_exceptions(&mut self, throw_exceptions: bool) {
        self.throw_exceptions = throw_exceptions;
    }

    /// Send a request and return its response.
    ///
    /// The calling task is suspended until the whole retry/redirect loop
    /// settles. Redirects (301, 302, 307, 308) are followed by the engine
    /// itself, up to the configured maximum; the redirected request is a
    /// clone, so the caller's original stays untouched. Transport
    /// failures and HTTP error statuses run the registered hooks, and any
    /// hook voting to retry re-attempts the same request. The engine
    /// imposes no retry cap of its own: bounding retries is the hooks'
    /// job, which keeps arbitrary backoff policies possible.
    pub async fn send(&self, mut request: Request) -> Result<Response> {
        self.hooks.emit_before_request(&mut request);
        tracing::debug!(method = request.method(), url = %request.url(), "sending request");

        let mut retry_count = 0;
        let mut redirects = 0;
        let response = loop {
            match self.transport.execute(&request).await {
                Ok(reply) => {
                    let response = Response::from_reply(reply)?;
                    let code = response.status();

                    if redirects < self.max_redirects && REDIRECT_STATUSES.contains(&code) {
                        if let Some(location) = response.header("Location") {
                            let target = request.url().join(&location)?;
                            tracing::debug!(%target, status = code, "following redirect");
                            let mut redirected = request.clone();
                            redirected.set_url(target);
                            request = redirected;
                            redirects += 1;
                            continue;
                        }
                        // A redirect status without a Location target
                        // settles the loop like any other response.
                    }

                    if code >= 400 && self.hooks.emit_error(&request, &response, retry_count) {
                        retry_count += 1;
                        tracing::debug!(status = code, retry_count, "retrying after error status");
                        continue;
                    }

                    break response;
                }
                Err(error) => {
                    if !self.hooks.emit_exception(&request, &error, retry_count) {
                        return Err(Error::Transport(error));
                    }
                    retry_count += 1;
                    tracing::debug!(%error, retry_count, "retrying after transport failure");
                }
            }
        };

        self.hooks.emit_after_request(&request, &response);

        if self.throw_exceptions && response.status() >= 400 {
            return Err(Error::HttpStatus(Box::new(response)));
        }
        Ok(response)
    }

    /// Register a request for multiplexed execution.
    ///
    /// The request starts making progress inside [`Client::poll`] and
    /// [`Client::wait`] calls; one `poll` happens immediately so fast
    /// completions are delivered without a separate call. On completion
    /// exactly one of the two callbacks runs.
    pub fn send_async<S, E>(&self, mut request: Request, on_success: S, on_error: E) -> RequestHandle
    where
        S: FnOnce(Response) + Send + 'static,
        E: FnOnce(Error, Request) + Send + 'static,
    {
        self.hooks.emit_before_request(&mut request);
        let handle = self.register(request, Some(Box::new(on_success)), Some(Box::new(on_error)), 0);
        self.poll();
        handle
    }

    /// Register a request for multiplexed execution without callbacks.
    ///
    /// Failures of a detached request are reported through the hooks and
    /// the log only.
    pub fn send_async_detached(&self, mut request: Request) -> RequestHandle {
        self.hooks.emit_before_request(&mut request);
        let handle = self.register(request, None, None, 0);
        self.poll();
        handle
    }

    /// Drive all in-flight requests forward without blocking and dispatch
    /// the callbacks of those that finished.
    ///
    /// Returns true while requests are still pending. Completions are
    /// delivered in whatever order the transfers finish, not submission
    /// order.
    pub fn poll(&self) -> bool {
        let completed = self.lock_multi().harvest_ready();
        if !completed.is_empty() {
            self.dispatch(completed);
        }
        !self.lock_multi().entries.is_empty()
    }

    /// Block until every pending request has completed and its callbacks
    /// have run.
    ///
    /// New requests enqueued from inside callbacks are waited on as well.
    pub async fn wait(&self) {
        loop {
            let completed = futures::future::poll_fn(|cx| {
                let mut multi = self.lock_multi();
                if multi.entries.is_empty() {
                    return Poll::Ready(Vec::new());
                }
                match Pin::new(&mut multi.transfers).poll_next(cx) {
                    Poll::Ready(Some(event)) => {
                        let mut events = vec![event];
                        events.extend(multi.harvest_ready());
                        Poll::Ready(events)
                    }
                    Poll::Ready(None) => Poll::Ready(Vec::new()),
                    Poll::Pending => Poll::Pending,
                }
            })
            .await;

            if completed.is_empty() {
                break;
            }
            self.dispatch(completed);
        }
    }

    /// Abort an in-flight async request without invoking its callbacks,
    /// releasing its transfer and buffers.
    ///
    /// Returns false when the handle no longer refers to a pending
    /// request.
    pub fn cancel(&self, handle: RequestHandle) -> bool {
        match self.lock_multi().entries.remove(&handle.0) {
            Some(entry) => {
                entry.abort.abort();
                tracing::debug!(url = %entry.request.url(), "cancelled in-flight request");
                true
            }
            None => false,
        }
    }

    /// Number of async requests still awaiting completion.
    pub fn pending_requests(&self) -> usize {
        self.lock_multi().entries.len()
    }

    fn lock_multi(&self) -> std::sync::MutexGuard<'_, Multiplexer> {
        self.multi.lock().expect("multiplexer lock poisoned")
    }

    /// Registers a transfer with the multiplexer. Retries re-enter here
    /// with their carried-over callbacks and count, skipping the
    /// `before_request` hooks.
    fn register(
        &self,
        request: Request,
        on_success: Option<SuccessCallback>,
        on_error: Option<ErrorCallback>,
        retry_count: u32,
    ) -> RequestHandle {
        let mut multi = self.lock_multi();
        let id = multi.next_id;
        multi.next_id += 1;

        let (abort, registration) = AbortHandle::new_pair();
        let transport = Arc::clone(&self.transport);
        let transfer_request = request.clone();
        let transfer = Abortable::new(
            async move { (id, transport.execute(&transfer_request).await) },
            registration,
        )
        .map(|outcome| match outcome {
            Ok((id, outcome)) => TransferEvent::Done(id, outcome),
            Err(Aborted) => TransferEvent::Cancelled,
        })
        .boxed();

        multi.transfers.push(transfer);
        multi.entries.insert(
            id,
            InFlight {
                request,
                on_success,
                on_error,
                retry_count,
                abort,
            },
        );
        RequestHandle(id)
    }

    /// Runs hooks and callbacks for a batch of finished transfers. Called
    /// with the multiplexer unlocked, so hooks and callbacks are free to
    /// enqueue or cancel requests.
    fn dispatch(&self, events: Vec<TransferEvent>) {
        for event in events {
            let (id, outcome) = match event {
                TransferEvent::Done(id, outcome) => (id, outcome),
                // An aborted transfer; its entry is already gone.
                TransferEvent::Cancelled => continue,
            };
            let entry = match self.lock_multi().entries.remove(&id) {
                Some(entry) => entry,
                // Cancelled after completing but before this drain.
                None => continue,
            };
            let InFlight {
                request,
                on_success,
                on_error,
                retry_count,
                ..
            } = entry;

            match outcome {
                Err(error) => {
                    if self.hooks.emit_exception(&request, &error, retry_count) {
                        tracing::debug!(%error, retry_count, "retrying async transfer");
                        self.register(request, on_success, on_error, retry_count + 1);
                        continue;
                    }
                    self.deliver_failure(Error::Transport(error), request, on_error);
                }
                Ok(reply) => match Response::from_reply(reply) {
                    Err(error) => self.deliver_failure(error, request, on_error),
                    Ok(response) if response.status() >= 400 => {
                        if self.hooks.emit_error(&request, &response, retry_count) {
                            tracing::debug!(
                                status = response.status(),
                                retry_count,
                                "retrying async transfer"
                            );
                            self.register(request, on_success, on_error, retry_count + 1);
                            continue;
                        }
                        self.deliver_failure(
                            Error::HttpStatus(Box::new(response)),
                            request,
                            on_error,
                        );
                    }
                    Ok(response) => {
                        tracing::debug!(
                            status = response.status(),
                            url = %request.url(),
                            "async transfer completed"
                        );
                        self.hooks.emit_after_request(&request, &response);
                        if let Some(on_success) = on_success {
                            on_success(response);
                        }
                    }
                },
            }
        }
    }

    fn deliver_failure(&self, error: Error, request: Request, on_error: Option<ErrorCallback>) {
        match on_error {
            Some(on_error) => on_error(error, request),
            None => tracing::warn!(
                %error,
                url = %request.url(),
                "async request failed with no error callback registered"
            ),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

enum TransferEvent {
    Done(u64, std::result::Result<RawReply, TransportError>),
    Cancelled,
}

type TransferFuture = BoxFuture<'static, TransferEvent>;

/// State of the multiplexed engine: the set of running transfers plus the
/// bookkeeping entry for each. All access goes through one lock, so the
/// set is never driven from two call stacks at once.
struct Multiplexer {
    transfers: FuturesUnordered<TransferFuture>,
    entries: HashMap<u64, InFlight>,
    next_id: u64,
}

/// Bookkeeping for one pending async request.
struct InFlight {
    request: Request,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    retry_count: u32,
    abort: AbortHandle,
}

impl Multiplexer {
    fn new() -> Self {
        Self {
            transfers: FuturesUnordered::new(),
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    /// Drains every transfer that can complete without blocking.
    fn harvest_ready(&mut self) -> Vec<TransferEvent> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut events = Vec::new();
        while let Poll::Ready(Some(event)) = Pin::new(&mut self.transfers).poll_next(&mut cx) {
            events.push(event);
        }
        events
    }
}

/// Builder for [`Client`].
///
/// The transport-facing settings (user agent, default headers, timeout,
/// memory cap) configure the default [`HttpTransport`]; they are ignored
/// when a custom transport is injected.
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    hooks: Hooks,
    max_redirects: u32,
    max_memory_size: usize,
    throw_exceptions: bool,
    user_agent: Option<String>,
    default_headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            transport: None,
            hooks: Hooks::new(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_memory_size: DEFAULT_MAX_MEMORY_SIZE,
            throw_exceptions: false,
            user_agent: None,
            default_headers: Vec::new(),
            timeout: None,
        }
    }

    /// Maximum number of redirects followed per `send`.
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Cap on in-memory response buffering; larger bodies spill to disk.
    pub fn max_memory_size(mut self, bytes: usize) -> Self {
        self.max_memory_size = bytes;
        self
    }

    /// Make [`Client::send`] return an error when the final status is 400
    /// or higher. Async execution is unaffected.
    pub fn throw_exceptions(mut self, throw_exceptions: bool) -> Self {
        self.throw_exceptions = throw_exceptions;
        self
    }

    /// Set the default user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
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

    /// Replace the transport; the test seam for substituting execution
    /// entirely.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Observe outbound requests just before execution.
    pub fn on_before_request(mut self, hook: impl Fn(&mut Request) + Send + Sync + 'static) -> Self {
        self.hooks.on_before_request(hook);
        self
    }

    /// Observe the final request/response pair of completed executions.
    pub fn on_after_request(
        mut self,
        hook: impl Fn(&Request, &Response) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_after_request(hook);
        self
    }

    /// Observe HTTP error responses (status 400 or higher).
    pub fn on_error(
        mut self,
        hook: impl Fn(&Request, &Response, &mut RetryDecision) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_error(hook);
        self
    }

    /// Observe HTTP error responses with one specific status code.
    pub fn on_error_status(
        mut self,
        status: u16,
        hook: impl Fn(&Request, &Response, &mut RetryDecision) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_error_status(status, hook);
        self
    }

    /// Observe transport-level failures.
    pub fn on_exception(
        mut self,
        hook: impl Fn(&Request, &TransportError, &mut RetryDecision) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_exception(hook);
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let mut builder =
                    HttpTransport::builder().max_memory_size(self.max_memory_size);
                if let Some(user_agent) = self.user_agent {
                    builder = builder.user_agent(user_agent);
                }
                for (name, value) in self.default_headers {
                    builder = builder.default_header(name, value);
                }
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                Arc::new(builder.build())
            }
        };

        Client {
            transport,
            hooks: self.hooks,
            max_redirects: self.max_redirects,
            throw_exceptions: self.throw_exceptions,
            multi: Mutex::new(Multiplexer::new()),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted transport replaying a fixed sequence of outcomes.
    struct MockTransport {
        replies: Mutex<VecDeque<std::result::Result<RawReply, TransportError>>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<Request>>,
    }

    impl MockTransport {
        fn new(
            replies: Vec<std::result::Result<RawReply, TransportError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen_urls(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|request| request.url().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(&self, request: &Request) -> std::result::Result<RawReply, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ok_reply(200, &[], ""))
        }
    }

    fn ok_reply(
        status: u16,
        headers: &[(&str, &str)],
        body: &str,
    ) -> std::result::Result<RawReply, TransportError> {
        Ok(RawReply {
            status,
            header_lines: headers
                .iter()
                .map(|(name, value)| format!("{}: {}", name, value))
                .collect(),
            body: Body::from(body),
        })
    }

    fn client_with(transport: &Arc<MockTransport>) -> ClientBuilder {
        Client::builder().transport(Arc::clone(transport) as Arc<dyn Transport>)
    }

    #[tokio::test]
    async fn test_send_returns_response() {
        let transport = MockTransport::new(vec![ok_reply(200, &[], "hello")]);
        let client = client_with(&transport).build();

        let response = client
            .send(Request::get("http://example.org/").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body_string().await.unwrap(), "hello");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_before_request_hook_mutates_outbound_request() {
        let transport = MockTransport::new(vec![ok_reply(200, &[], "")]);
        let client = client_with(&transport)
            .on_before_request(|request| request.set_header("Authorization", "Bearer token"))
            .build();

        client
            .send(Request::get("http://example.org/").unwrap())
            .await
            .unwrap();
        let seen = transport.requests.lock().unwrap();
        assert_eq!(
            seen[0].header("authorization").as_deref(),
            Some("Bearer token")
        );
    }

    #[tokio::test]
    async fn test_redirect_followed_once() {
        let transport = MockTransport::new(vec![
            ok_reply(302, &[("Location", "/new")], ""),
            ok_reply(200, &[], "redirected"),
        ]);
        let client = client_with(&transport).build();

        let original = Request::get("http://example.org/old").unwrap();
        let response = client.send(original.clone()).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.body_string().await.unwrap(), "redirected");
        assert_eq!(transport.calls(), 2);
        assert_eq!(
            transport.seen_urls(),
            vec!["http://example.org/old", "http://example.org/new"]
        );
        // The caller's request was not mutated; a clone followed the hop.
        assert_eq!(original.url().as_str(), "http://example.org/old");
    }

    #[tokio::test]
    async fn test_redirect_resolves_relative_location() {
        let transport = MockTransport::new(vec![
            ok_reply(301, &[("Location", "other")], ""),
            ok_reply(200, &[], ""),
        ]);
        let client = client_with(&transport).build();

        client
            .send(Request::get("http://example.org/a/b").unwrap())
            .await
            .unwrap();
        assert_eq!(
            transport.seen_urls(),
            vec!["http://example.org/a/b", "http://example.org/a/other"]
        );
    }

    #[tokio::test]
    async fn test_redirects_capped_at_maximum() {
        let transport = MockTransport::new(vec![
            ok_reply(302, &[("Location", "/one")], ""),
            ok_reply(302, &[("Location", "/two")], ""),
            ok_reply(302, &[("Location", "/three")], ""),
        ]);
        let client = client_with(&transport).max_redirects(2).build();

        let response = client
            .send(Request::get("http://example.org/").unwrap())
            .await
            .unwrap();
        // The third 302 is past the cap and is returned as-is.
        assert_eq!(response.status(), 302);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_redirect_without_location_settles() {
        let transport = MockTransport::new(vec![ok_reply(302, &[], "")]);
        let client = client_with(&transport).build();

        let response = client
            .send(Request::get("http://example.org/").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 302);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_303_not_followed() {
        let transport = MockTransport::new(vec![ok_reply(303, &[("Location", "/see")], "")]);
        let client = client_with(&transport).build();

        let response = client
            .send(Request::get("http://example.org/").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 303);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_error_hook_retries_same_request() {
        let transport = MockTransport::new(vec![
            ok_reply(503, &[], ""),
            ok_reply(503, &[], ""),
            ok_reply(200, &[], "finally"),
        ]);
        let observed = Arc::new(Mutex::new(Vec::new()));
        let counts = Arc::clone(&observed);
        let client = client_with(&transport)
            .on_error(move |_, _, decision| {
                counts.lock().unwrap().push(decision.retry_count);
                decision.retry();
            })
            .build();

        let response = client
            .send(Request::get("http://example.org/flaky").unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(transport.calls(), 3);
        assert_eq!(*observed.lock().unwrap(), vec![0, 1]);
        // The same request was re-sent, not a redirect.
        assert_eq!(
            transport.seen_urls(),
            vec![
                "http://example.org/flaky",
                "http://example.org/flaky",
                "http://example.org/flaky"
            ]
        );
    }

    #[tokio::test]
    async fn test_status_specific_hook_fires() {
        let transport = MockTransport::new(vec![ok_reply(404, &[], ""), ok_reply(200, &[], "")]);
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&fired);
        let client = client_with(&transport)
            .on_error_status(404, move |_, _, decision| {
                seen.fetch_add(1, Ordering::SeqCst);
                decision.retry();
            })
            .build();

        let response = client
            .send(Request::get("http://example.org/missing").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates_without_handler() {
        let transport =
            MockTransport::new(vec![Err(TransportError::new(6, "could not resolve host"))]);
        let client = client_with(&transport).build();

        let error = client
            .send(Request::get("http://nowhere.invalid/").unwrap())
            .await
            .unwrap_err();
        assert!(error.is_transport());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_exception_hook_retries_transport_failure() {
        let transport = MockTransport::new(vec![
            Err(TransportError::new(7, "connection refused")),
            ok_reply(200, &[], "recovered"),
        ]);
        let client = client_with(&transport)
            .on_exception(|_, _, decision| decision.retry())
            .build();

        let response = client
            .send(Request::get("http://example.org/").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body_string().await.unwrap(), "recovered");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_throw_exceptions_raises_on_error_status() {
        let transport = MockTransport::new(vec![ok_reply(404, &[], "gone")]);
        let client = client_with(&transport).throw_exceptions(true).build();

        let error = client
            .send(Request::get("http://example.org/missing").unwrap())
            .await
            .unwrap_err();
        assert_eq!(error.http_status(), Some(404));
    }

    #[tokio::test]
    async fn test_error_status_returned_when_not_throwing() {
        let transport = MockTransport::new(vec![ok_reply(500, &[], "boom")]);
        let client = client_with(&transport).build();

        let response = client
            .send(Request::get("http://example.org/").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_after_request_sees_final_pair() {
        let transport = MockTransport::new(vec![
            ok_reply(302, &[("Location", "/new")], ""),
            ok_reply(200, &[], ""),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let client = client_with(&transport)
            .on_after_request(move |request, response| {
                sink.lock()
                    .unwrap()
                    .push((request.url().to_string(), response.status()));
            })
            .build();

        client
            .send(Request::get("http://example.org/old").unwrap())
            .await
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("http://example.org/new".to_string(), 200)]
        );
    }

    #[tokio::test]
    async fn test_send_async_delivers_one_success() {
        let transport = MockTransport::new(vec![ok_reply(200, &[], "done")]);
        let client = client_with(&transport).build();

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        client.send_async(
            Request::get("http://example.org/").unwrap(),
            move |response| sink.lock().unwrap().push(response),
            |_, _| panic!("error callback must not run"),
        );
        while client.poll() {}

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].status(), 200);
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_send_async_error_callback_receives_http_error() {
        let transport = MockTransport::new(vec![ok_reply(404, &[], "missing")]);
        let client = client_with(&transport).build();

        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        client.send_async(
            Request::get("http://example.org/missing").unwrap(),
            |_| panic!("success callback must not run"),
            move |error, request| {
                sink.lock()
                    .unwrap()
                    .push((error.http_status(), request.url().to_string()));
            },
        );
        while client.poll() {}

        assert_eq!(
            *failures.lock().unwrap(),
            vec![(Some(404), "http://example.org/missing".to_string())]
        );
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_async_retry_skips_before_request_hooks() {
        let transport = MockTransport::new(vec![
            Err(TransportError::new(7, "connection refused")),
            ok_reply(200, &[], "recovered"),
        ]);
        let before_calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&before_calls);
        let client = client_with(&transport)
            .on_before_request(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .on_exception(|_, _, decision| decision.retry())
            .build();

        let succeeded = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&succeeded);
        client.send_async(
            Request::get("http://example.org/").unwrap(),
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            },
            |_, _| panic!("error callback must not run"),
        );
        while client.poll() {}

        assert_eq!(succeeded.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls(), 2);
        assert_eq!(before_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_detached_failure_is_dropped_quietly() {
        let transport = MockTransport::new(vec![Err(TransportError::new(28, "timed out"))]);
        let client = client_with(&transport).build();

        client.send_async_detached(Request::get("http://example.org/").unwrap());
        while client.poll() {}
        assert_eq!(client.pending_requests(), 0);
    }

    /// Transport whose transfers never complete, for cancellation tests.
    struct PendingTransport;

    #[async_trait]
    impl Transport for PendingTransport {
        async fn execute(
            &self,
            _request: &Request,
        ) -> std::result::Result<RawReply, TransportError> {
            futures::future::pending::<()>().await;
            Err(TransportError::new(0, "unreachable"))
        }
    }

    #[tokio::test]
    async fn test_cancel_removes_entry_without_callbacks() {
        let client = Client::builder()
            .transport(Arc::new(PendingTransport))
            .build();

        let handle = client.send_async(
            Request::get("http://example.org/slow").unwrap(),
            |_| panic!("success callback must not run"),
            |_, _| panic!("error callback must not run"),
        );
        assert_eq!(client.pending_requests(), 1);

        assert!(client.cancel(handle));
        assert_eq!(client.pending_requests(), 0);
        assert!(!client.poll());
        // A second cancel is a no-op.
        assert!(!client.cancel(handle));
    }

    #[tokio::test]
    async fn test_wait_drains_all_pending_requests() {
        let transport = MockTransport::new(vec![
            ok_reply(200, &[], "one"),
            ok_reply(200, &[], "two"),
        ]);
        let client = client_with(&transport).build();

        let completed = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let sink = Arc::clone(&completed);
            client.send_async(
                Request::get("http://example.org/").unwrap(),
                move |_| {
                    sink.fetch_add(1, Ordering::SeqCst);
                },
                |_, _| panic!("error callback must not run"),
            );
        }
        client.wait().await;

        assert_eq!(completed.load(Ordering::SeqCst), 2);
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_send_over_real_transport_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let client = Client::new();
        let response = client
            .send(Request::get(&format!("{}/old", server.uri())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body_string().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_async_over_real_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string("alpha"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string("beta"))
            .mount(&server)
            .await;

        let client = Client::new();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        for p in ["/a", "/b"] {
            let sink = Arc::clone(&statuses);
            client.send_async(
                Request::get(&format!("{}{}", server.uri(), p)).unwrap(),
                move |response| sink.lock().unwrap().push(response.status()),
                |error, _| panic!("request failed: {}", error),
            );
        }
        client.wait().await;

        assert_eq!(*statuses.lock().unwrap(), vec![200, 200]);
        assert_eq!(client.pending_requests(), 0);
    }
}
