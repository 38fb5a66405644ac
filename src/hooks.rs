use std::collections::HashMap;
use std::fmt;

use crate::request::Request;
use crate::response::Response;
use crate::transport::TransportError;

/// Outcome of one error or exception hook invocation.
///
/// Each handler receives a fresh decision carrying the current retry
/// count (0 on the first failure of a logical request). Votes are
/// aggregated with OR semantics: once any handler asks for a retry, a
/// later handler cannot undo it.
#[derive(Debug, Clone, Copy)]
pub struct RetryDecision {
    /// Set to true to re-attempt the same request.
    pub should_retry: bool,
    /// How many times this logical request has been retried so far.
    pub retry_count: u32,
}

impl RetryDecision {
    fn new(retry_count: u32) -> Self {
        Self {
            should_retry: false,
            retry_count,
        }
    }

    /// Vote for retrying the request.
    pub fn retry(&mut self) {
        self.should_retry = true;
    }
}

type BeforeRequestHook = Box<dyn Fn(&mut Request) + Send + Sync>;
type AfterRequestHook = Box<dyn Fn(&Request, &Response) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&Request, &Response, &mut RetryDecision) + Send + Sync>;
type ExceptionHook = Box<dyn Fn(&Request, &TransportError, &mut RetryDecision) + Send + Sync>;

/// Registry of lifecycle hooks observed by the client engines.
///
/// Hooks run in registration order. Error hooks registered for a specific
/// status code run after the generic ones.
#[derive(Default)]
pub struct Hooks {
    before_request: Vec<BeforeRequestHook>,
    after_request: Vec<AfterRequestHook>,
    error: Vec<ErrorHook>,
    error_by_status: HashMap<u16, Vec<ErrorHook>>,
    exception: Vec<ExceptionHook>,
}

impl Hooks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe an outbound request just before execution. The handler may
    /// mutate it, e.g. to inject an authentication header.
    pub fn on_before_request(&mut self, hook: impl Fn(&mut Request) + Send + Sync + 'static) {
        self.before_request.push(Box::new(hook));
    }

    /// Observe the final request/response pair of a completed execution.
    pub fn on_after_request(
        &mut self,
        hook: impl Fn(&Request, &Response) + Send + Sync + 'static,
    ) {
        self.after_request.push(Box::new(hook));
    }

    /// Observe any HTTP error response (status 400 or higher).
    pub fn on_error(
        &mut self,
        hook: impl Fn(&Request, &Response, &mut RetryDecision) + Send + Sync + 'static,
    ) {
        self.error.push(Box::new(hook));
    }

    /// Observe HTTP error responses with one specific status code.
    pub fn on_error_status(
        &mut self,
        status: u16,
        hook: impl Fn(&Request, &Response, &mut RetryDecision) + Send + Sync + 'static,
    ) {
        self.error_by_status
            .entry(status)
            .or_default()
            .push(Box::new(hook));
    }

    /// Observe transport-level failures.
    pub fn on_exception(
        &mut self,
        hook: impl Fn(&Request, &TransportError, &mut RetryDecision) + Send + Sync + 'static,
    ) {
        self.exception.push(Box::new(hook));
    }

    pub(crate) fn emit_before_request(&self, request: &mut Request) {
        for hook in &self.before_request {
            hook(request);
        }
    }

    pub(crate) fn emit_after_request(&self, request: &Request, response: &Response) {
        for hook in &self.after_request {
            hook(request, response);
        }
    }

    /// Runs the generic error hooks, then the ones registered for this
    /// status code. Returns whether any handler voted to retry.
    pub(crate) fn emit_error(
        &self,
        request: &Request,
        response: &Response,
        retry_count: u32,
    ) -> bool {
        let specific = self
            .error_by_status
            .get(&response.status())
            .map(|hooks| hooks.as_slice())
            .unwrap_or(&[]);
        let mut should_retry = false;
        for hook in self.error.iter().chain(specific) {
            let mut decision = RetryDecision::new(retry_count);
            hook(request, response, &mut decision);
            should_retry |= decision.should_retry;
        }
        should_retry
    }

    /// Runs the exception hooks. Returns whether any handler voted to
    /// retry.
    pub(crate) fn emit_exception(
        &self,
        request: &Request,
        error: &TransportError,
        retry_count: u32,
    ) -> bool {
        let mut should_retry = false;
        for hook in &self.exception {
            let mut decision = RetryDecision::new(retry_count);
            hook(request, error, &mut decision);
            should_retry |= decision.should_retry;
        }
        should_retry
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_request", &self.before_request.len())
            .field("after_request", &self.after_request.len())
            .field("error", &self.error.len())
            .field("error_by_status", &self.error_by_status.len())
            .field("exception", &self.exception.len())
            .finish()
    }
}
