//! Transport layer abstraction for sync requests.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Method of a request descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Fetch a resource.
    Get,
    /// Create a resource.
    Post,
    /// Partially update a resource.
    Patch,
    /// Delete a resource.
    Delete,
}

impl Method {
    /// Returns the wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shaped network request handed to the transport.
///
/// The core never parses wire bytes; it only shapes descriptors and
/// later consumes structured results keyed by the correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// Method to use.
    pub method: Method,
    /// Resource path, relative to the transport's base URL. May carry a
    /// query string.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
    /// Extra headers as (name, value) pairs.
    pub headers: Vec<(String, String)>,
    /// Correlation id echoed back with the result (the container id at
    /// issue time).
    pub correlation_id: String,
}

impl RequestDescriptor {
    /// Creates a bare descriptor.
    pub fn new(method: Method, path: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Attaches a JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header with the given name, if any.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The network collaborator.
///
/// `dispatch` is fire-and-forget: the transport eventually resolves the
/// request and the host feeds the structured `{success, data}` result
/// back through the engine's completion entry points. The engine never
/// blocks on a response.
pub trait Transport: Send + Sync {
    /// Hands a shaped request to the network layer.
    fn dispatch(&self, request: RequestDescriptor) -> SyncResult<()>;
}

/// A transport that records dispatched requests, for tests.
#[derive(Debug, Default)]
pub struct MockTransport {
    requests: Mutex<Vec<RequestDescriptor>>,
    fail_dispatch: AtomicBool,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every dispatched request, in order.
    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests.lock().clone()
    }

    /// Returns the most recently dispatched request.
    pub fn last_request(&self) -> Option<RequestDescriptor> {
        self.requests.lock().last().cloned()
    }

    /// Returns the number of dispatched requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Makes subsequent dispatches fail.
    pub fn set_fail_dispatch(&self, fail: bool) {
        self.fail_dispatch.store(fail, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn dispatch(&self, request: RequestDescriptor) -> SyncResult<()> {
        if self.fail_dispatch.load(Ordering::SeqCst) {
            return Err(SyncError::transport("mock dispatch failure"));
        }
        self.requests.lock().push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_builder() {
        let request = RequestDescriptor::new(Method::Patch, "conversations/c-1", "c-1")
            .with_body(json!([{ "operation": "delete", "property": "metadata.title" }]))
            .with_header("content-type", "application/vnd.layer-patch+json");

        assert_eq!(request.method.as_str(), "PATCH");
        assert_eq!(
            request.header("Content-Type"),
            Some("application/vnd.layer-patch+json")
        );
        assert!(request.body.is_some());
    }

    #[test]
    fn mock_records_in_order() {
        let transport = MockTransport::new();
        transport
            .dispatch(RequestDescriptor::new(Method::Post, "conversations", "a"))
            .unwrap();
        transport
            .dispatch(RequestDescriptor::new(Method::Get, "conversations/a", "a"))
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[1].method, Method::Get);
    }

    #[test]
    fn mock_dispatch_failure() {
        let transport = MockTransport::new();
        transport.set_fail_dispatch(true);

        let result = transport.dispatch(RequestDescriptor::new(Method::Post, "conversations", "a"));
        assert!(matches!(result, Err(SyncError::Transport { .. })));
        assert_eq!(transport.request_count(), 0);
    }
}
