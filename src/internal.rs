//! Internal request re-entry (design §4.11): `process_internal_request`
//! simulates a local HTTP request without touching a socket, bounded to a
//! fixed recursion depth.
//!
//! The source's ambient per-request globals are, in this crate, just the
//! explicit [`Request`](crate::request::Request) a handler is already
//! passed — so "save/restore ambient state" collapses to constructing a
//! fresh `Request` for the nested call and handing the caller back a
//! structured result instead of mutating shared state (design §9
//! "Superglobal injection").

use std::cell::Cell;

use crate::request::Request;
use crate::response::ResponseBuilder;
use crate::route::{Dispatcher, Method};

/// Recursion ceiling from design §4.11 / §7.
const MAX_DEPTH: usize = 5;

const RECURSION_FAILURE: &str = "INTERNAL REQUEST FAILED DUE TO RECURSION";

/// Captured result of a re-entrant dispatch. The design's Open Question
/// about whether this should be raw bytes or something richer is resolved
/// here in favor of a structured response (DESIGN.md), since a systems
/// caller benefits from typed access over re-parsing a byte blob.
#[derive(Debug, Clone)]
pub struct InternalResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl InternalResponse {
    fn recursion_failure() -> Self {
        InternalResponse {
            status: 500,
            headers: Vec::new(),
            body: RECURSION_FAILURE.as_bytes().to_vec(),
        }
    }
}

/// Tracks the current internal-request call depth for one connection's
/// request processing. Not `Sync`; the reactor is single-threaded so one
/// instance per in-flight top-level request suffices.
#[derive(Debug, Default)]
pub struct InternalRequester {
    depth: Cell<usize>,
}

impl InternalRequester {
    pub fn new() -> Self {
        InternalRequester::default()
    }

    /// Re-dispatches `url` through `dispatcher` as a synthetic request.
    /// `include_headers` copies the parent request's `HTTP_*` context
    /// entries into the nested one; `post_data`, if present, selects
    /// `POST` and becomes the nested request's body.
    pub fn process(
        &self,
        dispatcher: &Dispatcher,
        parent: &Request,
        url: &str,
        include_headers: bool,
        post_data: Option<Vec<u8>>,
    ) -> InternalResponse {
        if self.depth.get() >= MAX_DEPTH {
            return InternalResponse::recursion_failure();
        }
        self.depth.set(self.depth.get() + 1);
        let result = self.dispatch_once(dispatcher, parent, url, include_headers, post_data);
        self.depth.set(self.depth.get() - 1);
        result
    }

    fn dispatch_once(
        &self,
        dispatcher: &Dispatcher,
        parent: &Request,
        url: &str,
        include_headers: bool,
        post_data: Option<Vec<u8>>,
    ) -> InternalResponse {
        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (url.to_string(), String::new()),
        };

        let mut req = Request::new(path.clone());
        req.context_set("REQUEST_URI", url.to_string());
        req.context_set("PHP_SELF", path);
        req.context_set("QUERY_STRING", query);
        if include_headers {
            for (key, value) in &parent.context {
                if key.starts_with("HTTP_") {
                    req.context.insert(key.clone(), value.clone());
                }
            }
        }

        let method = if let Some(data) = post_data {
            req.context_set("CONTENT_LENGTH", data.len().to_string());
            req.body = data;
            Method::Post
        } else {
            Method::Get
        };
        req.parse_query_string();

        let mut response = ResponseBuilder::new();
        // A nested request's StopServer/RestartServer signal is not
        // propagated; only a top-level dispatch from the reactor acts on it.
        let _ = dispatcher.dispatch(method, &mut req, &mut response);

        let (status, headers, body) = response.into_parts();
        InternalResponse { status, headers, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::HandlerResult;

    fn echo_dispatcher() -> Dispatcher {
        let mut d = Dispatcher::new();
        d.register(Method::Get, "/echo", false, Box::new(|req, resp| {
            resp.body_mut().extend_from_slice(req.path.as_bytes());
            HandlerResult::Continue
        }));
        d
    }

    #[test]
    fn dispatches_and_captures_body() {
        let dispatcher = echo_dispatcher();
        let requester = InternalRequester::new();
        let parent = Request::new("/");
        let resp = requester.process(&dispatcher, &parent, "/echo", false, None);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"/echo".to_vec());
    }

    #[test]
    fn recursion_past_max_depth_fails_without_dispatching() {
        let dispatcher = echo_dispatcher();
        let requester = InternalRequester::new();
        let parent = Request::new("/");
        for _ in 0..MAX_DEPTH {
            requester.depth.set(requester.depth.get() + 1);
        }
        let resp = requester.process(&dispatcher, &parent, "/echo", false, None);
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body, RECURSION_FAILURE.as_bytes().to_vec());
    }

    #[test]
    fn include_headers_copies_http_context() {
        let dispatcher = {
            let mut d = Dispatcher::new();
            d.register(Method::Get, "/whoami", false, Box::new(|req, resp| {
                if let Some(host) = req.context_get("HTTP_HOST") {
                    resp.body_mut().extend_from_slice(host.as_bytes());
                }
                HandlerResult::Continue
            }));
            d
        };
        let mut parent = Request::new("/");
        parent.context_set("HTTP_HOST", "example.test");
        let requester = InternalRequester::new();
        let resp = requester.process(&dispatcher, &parent, "/whoami", true, None);
        assert_eq!(resp.body, b"example.test".to_vec());
    }

    #[test]
    fn post_data_selects_post_method_and_sets_body() {
        let dispatcher = {
            let mut d = Dispatcher::new();
            d.register(Method::Post, "/submit", false, Box::new(|req, resp| {
                resp.body_mut().extend_from_slice(&req.body);
                HandlerResult::Continue
            }));
            d
        };
        let parent = Request::new("/");
        let requester = InternalRequester::new();
        let resp = requester.process(&dispatcher, &parent, "/submit", false, Some(b"hi".to_vec()));
        assert_eq!(resp.body, b"hi".to_vec());
    }
}
