//! Pattern-matched route table, middleware chain, and recursion guard
//! (design §4.6). Verb dispatch is one registration operation per tag
//! rather than the source's catch-all hook (§9 "Dynamic method dispatch").

use std::collections::HashSet;

use crate::request::Request;
use crate::response::ResponseBuilder;

/// Verb tags the HTTP dispatcher registers against. `Error` is the
/// synthetic fallback method tried when no verb-specific route matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
    Error,
}

/// The mail/gopher counterpart, since SMTP/IMAP verbs don't fit the HTTP
/// enumeration (design §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailMethod {
    Request,
    Error,
}

/// What a handler returns, replacing the source's exception-for-control-flow
/// (design §9 "Exception-for-control-flow").
pub enum HandlerResult {
    Continue,
    StopServer,
    RestartServer(String),
}

pub type Handler = Box<dyn Fn(&mut Request, &mut ResponseBuilder) -> HandlerResult>;

struct Route {
    pattern: String,
    handler: Handler,
    raw: bool,
}

/// One method's ordered pattern list plus the middleware chain run ahead
/// of matching.
#[derive(Default)]
pub struct Dispatcher {
    routes: std::collections::HashMap<Method, Vec<Route>>,
    middleware: Vec<Box<dyn Fn(&mut Request)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            routes: std::collections::HashMap::new(),
            middleware: Vec::new(),
        }
    }

    /// Registers `pattern` under `method`; `raw` suppresses the default
    /// response framing (§4.10) for handlers that write their own
    /// complete wire output.
    pub fn register(&mut self, method: Method, pattern: impl Into<String>, raw: bool, handler: Handler) {
        self.routes.entry(method).or_default().push(Route {
            pattern: pattern.into(),
            handler,
            raw,
        });
    }

    pub fn use_middleware(&mut self, middleware: impl Fn(&mut Request) + 'static) {
        self.middleware.push(Box::new(middleware));
    }

    /// Mounts `other`'s routes under `prefix`, prepended onto every
    /// pattern with the same method, preserving captures (§4.6 sub-site
    /// composition).
    pub fn mount(&mut self, prefix: &str, other: Dispatcher) {
        for (method, routes) in other.routes {
            let target = self.routes.entry(method).or_default();
            for route in routes {
                target.push(Route {
                    pattern: format!("{prefix}{}", route.pattern),
                    handler: route.handler,
                    raw: route.raw,
                });
            }
        }
    }

    /// Runs middleware, finds the first matching route for `method` and
    /// `path`, falling back to `Method::Error` with the 404 synthetic
    /// route, and invokes the handler with a fresh recursion guard.
    pub fn dispatch(
        &self,
        method: Method,
        request: &mut Request,
        response: &mut ResponseBuilder,
    ) -> HandlerResult {
        for mw in &self.middleware {
            mw(request);
        }

        let mut guard = RecursionGuard::default();
        self.dispatch_inner(method, request, response, &mut guard)
    }

    fn dispatch_inner(
        &self,
        method: Method,
        request: &mut Request,
        response: &mut ResponseBuilder,
        guard: &mut RecursionGuard,
    ) -> HandlerResult {
        if let Some((route, captures)) = self.find(method, &request.path) {
            if !guard.enter(method, &route.pattern) {
                response.body_mut().extend_from_slice(
                    b"INTERNAL REQUEST FAILED DUE TO RECURSION",
                );
                return HandlerResult::Continue;
            }
            request.captures = captures;
            request.merge_captures_into_request_map();
            return (route.handler)(request, response);
        }

        if let Some((route, captures)) = self.find(Method::Error, "/404") {
            request.captures = captures;
            request.merge_captures_into_request_map();
            return (route.handler)(request, response);
        }

        response.body_mut().extend_from_slice(b"404 Not Found");
        HandlerResult::Continue
    }

    fn find(&self, method: Method, path: &str) -> Option<(&Route, Vec<(String, String)>)> {
        let routes = self.routes.get(&method)?;
        for route in routes {
            if let Some(captures) = match_pattern(&route.pattern, path) {
                return Some((route, captures));
            }
        }
        None
    }

    pub fn is_raw(&self, method: Method, path: &str) -> bool {
        self.find(method, path).map(|(r, _)| r.raw).unwrap_or(false)
    }
}

/// Tracks `(method, pattern)` pairs already entered within one top-level
/// dispatch, rejecting re-entry (design §4.6, §4.11).
#[derive(Default)]
struct RecursionGuard {
    seen: HashSet<(Method, String)>,
}

impl RecursionGuard {
    fn enter(&mut self, method: Method, pattern: &str) -> bool {
        self.seen.insert((method, pattern.to_string()))
    }
}

/// Matches `path` against `pattern`'s `*` (greedy wildcard) and `{name}`
/// (greedy named capture) metacharacters, whole-string.
fn match_pattern(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
    let mut captures = Vec::new();
    if match_segment(pattern.as_bytes(), path.as_bytes(), &mut captures) {
        Some(captures)
    } else {
        None
    }
}

fn match_segment(pattern: &[u8], path: &[u8], captures: &mut Vec<(String, String)>) -> bool {
    if pattern.is_empty() {
        return path.is_empty();
    }
    match pattern[0] {
        b'*' => {
            // Greedy: try consuming the longest possible run first.
            for split in (0..=path.len()).rev() {
                if match_segment(&pattern[1..], &path[split..], captures) {
                    return true;
                }
            }
            false
        }
        b'{' => {
            let end = match pattern.iter().position(|&b| b == b'}') {
                Some(i) => i,
                None => return false,
            };
            let name = String::from_utf8_lossy(&pattern[1..end]).to_string();
            let rest_pattern = &pattern[end + 1..];
            for split in (0..=path.len()).rev() {
                let mut trial = captures.clone();
                if match_segment(rest_pattern, &path[split..], &mut trial) {
                    trial.push((name, String::from_utf8_lossy(&path[..split]).to_string()));
                    *captures = trial;
                    return true;
                }
            }
            false
        }
        literal_byte => {
            if path.first() == Some(&literal_byte) {
                match_segment(&pattern[1..], &path[1..], captures)
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_route_matches_exactly() {
        assert_eq!(match_pattern("/thread", "/thread"), Some(vec![]));
        assert_eq!(match_pattern("/thread", "/thread/5"), None);
    }

    #[test]
    fn wildcard_is_greedy() {
        let caps = match_pattern("/static/*", "/static/a/b/c").unwrap();
        assert!(caps.is_empty());
    }

    #[test]
    fn named_capture_binds_longest_valid_suffix() {
        let caps = match_pattern("/thread/{thread_num}", "/thread/5").unwrap();
        assert_eq!(caps, vec![("thread_num".to_string(), "5".to_string())]);
    }

    #[test]
    fn named_capture_before_literal_suffix() {
        let caps = match_pattern("/thread/{id}/edit", "/thread/42/edit").unwrap();
        assert_eq!(caps, vec![("id".to_string(), "42".to_string())]);
    }
}
