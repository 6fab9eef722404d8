//! The per-request context map and captured-parameter maps handlers
//! consume (design §3, §6). A plain request object passed by reference,
//! replacing the source's superglobal mutation (§9).

use std::collections::HashMap;

/// A context value is either a single string or a multi-value list (for
/// repeated headers/query keys), matching the CGI-superglobal contract
/// without resorting to a generic `Any` map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextValue {
    Single(String),
    Multi(Vec<String>),
}

impl ContextValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::Single(s) => Some(s),
            ContextValue::Multi(v) => v.first().map(String::as_str),
        }
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::Single(s)
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Single(s.to_string())
    }
}

/// One parsed, routable request: HTTP/1.1, HTTP/2, or the mail variant's
/// synthesized `REQUEST` all populate the same shape before dispatch.
#[derive(Debug, Default)]
pub struct Request {
    /// `REQUEST_METHOD, REQUEST_URI, SERVER_PROTOCOL, PHP_SELF,
    /// QUERY_STRING, REMOTE_ADDR, REMOTE_PORT, SERVER_ADDR, SERVER_PORT,
    /// REQUEST_TIME, REQUEST_TIME_FLOAT, HTTP_<HEADER>, CONTENT_TYPE,
    /// CONTENT_LENGTH, CONTENT` and friends (design §6).
    pub context: HashMap<String, ContextValue>,
    pub path: String,
    pub body: Vec<u8>,
    /// Captured path segments from the matched route pattern.
    pub captures: Vec<(String, String)>,
    /// Query-string key/value pairs, merged with `captures`.
    pub get: HashMap<String, String>,
    /// `get` merged with parsed body parameters and `captures`.
    pub request: HashMap<String, String>,
    pub session_id: Option<String>,
}

impl Request {
    pub fn new(path: impl Into<String>) -> Self {
        Request {
            path: path.into(),
            ..Request::default()
        }
    }

    pub fn context_get(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(ContextValue::as_str)
    }

    pub fn context_set(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.context.insert(key.into(), value.into());
    }

    /// Parses `QUERY_STRING` (if present in the context map) into `get`.
    pub fn parse_query_string(&mut self) {
        let query = match self.context_get("QUERY_STRING") {
            Some(q) => q.to_string(),
            None => return,
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            };
            self.get.insert(key, value);
        }
        self.request = self.get.clone();
    }

    /// Merges route captures into both the GET map and the merged REQUEST
    /// map (design §8 "Route capture" scenario).
    pub fn merge_captures_into_request_map(&mut self) {
        for (name, value) in self.captures.clone() {
            self.get.insert(name.clone(), value.clone());
            self.request.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_capture_visible_in_both_maps() {
        let mut req = Request::new("/thread/5");
        req.captures = vec![("thread_num".to_string(), "5".to_string())];
        req.merge_captures_into_request_map();
        assert_eq!(req.get.get("thread_num"), Some(&"5".to_string()));
        assert_eq!(req.request.get("thread_num"), Some(&"5".to_string()));
    }

    #[test]
    fn query_string_parses_into_get_map() {
        let mut req = Request::new("/");
        req.context_set("QUERY_STRING", "a=1&b=2");
        req.parse_query_string();
        assert_eq!(req.get.get("a"), Some(&"1".to_string()));
        assert_eq!(req.get.get("b"), Some(&"2".to_string()));
    }
}
