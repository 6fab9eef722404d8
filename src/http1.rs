//! Incremental HTTP/1.1 request parser: request-line, headers, and a
//! fixed-length body, fed the connection's accumulated inbound buffer one
//! readiness cycle at a time. The request-line/header block is parsed with
//! `httparse`, re-run over the whole accumulated buffer on each call the
//! way the teacher's `proto/h1/role.rs` re-parses on every read rather than
//! resuming a partial header scan.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Matches the teacher's `proto/h1/role.rs` header-count ceiling.
const MAX_HEADERS: usize = 100;

/// One incremental parse outcome. The caller keeps feeding more bytes on
/// `NeedMore` and re-parsing from the same `ParserState`.
#[derive(Debug)]
pub enum Outcome {
    NeedMore,
    Complete(Request),
    BadRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Head,
    Body,
}

/// Parser state carried on the connection record between reads.
#[derive(Debug)]
pub struct ParserState {
    phase: Phase,
    method: String,
    path: String,
    query: String,
    version_minor: u8,
    headers: HashMap<String, String>,
    content_length: usize,
    body_start: usize,
}

impl Default for ParserState {
    fn default() -> Self {
        ParserState {
            phase: Phase::Head,
            method: String::new(),
            path: String::new(),
            query: String::new(),
            version_minor: 1,
            headers: HashMap::new(),
            content_length: 0,
            body_start: 0,
        }
    }
}

/// A fully parsed request: method/path/query, the raw and
/// context-mapped headers, and the body bytes.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: String,
    pub version_minor: u8,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Byte offset in the original buffer just past this request; the
    /// caller drains up to here (pipelined bytes, if any, remain).
    pub consumed: usize,
}

const RECOGNIZED_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "TRACE", "CONNECT", "PATCH",
];

/// Parses as much of `buf` as is available, advancing `state` in place.
///
/// The request-line/header block is re-parsed from the start of `buf` on
/// every call, the way the teacher's `proto/h1/role.rs` re-runs `httparse`
/// over the whole accumulated read buffer rather than resuming a partial
/// scan; only once `httparse` reports the head as complete do we start
/// tracking a body offset incrementally.
pub fn parse(buf: &[u8], state: &mut ParserState) -> Result<Outcome> {
    if state.phase == Phase::Head {
        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut raw_headers);
        let body_start = match req.parse(buf) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => return Ok(Outcome::NeedMore),
            Err(_) => return Ok(Outcome::BadRequest),
        };

        let method = req.method.unwrap_or("");
        if !RECOGNIZED_METHODS.contains(&method) {
            return Ok(Outcome::BadRequest);
        }
        let version_minor = req.version.unwrap_or(1);
        let uri = req.path.unwrap_or("");
        let (path, query) = match uri.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (uri.to_string(), String::new()),
        };

        let mut headers = HashMap::new();
        for h in req.headers.iter() {
            let value = std::str::from_utf8(h.value).map_err(|_| Error::new_http1_parse())?;
            store_header(&mut headers, h.name, value);
        }

        state.method = method.to_string();
        state.path = path;
        state.query = query;
        state.version_minor = version_minor;
        state.content_length = headers
            .get("CONTENT_LENGTH")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        state.headers = headers;
        state.body_start = body_start;
        state.phase = Phase::Body;
    }

    let body_start = state.body_start;
    if state.content_length == 0 {
        return Ok(finish(state, buf, body_start, body_start));
    }
    if state.content_length > buf.len().saturating_sub(body_start) {
        return Ok(Outcome::NeedMore);
    }
    let body_end = body_start + state.content_length;
    Ok(finish(state, buf, body_start, body_end))
}

fn finish(state: &mut ParserState, buf: &[u8], body_start: usize, body_end: usize) -> Outcome {
    let request = Request {
        method: std::mem::take(&mut state.method),
        path: std::mem::take(&mut state.path),
        query: std::mem::take(&mut state.query),
        version_minor: state.version_minor,
        headers: std::mem::take(&mut state.headers),
        body: buf[body_start..body_end].to_vec(),
        consumed: body_end,
    };
    *state = ParserState::default();
    Outcome::Complete(request)
}

/// CGI-style transform: `Foo-Bar` → `HTTP_FOO_BAR`, except the two
/// headers that are stored bare per the design's context-key contract.
fn store_header(headers: &mut HashMap<String, String>, name: &str, value: &str) {
    let upper = name.to_uppercase().replace('-', "_");
    let key = match upper.as_str() {
        "CONTENT_TYPE" | "CONTENT_LENGTH" => upper,
        _ => format!("HTTP_{upper}"),
    };
    headers.insert(key, value.to_string());
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let buf = b"GET /?a=1 HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut state = ParserState::default();
        match parse(buf, &mut state).unwrap() {
            Outcome::Complete(req) => {
                assert_eq!(req.method, "GET");
                assert_eq!(req.path, "/");
                assert_eq!(req.query, "a=1");
                assert_eq!(req.headers.get("HTTP_HOST"), Some(&"x".to_string()));
                assert_eq!(req.consumed, buf.len());
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn waits_for_full_body() {
        let buf = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel";
        let mut state = ParserState::default();
        assert!(matches!(parse(buf, &mut state).unwrap(), Outcome::NeedMore));
    }

    #[test]
    fn completes_once_body_arrives() {
        let buf = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let mut state = ParserState::default();
        match parse(buf, &mut state).unwrap() {
            Outcome::Complete(req) => assert_eq!(req.body, b"hello"),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unrecognized_method() {
        let buf = b"FOO / HTTP/1.1\r\n\r\n";
        let mut state = ParserState::default();
        assert!(matches!(parse(buf, &mut state).unwrap(), Outcome::BadRequest));
    }

    #[test]
    fn accepts_lf_only_lines() {
        let buf = b"GET / HTTP/1.1\nHost: x\n\n";
        let mut state = ParserState::default();
        assert!(matches!(parse(buf, &mut state).unwrap(), Outcome::Complete(_)));
    }

    #[test]
    fn rejects_header_without_colon() {
        let buf = b"GET / HTTP/1.1\r\nnotaheader\r\n\r\n";
        let mut state = ParserState::default();
        assert!(matches!(parse(buf, &mut state).unwrap(), Outcome::BadRequest));
    }
}
