//! Response assembler (design §4.10): handlers append headers and body
//! bytes to ambient pending-response state; at completion the status
//! line, default `Content-Type`, and `Content-Length` are synthesized.

use indexmap::IndexMap;

/// Ambient output-capture facility handlers write into, replacing the
/// source's implicit capture buffer (design §9 "Output buffering via
/// ambient capture") with a request-scoped value.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    status_line: Option<String>,
    headers: IndexMap<String, String>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        ResponseBuilder::default()
    }

    /// Sets a full status line beginning `HTTP/`; if set, no line is
    /// synthesized at completion.
    pub fn set_status_line(&mut self, line: impl Into<String>) {
        self.status_line = Some(line.into());
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body_mut(&mut self) -> &mut Vec<u8> {
        &mut self.body
    }

    pub fn status_code(&self) -> u16 {
        self.status_line
            .as_deref()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or_else(|| default_status_code(&self.headers))
    }

    /// Assembles the complete HTTP/1.1 wire response: status line,
    /// headers (synthesizing `Date`, `Content-Type` and `Content-Length`
    /// if absent), a blank line, then the body.
    pub fn finish(mut self) -> Vec<u8> {
        let status_line = self
            .status_line
            .take()
            .unwrap_or_else(|| default_status_line(&self.headers));
        if !self.headers.contains_key("Date") {
            self.headers.insert("Date".to_string(), httpdate::fmt_http_date(std::time::SystemTime::now()));
        }
        if !self.headers.contains_key("Content-Type") {
            self.headers
                .insert("Content-Type".to_string(), "text/html".to_string());
        }
        self.headers
            .insert("Content-Length".to_string(), self.body.len().to_string());

        let mut out = Vec::with_capacity(status_line.len() + self.body.len() + 128);
        out.extend_from_slice(status_line.trim_end().as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Splits into `(:status, headers, body)` for the HTTP/2 path, which
    /// frames these as HEADERS + DATA rather than one byte blob.
    pub fn into_parts(mut self) -> (u16, Vec<(String, String)>, Vec<u8>) {
        let status = self.status_code();
        if !self.headers.contains_key("Date") {
            self.headers.insert("Date".to_string(), httpdate::fmt_http_date(std::time::SystemTime::now()));
        }
        if !self.headers.contains_key("Content-Type") {
            self.headers
                .insert("Content-Type".to_string(), "text/html".to_string());
        }
        let headers = self.headers.into_iter().collect();
        (status, headers, self.body)
    }
}

fn default_status_line(headers: &IndexMap<String, String>) -> String {
    format!("HTTP/1.1 {}", default_status_text(default_status_code(headers)))
}

fn default_status_code(headers: &IndexMap<String, String>) -> u16 {
    if headers.contains_key("Location") {
        301
    } else if headers.contains_key("Refresh") {
        302
    } else {
        200
    }
}

fn default_status_text(code: u16) -> &'static str {
    match code {
        301 => "301 Moved Permanently",
        302 => "302 Found",
        _ => "200 OK",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ok_response() {
        let mut b = ResponseBuilder::new();
        b.body_mut().extend_from_slice(b"OK");
        let out = b.finish();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Date: "));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nOK"));
    }

    #[test]
    fn location_header_synthesizes_301() {
        let mut b = ResponseBuilder::new();
        b.set_header("Location", "/next");
        let out = b.finish();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 301 Moved Permanently\r\nLocation: /next\r\n"));
        assert!(text.contains("Content-Length: 0"));
    }

    #[test]
    fn explicit_status_line_is_kept_verbatim() {
        let mut b = ResponseBuilder::new();
        b.set_status_line("HTTP/1.1 404 Not Found");
        let out = b.finish();
        assert!(String::from_utf8(out).unwrap().starts_with("HTTP/1.1 404 Not Found\r\n"));
    }
}
