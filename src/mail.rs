//! Line-oriented SMTP (RFC 5321) and IMAP4rev1 (RFC 3501) command
//! dispatch, sharing the reactor and route-dispatcher machinery with the
//! HTTP variants but driven by its own per-protocol state table.

use crate::error::{Error, Result};

/// `DATA`'s accumulation mode and IMAP's `{N}` literal mode both need to
/// stop treating input as discrete lines; this is the parser's outcome
/// for one call.
#[derive(Debug)]
pub enum Outcome {
    NeedMore,
    /// One command line was recognized and dispatched; `reply` is the
    /// full wire response (already CRLF-terminated) to queue for write.
    Reply(String),
    /// The accumulated message body (SMTP `DATA`) or literal (IMAP
    /// `APPEND`) is complete; `reply` is the final acknowledgement.
    BodyComplete { body: Vec<u8>, reply: String },
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    Init,
    Helo,
    Tls,
    EhloTls,
    Auth,
    Mail,
    Rcpt,
    Data,
}

fn smtp_allowed(state: SmtpState, verb: &str) -> bool {
    let set: &[&str] = match state {
        SmtpState::Init => &["EHLO", "HELO", "NOOP", "QUIT", "RSET", "STARTTLS", "HELP"],
        SmtpState::Helo => &["NOOP", "QUIT", "RSET", "STARTTLS", "HELP"],
        SmtpState::Tls => &["EHLO", "HELO", "NOOP", "QUIT", "RSET", "HELP"],
        SmtpState::EhloTls => &["AUTH", "MAIL", "NOOP", "QUIT", "RSET", "HELP"],
        SmtpState::Auth => &["AUTH"],
        SmtpState::Mail => &["NOOP", "QUIT", "RCPT", "RSET", "HELP"],
        SmtpState::Rcpt => &["DATA", "NOOP", "QUIT", "RCPT", "RSET", "HELP"],
        SmtpState::Data => &["MAIL", "NOOP", "QUIT", "RSET", "HELP"],
    };
    set.contains(&verb)
}

/// Per-connection SMTP state: the allowed-command state plus whatever is
/// being accumulated across lines (the `DATA` body, the envelope).
#[derive(Debug)]
pub struct SmtpSession {
    pub state: SmtpState,
    pub mail_from: Option<String>,
    pub rcpt_to: Vec<String>,
    collecting_data: bool,
    data_buf: Vec<u8>,
    pub server_name: String,
}

impl SmtpSession {
    pub fn new(server_name: impl Into<String>) -> Self {
        SmtpSession {
            state: SmtpState::Init,
            mail_from: None,
            rcpt_to: Vec::new(),
            collecting_data: false,
            data_buf: Vec::new(),
            server_name: server_name.into(),
        }
    }

    pub fn greeting(&self) -> String {
        format!("220 {} ESMTP\r\n", self.server_name)
    }

    /// Feeds one line (without its terminator) through the state table.
    pub fn handle_line(&mut self, line: &str) -> Result<Outcome> {
        if self.collecting_data {
            if line == "." {
                self.collecting_data = false;
                self.state = SmtpState::EhloTls;
                let body = std::mem::take(&mut self.data_buf);
                return Ok(Outcome::BodyComplete {
                    body,
                    reply: "250 2.1.0 Ok\r\n".to_string(),
                });
            }
            let unstuffed = line.strip_prefix('.').unwrap_or(line);
            self.data_buf.extend_from_slice(unstuffed.as_bytes());
            self.data_buf.extend_from_slice(b"\r\n");
            return Ok(Outcome::NeedMore);
        }

        let mut parts = line.splitn(2, ' ');
        let verb = parts.next().unwrap_or("").to_uppercase();
        let rest = parts.next().unwrap_or("").trim();

        if !smtp_allowed(self.state, &verb) {
            return Ok(Outcome::Reply("500 BAD COMMAND\r\n".to_string()));
        }

        let reply = match verb.as_str() {
            "EHLO" => {
                self.state = SmtpState::EhloTls;
                format!(
                    "250-{}\r\n250 AUTH LOGIN PLAIN\r\n",
                    rest.split_whitespace().next().unwrap_or("localhost")
                )
            }
            "HELO" => {
                self.state = SmtpState::Helo;
                format!("250 {}\r\n", self.server_name)
            }
            "STARTTLS" => {
                self.state = SmtpState::Tls;
                "220 Ready to start TLS\r\n".to_string()
            }
            "NOOP" => "250 2.0.0 Ok\r\n".to_string(),
            "RSET" => {
                self.mail_from = None;
                self.rcpt_to.clear();
                self.state = SmtpState::Helo;
                "250 2.0.0 Ok\r\n".to_string()
            }
            "HELP" => "214 See RFC 5321\r\n".to_string(),
            "QUIT" => return Ok(Outcome::Reply("221 2.0.0 Bye\r\n".to_string())),
            "MAIL" => {
                self.mail_from = Some(rest.to_string());
                self.state = SmtpState::Mail;
                "250 2.1.0 Ok\r\n".to_string()
            }
            "RCPT" => {
                self.rcpt_to.push(rest.to_string());
                self.state = SmtpState::Rcpt;
                "250 2.1.0 Ok\r\n".to_string()
            }
            "DATA" => {
                self.collecting_data = true;
                self.state = SmtpState::Data;
                "354 End data with <CR><LF>.<CR><LF>\r\n".to_string()
            }
            "AUTH" => {
                self.state = SmtpState::Auth;
                "334 \r\n".to_string()
            }
            _ => return Err(Error::new_line_protocol()),
        };
        Ok(Outcome::Reply(reply))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapState {
    Init,
    Tls,
    User,
    Idle,
    Append,
    Auth,
}

fn imap_allowed(state: ImapState, verb: &str) -> bool {
    let set: &[&str] = match state {
        ImapState::Init => &["CAPABILITY", "NOOP", "STARTTLS"],
        ImapState::Tls => &["AUTH", "CAPABILITY", "LOGIN", "LOGOUT", "NOOP"],
        ImapState::User => &[
            "APPEND",
            "AUTH",
            "CAPABILITY",
            "CHECK",
            "COPY",
            "CLOSE",
            "CREATE",
            "DELETE",
            "EXAMINE",
            "EXPUNGE",
            "IDLE",
            "LIST",
            "LSUB",
            "LOGIN",
            "LOGOUT",
            "NOOP",
            "RENAME",
            "SELECT",
            "SEND",
            "STATUS",
            "STORE",
            "SUBSCRIBE",
            "UID",
            "UNSUBSCRIBE",
        ],
        ImapState::Idle => &["IDLE"],
        ImapState::Append => &["APPEND"],
        ImapState::Auth => &["AUTH"],
    };
    set.contains(&verb)
}

/// An IMAP `{N}` literal awaiting exactly `remaining` more bytes before
/// the append command can complete.
#[derive(Debug)]
struct PendingLiteral {
    tag: String,
    remaining: usize,
    buf: Vec<u8>,
}

#[derive(Debug)]
pub struct ImapSession {
    pub state: ImapState,
    pending: Option<PendingLiteral>,
}

impl ImapSession {
    pub fn new() -> Self {
        ImapSession {
            state: ImapState::Init,
            pending: None,
        }
    }

    pub fn greeting(&self, server_name: &str) -> String {
        format!("* OK {server_name} IMAP4rev1 Service Ready\r\n")
    }

    pub fn handle_line(&mut self, line: &str) -> Result<Outcome> {
        if let Some(pending) = &mut self.pending {
            let mut line_bytes = line.as_bytes().to_vec();
            line_bytes.extend_from_slice(b"\r\n");
            let take = pending.remaining.min(line_bytes.len());
            pending.buf.extend_from_slice(&line_bytes[..take]);
            pending.remaining -= take;
            if pending.remaining == 0 {
                let tag = pending.tag.clone();
                let body = std::mem::take(&mut pending.buf);
                self.pending = None;
                self.state = ImapState::User;
                return Ok(Outcome::BodyComplete {
                    body,
                    reply: format!("{tag} OK APPEND completed\r\n"),
                });
            }
            return Ok(Outcome::NeedMore);
        }

        let mut parts = line.splitn(3, ' ');
        let tag = parts.next().unwrap_or("*").to_string();
        let verb = parts.next().unwrap_or("").to_uppercase();
        let rest = parts.next().unwrap_or("").trim();

        if !imap_allowed(self.state, &verb) {
            return Ok(Outcome::Reply(format!("{tag} BAD unrecognized command in this state\r\n")));
        }

        let reply = match verb.as_str() {
            "CAPABILITY" => format!("* CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN\r\n{tag} OK CAPABILITY completed\r\n"),
            "NOOP" => format!("{tag} OK NOOP completed\r\n"),
            "STARTTLS" => {
                self.state = ImapState::Tls;
                format!("{tag} OK Begin TLS negotiation now\r\n")
            }
            "LOGIN" => {
                self.state = ImapState::User;
                format!("{tag} OK LOGIN completed\r\n")
            }
            "AUTH" | "AUTHENTICATE" => {
                self.state = ImapState::Auth;
                "+ \r\n".to_string()
            }
            "LOGOUT" => {
                return Ok(Outcome::Reply(format!("* BYE logging out\r\n{tag} OK LOGOUT completed\r\n")))
            }
            "SELECT" | "EXAMINE" => format!("{tag} OK [READ-WRITE] SELECT completed\r\n"),
            "IDLE" => {
                self.state = ImapState::Idle;
                "+ idling\r\n".to_string()
            }
            "APPEND" => {
                if let Some(len) = parse_literal_len(rest) {
                    self.state = ImapState::Append;
                    self.pending = Some(PendingLiteral {
                        tag: tag.clone(),
                        remaining: len,
                        buf: Vec::with_capacity(len),
                    });
                    "+ Ready for literal data\r\n".to_string()
                } else {
                    format!("{tag} BAD missing literal length\r\n")
                }
            }
            _ => format!("{tag} OK {verb} completed\r\n"),
        };
        Ok(Outcome::Reply(reply))
    }
}

impl Default for ImapSession {
    fn default() -> Self {
        ImapSession::new()
    }
}

/// Extracts `N` from a trailing `{N}` literal marker.
fn parse_literal_len(rest: &str) -> Option<usize> {
    let start = rest.rfind('{')?;
    let end = rest.rfind('}')?;
    if end <= start {
        return None;
    }
    rest[start + 1..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_session_happy_path() {
        let mut session = SmtpSession::new("localhost");
        assert_eq!(session.greeting(), "220 localhost ESMTP\r\n");

        let r = session.handle_line("EHLO x").unwrap();
        assert!(matches!(r, Outcome::Reply(_)));
        assert_eq!(session.state, SmtpState::EhloTls);

        session.handle_line("MAIL FROM:<a@x>").unwrap();
        assert_eq!(session.state, SmtpState::Mail);

        session.handle_line("RCPT TO:<b@localhost>").unwrap();
        assert_eq!(session.state, SmtpState::Rcpt);

        let r = session.handle_line("DATA").unwrap();
        assert!(matches!(r, Outcome::Reply(ref s) if s.starts_with("354")));
        assert_eq!(session.state, SmtpState::Data);

        session.handle_line("subject: test").unwrap();
        session.handle_line("").unwrap();
        let r = session.handle_line("hi").unwrap();
        assert!(matches!(r, Outcome::NeedMore));
        match session.handle_line(".").unwrap() {
            Outcome::BodyComplete { body, reply } => {
                assert_eq!(body, b"subject: test\r\n\r\nhi\r\n");
                assert_eq!(reply, "250 2.1.0 Ok\r\n");
            }
            other => panic!("expected BodyComplete, got {other:?}"),
        }
        assert_eq!(session.state, SmtpState::EhloTls);

        let r = session.handle_line("QUIT").unwrap();
        assert!(matches!(r, Outcome::Reply(ref s) if s.starts_with("221")));
    }

    #[test]
    fn smtp_rejects_out_of_state_command() {
        let mut session = SmtpSession::new("localhost");
        let r = session.handle_line("RCPT TO:<b@localhost>").unwrap();
        assert!(matches!(r, Outcome::Reply(ref s) if s.starts_with("500")));
    }

    #[test]
    fn imap_append_literal_roundtrip() {
        let mut session = ImapSession::new();
        session.state = ImapState::User;
        let r = session.handle_line("A1 APPEND INBOX {5}").unwrap();
        assert!(matches!(r, Outcome::Reply(ref s) if s.starts_with("+ ")));
        match session.handle_line("hello").unwrap() {
            Outcome::BodyComplete { reply, .. } => assert_eq!(reply, "A1 OK APPEND completed\r\n"),
            other => panic!("expected BodyComplete, got {other:?}"),
        }
    }

    #[test]
    fn imap_capability_includes_starttls() {
        let mut session = ImapSession::new();
        match session.handle_line("A1 CAPABILITY").unwrap() {
            Outcome::Reply(s) => assert!(s.contains("STARTTLS")),
            other => panic!("expected Reply, got {other:?}"),
        }
    }
}
