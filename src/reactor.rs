//! The non-blocking I/O reactor (design §4.1, C10): one `mio::Poll` event
//! loop over a listening socket and its accepted connections, classifying
//! each by its first bytes, driving the HTTP/1.1, HTTP/2, and mail state
//! machines, and culling idle connections between readiness waits.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;

use crate::cache::FileCache;
use crate::config::Config;
use crate::h2;
use crate::http1;
use crate::internal::InternalRequester;
use crate::mail::{ImapSession, Outcome as MailOutcome, SmtpSession};
use crate::request::Request;
use crate::response::ResponseBuilder;
use crate::route::{Dispatcher, HandlerResult, MailMethod, Method};
use crate::session::SessionStore;
use crate::timer::TimerWheel;
use crate::trace::warn;

const LISTENER_TOKEN: Token = Token(usize::MAX - 1);
const SMTP_LISTENER_TOKEN: Token = Token(usize::MAX - 2);
const IMAP_LISTENER_TOKEN: Token = Token(usize::MAX - 3);

const RECOGNIZED_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "TRACE", "CONNECT", "PATCH",
];

/// The peer protocol a connection has settled on, or is pending
/// resolution for (TLS ALPN negotiation included).
enum Protocol {
    Pending,
    TlsHandshake,
    Http1(http1::ParserState),
    Http2(h2::Connection),
    Smtp(SmtpSession),
    Imap(ImapSession),
}

/// TLS is a per-connection upgrade from `Plain`, taken once the first
/// bytes are recognized as a TLS record rather than HTTP/h2c (design
/// §4.1 "Accept and classification").
enum Transport {
    Plain(TcpStream),
    Tls(Box<rustls::ServerConnection>, TcpStream),
}

impl Transport {
    fn socket_mut(&mut self) -> &mut TcpStream {
        match self {
            Transport::Plain(s) => s,
            Transport::Tls(_, s) => s,
        }
    }
}

struct Connection {
    transport: Option<Transport>,
    remote_addr: SocketAddr,
    inbound: BytesMut,
    outbound: Vec<u8>,
    protocol: Protocol,
    last_activity: Instant,
    pre_bad: bool,
    close_after_flush: bool,
    is_mail: bool,
    writable_registered: bool,
}

impl Connection {
    fn socket_mut(&mut self) -> &mut TcpStream {
        self.transport
            .as_mut()
            .expect("transport present while connection is live")
            .socket_mut()
    }

    fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }
}

/// The event loop itself. Construct with [`Reactor::new`], register
/// routes via [`Reactor::http_dispatcher_mut`] / [`Reactor::mail_dispatcher_mut`],
/// then call [`Reactor::run`].
pub struct Reactor {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    smtp_listener: Option<TcpListener>,
    imap_listener: Option<TcpListener>,
    connections: Slab<Connection>,
    tokens: HashMap<Token, usize>,
    config: Config,
    tls_config: Option<Arc<rustls::ServerConfig>>,
    http_dispatcher: Dispatcher,
    mail_dispatcher: MailDispatcher,
    sessions: SessionStore,
    cache: FileCache,
    timers: TimerWheel,
    internal: InternalRequester,
    stop: bool,
}

/// Mirrors [`Dispatcher`] but keyed by [`MailMethod`], since SMTP/IMAP
/// verbs don't fit the HTTP method enumeration (design §9).
#[derive(Default)]
pub struct MailDispatcher {
    handlers: HashMap<MailMethod, Box<dyn Fn(&mut Request, &mut ResponseBuilder) -> HandlerResult>>,
}

impl MailDispatcher {
    pub fn new() -> Self {
        MailDispatcher::default()
    }

    pub fn register(
        &mut self,
        method: MailMethod,
        handler: Box<dyn Fn(&mut Request, &mut ResponseBuilder) -> HandlerResult>,
    ) {
        self.handlers.insert(method, handler);
    }

    fn dispatch(&self, method: MailMethod, request: &mut Request, response: &mut ResponseBuilder) -> HandlerResult {
        match self.handlers.get(&method) {
            Some(handler) => handler(request, response),
            None => HandlerResult::Continue,
        }
    }
}

impl Reactor {
    /// Binds the HTTP(S) listener (and the SMTP/IMAP listeners, if
    /// configured) non-blocking, ready for [`Reactor::run`].
    pub fn new(config: Config) -> io::Result<Reactor> {
        let addr: SocketAddr = (std::net::Ipv4Addr::UNSPECIFIED, config.server_port).into();
        let mut listener = TcpListener::bind(addr)?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let smtp_listener = match config.smtp_port {
            Some(port) => {
                let mut l = TcpListener::bind((std::net::Ipv4Addr::UNSPECIFIED, port).into())?;
                poll.registry()
                    .register(&mut l, SMTP_LISTENER_TOKEN, Interest::READABLE)?;
                Some(l)
            }
            None => None,
        };
        let imap_listener = match config.imap_port {
            Some(port) => {
                let mut l = TcpListener::bind((std::net::Ipv4Addr::UNSPECIFIED, port).into())?;
                poll.registry()
                    .register(&mut l, IMAP_LISTENER_TOKEN, Interest::READABLE)?;
                Some(l)
            }
            None => None,
        };

        let tls_config = config.tls.as_ref().map(build_tls_config).transpose()?;

        let max_cache_files = config.max_cache_files;
        let max_cache_filesize = config.max_cache_filesize;
        let cull_old_session_num = config.cull_old_session_num;

        Ok(Reactor {
            poll,
            events: Events::with_capacity(1024),
            listener,
            smtp_listener,
            imap_listener,
            connections: Slab::new(),
            tokens: HashMap::new(),
            config,
            tls_config,
            http_dispatcher: Dispatcher::new(),
            mail_dispatcher: MailDispatcher::new(),
            sessions: SessionStore::new(Duration::from_secs(3600), cull_old_session_num),
            cache: FileCache::new(max_cache_files, max_cache_filesize),
            timers: TimerWheel::new(),
            internal: InternalRequester::new(),
            stop: false,
        })
    }

    pub fn http_dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.http_dispatcher
    }

    pub fn mail_dispatcher_mut(&mut self) -> &mut MailDispatcher {
        &mut self.mail_dispatcher
    }

    pub fn timers_mut(&mut self) -> &mut TimerWheel {
        &mut self.timers
    }

    pub fn sessions_mut(&mut self) -> &mut SessionStore {
        &mut self.sessions
    }

    pub fn cache_mut(&mut self) -> &mut FileCache {
        &mut self.cache
    }

    pub fn internal_requester(&self) -> &InternalRequester {
        &self.internal
    }

    /// The bound address of the HTTP(S) listener, e.g. for tests that bind
    /// to port 0 and need to discover the OS-assigned port.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop until a handler returns `StopServer`/
    /// `RestartServer`. Each iteration: compute the readiness-wait timeout
    /// from the nearest timer deadline, poll, service ready connections,
    /// fire due timers, then cull idle connections (design §4.1).
    pub fn run(&mut self) -> io::Result<()> {
        let start = Instant::now();
        while !self.stop {
            let now = start.elapsed();
            let timeout = self.timers.next_deadline(now);
            self.poll.poll(&mut self.events, timeout)?;

            let ready: Vec<Token> = self.events.iter().map(|e| e.token()).collect();
            for token in ready {
                self.service_token(token)?;
            }

            self.timers.fire_due(start.elapsed());
            self.cull_idle();
        }
        Ok(())
    }

    fn service_token(&mut self, token: Token) -> io::Result<()> {
        match token {
            LISTENER_TOKEN => self.accept_loop(false, false),
            SMTP_LISTENER_TOKEN => self.accept_loop(true, false),
            IMAP_LISTENER_TOKEN => self.accept_loop(true, true),
            _ => {
                if let Some(&key) = self.tokens.get(&token) {
                    self.service_connection(key);
                }
                Ok(())
            }
        }
    }

    fn accept_loop(&mut self, is_mail: bool, is_imap: bool) -> io::Result<()> {
        loop {
            let accepted = if is_mail && is_imap {
                self.imap_listener.as_ref().map(TcpListener::accept)
            } else if is_mail {
                self.smtp_listener.as_ref().map(TcpListener::accept)
            } else {
                Some(self.listener.accept())
            };
            let (mut stream, remote_addr) = match accepted {
                Some(Ok(pair)) => pair,
                Some(Err(ref e)) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            };

            let (protocol, greeting) = if is_mail {
                if is_imap {
                    let session = ImapSession::new();
                    let greeting = session.greeting(&self.config.server_name);
                    (Protocol::Imap(session), Some(greeting))
                } else {
                    let session = SmtpSession::new(self.config.server_name.clone());
                    let greeting = session.greeting();
                    (Protocol::Smtp(session), Some(greeting))
                }
            } else {
                (Protocol::Pending, None)
            };

            let entry = self.connections.vacant_entry();
            let key = entry.key();
            let token = Token(key);
            self.poll
                .registry()
                .register(&mut stream, token, Interest::READABLE)?;
            self.tokens.insert(token, key);

            entry.insert(Connection {
                transport: Some(Transport::Plain(stream)),
                remote_addr,
                inbound: BytesMut::new(),
                outbound: greeting.map(|g| g.into_bytes()).unwrap_or_default(),
                protocol,
                last_activity: Instant::now(),
                pre_bad: false,
                close_after_flush: false,
                is_mail,
                writable_registered: false,
            });
        }
    }

    fn service_connection(&mut self, key: usize) {
        if !self.connections.contains(key) {
            return;
        }
        self.flush_writable(key);
        self.read_readable(key);
        if self.connections.contains(key) {
            self.connections[key].touch(Instant::now());
            self.flush_writable(key);
        }
    }

    /// Pulls raw socket bytes, routing them through the TLS record layer
    /// when the connection has been upgraded, and appends resulting
    /// plaintext to `inbound` for protocol parsing.
    fn read_readable(&mut self, key: usize) {
        loop {
            if !self.connections.contains(key) {
                return;
            }
            if self.connections[key].pre_bad {
                return;
            }
            let max_io_len = self.config.max_io_len;
            let mut raw = vec![0u8; max_io_len];
            let n = match self.connections[key].socket_mut().read(&mut raw) {
                Ok(0) => {
                    self.close_connection(key);
                    return;
                }
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(_) => {
                    self.close_connection(key);
                    return;
                }
            };

            let is_tls = matches!(self.connections[key].transport, Some(Transport::Tls(..)));
            if is_tls {
                if !self.pump_tls_ciphertext(key, &raw[..n]) {
                    return;
                }
            } else {
                let max_request_len = self.config.max_request_len;
                let conn = &mut self.connections[key];
                if conn.inbound.len() + n > max_request_len {
                    conn.outbound
                        .extend_from_slice(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n");
                    conn.pre_bad = true;
                    conn.close_after_flush = true;
                    return;
                }
                conn.inbound.extend_from_slice(&raw[..n]);
            }

            self.process_buffered(key);
        }
    }

    /// Feeds `ciphertext` into the connection's TLS state, draining any
    /// resulting plaintext into `inbound`. Returns `false` if the
    /// connection was torn down (handshake failure).
    fn pump_tls_ciphertext(&mut self, key: usize, ciphertext: &[u8]) -> bool {
        let mut cursor = io::Cursor::new(ciphertext);
        let mut plaintext = Vec::new();
        let mut failed = false;
        {
            let conn = &mut self.connections[key];
            let tls = match &mut conn.transport {
                Some(Transport::Tls(tls, _)) => tls,
                _ => return true,
            };
            if tls.read_tls(&mut cursor).is_err() || tls.process_new_packets().is_err() {
                failed = true;
            } else {
                let mut buf = [0u8; 4096];
                loop {
                    match tls.reader().read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => plaintext.extend_from_slice(&buf[..n]),
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(_) => break,
                    }
                }
            }
        }
        if failed {
            self.close_connection(key);
            return false;
        }
        self.connections[key].inbound.extend_from_slice(&plaintext);
        true
    }

    fn process_buffered(&mut self, key: usize) {
        if self.connections[key].is_mail {
            self.process_mail(key);
            return;
        }
        if matches!(self.connections[key].protocol, Protocol::Pending) {
            self.classify(key);
        }
        if matches!(self.connections[key].protocol, Protocol::TlsHandshake) {
            self.advance_tls_handshake(key);
        }
        match &self.connections[key].protocol {
            Protocol::Http1(_) => self.process_http1(key),
            Protocol::Http2(_) => self.process_http2(key),
            _ => {}
        }
    }

    /// Classifies a newly-connected socket by its first bytes (design
    /// §4.1): h2c preface, a recognized HTTP/1.1 request line, TLS record
    /// header (upgrading the transport), or a bare HTTP/1.1 fallback.
    fn classify(&mut self, key: usize) {
        let raw = self.connections[key].inbound.clone();
        if h2::looks_like_preface(&raw) {
            self.connections[key].protocol = Protocol::Http2(h2::Connection::new());
            return;
        }
        if looks_like_http1_request_line(&raw) {
            self.connections[key].protocol = Protocol::Http1(http1::ParserState::default());
            return;
        }
        if raw.first() == Some(&0x16) {
            if let Some(tls_config) = self.tls_config.clone() {
                self.upgrade_to_tls(key, tls_config);
                return;
            }
        }
        self.connections[key].protocol = Protocol::Http1(http1::ParserState::default());
    }

    fn upgrade_to_tls(&mut self, key: usize, tls_config: Arc<rustls::ServerConfig>) {
        let stream = match self.connections[key].transport.take() {
            Some(Transport::Plain(s)) => s,
            other => {
                self.connections[key].transport = other;
                return;
            }
        };
        match rustls::ServerConnection::new(tls_config) {
            Ok(tls) => {
                let conn = &mut self.connections[key];
                conn.transport = Some(Transport::Tls(Box::new(tls), stream));
                let raw = std::mem::take(&mut conn.inbound);
                self.pump_tls_ciphertext(key, &raw);
                self.connections[key].protocol = Protocol::TlsHandshake;
            }
            Err(_) => {
                self.connections[key].transport = Some(Transport::Plain(stream));
                self.close_connection(key);
            }
        }
    }

    /// Once the rustls handshake completes, picks HTTP/2 or HTTP/1.1 from
    /// the negotiated ALPN protocol (design §4.1's ALPN dispatch).
    fn advance_tls_handshake(&mut self, key: usize) {
        let (handshaking, alpn_is_h2) = match &self.connections[key].transport {
            Some(Transport::Tls(tls, _)) => (tls.is_handshaking(), tls.alpn_protocol() == Some(b"h2".as_ref())),
            _ => return,
        };
        if handshaking {
            return;
        }
        self.connections[key].protocol = if alpn_is_h2 {
            Protocol::Http2(h2::Connection::new())
        } else {
            Protocol::Http1(http1::ParserState::default())
        };
    }

    fn process_http1(&mut self, key: usize) {
        loop {
            let mut state = match &mut self.connections[key].protocol {
                Protocol::Http1(s) => std::mem::take(s),
                _ => return,
            };
            let buf = self.connections[key].inbound.clone();
            let outcome = http1::parse(&buf, &mut state);
            self.connections[key].protocol = Protocol::Http1(state);

            match outcome {
                Ok(http1::Outcome::NeedMore) => return,
                Ok(http1::Outcome::BadRequest) => {
                    let conn = &mut self.connections[key];
                    conn.outbound
                        .extend_from_slice(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n");
                    conn.pre_bad = true;
                    conn.close_after_flush = true;
                    return;
                }
                Ok(http1::Outcome::Complete(req)) => {
                    self.connections[key].inbound.advance(req.consumed);
                    self.dispatch_http1(key, req);
                }
                Err(_) => {
                    self.close_connection(key);
                    return;
                }
            }
        }
    }

    fn dispatch_http1(&mut self, key: usize, parsed: http1::Request) {
        let mut request = Request::new(parsed.path.clone());
        request.context_set("REQUEST_METHOD", parsed.method.clone());
        request.context_set("REQUEST_URI", parsed.path.clone());
        request.context_set("SERVER_PROTOCOL", format!("HTTP/1.{}", parsed.version_minor));
        request.context_set("PHP_SELF", parsed.path.clone());
        request.context_set("QUERY_STRING", parsed.query.clone());
        request.context_set("REMOTE_ADDR", self.connections[key].remote_addr.ip().to_string());
        request.context_set("REMOTE_PORT", self.connections[key].remote_addr.port().to_string());
        request.context_set("SERVER_NAME", self.config.server_name.clone());
        request.context_set("SERVER_PORT", self.config.server_port.to_string());
        for (k, v) in &parsed.headers {
            request.context.insert(k.clone(), v.clone().into());
        }
        request.body = parsed.body;
        request.parse_query_string();

        let method = method_from_str(&parsed.method);

        let mut response = ResponseBuilder::new();
        let result = self.http_dispatcher.dispatch(method, &mut request, &mut response);
        let wire = response.finish();
        let conn = &mut self.connections[key];
        conn.outbound.extend_from_slice(&wire);
        if !keep_alive_requested(&parsed) {
            conn.close_after_flush = true;
        }
        self.apply_handler_result(key, result);
    }

    fn process_http2(&mut self, key: usize) {
        let mut conn_state = match std::mem::replace(&mut self.connections[key].protocol, Protocol::Pending) {
            Protocol::Http2(c) => c,
            other => {
                self.connections[key].protocol = other;
                return;
            }
        };
        let mut out = Vec::new();
        let feed_result = {
            let conn = &mut self.connections[key];
            conn_state.feed(&mut conn.inbound, &mut out)
        };
        self.connections[key].outbound.extend_from_slice(&out);
        self.connections[key].protocol = Protocol::Http2(conn_state);

        let events = match feed_result {
            Ok(events) => events,
            Err(e) => {
                let reason = e
                    .h2_reason()
                    .unwrap_or(crate::h2::frame::Reason::PROTOCOL_ERROR);
                let mut out = Vec::new();
                if let Protocol::Http2(c) = &mut self.connections[key].protocol {
                    c.send_goaway(reason, &mut out);
                }
                self.connections[key].outbound.extend_from_slice(&out);
                self.connections[key].close_after_flush = true;
                return;
            }
        };

        for event in events {
            if let h2::Event::Headers { stream_id, headers, end_stream } = event {
                if end_stream {
                    self.dispatch_http2(key, stream_id, headers);
                }
            }
        }
    }

    fn dispatch_http2(&mut self, key: usize, stream_id: u32, headers: Vec<(String, String)>) {
        let mut path = "/".to_string();
        let mut authority = String::new();
        let mut method_name = "GET".to_string();
        let mut request = Request::new("/");
        for (name, value) in &headers {
            match name.as_str() {
                ":path" => path = value.clone(),
                ":authority" => authority = value.clone(),
                ":method" => method_name = value.clone(),
                ":scheme" => {}
                _ => {
                    request.context.insert(
                        format!("HTTP_{}", name.to_uppercase().replace('-', "_")),
                        value.clone().into(),
                    );
                }
            }
        }
        let (path_only, query) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (path.clone(), String::new()),
        };
        request.path = path_only.clone();
        request.context_set("REQUEST_METHOD", method_name.clone());
        request.context_set("REQUEST_URI", path.clone());
        request.context_set("PHP_SELF", path_only);
        request.context_set("QUERY_STRING", query);
        request.context_set("SERVER_PROTOCOL", "HTTP/2");
        request.context_set("HTTP_HOST", authority);
        request.parse_query_string();

        let method = method_from_str(&method_name);

        let mut response = ResponseBuilder::new();
        let result = self.http_dispatcher.dispatch(method, &mut request, &mut response);
        let (status, resp_headers, body) = response.into_parts();

        let mut out = Vec::new();
        if let Protocol::Http2(c) = &mut self.connections[key].protocol {
            c.send_response_headers(stream_id, status, &resp_headers, body.is_empty(), &mut out);
            if !body.is_empty() {
                c.send_data(stream_id, &body, true, &mut out);
            }
        }
        self.connections[key].outbound.extend_from_slice(&out);
        self.apply_handler_result(key, result);
    }

    fn process_mail(&mut self, key: usize) {
        loop {
            let line = find_crlf_line(&self.connections[key].inbound);
            let (line, consumed) = match line {
                Some(pair) => pair,
                None => return,
            };

            let outcome = match &mut self.connections[key].protocol {
                Protocol::Smtp(session) => session.handle_line(&line).map(MailEither::Smtp),
                Protocol::Imap(session) => session.handle_line(&line).map(MailEither::Imap),
                _ => return,
            };
            self.connections[key].inbound.advance(consumed);

            match outcome {
                Ok(MailEither::Smtp(MailOutcome::Reply(reply)))
                | Ok(MailEither::Imap(MailOutcome::Reply(reply))) => {
                    self.connections[key].outbound.extend_from_slice(reply.as_bytes());
                }
                Ok(MailEither::Smtp(MailOutcome::BodyComplete { body, reply }))
                | Ok(MailEither::Imap(MailOutcome::BodyComplete { body, reply })) => {
                    let mut request = Request::new("/");
                    request.body = body;
                    let mut response = ResponseBuilder::new();
                    self.mail_dispatcher
                        .dispatch(MailMethod::Request, &mut request, &mut response);
                    self.connections[key].outbound.extend_from_slice(reply.as_bytes());
                }
                Ok(MailEither::Smtp(MailOutcome::Closed)) | Ok(MailEither::Imap(MailOutcome::Closed)) => {
                    self.connections[key].close_after_flush = true;
                }
                Ok(MailEither::Smtp(MailOutcome::NeedMore)) | Ok(MailEither::Imap(MailOutcome::NeedMore)) => {}
                Err(_) => {
                    self.connections[key]
                        .outbound
                        .extend_from_slice(b"500 Bad command\r\n");
                }
            }
        }
    }

    fn apply_handler_result(&mut self, key: usize, result: HandlerResult) {
        match result {
            HandlerResult::Continue => {}
            HandlerResult::StopServer | HandlerResult::RestartServer(_) => {
                self.connections[key].close_after_flush = true;
                self.stop = true;
            }
        }
    }

    fn flush_writable(&mut self, key: usize) {
        if !self.connections.contains(key) {
            return;
        }
        loop {
            let conn = &mut self.connections[key];
            if conn.outbound.is_empty() {
                if conn.close_after_flush {
                    self.close_connection(key);
                } else {
                    self.deregister_writable(key);
                }
                return;
            }
            let transport = conn
                .transport
                .as_mut()
                .expect("transport present while connection is live");
            let write_result = transport.socket_mut().write(&conn.outbound);
            match write_result {
                Ok(0) => {
                    self.close_connection(key);
                    return;
                }
                Ok(n) => {
                    conn.outbound.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.register_writable(key);
                    return;
                }
                Err(_) => {
                    self.close_connection(key);
                    return;
                }
            }
        }
    }

    /// Re-arms the connection for writability after a partial write
    /// (design §4.1 "Write cycle... re-arm for writability").
    fn register_writable(&mut self, key: usize) {
        if self.connections[key].writable_registered {
            return;
        }
        let conn = &mut self.connections[key];
        let _ = self
            .poll
            .registry()
            .reregister(conn.socket_mut(), Token(key), Interest::READABLE | Interest::WRITABLE);
        conn.writable_registered = true;
    }

    fn deregister_writable(&mut self, key: usize) {
        if !self.connections[key].writable_registered {
            return;
        }
        let conn = &mut self.connections[key];
        let _ = self
            .poll
            .registry()
            .reregister(conn.socket_mut(), Token(key), Interest::READABLE);
        conn.writable_registered = false;
    }

    fn close_connection(&mut self, key: usize) {
        if !self.connections.contains(key) {
            return;
        }
        let mut conn = self.connections.remove(key);
        let _ = self.poll.registry().deregister(conn.socket_mut());
        self.tokens.retain(|_, v| *v != key);
    }

    /// Drops any connection whose last activity is older than
    /// `CONNECTION_TIMEOUT` (design §4.1 "Idle culling").
    fn cull_idle(&mut self) {
        let timeout = self.config.connection_timeout;
        let now = Instant::now();
        let stale: Vec<usize> = self
            .connections
            .iter()
            .filter(|(_, c)| now.duration_since(c.last_activity) > timeout)
            .map(|(key, _)| key)
            .collect();
        for key in stale {
            warn!(key, "culling idle connection");
            self.close_connection(key);
        }
    }
}

enum MailEither {
    Smtp(MailOutcome),
    Imap(MailOutcome),
}

fn method_from_str(name: &str) -> Method {
    match name {
        "GET" => Method::Get,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "DELETE" => Method::Delete,
        "HEAD" => Method::Head,
        "OPTIONS" => Method::Options,
        "TRACE" => Method::Trace,
        "CONNECT" => Method::Connect,
        _ => Method::Error,
    }
}

/// HTTP/1.1 defaults to keep-alive, HTTP/1.0 to close; an explicit
/// `Connection` header overrides either default.
fn keep_alive_requested(parsed: &http1::Request) -> bool {
    match parsed.headers.get("HTTP_CONNECTION").map(|v| v.to_ascii_lowercase()) {
        Some(v) if v == "close" => false,
        Some(v) if v == "keep-alive" => true,
        _ => parsed.version_minor != 0,
    }
}

fn looks_like_http1_request_line(buf: &[u8]) -> bool {
    let line_end = match buf.iter().position(|&b| b == b'\n') {
        Some(i) => i,
        None => buf.len().min(32),
    };
    let line = String::from_utf8_lossy(&buf[..line_end]);
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("");
    RECOGNIZED_METHODS.contains(&method)
}

fn find_crlf_line(buf: &BytesMut) -> Option<(String, usize)> {
    let lf = buf.iter().position(|&b| b == b'\n')?;
    let end = if lf > 0 && buf[lf - 1] == b'\r' { lf - 1 } else { lf };
    let line = String::from_utf8_lossy(&buf[..end]).to_string();
    Some((line, lf + 1))
}

fn build_tls_config(tls: &crate::config::TlsConfig) -> io::Result<Arc<rustls::ServerConfig>> {
    use rustls_pki_types::{CertificateDer, PrivateKeyDer};

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &tls.cert_chain[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &tls.private_key[..])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found"))?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    config.alpn_protocols = tls.alpn.clone();
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_crlf_line_strips_terminator() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"EHLO x\r\nrest");
        let (line, consumed) = find_crlf_line(&buf).unwrap();
        assert_eq!(line, "EHLO x");
        assert_eq!(consumed, 8);
    }

    #[test]
    fn find_crlf_line_none_without_newline() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"partial");
        assert!(find_crlf_line(&buf).is_none());
    }

    #[test]
    fn classifies_recognized_method() {
        assert!(looks_like_http1_request_line(b"GET / HTTP/1.1\r\n"));
        assert!(!looks_like_http1_request_line(&[0x16, 0x03, 0x01, 0x00, 0x05]));
    }
}
