//! HTTP/2 connection driver: preface handshake, frame dispatch, stream
//! table, and flow control — everything between raw bytes and a completed
//! request handed to the route dispatcher (C6).

pub mod frame;
mod stream;

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::hpack;
use crate::trace::{debug, trace};

use frame::{
    Frame, Head, Kind, Reason, StreamId, DEFAULT_HEADER_TABLE_SIZE, DEFAULT_INITIAL_WINDOW_SIZE,
    HEADER_LEN,
};
pub use stream::{Stream, StreamState};

/// The 24-byte magic that identifies an h2c prior-knowledge connection,
/// per RFC 7540 §3.5.
pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub fn looks_like_preface(buf: &[u8]) -> bool {
    buf.len() >= PREFACE.len() && &buf[..PREFACE.len()] == &PREFACE[..]
}

/// A fact the connection driver surfaces to the reactor: a completed
/// request header block, a chunk of body data, or a control event.
#[derive(Debug)]
pub enum Event {
    Headers {
        stream_id: StreamId,
        headers: Vec<(String, String)>,
        end_stream: bool,
    },
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    StreamReset {
        stream_id: StreamId,
        reason: Reason,
    },
    GoAway {
        last_stream_id: StreamId,
        reason: Reason,
    },
}

#[derive(Debug)]
struct PeerSettings {
    header_table_size: usize,
    initial_window_size: u32,
    max_frame_size: u32,
}

impl Default for PeerSettings {
    fn default() -> Self {
        PeerSettings {
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Owns one HTTP/2 connection's protocol state: the stream table, both
/// HPACK directions, and flow-control windows. The reactor feeds it raw
/// bytes and drains the `out` buffer it appends wire bytes to.
#[derive(Debug)]
pub struct Connection {
    preface_seen: bool,
    streams: HashMap<StreamId, Stream>,
    highest_client_stream: StreamId,
    hpack_enc: hpack::Encoder,
    hpack_dec: hpack::Decoder,
    peer_settings: PeerSettings,
    conn_send_window: i64,
    conn_recv_window: i64,
    pub goaway_sent: bool,
    /// Set to the stream whose HEADERS arrived with `end_headers=false`;
    /// per RFC 7540 §4.3, until the matching CONTINUATION(s) complete the
    /// header block, no other frame may legally arrive on the connection.
    expecting_continuation: Option<StreamId>,
}

impl Connection {
    pub fn new() -> Connection {
        Connection {
            preface_seen: false,
            streams: HashMap::new(),
            highest_client_stream: 0,
            hpack_enc: hpack::Encoder::new(DEFAULT_HEADER_TABLE_SIZE),
            hpack_dec: hpack::Decoder::new(DEFAULT_HEADER_TABLE_SIZE),
            peer_settings: PeerSettings::default(),
            conn_send_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            conn_recv_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            goaway_sent: false,
            expecting_continuation: None,
        }
    }

    /// Consumes every complete frame (and the preface, if not yet seen)
    /// from the front of `input`, appending any wire-level reply (SETTINGS
    /// ACK, PING ACK, our own initial SETTINGS) to `out` and returning the
    /// application-visible events produced.
    pub fn feed(&mut self, input: &mut BytesMut, out: &mut Vec<u8>) -> Result<Vec<Event>> {
        let mut events = Vec::new();

        if !self.preface_seen {
            if input.len() < PREFACE.len() {
                return Ok(events);
            }
            if &input[..PREFACE.len()] != &PREFACE[..] {
                return Err(Error::new_http2(Reason::PROTOCOL_ERROR));
            }
            input.advance(PREFACE.len());
            self.preface_seen = true;
            self.send_settings(out);
        }

        loop {
            let head = match frame::peek_head(input) {
                Some(head) => head,
                None => break,
            };
            let total = HEADER_LEN + head.length;
            if input.len() < total {
                break;
            }
            let bytes = input.split_to(total);
            let payload = bytes.slice(HEADER_LEN..);
            let frame = Frame::load(head, &payload).map_err(|_| Error::new_http2(Reason::PROTOCOL_ERROR))?;
            trace!(?frame, "h2 frame received");
            self.handle_frame(frame, out, &mut events)?;
        }

        Ok(events)
    }

    fn send_settings(&self, out: &mut Vec<u8>) {
        let settings = frame::Settings::default();
        Frame::Settings(settings).encode(out);
    }

    fn handle_frame(&mut self, frame: Frame, out: &mut Vec<u8>, events: &mut Vec<Event>) -> Result<()> {
        if let Some(expected) = self.expecting_continuation {
            let is_matching_continuation =
                matches!(&frame, Frame::Continuation(c) if c.stream_id == expected);
            if !is_matching_continuation {
                return Err(Error::new_http2(Reason::PROTOCOL_ERROR));
            }
        }
        match frame {
            Frame::Settings(s) => {
                if !s.ack {
                    for (id, value) in &s.params {
                        match id {
                            frame::SettingId::InitialWindowSize => {
                                self.peer_settings.initial_window_size = *value
                            }
                            frame::SettingId::HeaderTableSize => {
                                self.peer_settings.header_table_size = *value as usize;
                                self.hpack_enc.set_max_dynamic_size(*value as usize);
                            }
                            frame::SettingId::MaxFrameSize => self.peer_settings.max_frame_size = *value,
                            _ => {}
                        }
                    }
                    Frame::Settings(frame::Settings::ack()).encode(out);
                }
                Ok(())
            }
            Frame::Ping(p) => {
                if !p.ack {
                    Frame::Ping(frame::Ping {
                        ack: true,
                        payload: p.payload,
                    })
                    .encode(out);
                }
                Ok(())
            }
            Frame::WindowUpdate(w) => {
                if w.stream_id == 0 {
                    self.conn_send_window += w.increment as i64;
                } else if let Some(stream) = self.streams.get_mut(&w.stream_id) {
                    stream.send_window += w.increment as i64;
                }
                Ok(())
            }
            Frame::Priority(p) => {
                let stream = self.streams.entry(p.stream_id).or_insert_with(|| Stream::new(p.stream_id));
                stream.dependency = p.dependency;
                Ok(())
            }
            Frame::RstStream(r) => {
                if let Some(stream) = self.streams.get_mut(&r.stream_id) {
                    stream.reset();
                }
                events.push(Event::StreamReset {
                    stream_id: r.stream_id,
                    reason: r.error_code,
                });
                Ok(())
            }
            Frame::GoAway(g) => {
                events.push(Event::GoAway {
                    last_stream_id: g.last_stream_id,
                    reason: g.error_code,
                });
                Ok(())
            }
            Frame::Headers(h) => {
                if h.stream_id <= self.highest_client_stream && !self.streams.contains_key(&h.stream_id) {
                    return Err(Error::new_http2(Reason::PROTOCOL_ERROR));
                }
                self.highest_client_stream = self.highest_client_stream.max(h.stream_id);
                let stream = self
                    .streams
                    .entry(h.stream_id)
                    .or_insert_with(|| Stream::new(h.stream_id));
                stream.open();
                if let Some(dep) = h.priority {
                    stream.dependency = dep;
                }
                stream.header_fragments.extend_from_slice(&h.header_block);
                if h.end_headers {
                    let headers = self.decode_headers(h.stream_id)?;
                    let stream = self.streams.get_mut(&h.stream_id).unwrap();
                    if h.end_stream {
                        stream.recv_end_stream();
                    }
                    events.push(Event::Headers {
                        stream_id: h.stream_id,
                        headers,
                        end_stream: h.end_stream,
                    });
                } else {
                    let stream = self.streams.get_mut(&h.stream_id).unwrap();
                    stream.headers_in_progress = true;
                    self.expecting_continuation = Some(h.stream_id);
                }
                Ok(())
            }
            Frame::Continuation(c) => {
                let stream = self
                    .streams
                    .get_mut(&c.stream_id)
                    .ok_or(Error::new_http2(Reason::PROTOCOL_ERROR))?;
                if !stream.headers_in_progress {
                    return Err(Error::new_http2(Reason::PROTOCOL_ERROR));
                }
                stream.header_fragments.extend_from_slice(&c.header_block);
                if c.end_headers {
                    self.expecting_continuation = None;
                    let headers = self.decode_headers(c.stream_id)?;
                    let stream = self.streams.get_mut(&c.stream_id).unwrap();
                    stream.headers_in_progress = false;
                    let end_stream = stream.state == StreamState::HalfClosedRemote;
                    events.push(Event::Headers {
                        stream_id: c.stream_id,
                        headers,
                        end_stream,
                    });
                }
                Ok(())
            }
            Frame::Data(d) => {
                self.conn_recv_window -= d.data.len() as i64;
                if let Some(stream) = self.streams.get_mut(&d.stream_id) {
                    stream.recv_window -= d.data.len() as i64;
                    if d.end_stream {
                        stream.recv_end_stream();
                    }
                }
                self.grant_window_credit(d.stream_id, d.data.len(), out);
                events.push(Event::Data {
                    stream_id: d.stream_id,
                    data: d.data,
                    end_stream: d.end_stream,
                });
                Ok(())
            }
            Frame::PushPromise(_) => Err(Error::new_http2(Reason::PROTOCOL_ERROR)),
        }
    }

    fn decode_headers(&mut self, stream_id: StreamId) -> Result<Vec<(String, String)>> {
        let stream = self.streams.get_mut(&stream_id).unwrap();
        let block = stream.take_header_block();
        self.hpack_dec
            .decode(&block)
            .map_err(|_| Error::new_http2(Reason::COMPRESSION_ERROR))
    }

    /// Replenishes flow-control credit so a request/response exchange
    /// never stalls (design §4.3: "requires the receiver to emit
    /// WINDOW_UPDATE such that no stalling occurs under normal request
    /// flow").
    fn grant_window_credit(&mut self, stream_id: StreamId, consumed: usize, out: &mut Vec<u8>) {
        if consumed == 0 {
            return;
        }
        Frame::WindowUpdate(frame::WindowUpdate {
            stream_id: 0,
            increment: consumed as u32,
        })
        .encode(out);
        Frame::WindowUpdate(frame::WindowUpdate {
            stream_id,
            increment: consumed as u32,
        })
        .encode(out);
        self.conn_recv_window += consumed as i64;
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.recv_window += consumed as i64;
        }
    }

    /// Encodes and queues a response HEADERS frame carrying `:status` plus
    /// the handler's headers.
    pub fn send_response_headers(
        &mut self,
        stream_id: StreamId,
        status: u16,
        headers: &[(String, String)],
        end_stream: bool,
        out: &mut Vec<u8>,
    ) {
        let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(headers.len() + 1);
        let status_value = itoa_status(status);
        pairs.push((":status", &status_value));
        for (name, value) in headers {
            pairs.push((name.as_str(), value.as_str()));
        }
        let block = self.hpack_enc.encode(pairs);
        let frame = Frame::Headers(frame::Headers {
            stream_id,
            header_block: Bytes::from(block),
            pad_len: 0,
            end_stream,
            end_headers: true,
            priority: None,
        });
        frame.encode(out);
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            if end_stream {
                stream.send_end_stream();
            }
        }
        debug!(stream_id, status, "h2 response headers sent");
    }

    /// Encodes and queues one DATA frame, splitting at `max_frame_size`
    /// if needed.
    pub fn send_data(&mut self, stream_id: StreamId, data: &[u8], end_stream: bool, out: &mut Vec<u8>) {
        let max = self.peer_settings.max_frame_size as usize;
        if data.is_empty() {
            Frame::Data(frame::Data {
                stream_id,
                data: Bytes::new(),
                pad_len: 0,
                end_stream,
            })
            .encode(out);
        } else {
            let mut offset = 0;
            while offset < data.len() {
                let end = (offset + max).min(data.len());
                let is_last = end == data.len();
                Frame::Data(frame::Data {
                    stream_id,
                    data: Bytes::copy_from_slice(&data[offset..end]),
                    pad_len: 0,
                    end_stream: end_stream && is_last,
                })
                .encode(out);
                offset = end;
            }
        }
        if end_stream {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.send_end_stream();
            }
        }
    }

    pub fn send_rst_stream(&mut self, stream_id: StreamId, reason: Reason, out: &mut Vec<u8>) {
        Frame::RstStream(frame::RstStream {
            stream_id,
            error_code: reason,
        })
        .encode(out);
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.reset();
        }
    }

    pub fn send_goaway(&mut self, reason: Reason, out: &mut Vec<u8>) {
        if self.goaway_sent {
            return;
        }
        Frame::GoAway(frame::GoAway {
            last_stream_id: self.highest_client_stream,
            error_code: reason,
            debug_data: Bytes::new(),
        })
        .encode(out);
        self.goaway_sent = true;
    }

    pub fn stream_is_closed(&self, stream_id: StreamId) -> bool {
        self.streams
            .get(&stream_id)
            .map(Stream::is_closed)
            .unwrap_or(true)
    }
}

impl Default for Connection {
    fn default() -> Self {
        Connection::new()
    }
}

fn itoa_status(status: u16) -> String {
    let mut buf = itoa::Buffer::new();
    buf.format(status).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_frame(payload: &[u8]) -> Vec<u8> {
        let head = Head::new(Kind::Settings, 0, 0);
        let mut out = Vec::new();
        head.encode(payload.len(), &mut out);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn h2c_handshake_and_request_roundtrip() {
        let mut conn = Connection::new();
        let mut input = BytesMut::new();
        input.extend_from_slice(PREFACE);
        input.extend_from_slice(&settings_frame(&[]));

        let mut window_update = Vec::new();
        Frame::WindowUpdate(frame::WindowUpdate {
            stream_id: 0,
            increment: 65535,
        })
        .encode(&mut window_update);
        input.extend_from_slice(&window_update);

        let mut out = Vec::new();
        let events = conn.feed(&mut input, &mut out).unwrap();
        assert!(events.is_empty());
        // Our initial SETTINGS plus the ACK of the client's SETTINGS.
        assert!(out.len() >= HEADER_LEN * 2);

        let mut hpack_enc = hpack::Encoder::new(4096);
        let block = hpack_enc.encode([
            (":method", "GET"),
            (":scheme", "http"),
            (":authority", "x"),
            (":path", "/"),
        ]);
        let mut raw = Vec::new();
        Frame::Headers(frame::Headers {
            stream_id: 1,
            header_block: Bytes::from(block),
            pad_len: 0,
            end_stream: true,
            end_headers: true,
            priority: None,
        })
        .encode(&mut raw);
        let mut fresh_input = BytesMut::from(&raw[..]);
        let mut out2 = Vec::new();
        let events2 = conn.feed(&mut fresh_input, &mut out2).unwrap();
        assert_eq!(events2.len(), 1);
        match &events2[0] {
            Event::Headers { stream_id, end_stream, .. } => {
                assert_eq!(*stream_id, 1);
                assert!(*end_stream);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
