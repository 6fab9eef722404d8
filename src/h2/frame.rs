//! RFC 7540 §4 binary framing: the nine-octet header plus the ten typed
//! payloads, collapsed to one tagged union per the design's redesign note
//! (inheritance + mixin roles become embedded substructures).

use bytes::{BufMut, Bytes};

use crate::wire::{read_u24, write_u24};

/// Every frame header is exactly this many octets.
pub const HEADER_LEN: usize = 9;

/// Stream identifiers are 31-bit; the reserved high bit is always masked
/// off on read and left clear on write.
pub type StreamId = u32;

const STREAM_ID_MASK: u32 = 1 << 31;

pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_MAX_FRAME_SIZE: u32 = (1 << 24) - 1;
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;
pub const DEFAULT_HEADER_TABLE_SIZE: usize = 4_096;

/// The 4-octet error code carried by RST_STREAM and GOAWAY, and attached
/// to [`crate::error::Error`] so the reactor knows what to send the peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(non_camel_case_types)]
pub enum Reason {
    NO_ERROR,
    PROTOCOL_ERROR,
    INTERNAL_ERROR,
    FLOW_CONTROL_ERROR,
    SETTINGS_TIMEOUT,
    STREAM_CLOSED,
    FRAME_SIZE_ERROR,
    REFUSED_STREAM,
    CANCEL,
    COMPRESSION_ERROR,
    CONNECT_ERROR,
    ENHANCE_YOUR_CALM,
    INADEQUATE_SECURITY,
    HTTP_1_1_REQUIRED,
    Other(u32),
}

impl Reason {
    pub fn into_u32(self) -> u32 {
        match self {
            Reason::NO_ERROR => 0x0,
            Reason::PROTOCOL_ERROR => 0x1,
            Reason::INTERNAL_ERROR => 0x2,
            Reason::FLOW_CONTROL_ERROR => 0x3,
            Reason::SETTINGS_TIMEOUT => 0x4,
            Reason::STREAM_CLOSED => 0x5,
            Reason::FRAME_SIZE_ERROR => 0x6,
            Reason::REFUSED_STREAM => 0x7,
            Reason::CANCEL => 0x8,
            Reason::COMPRESSION_ERROR => 0x9,
            Reason::CONNECT_ERROR => 0xa,
            Reason::ENHANCE_YOUR_CALM => 0xb,
            Reason::INADEQUATE_SECURITY => 0xc,
            Reason::HTTP_1_1_REQUIRED => 0xd,
            Reason::Other(code) => code,
        }
    }

    pub fn from_u32(code: u32) -> Reason {
        match code {
            0x0 => Reason::NO_ERROR,
            0x1 => Reason::PROTOCOL_ERROR,
            0x2 => Reason::INTERNAL_ERROR,
            0x3 => Reason::FLOW_CONTROL_ERROR,
            0x4 => Reason::SETTINGS_TIMEOUT,
            0x5 => Reason::STREAM_CLOSED,
            0x6 => Reason::FRAME_SIZE_ERROR,
            0x7 => Reason::REFUSED_STREAM,
            0x8 => Reason::CANCEL,
            0x9 => Reason::COMPRESSION_ERROR,
            0xa => Reason::CONNECT_ERROR,
            0xb => Reason::ENHANCE_YOUR_CALM,
            0xc => Reason::INADEQUATE_SECURITY,
            0xd => Reason::HTTP_1_1_REQUIRED,
            other => Reason::Other(other),
        }
    }
}

/// Frame parse/validity failure. Connection-level errors (`Unspecified`
/// with no stream) turn into GOAWAY; stream-scoped ones turn into
/// RST_STREAM.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    InvalidStreamId,
    InvalidPayloadLength,
    BadFrameKind(u8),
    Malformed,
    TooLarge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl Kind {
    fn from_u8(byte: u8) -> Kind {
        match byte {
            0x0 => Kind::Data,
            0x1 => Kind::Headers,
            0x2 => Kind::Priority,
            0x3 => Kind::RstStream,
            0x4 => Kind::Settings,
            0x5 => Kind::PushPromise,
            0x6 => Kind::Ping,
            0x7 => Kind::GoAway,
            0x8 => Kind::WindowUpdate,
            0x9 => Kind::Continuation,
            other => Kind::Unknown(other),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Kind::Data => 0x0,
            Kind::Headers => 0x1,
            Kind::Priority => 0x2,
            Kind::RstStream => 0x3,
            Kind::Settings => 0x4,
            Kind::PushPromise => 0x5,
            Kind::Ping => 0x6,
            Kind::GoAway => 0x7,
            Kind::WindowUpdate => 0x8,
            Kind::Continuation => 0x9,
            Kind::Unknown(b) => b,
        }
    }
}

pub mod flag {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// The decoded 9-octet frame header.
#[derive(Clone, Copy, Debug)]
pub struct Head {
    pub length: usize,
    pub kind: Kind,
    pub flags: u8,
    pub stream_id: StreamId,
}

impl Head {
    pub fn new(kind: Kind, flags: u8, stream_id: StreamId) -> Head {
        Head {
            length: 0,
            kind,
            flags,
            stream_id,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Head, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Malformed);
        }
        let length = read_u24(bytes) as usize;
        let kind = Kind::from_u8(bytes[3]);
        let flags = bytes[4];
        let stream_id = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & !STREAM_ID_MASK;
        Ok(Head {
            length,
            kind,
            flags,
            stream_id,
        })
    }

    pub fn encode(&self, payload_len: usize, dst: &mut Vec<u8>) {
        debug_assert!(payload_len <= MAX_MAX_FRAME_SIZE as usize);
        write_u24(payload_len as u32, dst);
        dst.put_u8(self.kind.as_u8());
        dst.put_u8(self.flags);
        dst.put_u32(self.stream_id & !STREAM_ID_MASK);
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags & flag::END_STREAM != 0
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags & flag::END_HEADERS != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flag::ACK != 0
    }

    pub fn is_padded(&self) -> bool {
        self.flags & flag::PADDED != 0
    }

    pub fn has_priority(&self) -> bool {
        self.flags & flag::PRIORITY != 0
    }
}

/// Dependency/weight/exclusive triple shared by HEADERS (when PRIORITY is
/// set) and the standalone PRIORITY frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StreamDependency {
    pub dependency_id: StreamId,
    pub weight: u8,
    pub is_exclusive: bool,
}

impl StreamDependency {
    fn load(bytes: &[u8]) -> Result<StreamDependency, Error> {
        if bytes.len() < 5 {
            return Err(Error::Malformed);
        }
        let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(StreamDependency {
            dependency_id: raw & !STREAM_ID_MASK,
            weight: bytes[4],
            is_exclusive: raw & STREAM_ID_MASK != 0,
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let mut raw = self.dependency_id & !STREAM_ID_MASK;
        if self.is_exclusive {
            raw |= STREAM_ID_MASK;
        }
        dst.put_u32(raw);
        dst.put_u8(self.weight);
    }
}

fn strip_padding(is_padded: bool, payload: &[u8]) -> Result<(&[u8], u8), Error> {
    if !is_padded {
        return Ok((payload, 0));
    }
    let pad_len = *payload.first().ok_or(Error::Malformed)? as usize;
    let body = &payload[1..];
    if pad_len > body.len() {
        return Err(Error::Malformed);
    }
    Ok((&body[..body.len() - pad_len], pad_len as u8))
}

#[derive(Clone, Debug)]
pub struct Data {
    pub stream_id: StreamId,
    pub data: Bytes,
    pub pad_len: u8,
    pub end_stream: bool,
}

impl Data {
    fn load(head: &Head, payload: &[u8]) -> Result<Data, Error> {
        if head.stream_id == 0 {
            return Err(Error::InvalidStreamId);
        }
        let (body, pad_len) = strip_padding(head.is_padded(), payload)?;
        Ok(Data {
            stream_id: head.stream_id,
            data: Bytes::copy_from_slice(body),
            pad_len,
            end_stream: head.is_end_stream(),
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let flags = if self.end_stream { flag::END_STREAM } else { 0 };
        let head = Head::new(Kind::Data, flags, self.stream_id);
        head.encode(self.data.len(), dst);
        dst.extend_from_slice(&self.data);
    }
}

#[derive(Clone, Debug)]
pub struct Headers {
    pub stream_id: StreamId,
    pub header_block: Bytes,
    pub pad_len: u8,
    pub end_stream: bool,
    pub end_headers: bool,
    pub priority: Option<StreamDependency>,
}

impl Headers {
    fn load(head: &Head, payload: &[u8]) -> Result<Headers, Error> {
        if head.stream_id == 0 {
            return Err(Error::InvalidStreamId);
        }
        let (mut body, pad_len) = strip_padding(head.is_padded(), payload)?;
        let priority = if head.has_priority() {
            let dep = StreamDependency::load(body)?;
            body = &body[5..];
            Some(dep)
        } else {
            None
        };
        Ok(Headers {
            stream_id: head.stream_id,
            header_block: Bytes::copy_from_slice(body),
            pad_len,
            end_stream: head.is_end_stream(),
            end_headers: head.is_end_headers(),
            priority,
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let mut flags = 0;
        if self.end_stream {
            flags |= flag::END_STREAM;
        }
        if self.end_headers {
            flags |= flag::END_HEADERS;
        }
        if self.priority.is_some() {
            flags |= flag::PRIORITY;
        }
        let head = Head::new(Kind::Headers, flags, self.stream_id);
        let len = self.header_block.len() + if self.priority.is_some() { 5 } else { 0 };
        head.encode(len, dst);
        if let Some(dep) = &self.priority {
            dep.encode(dst);
        }
        dst.extend_from_slice(&self.header_block);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Priority {
    pub stream_id: StreamId,
    pub dependency: StreamDependency,
}

impl Priority {
    fn load(head: &Head, payload: &[u8]) -> Result<Priority, Error> {
        if head.stream_id == 0 {
            return Err(Error::InvalidStreamId);
        }
        Ok(Priority {
            stream_id: head.stream_id,
            dependency: StreamDependency::load(payload)?,
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let head = Head::new(Kind::Priority, 0, self.stream_id);
        head.encode(5, dst);
        self.dependency.encode(dst);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RstStream {
    pub stream_id: StreamId,
    pub error_code: Reason,
}

impl RstStream {
    fn load(head: &Head, payload: &[u8]) -> Result<RstStream, Error> {
        if head.stream_id == 0 {
            return Err(Error::InvalidStreamId);
        }
        if payload.len() != 4 {
            return Err(Error::InvalidPayloadLength);
        }
        let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Ok(RstStream {
            stream_id: head.stream_id,
            error_code: Reason::from_u32(code),
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let head = Head::new(Kind::RstStream, 0, self.stream_id);
        head.encode(4, dst);
        dst.put_u32(self.error_code.into_u32());
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SettingId {
    HeaderTableSize,
    EnablePush,
    MaxConcurrentStreams,
    InitialWindowSize,
    MaxFrameSize,
    MaxHeaderListSize,
    Unknown(u16),
}

impl SettingId {
    fn from_u16(v: u16) -> SettingId {
        match v {
            0x1 => SettingId::HeaderTableSize,
            0x2 => SettingId::EnablePush,
            0x3 => SettingId::MaxConcurrentStreams,
            0x4 => SettingId::InitialWindowSize,
            0x5 => SettingId::MaxFrameSize,
            0x6 => SettingId::MaxHeaderListSize,
            other => SettingId::Unknown(other),
        }
    }

    fn as_u16(self) -> u16 {
        match self {
            SettingId::HeaderTableSize => 0x1,
            SettingId::EnablePush => 0x2,
            SettingId::MaxConcurrentStreams => 0x3,
            SettingId::InitialWindowSize => 0x4,
            SettingId::MaxFrameSize => 0x5,
            SettingId::MaxHeaderListSize => 0x6,
            SettingId::Unknown(v) => v,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub ack: bool,
    pub params: Vec<(SettingId, u32)>,
}

impl Settings {
    pub fn ack() -> Settings {
        Settings {
            ack: true,
            params: Vec::new(),
        }
    }

    fn load(head: &Head, payload: &[u8]) -> Result<Settings, Error> {
        if head.stream_id != 0 {
            return Err(Error::InvalidStreamId);
        }
        if head.is_ack() {
            if !payload.is_empty() {
                return Err(Error::InvalidPayloadLength);
            }
            return Ok(Settings::ack());
        }
        if payload.len() % 6 != 0 {
            return Err(Error::InvalidPayloadLength);
        }
        let mut params = Vec::with_capacity(payload.len() / 6);
        for chunk in payload.chunks_exact(6) {
            let id = SettingId::from_u16(u16::from_be_bytes([chunk[0], chunk[1]]));
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            params.push((id, value));
        }
        Ok(Settings { ack: false, params })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let flags = if self.ack { flag::ACK } else { 0 };
        let head = Head::new(Kind::Settings, flags, 0);
        head.encode(self.params.len() * 6, dst);
        for (id, value) in &self.params {
            dst.put_u16(id.as_u16());
            dst.put_u32(*value);
        }
    }
}

#[derive(Clone, Debug)]
pub struct PushPromise {
    pub stream_id: StreamId,
    pub promised_id: StreamId,
    pub header_block: Bytes,
    pub pad_len: u8,
    pub end_headers: bool,
}

impl PushPromise {
    fn load(head: &Head, payload: &[u8]) -> Result<PushPromise, Error> {
        if head.stream_id == 0 {
            return Err(Error::InvalidStreamId);
        }
        let (body, pad_len) = strip_padding(head.is_padded(), payload)?;
        if body.len() < 4 {
            return Err(Error::Malformed);
        }
        let promised_id = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) & !STREAM_ID_MASK;
        Ok(PushPromise {
            stream_id: head.stream_id,
            promised_id,
            header_block: Bytes::copy_from_slice(&body[4..]),
            pad_len,
            end_headers: head.is_end_headers(),
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let flags = if self.end_headers { flag::END_HEADERS } else { 0 };
        let head = Head::new(Kind::PushPromise, flags, self.stream_id);
        head.encode(4 + self.header_block.len(), dst);
        dst.put_u32(self.promised_id & !STREAM_ID_MASK);
        dst.extend_from_slice(&self.header_block);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Ping {
    pub ack: bool,
    pub payload: [u8; 8],
}

impl Ping {
    fn load(head: &Head, payload: &[u8]) -> Result<Ping, Error> {
        if head.stream_id != 0 {
            return Err(Error::InvalidStreamId);
        }
        if payload.len() != 8 {
            return Err(Error::InvalidPayloadLength);
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(payload);
        Ok(Ping {
            ack: head.is_ack(),
            payload: buf,
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let flags = if self.ack { flag::ACK } else { 0 };
        let head = Head::new(Kind::Ping, flags, 0);
        head.encode(8, dst);
        dst.extend_from_slice(&self.payload);
    }
}

#[derive(Clone, Debug)]
pub struct GoAway {
    pub last_stream_id: StreamId,
    pub error_code: Reason,
    pub debug_data: Bytes,
}

impl GoAway {
    fn load(head: &Head, payload: &[u8]) -> Result<GoAway, Error> {
        if head.stream_id != 0 {
            return Err(Error::InvalidStreamId);
        }
        if payload.len() < 8 {
            return Err(Error::InvalidPayloadLength);
        }
        let last_stream_id =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & !STREAM_ID_MASK;
        let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        Ok(GoAway {
            last_stream_id,
            error_code: Reason::from_u32(code),
            debug_data: Bytes::copy_from_slice(&payload[8..]),
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let head = Head::new(Kind::GoAway, 0, 0);
        head.encode(8 + self.debug_data.len(), dst);
        dst.put_u32(self.last_stream_id & !STREAM_ID_MASK);
        dst.put_u32(self.error_code.into_u32());
        dst.extend_from_slice(&self.debug_data);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WindowUpdate {
    pub stream_id: StreamId,
    pub increment: u32,
}

impl WindowUpdate {
    fn load(head: &Head, payload: &[u8]) -> Result<WindowUpdate, Error> {
        if payload.len() != 4 {
            return Err(Error::InvalidPayloadLength);
        }
        let increment = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & !STREAM_ID_MASK;
        if increment == 0 {
            return Err(Error::Malformed);
        }
        Ok(WindowUpdate {
            stream_id: head.stream_id,
            increment,
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let head = Head::new(Kind::WindowUpdate, 0, self.stream_id);
        head.encode(4, dst);
        dst.put_u32(self.increment & !STREAM_ID_MASK);
    }
}

#[derive(Clone, Debug)]
pub struct Continuation {
    pub stream_id: StreamId,
    pub header_block: Bytes,
    pub end_headers: bool,
}

impl Continuation {
    fn load(head: &Head, payload: &[u8]) -> Result<Continuation, Error> {
        if head.stream_id == 0 {
            return Err(Error::InvalidStreamId);
        }
        Ok(Continuation {
            stream_id: head.stream_id,
            header_block: Bytes::copy_from_slice(payload),
            end_headers: head.is_end_headers(),
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        let flags = if self.end_headers { flag::END_HEADERS } else { 0 };
        let head = Head::new(Kind::Continuation, flags, self.stream_id);
        head.encode(self.header_block.len(), dst);
        dst.extend_from_slice(&self.header_block);
    }
}

/// One parsed frame of any type, tagged by variant rather than by an
/// inheritance hierarchy.
#[derive(Clone, Debug)]
pub enum Frame {
    Data(Data),
    Headers(Headers),
    Priority(Priority),
    RstStream(RstStream),
    Settings(Settings),
    PushPromise(PushPromise),
    Ping(Ping),
    GoAway(GoAway),
    WindowUpdate(WindowUpdate),
    Continuation(Continuation),
}

impl Frame {
    /// Parses a complete frame from its header and exactly `head.length`
    /// payload bytes.
    pub fn load(head: Head, payload: &[u8]) -> Result<Frame, Error> {
        if payload.len() != head.length {
            return Err(Error::InvalidPayloadLength);
        }
        if head.length > MAX_MAX_FRAME_SIZE as usize {
            return Err(Error::TooLarge);
        }
        Ok(match head.kind {
            Kind::Data => Frame::Data(Data::load(&head, payload)?),
            Kind::Headers => Frame::Headers(Headers::load(&head, payload)?),
            Kind::Priority => Frame::Priority(Priority::load(&head, payload)?),
            Kind::RstStream => Frame::RstStream(RstStream::load(&head, payload)?),
            Kind::Settings => Frame::Settings(Settings::load(&head, payload)?),
            Kind::PushPromise => Frame::PushPromise(PushPromise::load(&head, payload)?),
            Kind::Ping => Frame::Ping(Ping::load(&head, payload)?),
            Kind::GoAway => Frame::GoAway(GoAway::load(&head, payload)?),
            Kind::WindowUpdate => Frame::WindowUpdate(WindowUpdate::load(&head, payload)?),
            Kind::Continuation => Frame::Continuation(Continuation::load(&head, payload)?),
            Kind::Unknown(_) => return Err(Error::BadFrameKind(head.kind.as_u8())),
        })
    }

    pub fn encode(&self, dst: &mut Vec<u8>) {
        match self {
            Frame::Data(f) => f.encode(dst),
            Frame::Headers(f) => f.encode(dst),
            Frame::Priority(f) => f.encode(dst),
            Frame::RstStream(f) => f.encode(dst),
            Frame::Settings(f) => f.encode(dst),
            Frame::PushPromise(f) => f.encode(dst),
            Frame::Ping(f) => f.encode(dst),
            Frame::GoAway(f) => f.encode(dst),
            Frame::WindowUpdate(f) => f.encode(dst),
            Frame::Continuation(f) => f.encode(dst),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data(f) => f.stream_id,
            Frame::Headers(f) => f.stream_id,
            Frame::Priority(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
            Frame::Settings(_) => 0,
            Frame::PushPromise(f) => f.stream_id,
            Frame::Ping(_) => 0,
            Frame::GoAway(_) => 0,
            Frame::WindowUpdate(f) => f.stream_id,
            Frame::Continuation(f) => f.stream_id,
        }
    }
}

/// Attempts to read one frame's header off the front of `buf` without
/// consuming it, so the caller can wait for the full payload before
/// advancing the cursor.
pub fn peek_head(buf: &[u8]) -> Option<Head> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    Head::parse(&buf[..HEADER_LEN]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) {
        let mut encoded = Vec::new();
        frame.encode(&mut encoded);
        let head = Head::parse(&encoded[..HEADER_LEN]).unwrap();
        let payload = &encoded[HEADER_LEN..];
        let parsed = Frame::load(head, payload).unwrap();
        assert_eq!(format!("{:?}", parsed), format!("{:?}", frame));
    }

    #[test]
    fn data_frame_roundtrip() {
        roundtrip(Frame::Data(Data {
            stream_id: 1,
            data: Bytes::from_static(b"OK"),
            pad_len: 0,
            end_stream: true,
        }));
    }

    #[test]
    fn headers_frame_with_priority_roundtrip() {
        roundtrip(Frame::Headers(Headers {
            stream_id: 1,
            header_block: Bytes::from_static(b"\x82\x86\x84"),
            pad_len: 0,
            end_stream: false,
            end_headers: true,
            priority: Some(StreamDependency {
                dependency_id: 0,
                weight: 15,
                is_exclusive: false,
            }),
        }));
    }

    #[test]
    fn settings_ack_has_empty_payload() {
        roundtrip(Frame::Settings(Settings::ack()));
    }

    #[test]
    fn window_update_rejects_zero_increment() {
        let head = Head::new(Kind::WindowUpdate, 0, 0);
        assert!(matches!(
            WindowUpdate::load(&head, &0u32.to_be_bytes()),
            Err(Error::Malformed)
        ));
    }

    #[test]
    fn data_frame_rejects_stream_zero() {
        let head = Head::new(Kind::Data, 0, 0);
        assert!(matches!(Data::load(&head, b"x"), Err(Error::InvalidStreamId)));
    }

    #[test]
    fn goaway_roundtrip_with_debug_data() {
        roundtrip(Frame::GoAway(GoAway {
            last_stream_id: 3,
            error_code: Reason::PROTOCOL_ERROR,
            debug_data: Bytes::from_static(b"bad"),
        }));
    }
}
