//! Per-stream state record (design §3 "HTTP/2 stream record"): lifecycle,
//! header-block reassembly, and flow-control windows.

use bytes::{Bytes, BytesMut};

use super::frame::{StreamDependency, StreamId, DEFAULT_INITIAL_WINDOW_SIZE};

/// IDLE → OPEN → {HALF_CLOSED_REMOTE, HALF_CLOSED_LOCAL} → CLOSED, per
/// RFC 7540 §5.1.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedRemote,
    HalfClosedLocal,
    Closed,
}

#[derive(Debug)]
pub struct Stream {
    pub id: StreamId,
    pub state: StreamState,
    /// Reassembly buffer for HEADERS/PUSH_PROMISE + CONTINUATION chains;
    /// cleared once END_HEADERS closes the block.
    pub header_fragments: BytesMut,
    /// Set while a HEADERS block is open and awaiting END_HEADERS,
    /// rejecting any other frame type arriving on the connection in the
    /// interim (design's CONTINUATION open question).
    pub headers_in_progress: bool,
    pub dependency: StreamDependency,
    pub send_window: i64,
    pub recv_window: i64,
}

impl Stream {
    pub fn new(id: StreamId) -> Stream {
        Stream {
            id,
            state: StreamState::Idle,
            header_fragments: BytesMut::new(),
            headers_in_progress: false,
            dependency: StreamDependency {
                dependency_id: 0,
                weight: 15,
                is_exclusive: false,
            },
            send_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            recv_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
        }
    }

    pub fn open(&mut self) {
        if self.state == StreamState::Idle {
            self.state = StreamState::Open;
        }
    }

    pub fn recv_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            other => other,
        };
    }

    pub fn send_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            other => other,
        };
    }

    pub fn reset(&mut self) {
        self.state = StreamState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    pub fn take_header_block(&mut self) -> Bytes {
        self.headers_in_progress = false;
        self.header_fragments.split().freeze()
    }
}
