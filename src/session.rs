//! Per-connection session state.
//!
//! A session moves `Connected -> Streaming -> Closed` and owns the frame
//! cursor for exactly one client. Nothing here is shared between
//! connections.

use std::fmt;
use std::io;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed its side of the connection.
    EndOfStream,
    /// Reading from the socket failed.
    ReadFailed(io::ErrorKind),
    /// Writing a frame failed; the client is treated as gone.
    WriteFailed(io::ErrorKind),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::EndOfStream => write!(f, "client disconnected"),
            CloseReason::ReadFailed(kind) => write!(f, "read failed: {kind}"),
            CloseReason::WriteFailed(kind) => write!(f, "write failed: {kind}"),
        }
    }
}

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, ticks not yet scheduled.
    Connected,
    /// Ticking and writing frames.
    Streaming,
    /// Finished. No further writes may happen.
    Closed(CloseReason),
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: u64,
    pub frames_sent: u64,
    pub frames_skipped: u64,
    pub bytes_written: u64,
}

/// A single client's playback state.
#[derive(Debug)]
pub struct Session {
    pub id: u64,
    state: SessionState,
    cursor: usize,
    pub stats: SessionStats,
}

impl Session {
    /// Create a new session positioned at the first frame.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: SessionState::Connected,
            cursor: 0,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Index of the frame the next tick will show.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Transition to streaming. Has no effect once closed.
    pub fn start_streaming(&mut self) {
        if self.state == SessionState::Connected {
            self.state = SessionState::Streaming;
        }
    }

    /// Move to the next frame, wrapping at `frame_count`.
    ///
    /// An empty frame set keeps the cursor at 0.
    pub fn advance(&mut self, frame_count: usize) {
        if frame_count == 0 {
            self.cursor = 0;
        } else {
            self.cursor = (self.cursor + 1) % frame_count;
        }
    }

    /// Mark the session closed. The first reason recorded wins.
    pub fn close(&mut self, reason: CloseReason) {
        if !self.is_closed() {
            self.state = SessionState::Closed(reason);
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed(_))
    }

    /// The reason the session closed, if it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state() {
            SessionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }
}
