//! TCP server that streams the animation to every connected client.
//!
//! Each accepted connection gets its own task running a tick timer and its
//! own frame cursor. The only state shared between tasks is the read-only
//! `FrameSource`.

use crate::config::Config;
use crate::frames::{Frame, FrameSource};
use crate::session::{CloseReason, Session, SessionStats};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Cursor home, then clear screen.
pub const CLEAR_SCREEN: &[u8] = b"\x1b[H\x1b[2J";

/// Client input is read only to notice disconnects, then dropped.
const READ_BUFFER_SIZE: usize = 1024;

/// Listen backlog for the server socket
const LISTEN_BACKLOG: i32 = 1024;

/// Playback settings shared by all sessions.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub tick: Duration,
    pub placeholder: Frame,
}

impl StreamSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick: config.tick_interval(),
            placeholder: Frame::from_raw(config.placeholder.as_bytes()),
        }
    }
}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub id: u64,
    pub reason: CloseReason,
    pub stats: SessionStats,
}

/// Server instance
pub struct Server {
    config: Config,
    source: Arc<FrameSource>,
    settings: Arc<StreamSettings>,
}

impl Server {
    /// Create a new server over an already loaded frame source
    pub fn new(config: Config, source: FrameSource) -> Self {
        let settings = StreamSettings::from_config(&config);
        Server {
            config,
            source: Arc::new(source),
            settings: Arc::new(settings),
        }
    }

    /// Bind the listening socket. Must be called inside a tokio runtime.
    pub fn bind(self) -> io::Result<BoundServer> {
        let addr: SocketAddr = self
            .config
            .listen
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::from_std(create_listener(addr)?)?;
        info!(
            address = %listener.local_addr()?,
            frames = self.source.len(),
            mode = ?self.source.mode(),
            tick_ms = self.settings.tick.as_millis() as u64,
            "Server listening"
        );

        Ok(BoundServer {
            listener,
            source: self.source,
            settings: self.settings,
            next_session_id: 1,
        })
    }

    /// Bind and accept connections until the process exits
    pub async fn run(self) -> io::Result<()> {
        self.bind()?.serve().await
    }
}

/// A server whose listener is bound and ready to accept.
pub struct BoundServer {
    listener: TcpListener,
    source: Arc<FrameSource>,
    settings: Arc<StreamSettings>,
    next_session_id: u64,
}

impl BoundServer {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. There is no cap on concurrent sessions.
    pub async fn serve(mut self) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let id = self.next_session_id;
                    self.next_session_id += 1;

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(session = id, error = %e, "Failed to set TCP_NODELAY");
                    }
                    info!(session = id, peer = %peer, "New client connected");

                    let source = Arc::clone(&self.source);
                    let settings = Arc::clone(&self.settings);

                    tokio::spawn(async move {
                        let report = handle_connection(stream, source, settings, id).await;
                        if report.reason != CloseReason::EndOfStream {
                            debug!(session = id, reason = %report.reason, "Connection error");
                        }
                        info!(
                            session = report.id,
                            peer = %peer,
                            reason = %report.reason,
                            ticks = report.stats.ticks,
                            frames_sent = report.stats.frames_sent,
                            frames_skipped = report.stats.frames_skipped,
                            bytes_written = report.stats.bytes_written,
                            "Client disconnected"
                        );
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Create a TCP listener with SO_REUSEADDR so restarts can rebind at once.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Drive one client's animation until it disconnects or a write fails.
///
/// Ticks and socket reads are handled by the same task, so once a
/// disconnect is observed no further tick can write.
pub async fn handle_connection<S>(
    stream: S,
    source: Arc<FrameSource>,
    settings: Arc<StreamSettings>,
    session_id: u64,
) -> SessionReport
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut session = Session::new(session_id);
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    let mut ticker = time::interval_at(Instant::now() + settings.tick, settings.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    session.start_streaming();

    loop {
        tokio::select! {
            biased;

            read = reader.read(&mut buffer) => match read {
                Ok(0) => session.close(CloseReason::EndOfStream),
                Ok(n) => trace!(session = session.id, bytes = n, "Discarding client input"),
                Err(e) => session.close(CloseReason::ReadFailed(e.kind())),
            },

            _ = ticker.tick() => {
                if let Err(e) = tick(&mut session, &mut writer, &source, &settings).await {
                    session.close(CloseReason::WriteFailed(e.kind()));
                }
            }
        }

        if let Some(reason) = session.close_reason() {
            return SessionReport {
                id: session.id,
                reason,
                stats: session.stats,
            };
        }
    }
}

/// Write the current frame and advance the cursor.
///
/// A lazy read failure skips the writes but still advances, so one bad
/// file cannot stall the animation.
async fn tick<W>(
    session: &mut Session,
    writer: &mut W,
    source: &FrameSource,
    settings: &StreamSettings,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    session.stats.ticks += 1;
    let index = session.cursor();

    let frame = if source.is_empty() {
        Some(settings.placeholder.clone())
    } else {
        match source.read(index).await {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(
                    session = session.id,
                    index,
                    path = e.path().and_then(Path::to_str),
                    error = %e,
                    "Skipping frame"
                );
                session.stats.frames_skipped += 1;
                None
            }
        }
    };

    if let Some(frame) = frame {
        trace!(session = session.id, index, bytes = frame.len(), "Sending frame");
        writer.write_all(CLEAR_SCREEN).await?;
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        session.stats.frames_sent += 1;
        session.stats.bytes_written += (CLEAR_SCREEN.len() + frame.len()) as u64;
    }

    session.advance(source.len());
    Ok(())
}
