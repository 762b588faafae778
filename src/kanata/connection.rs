//! TCP connection to the kanata daemon.
//!
//! # Wire format
//!
//! kanata writes one JSON document per message and never frames them:
//!
//! ```json
//! {"LayerChange":{"new":"qwerty"}}
//! ```
//!
//! Each message is expected to arrive as exactly one read of up to
//! [`CHUNK_SIZE`] bytes.  There is no close frame either; a zero-length read
//! is the only sign that kanata went away.
//!
//! # Cancellation
//!
//! A blocking [`Read`] cannot be interrupted directly, so every connection
//! registers a clone of its socket with a [`CancelToken`].  Cancelling the
//! token shuts the socket down, which wakes the pending read; the read then
//! sees the token flag and reports [`ReadError::Cancelled`] instead of an
//! end-of-stream.

use crate::traits::ChunkSource;
use log::{debug, warn};
use std::fmt;
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Upper bound on a single read.
pub const CHUNK_SIZE: usize = 1024;

/// Where the daemon listens.  Read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
}

impl ConnectionTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Result of one successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data(Vec<u8>),
    /// The peer closed the socket.
    EndOfStream,
}

/// Failure to open a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("{target} resolved to no addresses")]
    NoAddress { target: String },
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
}

/// Failure while waiting for a chunk.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The [`CancelToken`] fired while the read was pending.
    #[error("read cancelled")]
    Cancelled,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

//  Cancel token

/// Shared cancellation flag that also knows how to wake a blocked read.
///
/// Cloning is cheap; all clones observe the same flag.  A token is cancelled
/// at most once and never reset.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    next_ticket: AtomicU64,
    /// The socket of the live connection, if any.
    registered: Mutex<Option<(u64, TcpStream)>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Set the flag and shut down the registered socket.  Later calls are
    /// no-ops.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let registered = self
            .inner
            .registered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some((_, stream)) = registered {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Register `stream` as the socket to shut down on cancel.
    ///
    /// Returns a ticket for [`release`](Self::release).  If the token is
    /// already cancelled the socket is shut down immediately.
    fn register(&self, stream: &TcpStream) -> io::Result<u64> {
        let clone = stream.try_clone()?;
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst);
        let mut slot = self
            .inner
            .registered
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // Checked under the lock so a concurrent cancel() cannot miss it.
        if self.is_cancelled() {
            let _ = clone.shutdown(Shutdown::Both);
        } else {
            *slot = Some((ticket, clone));
        }
        Ok(ticket)
    }

    /// Forget the socket registered under `ticket`, if it is still the
    /// registered one.
    fn release(&self, ticket: u64) {
        let mut slot = self
            .inner
            .registered
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if matches!(*slot, Some((t, _)) if t == ticket) {
            *slot = None;
        }
    }
}

//  Connection

/// One open socket to the daemon.
///
/// The socket is closed by [`close`](ChunkSource::close) or on drop,
/// whichever comes first.
pub struct Connection {
    stream: TcpStream,
    target: ConnectionTarget,
    cancel: CancelToken,
    ticket: u64,
    closed: bool,
    buf: [u8; CHUNK_SIZE],
}

impl Connection {
    /// Open a TCP connection to `target`.
    ///
    /// Every resolved address is tried in order.  With `timeout` set, no
    /// single attempt blocks longer than that.
    pub fn connect(
        target: &ConnectionTarget,
        cancel: CancelToken,
        timeout: Option<Duration>,
    ) -> Result<Self, ConnectError> {
        let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|source| ConnectError::Resolve {
                target: target.to_string(),
                source,
            })?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    debug!("connected to {} ({})", target, addr);
                    return Self::from_stream(stream, target.clone(), cancel).map_err(
                        |source| ConnectError::Connect {
                            target: target.to_string(),
                            source,
                        },
                    );
                }
                Err(e) => {
                    debug!("connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(source) => Err(ConnectError::Connect {
                target: target.to_string(),
                source,
            }),
            None => Err(ConnectError::NoAddress {
                target: target.to_string(),
            }),
        }
    }

    fn from_stream(
        stream: TcpStream,
        target: ConnectionTarget,
        cancel: CancelToken,
    ) -> io::Result<Self> {
        let ticket = cancel.register(&stream)?;
        Ok(Self {
            stream,
            target,
            cancel,
            ticket,
            closed: false,
            buf: [0; CHUNK_SIZE],
        })
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }
}

impl ChunkSource for Connection {
    fn read_chunk(&mut self) -> Result<Chunk, ReadError> {
        loop {
            let result = self.stream.read(&mut self.buf);
            // A cancelled token shuts the socket down, which surfaces as
            // either a zero-length read or an error.  Both mean "cancelled".
            if self.cancel.is_cancelled() {
                return Err(ReadError::Cancelled);
            }
            return match result {
                Ok(0) => Ok(Chunk::EndOfStream),
                Ok(n) => Ok(Chunk::Data(self.buf[..n].to_vec())),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(ReadError::Io(e)),
            };
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.release(self.ticket);
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => debug!("closed connection to kanata {}", self.target),
            // Closing a socket the peer already tore down is expected.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                debug!("connection to kanata {} already closed", self.target)
            }
            Err(e) => warn!(
                "failed to close connection to kanata {}: {}",
                self.target, e
            ),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

//  Tests
