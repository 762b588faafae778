//! The connect and read loop for one connection, and how their results reach
//! the indicator.
//!
//! Both run on one thread per session and only talk to the rest of the
//! program through the coordinator's [`Event`] channel, so neither a slow
//! connect nor a pending read ever holds up the host's loop.  The indicator is updated on
//! the coordinator's thread via [`show_layer`] / [`show_disconnected`], so
//! events from one connection reach the indicator in arrival order.

use crate::event::{CloseReason, Event, SessionId};
use crate::kanata::connection::{CancelToken, Connection, ConnectionTarget, ReadError};
use crate::kanata::decoder::StreamDecoder;
use crate::traits::{ChunkSource, Indicator};
use log::{debug, info};
use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Text shown (while hidden) after a connection ends.
pub const DISCONNECTED_TEXT: &str = "disconnected";

/// How a read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The connect failed; a [`Event::ConnectFailed`] was sent.
    ConnectFailed(String),
    /// The stream ended or failed; a [`Event::Closed`] was sent.
    Closed(CloseReason),
    /// The cancel token fired.  Nothing was sent.
    Cancelled,
    /// The coordinator dropped its receiver.
    Abandoned,
}

/// Drive `source` until it ends, forwarding every layer change as an
/// [`Event::Layer`] tagged with `session`.
///
/// On end-of-stream or a read error the source is closed before the
/// [`Event::Closed`] report goes out.  A cancelled read returns quietly;
/// whoever cancelled owns the cleanup.
pub fn watch<S: ChunkSource>(
    mut source: S,
    session: SessionId,
    events: &mpsc::Sender<Event>,
) -> WatchOutcome {
    let outcome = {
        let mut decoder = StreamDecoder::new(&mut source);
        loop {
            match decoder.next() {
                Some(Ok(layer)) => {
                    let event = Event::Layer {
                        session,
                        name: layer.layer_name,
                    };
                    if events.send(event).is_err() {
                        break WatchOutcome::Abandoned;
                    }
                }
                Some(Err(ReadError::Cancelled)) => break WatchOutcome::Cancelled,
                Some(Err(ReadError::Io(e))) => {
                    break WatchOutcome::Closed(CloseReason::Error(e.to_string()))
                }
                None => break WatchOutcome::Closed(CloseReason::Peer),
            }
        }
    };

    match &outcome {
        WatchOutcome::Closed(reason) => {
            source.close();
            match reason {
                CloseReason::Peer => info!("session {}: connection closed by kanata", session),
                CloseReason::Error(e) => {
                    debug!("session {}: read from kanata failed: {}", session, e)
                }
            }
            let _ = events.send(Event::Closed {
                session,
                reason: reason.clone(),
            });
        }
        // Only `connect_and_watch` produces this; `watch` never does.
        WatchOutcome::ConnectFailed(_) => {}
        WatchOutcome::Cancelled => info!("session {}: read from kanata cancelled", session),
        WatchOutcome::Abandoned => {
            debug!("session {}: event receiver gone, stopping", session);
            source.close();
        }
    }
    outcome
}

/// What a session thread needs to open its connection.
#[derive(Debug, Clone)]
pub struct Dial {
    pub target: ConnectionTarget,
    pub cancel: CancelToken,
    pub timeout: Option<Duration>,
}

/// Connect to `dial.target`, announce the result, then [`watch`] the new
/// connection.
///
/// A failed connect sends [`Event::ConnectFailed`], unless `dial.cancel`
/// already fired, in which case nothing is sent.  A connect that succeeds
/// after cancellation still sends [`Event::Connected`], but its socket is
/// shut down at once, so the first read returns [`ReadError::Cancelled`]
/// and no [`Event::Closed`] follows.
pub fn connect_and_watch(dial: Dial, session: SessionId, events: &mpsc::Sender<Event>) -> WatchOutcome {
    let conn = match Connection::connect(&dial.target, dial.cancel.clone(), dial.timeout) {
        Ok(conn) => conn,
        Err(_) if dial.cancel.is_cancelled() => {
            debug!("session {}: connect abandoned after cancel", session);
            return WatchOutcome::Cancelled;
        }
        Err(e) => {
            let error = e.to_string();
            debug!("session {}: {}", session, error);
            let _ = events.send(Event::ConnectFailed {
                session,
                error: error.clone(),
            });
            return WatchOutcome::ConnectFailed(error);
        }
    };
    if events.send(Event::Connected { session }).is_err() {
        debug!("session {}: event receiver gone before connect finished", session);
        return WatchOutcome::Abandoned;
    }
    watch(conn, session, events)
}

/// Run [`connect_and_watch`] on a dedicated thread.
pub fn spawn(
    dial: Dial,
    session: SessionId,
    events: mpsc::Sender<Event>,
) -> io::Result<JoinHandle<WatchOutcome>> {
    thread::Builder::new()
        .name(format!("kanata-watch-{}", session))
        .spawn(move || connect_and_watch(dial, session, &events))
}

//  Indicator updates

/// Show `name`.  The text is set before the indicator becomes visible so a
/// stale layer name never flashes.
pub fn show_layer<I: Indicator>(indicator: &mut I, name: &str) {
    indicator.set_layer(name);
    indicator.set_visible(true);
}

/// Hide the indicator and drop the last layer name.
pub fn show_disconnected<I: Indicator>(indicator: &mut I) {
    indicator.set_visible(false);
    indicator.set_layer(DISCONNECTED_TEXT);
}

//  Tests
