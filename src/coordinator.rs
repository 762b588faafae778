//! The main orchestrator that ties the kanata connection, the service
//! monitor, and the indicator together.
//!
//! [`ReconnectCoordinator`] owns the only mutable state shared between the
//! read loop and the restart notifications: whether a connection is open or
//! being opened.  Both paths reach it as [`Event`]s on one channel and are
//! handled one at a time on the host's thread.  Deciding to connect and
//! moving to [`LinkState::Connecting`] happen in the same call, before the
//! connect itself starts on the session thread, so no other decision can
//! slip in between.  That is what keeps the client at one connection at
//! most without ever blocking the host on the network.

use crate::event::{CloseReason, Event, SessionId};
use crate::kanata::connection::{CancelToken, ConnectionTarget};
use crate::kanata::watcher::{self, show_disconnected, show_layer, Dial, WatchOutcome};
use crate::systemd::monitor::{ServiceStateMonitor, SubscriptionHandle};
use crate::traits::{Indicator, Lifecycle, ServiceBus};
use log::{debug, error, info, warn};
use std::ops::ControlFlow;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Where the connection to kanata stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    /// A session thread is connecting in the background.
    Connecting,
    Connected,
}

/// What a service activation led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The coordinator is not running.
    Stopped,
    /// A new session started connecting.
    Reconnecting(SessionId),
    /// This session is still connecting; nothing new was started.
    InProgress(SessionId),
    /// This session is connected even though kanata restarted.  Logged as a
    /// warning; nothing new was started.
    AlreadyConnected(SessionId),
    /// The session thread could not be started.
    Failed,
}

/// One session thread, connecting or reading.
struct Session {
    id: SessionId,
    thread: JoinHandle<WatchOutcome>,
}

enum Link {
    Disconnected,
    Connecting(Session),
    Connected(Session),
}

impl Link {
    fn session(&self) -> Option<&Session> {
        match self {
            Link::Disconnected => None,
            Link::Connecting(s) | Link::Connected(s) => Some(s),
        }
    }
}

/// Everything that exists only between [`start`](Lifecycle::start) and
/// [`stop`](Lifecycle::stop).
struct CoreState<B: ServiceBus> {
    cancel: CancelToken,
    link: Link,
    subscription: Option<SubscriptionHandle<B>>,
}

/// Keeps at most one connection to kanata open and reconnects when the
/// service manager reports that kanata started again.
///
/// The coordinator is generic over the [`Indicator`] it drives and the
/// [`ServiceBus`] it watches, so tests can run it without GTK or D-Bus.
///
/// # Typical usage
///
/// ```ignore
/// let (tx, rx) = mpsc::channel();
/// let mut coordinator = ReconnectCoordinator::new(target, indicator, tx.clone());
/// coordinator.set_monitor(ServiceStateMonitor::new(bus, unit));
/// coordinator.start();
/// for event in rx {
///     if coordinator.handle(event).is_break() {
///         break;
///     }
/// }
/// ```
pub struct ReconnectCoordinator<I: Indicator, B: ServiceBus> {
    target: ConnectionTarget,
    connect_timeout: Option<Duration>,
    indicator: I,
    monitor: Option<ServiceStateMonitor<B>>,
    events: mpsc::Sender<Event>,
    core: Option<CoreState<B>>,
    last_session: SessionId,
}

impl<I: Indicator, B: ServiceBus> ReconnectCoordinator<I, B> {
    /// Create a stopped coordinator.
    ///
    /// `events` is the sending half of the channel the host feeds back into
    /// [`handle`](Self::handle); session and monitor threads get clones.
    pub fn new(target: ConnectionTarget, indicator: I, events: mpsc::Sender<Event>) -> Self {
        Self {
            target,
            connect_timeout: None,
            indicator,
            monitor: None,
            events,
            core: None,
            last_session: 0,
        }
    }

    /// Watch a service for restarts.  Without a monitor the client connects
    /// once at start and never again.
    pub fn set_monitor(&mut self, monitor: ServiceStateMonitor<B>) {
        self.monitor = Some(monitor);
    }

    /// Bound every background connect attempt to `timeout` per address.
    pub fn set_connect_timeout(&mut self, timeout: Option<Duration>) {
        self.connect_timeout = timeout;
    }

    pub fn state(&self) -> LinkState {
        match self.core.as_ref().map(|c| &c.link) {
            Some(Link::Connecting(_)) => LinkState::Connecting,
            Some(Link::Connected(_)) => LinkState::Connected,
            _ => LinkState::Disconnected,
        }
    }

    /// Id of the session that is connecting or connected, if any.
    pub fn session(&self) -> Option<SessionId> {
        self.core
            .as_ref()
            .and_then(|c| c.link.session())
            .map(|s| s.id)
    }

    pub fn is_started(&self) -> bool {
        self.core.is_some()
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn indicator_mut(&mut self) -> &mut I {
        &mut self.indicator
    }

    /// React to one event.  Returns [`ControlFlow::Break`] once the host
    /// should exit.
    pub fn handle(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::Connected { session } => self.on_connected(session),
            Event::ConnectFailed { session, error } => self.on_connect_failed(session, &error),
            Event::Layer { session, name } => {
                if self.connected_session() == Some(session) {
                    show_layer(&mut self.indicator, &name);
                } else {
                    debug!("ignore layer {} from stale session {}", name, session);
                }
            }
            Event::Closed { session, reason } => self.on_closed(session, reason),
            Event::ServiceActivated => {
                let _ = self.on_activated();
            }
            Event::Shutdown => {
                info!("shutdown requested");
                self.stop();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// The watched service became active.  Starts a new session only when
    /// none is connecting or connected.
    pub fn on_activated(&mut self) -> Activation {
        let Some(core) = self.core.as_ref() else {
            debug!("ignore service activation while stopped");
            return Activation::Stopped;
        };
        match &core.link {
            Link::Disconnected => {
                info!("kanata {} just started, re-connecting", self.target);
                self.begin_session()
            }
            Link::Connecting(session) => {
                debug!("session {} is still connecting, ignore service activation", session.id);
                Activation::InProgress(session.id)
            }
            Link::Connected(session) => {
                warn!(
                    "this should never happen: session {} should have been closed by kanata now, but it is still open",
                    session.id
                );
                Activation::AlreadyConnected(session.id)
            }
        }
    }

    fn connected_session(&self) -> Option<SessionId> {
        match self.core.as_ref().map(|c| &c.link) {
            Some(Link::Connected(s)) => Some(s.id),
            _ => None,
        }
    }

    /// Take the session out of `Connecting` if it is `session`.
    fn take_connecting(&mut self, session: SessionId) -> Option<Session> {
        let core = self.core.as_mut()?;
        match std::mem::replace(&mut core.link, Link::Disconnected) {
            Link::Connecting(s) if s.id == session => Some(s),
            other => {
                core.link = other;
                None
            }
        }
    }

    fn on_connected(&mut self, session: SessionId) {
        match self.take_connecting(session) {
            Some(s) => {
                info!("connected to kanata {} (session {})", self.target, s.id);
                if let Some(core) = self.core.as_mut() {
                    core.link = Link::Connected(s);
                }
            }
            None => debug!("ignore connect of stale session {}", session),
        }
    }

    fn on_connect_failed(&mut self, session: SessionId, error: &str) {
        match self.take_connecting(session) {
            // The session thread has already returned.
            Some(_) => error!("failed to connect to kanata: {}", error),
            None => debug!("ignore connect failure of stale session {}: {}", session, error),
        }
    }

    fn on_closed(&mut self, session: SessionId, reason: CloseReason) {
        if self.connected_session() != Some(session) {
            debug!("ignore close of stale session {}", session);
            return;
        }
        show_disconnected(&mut self.indicator);
        if let Some(core) = self.core.as_mut() {
            // The session thread has already closed its socket and is exiting.
            core.link = Link::Disconnected;
        }
        match reason {
            CloseReason::Peer => info!("hide indicator because kanata {} closed the connection", self.target),
            CloseReason::Error(e) => error!(
                "hide indicator because reading from kanata {} failed: {}",
                self.target, e
            ),
        }
    }

    /// Move to `Connecting` and hand the connect to a new session thread.
    /// Must only be called while started and disconnected.
    fn begin_session(&mut self) -> Activation {
        let Some(core) = self.core.as_mut() else {
            return Activation::Stopped;
        };

        self.last_session += 1;
        let id = self.last_session;
        let dial = Dial {
            target: self.target.clone(),
            cancel: core.cancel.clone(),
            timeout: self.connect_timeout,
        };
        match watcher::spawn(dial, id, self.events.clone()) {
            Ok(thread) => {
                debug!("session {}: connecting to kanata {}", id, self.target);
                core.link = Link::Connecting(Session { id, thread });
                Activation::Reconnecting(id)
            }
            Err(e) => {
                error!("failed to start session thread: {}", e);
                Activation::Failed
            }
        }
    }
}

impl<I: Indicator, B: ServiceBus> Lifecycle for ReconnectCoordinator<I, B> {
    /// Start connecting, then subscribe to restart notifications.  A failed
    /// connect is not retried; the next service activation tries again.
    fn start(&mut self) {
        if self.core.is_some() {
            warn!("already started");
            return;
        }
        info!("starting, kanata at {}", self.target);
        self.core = Some(CoreState {
            cancel: CancelToken::new(),
            link: Link::Disconnected,
            subscription: None,
        });

        let _ = self.begin_session();

        match &self.monitor {
            Some(monitor) => match monitor.subscribe(self.events.clone()) {
                Ok(handle) => {
                    if let Some(core) = self.core.as_mut() {
                        core.subscription = Some(handle);
                    }
                }
                Err(e) => error!("skip reconnecting when kanata restarts: {}", e),
            },
            None => info!("no service monitor, will not reconnect when kanata restarts"),
        }
    }

    /// Cancel the pending read, wait for the read loop to finish, and
    /// unsubscribe.  Safe to call in any state and more than once.
    ///
    /// A connect still in flight is not waited for: once it completes it
    /// sees the cancelled token and closes its socket on its own.
    fn stop(&mut self) {
        let Some(core) = self.core.take() else {
            debug!("already stopped");
            return;
        };

        core.cancel.cancel();
        match core.link {
            Link::Connected(session) => match session.thread.join() {
                Ok(outcome) => debug!("session {} ended: {:?}", session.id, outcome),
                Err(_) => error!("reader thread of session {} panicked", session.id),
            },
            Link::Connecting(session) => {
                debug!("session {} still connecting, leaving it to exit on its own", session.id)
            }
            Link::Disconnected => {}
        }
        if let Some(subscription) = core.subscription {
            subscription.unsubscribe();
        }
        self.indicator.set_visible(false);
        info!("stopped");
    }
}

/// Drive `coordinator` on the current thread until a shutdown event.
///
/// Used when no UI toolkit main loop is running.
pub fn run_blocking<I: Indicator, B: ServiceBus>(
    mut coordinator: ReconnectCoordinator<I, B>,
    events: mpsc::Receiver<Event>,
) {
    coordinator.start();
    for event in events {
        if coordinator.handle(event).is_break() {
            break;
        }
    }
    coordinator.stop();
    coordinator.indicator_mut().destroy();
    info!("exiting");
}

//  Tests
