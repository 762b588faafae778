//! Core traits that decouple kanata-indicator from any specific UI toolkit,
//! transport, or service manager.
//!
//! Every concrete backend (the GTK overlay, a TCP socket, the systemd bus, a
//! test harness, …) implements one of these traits.  The
//! [`ReconnectCoordinator`](crate::coordinator::ReconnectCoordinator) only
//! depends on these abstractions.

use crate::event::{ServiceNotification, ServiceState};
use crate::kanata::connection::{Chunk, ReadError};
use std::sync::mpsc;

//  Indicator

/// The visible output of the client: a label that shows the current layer.
///
/// Implemented by the host UI.  All calls happen on the thread that drives
/// the coordinator, so implementations do not need to be [`Send`].
pub trait Indicator {
    /// Replace the displayed text.
    fn set_layer(&mut self, text: &str);

    /// Show or hide the indicator.
    fn set_visible(&mut self, visible: bool);

    /// Release the underlying widget.  Called once when the host shuts down.
    fn destroy(&mut self);
}

//  Chunk source

/// A byte stream read in bounded chunks.
///
/// [`Connection`](crate::kanata::connection::Connection) is the real
/// implementation; tests feed scripted chunks instead.
pub trait ChunkSource {
    /// Block until the next chunk, the end of the stream, or an error.
    fn read_chunk(&mut self) -> Result<Chunk, ReadError>;

    /// Close the underlying transport.  Must be idempotent.
    fn close(&mut self);
}

//  Service bus

/// Opaque handle returned by [`ServiceBus::subscribe_job_removed`].
pub type SubscriptionId = u64;

/// The narrow slice of a service manager the client needs: job-completion
/// notifications and a unit's active state.
///
/// # Contract
///
/// * [`subscribe_job_removed`](ServiceBus::subscribe_job_removed) returns
///   once the subscription is in place and forwards every notification into
///   `sink` from a background thread until unsubscribed.
/// * [`unsubscribe`](ServiceBus::unsubscribe) is called at most once per id.
/// * [`active_state`](ServiceBus::active_state) blocks until the bus replies.
pub trait ServiceBus: Send + Sync + 'static {
    /// The error type produced by this bus.
    type Error: std::error::Error + Send + 'static;

    /// Start forwarding `JobRemoved` notifications into `sink`.
    fn subscribe_job_removed(
        &self,
        sink: mpsc::Sender<ServiceNotification>,
    ) -> Result<SubscriptionId, Self::Error>;

    /// Stop forwarding notifications for `id`.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Query the `ActiveState` of the unit whose escaped object-path suffix is
    /// `unit_path`.
    fn active_state(&self, unit_path: &str) -> Result<ServiceState, Self::Error>;
}

//  Lifecycle

/// What the host calls when the indicator is enabled and disabled.
pub trait Lifecycle {
    fn start(&mut self);
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockBus, RecordingIndicator, ScriptedSource};

    #[test]
    fn recording_indicator_tracks_state() {
        let mut ind = RecordingIndicator::default();
        ind.set_layer("qwerty");
        ind.set_visible(true);
        ind.destroy();
        assert_eq!(
            ind.calls,
            vec![Call::Layer("qwerty".into()), Call::Visible(true), Call::Destroy]
        );
        assert_eq!(ind.text, "qwerty");
        assert!(ind.visible);
    }

    #[test]
    fn scripted_source_ends_on_empty_chunk() {
        let mut src = ScriptedSource::chunks(&[b"abc", b"", b"def"]);
        assert_eq!(src.read_chunk().unwrap(), Chunk::Data(b"abc".to_vec()));
        assert_eq!(src.read_chunk().unwrap(), Chunk::EndOfStream);
        src.close();
        assert_eq!(src.closes, 1);
    }

    #[test]
    fn mock_bus_forwards_until_unsubscribed() {
        let bus = MockBus::with_state(ServiceState::Active);
        let (tx, rx) = mpsc::channel();
        let id = bus.subscribe_job_removed(tx).unwrap();
        bus.emit(ServiceNotification::new("kanata.service", "done"));
        assert_eq!(
            rx.try_recv().unwrap(),
            ServiceNotification::new("kanata.service", "done")
        );

        bus.unsubscribe(id);
        assert!(rx.recv().is_err());
        assert_eq!(bus.unsubscribes(), 1);
    }
}
