//! [`ServiceBus`] implementation backed by the systemd manager on the system
//! D-Bus.
//!
//! Uses the blocking `zbus` API: the signal iterator runs on a forwarding
//! thread per subscription and property queries block the calling thread.
//!
//! A blocked signal iterator cannot be woken from outside.  Unsubscribing
//! therefore drops the subscriber's sink right away and calls
//! `Manager.Unsubscribe`; the forwarding thread itself exits at the next
//! signal it sees, without forwarding it.

use crate::event::{ServiceNotification, ServiceState};
use crate::traits::{ServiceBus, SubscriptionId};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
const MANAGER_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";
const UNIT_PATH_PREFIX: &str = "/org/freedesktop/systemd1/unit/";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Errors that can occur when talking to systemd.
#[derive(Debug, thiserror::Error)]
pub enum SystemdBusError {
    #[error("failed to open system bus: {0}")]
    Connect(#[source] zbus::Error),
    #[error("failed to subscribe to JobRemoved: {0}")]
    Subscribe(#[source] zbus::Error),
    #[error("failed to query ActiveState of {unit}: {source}")]
    Query {
        unit: String,
        #[source]
        source: zbus::Error,
    },
    #[error("unexpected ActiveState reply for {unit}: {message}")]
    Decode { unit: String, message: String },
    #[error("failed to spawn signal thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// The sink of one subscription, shared between the registry and its
/// forwarding thread.
#[derive(Debug)]
struct Forwarder {
    sink: Mutex<Option<mpsc::Sender<ServiceNotification>>>,
}

impl Forwarder {
    fn new(sink: mpsc::Sender<ServiceNotification>) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
        }
    }

    /// Send `notification` on.  `false` once closed or the receiver is gone.
    fn forward(&self, notification: ServiceNotification) -> bool {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        let delivered = match sink.as_ref() {
            Some(tx) => tx.send(notification).is_ok(),
            None => false,
        };
        if !delivered {
            *sink = None;
        }
        delivered
    }

    fn is_closed(&self) -> bool {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Drop the sink, which ends the subscriber's receive loop.
    fn close(&self) {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// systemd manager reachable over the system bus.
pub struct SystemdBus {
    conn: Connection,
    next_id: AtomicU64,
    subscriptions: Mutex<HashMap<SubscriptionId, Arc<Forwarder>>>,
}

impl SystemdBus {
    /// Connect to the system bus.
    pub fn system() -> Result<Self, SystemdBusError> {
        let conn = Connection::system().map_err(SystemdBusError::Connect)?;
        Ok(Self {
            conn,
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    fn manager(&self) -> zbus::Result<Proxy<'static>> {
        Proxy::new(
            &self.conn,
            SYSTEMD_DESTINATION,
            MANAGER_PATH,
            MANAGER_INTERFACE,
        )
    }
}

/// `JobRemoved(u id, o job, s unit, s result)`.
type JobRemovedBody = (u32, OwnedObjectPath, String, String);

impl ServiceBus for SystemdBus {
    type Error = SystemdBusError;

    fn subscribe_job_removed(
        &self,
        sink: mpsc::Sender<ServiceNotification>,
    ) -> Result<SubscriptionId, SystemdBusError> {
        let manager = self.manager().map_err(SystemdBusError::Subscribe)?;
        let signals = manager
            .receive_signal("JobRemoved")
            .map_err(SystemdBusError::Subscribe)?;

        // systemd only broadcasts job signals once some client subscribed.
        if let Err(e) = manager.call_method("Subscribe", &()) {
            warn!("Manager.Subscribe failed, relying on other subscribers: {}", e);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let forwarder = Arc::new(Forwarder::new(sink));
        let thread_forwarder = forwarder.clone();

        std::thread::Builder::new()
            .name(format!("systemd-jobs-{}", id))
            .spawn(move || {
                for message in signals {
                    if thread_forwarder.is_closed() {
                        break;
                    }
                    let (_, _, unit, result) = match message.body().deserialize::<JobRemovedBody>() {
                        Ok(body) => body,
                        Err(e) => {
                            warn!("ignore malformed JobRemoved signal: {}", e);
                            continue;
                        }
                    };
                    debug!("JobRemoved: {} -> {}", unit, result);
                    if !thread_forwarder.forward(ServiceNotification::new(unit, result)) {
                        break;
                    }
                }
                debug!("JobRemoved forwarding {} stopped", id);
            })
            .map_err(SystemdBusError::Thread)?;

        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, forwarder);
        info!("subscribed to systemd JobRemoved signals");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let forwarder = self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        let Some(forwarder) = forwarder else {
            warn!("unsubscribe for unknown subscription {}", id);
            return;
        };
        forwarder.close();

        // Pairs with the Subscribe call made for this subscription.
        match self.manager().and_then(|m| m.call_method("Unsubscribe", &())) {
            Ok(_) => info!("unsubscribed from systemd JobRemoved signals"),
            Err(e) => debug!("Manager.Unsubscribe failed: {}", e),
        }
    }

    fn active_state(&self, unit_path: &str) -> Result<ServiceState, SystemdBusError> {
        let path = format!("{}{}", UNIT_PATH_PREFIX, unit_path);
        let reply = self
            .conn
            .call_method(
                Some(SYSTEMD_DESTINATION),
                path.as_str(),
                Some(PROPERTIES_INTERFACE),
                "Get",
                &(UNIT_INTERFACE, "ActiveState"),
            )
            .map_err(|source| SystemdBusError::Query {
                unit: unit_path.to_string(),
                source,
            })?;
        let value = reply
            .body()
            .deserialize::<OwnedValue>()
            .map_err(|e| SystemdBusError::Decode {
                unit: unit_path.to_string(),
                message: e.to_string(),
            })?;
        let state = String::try_from(value).map_err(|e| SystemdBusError::Decode {
            unit: unit_path.to_string(),
            message: e.to_string(),
        })?;
        Ok(ServiceState::from(state.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarder_passes_notifications_until_closed() {
        let (tx, rx) = mpsc::channel();
        let forwarder = Forwarder::new(tx);
        assert!(forwarder.forward(ServiceNotification::new("kanata.service", "done")));
        assert_eq!(
            rx.try_recv().unwrap(),
            ServiceNotification::new("kanata.service", "done")
        );

        forwarder.close();
        assert!(forwarder.is_closed());
        assert!(!forwarder.forward(ServiceNotification::new("kanata.service", "done")));
    }

    #[test]
    fn close_disconnects_receiver_immediately() {
        let (tx, rx) = mpsc::channel();
        let forwarder = Arc::new(Forwarder::new(tx));
        let held_by_thread = forwarder.clone();

        forwarder.close();

        assert_eq!(rx.try_recv(), Err(mpsc::TryRecvError::Disconnected));
        drop(held_by_thread);
    }

    #[test]
    fn dropped_receiver_closes_forwarder() {
        let (tx, rx) = mpsc::channel();
        let forwarder = Forwarder::new(tx);
        drop(rx);
        assert!(!forwarder.forward(ServiceNotification::new("kanata.service", "done")));
        assert!(forwarder.is_closed());
    }
}
