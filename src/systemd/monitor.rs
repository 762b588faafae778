//! Watches one unit and reports when it becomes active.
//!
//! Every `JobRemoved` notification is filtered by unit name and job result
//! before anything else happens; only a finished (`done`) job for the
//! watched unit triggers an `ActiveState` query.  A failed query drops that
//! notification: there is no retry, the next restart will be caught again.

use crate::event::{Event, ServiceNotification};
use crate::traits::{ServiceBus, SubscriptionId};
use log::{debug, info, warn};
use std::sync::{mpsc, Arc};

/// The two names a unit goes by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitNames {
    /// As it appears in `JobRemoved`, e.g. `kanata.service`.
    pub service_name: String,
    /// Escaped object-path suffix, e.g. `kanata_2eservice`.
    pub dbus_name: String,
}

/// The bus could not be subscribed to; reconnect-on-restart is disabled.
#[derive(Debug, thiserror::Error)]
#[error("failed to subscribe to service notifications: {0}")]
pub struct SubscriptionError(String);

/// Turns `JobRemoved` notifications for one unit into
/// [`Event::ServiceActivated`].
pub struct ServiceStateMonitor<B: ServiceBus> {
    bus: Arc<B>,
    unit: UnitNames,
}

/// Live subscription.  Consumed by [`unsubscribe`](Self::unsubscribe), so
/// it cannot be released twice.
pub struct SubscriptionHandle<B: ServiceBus> {
    bus: Arc<B>,
    id: SubscriptionId,
}

impl<B: ServiceBus> SubscriptionHandle<B> {
    pub fn unsubscribe(self) {
        debug!("unsubscribing from service notifications ({})", self.id);
        self.bus.unsubscribe(self.id);
    }
}

impl<B: ServiceBus> ServiceStateMonitor<B> {
    pub fn new(bus: Arc<B>, unit: UnitNames) -> Self {
        Self { bus, unit }
    }

    pub fn unit(&self) -> &UnitNames {
        &self.unit
    }

    /// Subscribe and forward activations of the watched unit into `events`.
    ///
    /// Notifications are handled one at a time on a dedicated thread, which
    /// ends once the bus stops forwarding or `events` is dropped.
    pub fn subscribe(
        &self,
        events: mpsc::Sender<Event>,
    ) -> Result<SubscriptionHandle<B>, SubscriptionError> {
        let (tx, rx) = mpsc::channel::<ServiceNotification>();
        let id = self
            .bus
            .subscribe_job_removed(tx)
            .map_err(|e| SubscriptionError(e.to_string()))?;

        let bus = self.bus.clone();
        let unit = self.unit.clone();
        let spawned = std::thread::Builder::new()
            .name("service-monitor".into())
            .spawn(move || {
                for notification in rx {
                    if let Some(event) = handle_notification(bus.as_ref(), &unit, &notification) {
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                }
                debug!("service monitor for {} stopped", unit.service_name);
            });

        if let Err(e) = spawned {
            self.bus.unsubscribe(id);
            return Err(SubscriptionError(format!("failed to spawn monitor thread: {}", e)));
        }

        info!("watching {} for restarts", self.unit.service_name);
        Ok(SubscriptionHandle {
            bus: self.bus.clone(),
            id,
        })
    }
}

/// Decide what one notification means for the watched unit.
///
/// Returns [`Event::ServiceActivated`] only for a `done` job of the watched
/// unit whose state query answers `active`.
pub fn handle_notification<B: ServiceBus>(
    bus: &B,
    unit: &UnitNames,
    notification: &ServiceNotification,
) -> Option<Event> {
    if !notification.is_done_for(&unit.service_name) {
        return None;
    }

    let state = match bus.active_state(&unit.dbus_name) {
        Ok(state) => state,
        Err(e) => {
            warn!("failed to get {} state: {}", unit.service_name, e);
            return None;
        }
    };

    if state.is_active() {
        info!("{} just started", unit.service_name);
        Some(Event::ServiceActivated)
    } else {
        debug!("{} finished a job, now {}", unit.service_name, state);
        None
    }
}

//  Tests
