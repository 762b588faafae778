//! Test doubles shared by the unit tests of several modules.

use crate::event::{ServiceNotification, ServiceState};
use crate::kanata::connection::{Chunk, ReadError};
use crate::traits::{ChunkSource, Indicator, ServiceBus, SubscriptionId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex};

//  Indicator

/// One recorded [`Indicator`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Layer(String),
    Visible(bool),
    Destroy,
}

/// Records every call and tracks the resulting state.
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    pub calls: Vec<Call>,
    pub text: String,
    pub visible: bool,
}

impl RecordingIndicator {
    /// Every text passed to `set_layer`, in order.
    pub fn layers(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Layer(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Indicator for RecordingIndicator {
    fn set_layer(&mut self, text: &str) {
        self.text = text.to_string();
        self.calls.push(Call::Layer(text.to_string()));
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.calls.push(Call::Visible(visible));
    }

    fn destroy(&mut self) {
        self.calls.push(Call::Destroy);
    }
}

//  Chunk source

/// Replays scripted reads; an exhausted script reads as end-of-stream.
#[derive(Default)]
pub struct ScriptedSource {
    pub reads: VecDeque<Result<Chunk, ReadError>>,
    pub reads_done: usize,
    pub closes: usize,
}

impl ScriptedSource {
    /// Build a script from raw chunks.  An empty chunk becomes end-of-stream.
    pub fn chunks(chunks: &[&[u8]]) -> Self {
        Self {
            reads: chunks
                .iter()
                .map(|c| {
                    if c.is_empty() {
                        Ok(Chunk::EndOfStream)
                    } else {
                        Ok(Chunk::Data(c.to_vec()))
                    }
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn then(mut self, read: Result<Chunk, ReadError>) -> Self {
        self.reads.push_back(read);
        self
    }
}

impl ChunkSource for ScriptedSource {
    fn read_chunk(&mut self) -> Result<Chunk, ReadError> {
        self.reads_done += 1;
        self.reads.pop_front().unwrap_or(Ok(Chunk::EndOfStream))
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

//  Service bus

#[derive(Debug, thiserror::Error)]
#[error("mock bus error: {0}")]
pub struct MockBusError(pub String);

/// A bus whose state answers are scripted and whose calls are counted.
pub struct MockBus {
    pub state: Mutex<Result<ServiceState, String>>,
    pub fail_subscribe: bool,
    pub sinks: Mutex<Vec<mpsc::Sender<ServiceNotification>>>,
    pub queries: AtomicUsize,
    pub unsubscribes: AtomicUsize,
    next_id: AtomicU64,
}

impl MockBus {
    pub fn with_state(state: ServiceState) -> Self {
        Self {
            state: Mutex::new(Ok(state)),
            fail_subscribe: false,
            sinks: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn failing_query(message: &str) -> Self {
        let bus = Self::with_state(ServiceState::Inactive);
        *bus.state.lock().unwrap() = Err(message.to_string());
        bus
    }

    pub fn unavailable() -> Self {
        Self {
            fail_subscribe: true,
            ..Self::with_state(ServiceState::Inactive)
        }
    }

    /// Deliver `notification` to every subscriber.
    pub fn emit(&self, notification: ServiceNotification) {
        for sink in self.sinks.lock().unwrap().iter() {
            let _ = sink.send(notification.clone());
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }
}

impl ServiceBus for MockBus {
    type Error = MockBusError;

    fn subscribe_job_removed(
        &self,
        sink: mpsc::Sender<ServiceNotification>,
    ) -> Result<SubscriptionId, MockBusError> {
        if self.fail_subscribe {
            return Err(MockBusError("no bus".into()));
        }
        self.sinks.lock().unwrap().push(sink);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn unsubscribe(&self, _id: SubscriptionId) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        // Dropping the senders ends the monitor thread.
        self.sinks.lock().unwrap().clear();
    }

    fn active_state(&self, _unit_path: &str) -> Result<ServiceState, MockBusError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .clone()
            .map_err(MockBusError)
    }
}
