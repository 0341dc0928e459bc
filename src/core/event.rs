use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Error,
    Warning,
    EndOfStream,
    StreamError,
    Info,
}

/// Notification posted by a module or the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub module_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    pub message: String,
}

impl Event {
    pub fn new(
        event_type: EventType,
        module_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            module_name: module_name.into(),
            stream_id: None,
            message: message.into(),
        }
    }

    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }
}

/// Multi-producer event queue owned by a pipeline
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    running: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            running: AtomicBool::new(true),
        }
    }

    /// Queue an event. Returns false once the bus has been stopped.
    pub fn post_event(&self, event: Event) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    pub fn try_poll_event(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn poll_event(&self, timeout: Duration) -> Option<Event> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Reject further posts; already queued events can still be polled
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
