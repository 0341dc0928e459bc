use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, RwLock};
use std::time::Duration;

/// Re-check period for end-of-stream waiters
pub const EOS_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// End-of-stream and stream-removal state shared by every module thread
/// touching the same streams.
///
/// The two tables are guarded independently and no method holds both locks.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    /// stream id -> EOS frame released
    eos: Mutex<HashMap<String, bool>>,
    eos_cond: Condvar,

    /// stream id -> removed; absent means not removed
    removed: RwLock<HashMap<String, bool>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a top-level EOS frame is created
    pub(crate) fn register_eos(&self, stream_id: &str) {
        let mut eos = self.eos.lock().unwrap_or_else(|p| p.into_inner());
        eos.insert(stream_id.to_string(), false);
    }

    /// Called when a top-level EOS frame is released
    pub(crate) fn mark_eos_reached(&self, stream_id: &str) {
        {
            let mut eos = self.eos.lock().unwrap_or_else(|p| p.into_inner());
            eos.insert(stream_id.to_string(), true);
        }
        debug!("stream {} end of stream released", stream_id);
        self.eos_cond.notify_all();
    }

    /// Pending EOS state without consuming it: `None` if nothing is registered
    pub fn eos_state(&self, stream_id: &str) -> Option<bool> {
        let eos = self.eos.lock().unwrap_or_else(|p| p.into_inner());
        eos.get(stream_id).copied()
    }

    /// Check whether the end of stream has been reached, consuming the entry
    /// when it has.
    ///
    /// With `sync` the call blocks until the registered EOS frame is released.
    /// A stream with no registered EOS returns false straight away.
    pub fn wait_eos(&self, stream_id: &str, sync: bool) -> bool {
        let mut eos = self.eos.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            match take_reached(&mut eos, stream_id) {
                Some(true) => {
                    info!("stream {} reached end of stream", stream_id);
                    return true;
                }
                Some(false) if sync => {
                    eos = self
                        .eos_cond
                        .wait_timeout(eos, EOS_POLL_INTERVAL)
                        .unwrap_or_else(|p| p.into_inner())
                        .0;
                }
                _ => return false,
            }
        }
    }

    /// Async flavor of a synchronous [`wait_eos`](Self::wait_eos); polls
    /// without blocking a runtime thread.
    pub async fn wait_eos_async(&self, stream_id: &str) -> bool {
        let mut ticker = tokio::time::interval(EOS_POLL_INTERVAL);
        loop {
            let state = {
                let mut eos = self.eos.lock().unwrap_or_else(|p| p.into_inner());
                take_reached(&mut eos, stream_id)
            };
            match state {
                Some(true) => {
                    info!("stream {} reached end of stream", stream_id);
                    return true;
                }
                Some(false) => {
                    ticker.tick().await;
                }
                None => return false,
            }
        }
    }

    /// Mark a stream removed, or clear the mark.
    /// Clearing a stream that was never marked leaves the table untouched.
    pub fn set_removed(&self, stream_id: &str, removed: bool) {
        let mut table = self.removed.write().unwrap_or_else(|p| p.into_inner());
        if removed {
            if table.insert(stream_id.to_string(), true).is_none() {
                info!("stream {} marked removed", stream_id);
            }
        } else if table.remove(stream_id).is_some() {
            info!("stream {} removal cleared", stream_id);
        }
    }

    pub fn is_removed(&self, stream_id: &str) -> bool {
        let table = self.removed.read().unwrap_or_else(|p| p.into_inner());
        table.get(stream_id).copied().unwrap_or(false)
    }

    /// Raw removal entry, `None` when the stream has no entry at all
    pub fn removed_entry(&self, stream_id: &str) -> Option<bool> {
        let table = self.removed.read().unwrap_or_else(|p| p.into_inner());
        table.get(stream_id).copied()
    }
}

/// Some(true): reached and erased. Some(false): pending. None: unregistered.
fn take_reached(eos: &mut HashMap<String, bool>, stream_id: &str) -> Option<bool> {
    match eos.get(stream_id).copied() {
        Some(true) => {
            eos.remove(stream_id);
            Some(true)
        }
        other => other,
    }
}
