use crate::core::{FramePtr, Module, ModuleBase};
use anyhow::Result;
use async_trait::async_trait;
use framegraph_macros::RegisterModule;
use log::info;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Counts the frames it processes, per stream.
///
/// With `{"stamp": true}` in its config it also stores the running count in
/// each frame's collection under `"<name>.count"`.
#[derive(RegisterModule)]
#[module_meta(type_name = "FrameCounter", description = "Counts frames per stream")]
pub struct FrameCounter {
    base: ModuleBase,
    stamp: bool,
    counts: Mutex<HashMap<String, u64>>,
}

impl FrameCounter {
    pub fn new(name: &str) -> Self {
        Self {
            base: ModuleBase::new(name),
            stamp: false,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Frames seen so far for `stream_id`
    pub fn count(&self, stream_id: &str) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(|p| p.into_inner());
        counts.get(stream_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(|p| p.into_inner());
        counts.values().sum()
    }
}

#[async_trait]
impl Module for FrameCounter {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    async fn open(&mut self, config: Value) -> Result<()> {
        if let Some(stamp) = config.get("stamp").and_then(|v| v.as_bool()) {
            self.stamp = stamp;
        }
        Ok(())
    }

    async fn process(&self, frame: &FramePtr) -> i32 {
        let count = {
            let mut counts = self.counts.lock().unwrap_or_else(|p| p.into_inner());
            let count = counts.entry(frame.stream_id().to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if self.stamp {
            let key = format!("{}.count", self.name());
            frame.collection.remove(&key);
            if frame.collection.add(key, count).is_err() {
                return 1;
            }
        }
        0
    }

    async fn on_eos(&self, stream_id: &str) {
        info!(
            "[{}] stream {} ended after {} frames",
            self.name(),
            stream_id,
            self.count(stream_id)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Frame, StreamRegistry};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_counts_per_stream() {
        let streams = Arc::new(StreamRegistry::new());
        let counter = FrameCounter::new("counter");

        for stream_id in ["a", "a", "b"] {
            let frame = Frame::create(&streams, stream_id, false, None).unwrap();
            assert_eq!(counter.process(&frame).await, 0);
        }

        assert_eq!(counter.count("a"), 2);
        assert_eq!(counter.count("b"), 1);
        assert_eq!(counter.count("c"), 0);
        assert_eq!(counter.total(), 3);
    }

    #[tokio::test]
    async fn test_stamps_count_into_collection() {
        let streams = Arc::new(StreamRegistry::new());
        let mut counter = FrameCounter::new("counter");
        counter.open(json!({"stamp": true})).await.unwrap();

        let frame = Frame::create(&streams, "a", false, None).unwrap();
        counter.process(&frame).await;
        counter.process(&frame).await;

        assert_eq!(*frame.collection.get::<u64>("counter.count").unwrap(), 2);
    }
}
