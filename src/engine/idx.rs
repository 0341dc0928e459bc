use log::warn;
use std::collections::HashMap;
use std::sync::Mutex;

/// Width of a frame's routing mask, and so the module ceiling per pipeline
pub const MAX_MODULE_NUM: usize = u64::BITS as usize;

/// Concurrently active streams per pipeline
pub const MAX_STREAM_NUM: usize = 128;

#[derive(Debug)]
struct IdxState {
    module_mask: u64,
    stream_slots: [bool; MAX_STREAM_NUM],
    stream_map: HashMap<String, u32>,
}

/// Hands out module ids and stream slot indices for one pipeline.
///
/// All operations go through one lock; they run on attach/detach, not per
/// frame.
#[derive(Debug)]
pub struct IdxManager {
    state: Mutex<IdxState>,
}

impl IdxManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IdxState {
                module_mask: 0,
                stream_slots: [false; MAX_STREAM_NUM],
                stream_map: HashMap::new(),
            }),
        }
    }

    /// Lowest free module id, or `None` when all 64 are live
    pub fn allocate_module_id(&self) -> Option<usize> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let free = state.module_mask.trailing_ones() as usize;
        if free >= MAX_MODULE_NUM {
            warn!("module id pool exhausted ({} modules)", MAX_MODULE_NUM);
            return None;
        }
        state.module_mask |= 1u64 << free;
        Some(free)
    }

    /// Return a module id; only once the module is fully detached
    pub fn release_module_id(&self, id: usize) {
        if id >= MAX_MODULE_NUM {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.module_mask &= !(1u64 << id);
    }

    /// Slot of `stream_id`, assigning the lowest free one on first use
    pub fn allocate_stream_index(&self, stream_id: &str) -> Option<u32> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(&index) = state.stream_map.get(stream_id) {
            return Some(index);
        }

        let Some(slot) = state.stream_slots.iter().position(|used| !used) else {
            warn!("stream slot pool exhausted, cannot admit stream {}", stream_id);
            return None;
        };
        state.stream_slots[slot] = true;
        state.stream_map.insert(stream_id.to_string(), slot as u32);
        Some(slot as u32)
    }

    pub fn release_stream_index(&self, stream_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(index) = state.stream_map.remove(stream_id) {
            state.stream_slots[index as usize] = false;
        }
    }

    pub fn stream_index(&self, stream_id: &str) -> Option<u32> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.stream_map.get(stream_id).copied()
    }

    pub fn active_streams(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.stream_map.len()
    }
}

impl Default for IdxManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_ids_are_lowest_first() {
        let idx = IdxManager::new();
        assert_eq!(idx.allocate_module_id(), Some(0));
        assert_eq!(idx.allocate_module_id(), Some(1));
        assert_eq!(idx.allocate_module_id(), Some(2));

        idx.release_module_id(1);
        assert_eq!(idx.allocate_module_id(), Some(1));
        assert_eq!(idx.allocate_module_id(), Some(3));
    }

    #[test]
    fn test_release_out_of_range_is_ignored() {
        let idx = IdxManager::new();
        idx.release_module_id(64);
        idx.release_module_id(usize::MAX);
        assert_eq!(idx.allocate_module_id(), Some(0));
    }

    #[test]
    fn test_stream_slot_reuse() {
        let idx = IdxManager::new();
        assert_eq!(idx.allocate_stream_index("a"), Some(0));
        assert_eq!(idx.allocate_stream_index("b"), Some(1));

        idx.release_stream_index("a");
        assert_eq!(idx.stream_index("a"), None);
        assert_eq!(idx.allocate_stream_index("c"), Some(0));
        assert_eq!(idx.active_streams(), 2);
    }
}
