use super::{Collection, StreamRegistry};
use anyhow::{bail, Result};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

/// Timestamp of a frame nobody has stamped yet
pub const TIMESTAMP_UNSET: i64 = -1;

/// Stream index of a frame that has not entered a pipeline
pub const INVALID_STREAM_INDEX: u32 = u32::MAX;

/// Bits of [`Frame::flags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FrameFlag {
    EndOfStream = 1 << 0,
    Invalid = 1 << 1,
    Removed = 1 << 2,
}

impl FrameFlag {
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

pub type FramePtr = Arc<Frame>;

/// One unit of streaming data moving through the graph
pub struct Frame {
    stream_id: String,
    timestamp: AtomicI64,
    flags: AtomicU32,
    stream_index: AtomicU32,

    /// bit = 1: module need not see this frame
    routing_mask: RwLock<u64>,

    /// Frame of the enclosing pipeline when created by a nested one
    parent: Option<FramePtr>,

    pub collection: Collection,

    streams: Arc<StreamRegistry>,
}

impl Frame {
    /// Create a frame for `stream_id`.
    ///
    /// A top-level (parentless) end-of-stream frame registers a pending EOS
    /// for its stream; releasing the frame marks it reached.
    pub fn create(
        streams: &Arc<StreamRegistry>,
        stream_id: impl Into<String>,
        eos: bool,
        parent: Option<FramePtr>,
    ) -> Result<FramePtr> {
        let stream_id = stream_id.into();
        if stream_id.is_empty() {
            bail!("Frame stream_id is empty");
        }

        let mut flags = 0;
        if eos {
            flags |= FrameFlag::EndOfStream.bits();
            if parent.is_none() {
                streams.register_eos(&stream_id);
            }
        }

        Ok(Arc::new(Self {
            stream_id,
            timestamp: AtomicI64::new(TIMESTAMP_UNSET),
            flags: AtomicU32::new(flags),
            stream_index: AtomicU32::new(INVALID_STREAM_INDEX),
            routing_mask: RwLock::new(0),
            parent,
            collection: Collection::new(),
            streams: streams.clone(),
        }))
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp.load(Ordering::Acquire)
    }

    pub fn set_timestamp(&self, timestamp: i64) {
        self.timestamp.store(timestamp, Ordering::Release);
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    /// Flags only accumulate; there is no way to clear one
    pub fn set_flag(&self, flag: FrameFlag) {
        self.flags.fetch_or(flag.bits(), Ordering::AcqRel);
    }

    pub fn has_flag(&self, flag: FrameFlag) -> bool {
        self.flags() & flag.bits() != 0
    }

    pub fn is_eos(&self) -> bool {
        self.has_flag(FrameFlag::EndOfStream)
    }

    pub fn is_invalid(&self) -> bool {
        self.has_flag(FrameFlag::Invalid)
    }

    pub fn is_removed(&self) -> bool {
        self.has_flag(FrameFlag::Removed)
    }

    pub fn parent(&self) -> Option<&FramePtr> {
        self.parent.as_ref()
    }

    /// Registry this frame reports its end of stream to
    pub fn streams(&self) -> &Arc<StreamRegistry> {
        &self.streams
    }

    /// Worker selector assigned by the pipeline
    pub(crate) fn stream_index(&self) -> u32 {
        self.stream_index.load(Ordering::Acquire)
    }

    pub(crate) fn set_stream_index(&self, index: u32) {
        self.stream_index.store(index, Ordering::Release);
    }

    fn load_mask(&self) -> u64 {
        *self.routing_mask.read().unwrap_or_else(|p| p.into_inner())
    }

    fn store_mask(&self, mask: u64) {
        *self.routing_mask.write().unwrap_or_else(|p| p.into_inner()) = mask;
    }

    fn set_mask_bit(&self, bit: usize) -> u64 {
        let mut mask = self.routing_mask.write().unwrap_or_else(|p| p.into_inner());
        if bit < u64::BITS as usize {
            *mask |= 1u64 << bit;
        }
        *mask
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if self.is_eos() && self.parent.is_none() {
            self.streams.mark_eos_reached(&self.stream_id);
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("stream_id", &self.stream_id)
            .field("timestamp", &self.timestamp())
            .field("flags", &self.flags())
            .field("routing_mask", &format_args!("{:#018x}", self.load_mask()))
            .field("has_parent", &self.parent.is_some())
            .field("collection", &self.collection)
            .finish()
    }
}

/// Privileged access to a frame's routing mask.
///
/// Implemented by whatever routes frames along graph edges; everything else
/// only sees the mask through an implementor.
pub trait RoutingAccess {
    fn set_routing_mask(&self, frame: &Frame, mask: u64) {
        frame.store_mask(mask);
    }

    fn routing_mask(&self, frame: &Frame) -> u64 {
        frame.load_mask()
    }

    /// Set the bit of `module_id` and return the resulting mask
    fn mark_passed(&self, frame: &Frame, module_id: usize) -> u64 {
        frame.set_mask_bit(module_id)
    }
}
