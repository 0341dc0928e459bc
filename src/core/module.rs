use super::{Event, EventBus, EventType, FrameFlag, FramePtr};
use crate::observability::ModuleMetrics;
use anyhow::{bail, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Id of a module not bound to any container
pub const INVALID_MODULE_ID: usize = usize::MAX;

/// One processing stage of the graph.
///
/// Engine-routed modules only transform frames; the container forwards them.
/// Self-transmitting modules (see [`ModuleBase::self_transmitting`]) push
/// frames downstream themselves through [`ModuleBase::transmit_data`].
#[async_trait]
pub trait Module: Send + Sync {
    fn base(&self) -> &ModuleBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    /// Called once with the module's JSON config before it is bound
    async fn open(&mut self, _config: Value) -> Result<()> {
        Ok(())
    }

    /// Called when the owning pipeline stops
    async fn close(&self) {}

    /// Transform one frame. Zero means success.
    async fn process(&self, frame: &FramePtr) -> i32;

    async fn on_eos(&self, _stream_id: &str) {}
}

/// Receives frames from a self-transmitting module that has no container
pub trait ModuleObserver: Send + Sync {
    fn notify(&self, frame: FramePtr);
}

/// The side of a pipeline that modules talk to
#[async_trait]
pub trait Container: Send + Sync {
    /// Route `frame` along the graph edges leaving `module`
    async fn provide_data(&self, module: &ModuleBase, frame: FramePtr) -> Result<()>;

    fn event_bus(&self) -> &EventBus;

    fn module_profiler(&self, module_name: &str) -> Option<Arc<ModuleMetrics>>;

    /// Give an id back once its module has been detached
    fn release_module_id(&self, id: usize);
}

/// Non-zero status returned by a module's transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessError {
    pub module: String,
    pub stream_id: String,
    pub code: i32,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module {} failed on stream {} with code {}",
            self.module, self.stream_id, self.code
        )
    }
}

impl std::error::Error for ProcessError {}

/// State every module carries: identity, container binding, transmit mode
pub struct ModuleBase {
    name: String,
    id: AtomicUsize,
    transmit: bool,
    container: RwLock<Option<Weak<dyn Container>>>,
    observer: RwLock<Option<Arc<dyn ModuleObserver>>>,
}

impl ModuleBase {
    /// Base of an engine-routed module
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_mode(name.into(), false)
    }

    /// Base of a module that pushes its own results downstream
    pub fn self_transmitting(name: impl Into<String>) -> Self {
        Self::with_mode(name.into(), true)
    }

    fn with_mode(name: String, transmit: bool) -> Self {
        Self {
            name,
            id: AtomicUsize::new(INVALID_MODULE_ID),
            transmit,
            container: RwLock::new(None),
            observer: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bit index of this module in a frame's routing mask
    pub fn id(&self) -> usize {
        self.id.load(Ordering::Acquire)
    }

    pub fn has_transmit(&self) -> bool {
        self.transmit
    }

    pub fn is_bound(&self) -> bool {
        self.container().is_some()
    }

    /// Attach to `container` under `id`
    pub fn bind(&self, container: Weak<dyn Container>, id: usize) {
        let mut slot = self.container.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(container);
        self.id.store(id, Ordering::Release);
    }

    /// Detach from the container, handing the id back to it while it is
    /// still alive. Returns the id the module held.
    pub fn unbind(&self) -> Option<usize> {
        let container = {
            let mut slot = self.container.write().unwrap_or_else(|p| p.into_inner());
            slot.take()
        }?;
        let id = self.id.swap(INVALID_MODULE_ID, Ordering::AcqRel);
        if id == INVALID_MODULE_ID {
            return None;
        }
        if let Some(container) = container.upgrade() {
            container.release_module_id(id);
        }
        Some(id)
    }

    fn container(&self) -> Option<Arc<dyn Container>> {
        let slot = self.container.read().unwrap_or_else(|p| p.into_inner());
        slot.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_observer(&self, observer: Option<Arc<dyn ModuleObserver>>) {
        let mut slot = self.observer.write().unwrap_or_else(|p| p.into_inner());
        *slot = observer;
    }

    fn notify_observer(&self, frame: FramePtr) {
        let observer = self.observer.read().unwrap_or_else(|p| p.into_inner()).clone();
        if let Some(observer) = observer {
            observer.notify(frame);
        }
    }

    /// Post an event on the container's bus
    pub fn post_event(&self, event_type: EventType, message: impl Into<String>) -> bool {
        self.post(Event::new(event_type, self.name.as_str(), message))
    }

    pub fn post(&self, event: Event) -> bool {
        match self.container() {
            Some(container) => container.event_bus().post_event(event),
            None => {
                warn!("[{}] module's container is not set", self.name);
                false
            }
        }
    }

    /// Metrics slot for this module, if the container profiles
    pub fn profiler(&self) -> Option<Arc<ModuleMetrics>> {
        self.container()?.module_profiler(&self.name)
    }

    /// Push a frame downstream from a self-transmitting module
    pub async fn transmit_data(&self, frame: FramePtr) -> Result<()> {
        if !self.transmit {
            bail!("module {} is routed by its container and cannot transmit", self.name);
        }
        self.do_transmit_data(frame).await
    }

    pub(crate) async fn do_transmit_data(&self, frame: FramePtr) -> Result<()> {
        // a nested stream is torn down once its EOS gets out
        if frame.is_eos() {
            if let Some(parent) = frame.parent() {
                if parent.streams().is_removed(parent.stream_id()) {
                    frame.streams().set_removed(frame.stream_id(), false);
                }
            }
        }

        match self.container() {
            Some(container) => container.provide_data(self, frame).await,
            None => {
                if self.transmit {
                    self.notify_observer(frame);
                }
                Ok(())
            }
        }
    }
}

impl Drop for ModuleBase {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl fmt::Debug for ModuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBase")
            .field("name", &self.name)
            .field("id", &self.id())
            .field("transmit", &self.transmit)
            .finish()
    }
}

/// Run one frame through `module` and move it on.
///
/// Frames of removed streams skip the transform but still drain downstream.
/// A non-zero transform status stops the frame here and comes back as a
/// [`ProcessError`].
pub async fn dispatch(module: &dyn Module, frame: FramePtr) -> Result<()> {
    let base = module.base();
    let streams = frame.streams();

    let mut removed = streams.is_removed(frame.stream_id());
    if !removed {
        if let Some(parent) = frame.parent() {
            if parent.streams().is_removed(parent.stream_id()) {
                debug!(
                    "[{}] stream {} removed along with parent stream {}",
                    base.name(),
                    frame.stream_id(),
                    parent.stream_id()
                );
                streams.set_removed(frame.stream_id(), true);
                removed = true;
            }
        }
    }

    if base.has_transmit() {
        if removed {
            frame.set_flag(FrameFlag::Removed);
        }
        return run_process(module, &frame).await;
    }

    if frame.is_eos() {
        module.on_eos(frame.stream_id()).await;
    } else if removed {
        if let Some(profiler) = base.profiler() {
            profiler.record_frame_skipped();
        }
    } else {
        run_process(module, &frame).await?;
    }
    base.do_transmit_data(frame).await
}

async fn run_process(module: &dyn Module, frame: &FramePtr) -> Result<()> {
    let profiler = module.base().profiler();
    let start = profiler.as_ref().map(|p| p.start_processing());

    let code = module.process(frame).await;

    if let (Some(profiler), Some(start)) = (profiler.as_ref(), start) {
        profiler.finish_processing(start);
        if code == 0 {
            profiler.record_frame_processed();
        } else {
            profiler.record_error();
        }
    }

    if code != 0 {
        return Err(ProcessError {
            module: module.name().to_string(),
            stream_id: frame.stream_id().to_string(),
            code,
        }
        .into());
    }
    Ok(())
}
