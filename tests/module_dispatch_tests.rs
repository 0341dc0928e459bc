use anyhow::Result;
use async_trait::async_trait;
use framegraph::core::{
    dispatch, Container, EventBus, EventType, Frame, FramePtr, Module, ModuleBase,
    ModuleObserver, ProcessError, StreamRegistry, INVALID_MODULE_ID,
};
use framegraph::observability::ModuleMetrics;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

struct Probe {
    base: ModuleBase,
    code: AtomicI32,
    processed: AtomicUsize,
    eos_seen: Mutex<Vec<String>>,
}

impl Probe {
    fn routed(name: &str) -> Self {
        Self::with_base(ModuleBase::new(name))
    }

    fn transmitting(name: &str) -> Self {
        Self::with_base(ModuleBase::self_transmitting(name))
    }

    fn with_base(base: ModuleBase) -> Self {
        Self {
            base,
            code: AtomicI32::new(0),
            processed: AtomicUsize::new(0),
            eos_seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Module for Probe {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    async fn process(&self, _frame: &FramePtr) -> i32 {
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.code.load(Ordering::SeqCst)
    }

    async fn on_eos(&self, stream_id: &str) {
        self.eos_seen.lock().unwrap().push(stream_id.to_string());
    }
}

/// Container that records what it is asked to route
#[derive(Default)]
struct Recorder {
    bus: EventBus,
    routed: Mutex<Vec<String>>,
    released: Mutex<Vec<usize>>,
    metrics: Option<Arc<ModuleMetrics>>,
}

#[async_trait]
impl Container for Recorder {
    async fn provide_data(&self, module: &ModuleBase, frame: FramePtr) -> Result<()> {
        self.routed
            .lock()
            .unwrap()
            .push(format!("{}:{}", module.name(), frame.stream_id()));
        Ok(())
    }

    fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    fn module_profiler(&self, _module_name: &str) -> Option<Arc<ModuleMetrics>> {
        self.metrics.clone()
    }

    fn release_module_id(&self, id: usize) {
        self.released.lock().unwrap().push(id);
    }
}

fn bind(module: &Probe, container: &Arc<Recorder>, id: usize) {
    let weak: Weak<dyn Container> = Arc::downgrade(container) as Weak<dyn Container>;
    module.base().bind(weak, id);
}

#[tokio::test]
async fn test_routed_success_forwards() {
    let streams = Arc::new(StreamRegistry::new());
    let container = Arc::new(Recorder::default());
    let probe = Probe::routed("decoder");
    bind(&probe, &container, 3);

    let frame = Frame::create(&streams, "cam0", false, None).unwrap();
    dispatch(&probe, frame).await.unwrap();

    assert_eq!(probe.processed.load(Ordering::SeqCst), 1);
    assert_eq!(*container.routed.lock().unwrap(), vec!["decoder:cam0"]);
}

#[tokio::test]
async fn test_routed_failure_stops_frame() {
    let streams = Arc::new(StreamRegistry::new());
    let container = Arc::new(Recorder::default());
    let probe = Probe::routed("decoder");
    probe.code.store(7, Ordering::SeqCst);
    bind(&probe, &container, 0);

    let frame = Frame::create(&streams, "cam0", false, None).unwrap();
    let err = dispatch(&probe, frame).await.unwrap_err();

    let process_error = err.downcast_ref::<ProcessError>().unwrap();
    assert_eq!(process_error.code, 7);
    assert_eq!(process_error.stream_id, "cam0");
    assert!(container.routed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_removed_stream_skips_transform_but_drains() {
    let streams = Arc::new(StreamRegistry::new());
    let metrics = Arc::new(ModuleMetrics::new("decoder"));
    let container = Arc::new(Recorder {
        metrics: Some(metrics.clone()),
        ..Default::default()
    });
    let probe = Probe::routed("decoder");
    bind(&probe, &container, 0);

    streams.set_removed("cam0", true);
    let frame = Frame::create(&streams, "cam0", false, None).unwrap();
    dispatch(&probe, frame).await.unwrap();

    assert_eq!(probe.processed.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.frames_skipped(), 1);
    assert_eq!(container.routed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_eos_runs_hook_instead_of_transform() {
    let streams = Arc::new(StreamRegistry::new());
    let container = Arc::new(Recorder::default());
    let probe = Probe::routed("decoder");
    bind(&probe, &container, 0);

    let eos = Frame::create(&streams, "cam1", true, None).unwrap();
    dispatch(&probe, eos).await.unwrap();

    assert_eq!(probe.processed.load(Ordering::SeqCst), 0);
    assert_eq!(*probe.eos_seen.lock().unwrap(), vec!["cam1"]);
    assert_eq!(container.routed.lock().unwrap().len(), 1);
    // the recorder dropped its reference, so the frame is gone
    assert!(streams.wait_eos("cam1", false));
}

#[tokio::test]
async fn test_transmitting_module_gets_removed_flag() {
    let streams = Arc::new(StreamRegistry::new());
    let container = Arc::new(Recorder::default());
    let probe = Probe::transmitting("tracker");
    bind(&probe, &container, 0);

    streams.set_removed("cam0", true);
    let frame = Frame::create(&streams, "cam0", false, None).unwrap();
    dispatch(&probe, frame.clone()).await.unwrap();

    assert!(frame.is_removed());
    assert_eq!(probe.processed.load(Ordering::SeqCst), 1);
    // it decides itself whether to push the frame on
    assert!(container.routed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_parent_removal_propagates_to_child_stream() {
    let streams = Arc::new(StreamRegistry::new());
    let container = Arc::new(Recorder::default());
    let probe = Probe::routed("inner");
    bind(&probe, &container, 0);

    let outer = Frame::create(&streams, "outer", false, None).unwrap();
    streams.set_removed("outer", true);
    let inner = Frame::create(&streams, "inner", false, Some(outer)).unwrap();
    dispatch(&probe, inner).await.unwrap();

    assert!(streams.is_removed("inner"));
    assert_eq!(probe.processed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_child_eos_clears_its_removal() {
    let streams = Arc::new(StreamRegistry::new());
    let container = Arc::new(Recorder::default());
    let probe = Probe::routed("inner");
    bind(&probe, &container, 0);

    let outer = Frame::create(&streams, "outer", false, None).unwrap();
    streams.set_removed("outer", true);
    let inner_eos = Frame::create(&streams, "inner", true, Some(outer)).unwrap();
    dispatch(&probe, inner_eos).await.unwrap();

    assert!(!streams.is_removed("inner"));
    assert_eq!(streams.removed_entry("inner"), None);
}

#[tokio::test]
async fn test_transmit_data_requires_capability() {
    let streams = Arc::new(StreamRegistry::new());
    let routed = Probe::routed("decoder");
    let frame = Frame::create(&streams, "cam0", false, None).unwrap();

    assert!(routed.base().transmit_data(frame).await.is_err());
}

struct Collect(Mutex<Vec<String>>);

impl ModuleObserver for Collect {
    fn notify(&self, frame: FramePtr) {
        self.0.lock().unwrap().push(frame.stream_id().to_string());
    }
}

#[tokio::test]
async fn test_unbound_transmitter_notifies_observer() {
    let streams = Arc::new(StreamRegistry::new());
    let probe = Probe::transmitting("standalone");
    let observer = Arc::new(Collect(Mutex::new(Vec::new())));
    probe.base().set_observer(Some(observer.clone() as Arc<dyn ModuleObserver>));

    let frame = Frame::create(&streams, "cam0", false, None).unwrap();
    probe.base().transmit_data(frame).await.unwrap();

    assert_eq!(*observer.0.lock().unwrap(), vec!["cam0"]);
}

#[test]
fn test_post_event_needs_container() {
    let container = Arc::new(Recorder::default());
    let probe = Probe::routed("decoder");
    assert!(!probe.base().post_event(EventType::Info, "lonely"));

    bind(&probe, &container, 1);
    assert!(probe.base().post_event(EventType::Warning, "bound"));

    let event = container.bus.poll_event(Duration::from_millis(10)).unwrap();
    assert_eq!(event.event_type, EventType::Warning);
    assert_eq!(event.module_name, "decoder");
}

#[test]
fn test_unbind_returns_id_to_container() {
    let container = Arc::new(Recorder::default());
    let probe = Probe::routed("decoder");
    bind(&probe, &container, 9);
    assert_eq!(probe.base().id(), 9);

    assert_eq!(probe.base().unbind(), Some(9));
    assert_eq!(probe.base().id(), INVALID_MODULE_ID);
    assert_eq!(*container.released.lock().unwrap(), vec![9]);

    let other = Probe::routed("encoder");
    bind(&other, &container, 4);
    drop(other);
    assert_eq!(*container.released.lock().unwrap(), vec![9, 4]);
}
