use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::PipelineConfig;
use super::idx::IdxManager;
use super::state::PipelineState;
use crate::core::{
    dispatch, Container, Event, EventBus, EventType, Frame, FramePtr, Module, ModuleBase,
    RoutingAccess, StreamRegistry,
};
use crate::graph::Dag;
use crate::observability::{MetricsCollector, ModuleMetrics, PipelineMonitor};
use crate::registry::ModuleRegistry;

/// Called with every non-EOS frame that has passed all modules on its route
pub type FrameDoneCallback = Arc<dyn Fn(FramePtr) + Send + Sync>;

struct ModuleNode {
    module: Arc<dyn Module>,
    parallelism: usize,
    /// Bits of the direct upstream modules
    parents_mask: u64,
    /// Bits of every module reachable from this one, itself included
    route_mask: u64,
}

/// Runs a DAG of modules, one or more worker tasks per module.
///
/// Frames enter at head modules and are forwarded along edges once every
/// upstream branch has passed them; each frame's routing mask records which
/// modules are done.
pub struct Pipeline {
    name: String,
    dag: Dag,
    /// Vertex visiting order for shutdown
    topo_order: Vec<usize>,
    nodes: Vec<ModuleNode>,
    node_index: HashMap<String, usize>,
    idx: IdxManager,
    streams: Arc<StreamRegistry>,
    event_bus: EventBus,
    collector: Option<MetricsCollector>,
    channel_capacity: usize,
    state: RwLock<PipelineState>,
    senders: RwLock<Vec<Vec<mpsc::Sender<FramePtr>>>>,
    handles: Mutex<Vec<Vec<JoinHandle<()>>>>,
    frame_done: RwLock<Option<FrameDoneCallback>>,
}

impl Pipeline {
    pub async fn build(config: PipelineConfig, registry: &ModuleRegistry) -> Result<Arc<Self>> {
        Self::build_with_streams(config, registry, Arc::new(StreamRegistry::new())).await
    }

    /// Build against an existing stream registry, e.g. one shared with an
    /// enclosing pipeline.
    pub async fn build_with_streams(
        config: PipelineConfig,
        registry: &ModuleRegistry,
        streams: Arc<StreamRegistry>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let node_index: HashMap<String, usize> = config
            .nodes
            .iter()
            .enumerate()
            .map(|(vertex, node)| (node.id.clone(), vertex))
            .collect();

        let mut dag = Dag::with_vertices(config.nodes.len());
        for conn in &config.connections {
            let from = node_index[conn.from.as_str()];
            let to = node_index[conn.to.as_str()];
            dag.add_edge(from, to);
        }

        let order = dag.topo_sort();
        if !order.is_acyclic() {
            let names: Vec<&str> = order
                .unsorted
                .iter()
                .map(|&vertex| config.nodes[vertex].id.as_str())
                .collect();
            bail!("Graph contains a cycle through: {}", names.join(", "));
        }

        let mut modules: Vec<Arc<dyn Module>> = Vec::with_capacity(config.nodes.len());
        for node in &config.nodes {
            let mut module = registry
                .create(&node.node_type, &node.id)
                .ok_or_else(|| anyhow!("Unknown module type: {}", node.node_type))?;
            module
                .open(node.config.clone())
                .await
                .with_context(|| format!("Failed to open module {}", node.id))?;
            modules.push(Arc::from(module));
        }

        let collector = config.pipeline_config.profiling.then(|| {
            let mut collector = MetricsCollector::new();
            for node in &config.nodes {
                collector.register(node.id.clone(), Arc::new(ModuleMetrics::new(node.id.clone())));
            }
            collector
        });

        let idx = IdxManager::new();
        let mut ids = Vec::with_capacity(modules.len());
        for module in &modules {
            let id = idx
                .allocate_module_id()
                .ok_or_else(|| anyhow!("No module id left for {}", module.name()))?;
            ids.push(id);
        }

        let bit = |vertex: usize| 1u64 << ids[vertex];
        let mut parents_masks = vec![0u64; dag.vertex_count()];
        for vertex in 0..dag.vertex_count() {
            for &next in dag.successors(vertex) {
                parents_masks[next] |= bit(vertex);
            }
        }

        let nodes: Vec<ModuleNode> = modules
            .into_iter()
            .enumerate()
            .map(|(vertex, module)| ModuleNode {
                module,
                parallelism: config.nodes[vertex].parallelism,
                parents_mask: parents_masks[vertex],
                route_mask: dag.dfs_from(vertex).fold(0, |mask, v| mask | bit(v)),
            })
            .collect();

        let pipeline = Arc::new_cyclic(|weak: &Weak<Pipeline>| {
            let container: Weak<dyn Container> = weak.clone();
            for (node, &id) in nodes.iter().zip(&ids) {
                node.module.base().bind(container.clone(), id);
            }

            Pipeline {
                name: config.pipeline_config.name.clone(),
                dag,
                topo_order: order.sorted,
                nodes,
                node_index,
                idx,
                streams,
                event_bus: EventBus::new(),
                collector,
                channel_capacity: config.pipeline_config.channel_capacity,
                state: RwLock::new(PipelineState::Idle),
                senders: RwLock::new(Vec::new()),
                handles: Mutex::new(Vec::new()),
                frame_done: RwLock::new(None),
            }
        });

        info!(
            "pipeline {} built with {} modules",
            pipeline.name,
            pipeline.nodes.len()
        );
        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current pipeline state
    pub fn state(&self) -> PipelineState {
        self.state.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Transition to a new state with validation
    fn transition_to(&self, new_state: PipelineState) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if !state.can_transition_to(&new_state) {
            return Err(anyhow!(
                "Invalid state transition: {} -> {}",
                state.name(),
                new_state.name()
            ));
        }
        *state = new_state;
        Ok(())
    }

    pub fn streams(&self) -> &Arc<StreamRegistry> {
        &self.streams
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn module(&self, name: &str) -> Option<Arc<dyn Module>> {
        let &vertex = self.node_index.get(name)?;
        Some(self.nodes[vertex].module.clone())
    }

    /// Module names of the graph's entry points
    pub fn heads(&self) -> Vec<&str> {
        self.dag
            .heads()
            .into_iter()
            .map(|vertex| self.nodes[vertex].module.name())
            .collect()
    }

    pub fn tails(&self) -> Vec<&str> {
        self.dag
            .tails()
            .into_iter()
            .map(|vertex| self.nodes[vertex].module.name())
            .collect()
    }

    pub fn set_frame_done_callback<F>(&self, callback: F)
    where
        F: Fn(FramePtr) + Send + Sync + 'static,
    {
        let mut slot = self.frame_done.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(Arc::new(callback));
    }

    /// Spawn the worker tasks of every module.
    ///
    /// Only an idle pipeline starts; modules are closed by `stop`, so a
    /// stopped pipeline has to be built again.
    pub async fn start(&self) -> Result<()> {
        self.transition_to(PipelineState::Running {
            start_time: Some(Instant::now()),
        })?;

        let mut senders = Vec::with_capacity(self.nodes.len());
        let mut handles = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let mut node_senders = Vec::with_capacity(node.parallelism);
            let mut node_handles = Vec::with_capacity(node.parallelism);
            for worker in 0..node.parallelism {
                let (tx, rx) = mpsc::channel(self.channel_capacity);
                node_senders.push(tx);
                node_handles.push(tokio::spawn(run_worker(node.module.clone(), worker, rx)));
            }
            senders.push(node_senders);
            handles.push(node_handles);
        }

        *self.senders.write().unwrap_or_else(|p| p.into_inner()) = senders;
        *self.handles.lock().unwrap_or_else(|p| p.into_inner()) = handles;

        info!("pipeline {} started", self.name);
        Ok(())
    }

    /// Drain and join the workers, upstream modules first, then close every
    /// module.
    pub async fn stop(&self) -> Result<()> {
        let start_time = match self.state() {
            PipelineState::Running { start_time } => start_time,
            _ => return Ok(()),
        };
        self.transition_to(PipelineState::Stopped {
            duration: start_time.map(|t| t.elapsed()),
        })?;

        let mut handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|p| p.into_inner()));
        for &vertex in &self.topo_order {
            // closing the queue ends the workers once they are drained
            {
                let mut senders = self.senders.write().unwrap_or_else(|p| p.into_inner());
                if let Some(workers) = senders.get_mut(vertex) {
                    workers.clear();
                }
            }
            for handle in handles.get_mut(vertex).map(std::mem::take).unwrap_or_default() {
                if let Err(e) = handle.await {
                    error!("[{}] worker task failed: {}", self.nodes[vertex].module.name(), e);
                }
            }
        }
        self.senders.write().unwrap_or_else(|p| p.into_inner()).clear();

        for node in &self.nodes {
            node.module.close().await;
        }

        info!("pipeline {} stopped", self.name);
        Ok(())
    }

    /// Feed a frame into head module `head`
    pub async fn submit(&self, head: &str, frame: FramePtr) -> Result<()> {
        if !self.state().is_running() {
            bail!("Pipeline {} is not running", self.name);
        }
        let vertex = *self
            .node_index
            .get(head)
            .ok_or_else(|| anyhow!("Unknown module: {}", head))?;
        if self.dag.indegree(vertex) != Some(0) {
            bail!("Module {} is not a head of the graph", head);
        }

        // worker selection needs the slot; the head seeds the routing mask
        self.admit(&frame)?;
        self.transmit(vertex, frame).await
    }

    /// Mark a stream for teardown; its frames keep draining unprocessed
    pub fn remove_stream(&self, stream_id: &str) {
        self.streams.set_removed(stream_id, true);
    }

    pub fn is_stream_removed(&self, stream_id: &str) -> bool {
        self.streams.is_removed(stream_id)
    }

    /// See [`StreamRegistry::wait_eos`]. Blocks the calling thread when
    /// `sync` is set.
    pub fn wait_stream_eos(&self, stream_id: &str, sync: bool) -> bool {
        self.streams.wait_eos(stream_id, sync)
    }

    pub async fn wait_stream_eos_async(&self, stream_id: &str) -> bool {
        self.streams.wait_eos_async(stream_id).await
    }

    pub fn get_monitor(&self) -> Option<PipelineMonitor> {
        self.collector.as_ref().map(|c| PipelineMonitor::new(c.clone()))
    }

    /// Metrics report, if profiling is enabled
    pub fn report(&self) -> Option<String> {
        self.get_monitor().map(|monitor| monitor.generate_report())
    }

    /// Assign the frame its stream slot; idempotent per stream
    fn admit(&self, frame: &Frame) -> Result<()> {
        let index = self
            .idx
            .allocate_stream_index(frame.stream_id())
            .ok_or_else(|| anyhow!("Too many active streams, cannot admit {}", frame.stream_id()))?;
        frame.set_stream_index(index);
        Ok(())
    }

    async fn transmit(&self, vertex: usize, frame: FramePtr) -> Result<()> {
        let sender = {
            let senders = self.senders.read().unwrap_or_else(|p| p.into_inner());
            let workers = senders
                .get(vertex)
                .filter(|workers| !workers.is_empty())
                .ok_or_else(|| anyhow!("Pipeline {} is not running", self.name))?;
            workers[frame.stream_index() as usize % workers.len()].clone()
        };

        let module = self.nodes[vertex].module.name();
        sender
            .send(frame)
            .await
            .map_err(|_| anyhow!("Module {} stopped accepting frames", module))
    }

    fn finish_frame(&self, frame: FramePtr) {
        if !frame.is_eos() {
            let callback = self.frame_done.read().unwrap_or_else(|p| p.into_inner()).clone();
            if let Some(callback) = callback {
                callback(frame);
            }
            return;
        }

        let stream_id = frame.stream_id().to_string();
        info!("pipeline {} drained end of stream {}", self.name, stream_id);
        self.idx.release_stream_index(&stream_id);
        self.streams.set_removed(&stream_id, false);
        self.event_bus.post_event(
            Event::new(EventType::EndOfStream, self.name.as_str(), "end of stream reached")
                .with_stream(stream_id),
        );
    }
}

impl RoutingAccess for Pipeline {}

#[async_trait]
impl Container for Pipeline {
    async fn provide_data(&self, module: &ModuleBase, frame: FramePtr) -> Result<()> {
        let vertex = *self
            .node_index
            .get(module.name())
            .ok_or_else(|| anyhow!("Module {} is not part of pipeline {}", module.name(), self.name))?;

        if self.dag.indegree(vertex) == Some(0) {
            // entering the graph: every module off this head's route is done
            self.set_routing_mask(&frame, !self.nodes[vertex].route_mask);
            self.admit(&frame)?;
        }

        let mask = self.mark_passed(&frame, module.id());
        if mask == u64::MAX {
            self.finish_frame(frame);
            return Ok(());
        }

        for &next in self.dag.successors(vertex) {
            let parents = self.nodes[next].parents_mask;
            if mask & parents == parents {
                self.transmit(next, frame.clone()).await?;
            }
        }
        Ok(())
    }

    fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    fn module_profiler(&self, module_name: &str) -> Option<Arc<ModuleMetrics>> {
        self.collector.as_ref()?.get_module_metrics(module_name)
    }

    fn release_module_id(&self, id: usize) {
        self.idx.release_module_id(id);
    }
}

async fn run_worker(module: Arc<dyn Module>, worker: usize, mut rx: mpsc::Receiver<FramePtr>) {
    while let Some(frame) = rx.recv().await {
        let stream_id = frame.stream_id().to_string();
        if let Err(e) = dispatch(module.as_ref(), frame).await {
            error!("[{}] stream {}: {:#}", module.name(), stream_id, e);
            module.base().post(
                Event::new(EventType::Error, module.name(), e.to_string()).with_stream(stream_id),
            );
        }
    }
    debug!("[{}] worker {} finished", module.name(), worker);
}
