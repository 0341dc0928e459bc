use std::collections::HashMap;
use std::sync::Arc;
use super::ModuleMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub module_name: String,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub errors_count: u64,
    pub avg_latency_us: u64,
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: HashMap<String, Arc<ModuleMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module_name: impl Into<String>, metrics: Arc<ModuleMetrics>) {
        self.metrics.insert(module_name.into(), metrics);
    }

    pub fn snapshot(&self) -> HashMap<String, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(name, metrics)| {
                (
                    name.clone(),
                    MetricsSnapshot {
                        module_name: metrics.module_name().to_string(),
                        frames_processed: metrics.frames_processed(),
                        frames_skipped: metrics.frames_skipped(),
                        errors_count: metrics.errors_count(),
                        avg_latency_us: metrics.avg_latency_us(),
                    },
                )
            })
            .collect()
    }

    pub fn get_module_metrics(&self, module_name: &str) -> Option<Arc<ModuleMetrics>> {
        self.metrics.get(module_name).cloned()
    }
}
