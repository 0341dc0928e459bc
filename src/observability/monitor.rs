use super::MetricsCollector;

pub struct PipelineMonitor {
    collector: MetricsCollector,
}

impl PipelineMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();

        if snapshot.is_empty() {
            return "No modules registered".to_string();
        }

        // stable output regardless of map order
        let mut names: Vec<&String> = snapshot.keys().collect();
        names.sort();

        let mut report = String::from("=== Pipeline Metrics ===\n");

        for name in names {
            let metrics = &snapshot[name];
            report.push_str(&format!(
                "\n[{}]\n  Frames: {} frames processed, {} skipped\n  Errors: {}\n  Avg Latency: {}μs\n",
                name,
                metrics.frames_processed,
                metrics.frames_skipped,
                if metrics.errors_count > 0 {
                    format!("{} error{}", metrics.errors_count, if metrics.errors_count == 1 { "" } else { "s" })
                } else {
                    "0 errors".to_string()
                },
                metrics.avg_latency_us
            ));
        }

        report
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}
