use super::idx::MAX_MODULE_NUM;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

fn default_parallelism() -> usize {
    1
}

fn default_channel_capacity() -> usize {
    100
}

fn default_pipeline_name() -> String {
    "pipeline".to_string()
}

/// One module instance of the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Instance name, unique within the pipeline
    pub id: String,

    /// Registered module type
    #[serde(rename = "type")]
    pub node_type: String,

    /// Worker tasks for this module; a stream always lands on the same one
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Handed to the module's `open` hook
    #[serde(default)]
    pub config: Value,
}

/// Directed edge between two node ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Module name used for events the pipeline posts itself
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Queue depth of every worker
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Collect per-module metrics
    #[serde(default)]
    pub profiling: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            channel_capacity: default_channel_capacity(),
            profiling: false,
        }
    }
}

/// Abstract graph a pipeline is assembled from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub nodes: Vec<NodeConfig>,

    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,

    #[serde(default)]
    pub pipeline_config: RuntimeConfig,
}

impl PipelineConfig {
    pub fn from_json(config: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(config).context("Invalid pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse pipeline config {}", path.display()))?;
        Self::from_json(value)
    }

    /// Structural checks. Cycles are caught later by the topological sort.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            bail!("Pipeline has no nodes");
        }
        if self.nodes.len() > MAX_MODULE_NUM {
            bail!(
                "Pipeline has {} nodes, at most {} are supported",
                self.nodes.len(),
                MAX_MODULE_NUM
            );
        }
        if self.pipeline_config.channel_capacity == 0 {
            bail!("channel_capacity must be at least 1");
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                bail!("Node missing id");
            }
            if node.node_type.is_empty() {
                bail!("Node {} missing type", node.id);
            }
            if node.parallelism == 0 {
                bail!("Node {} parallelism must be at least 1", node.id);
            }
            if !ids.insert(node.id.as_str()) {
                bail!("Duplicate node id: {}", node.id);
            }
        }

        for conn in &self.connections {
            for end in [&conn.from, &conn.to] {
                if !ids.contains(end.as_str()) {
                    return Err(anyhow!("Connection references unknown node: {}", end));
                }
            }
            if conn.from == conn.to {
                bail!("Connection from {} to itself", conn.from);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_json(json!({
            "nodes": [{"id": "src", "type": "Passthrough"}]
        }))
        .unwrap();

        assert_eq!(config.nodes[0].parallelism, 1);
        assert_eq!(config.nodes[0].config, Value::Null);
        assert_eq!(config.pipeline_config, RuntimeConfig::default());
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_rejects_unknown_connection() {
        let result = PipelineConfig::from_json(json!({
            "nodes": [{"id": "src", "type": "Passthrough"}],
            "connections": [{"from": "src", "to": "sink"}]
        }));

        assert!(result.unwrap_err().to_string().contains("unknown node: sink"));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let result = PipelineConfig::from_json(json!({
            "nodes": [
                {"id": "a", "type": "Passthrough"},
                {"id": "a", "type": "FrameCounter"}
            ]
        }));

        assert!(result.unwrap_err().to_string().contains("Duplicate node id"));
    }

    #[test]
    fn test_rejects_zero_parallelism() {
        let result = PipelineConfig::from_json(json!({
            "nodes": [{"id": "a", "type": "Passthrough", "parallelism": 0}]
        }));

        assert!(result.is_err());
    }
}
