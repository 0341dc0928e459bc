pub mod config;
pub mod idx;
pub mod pipeline;
pub mod state;

pub use config::{ConnectionConfig, NodeConfig, PipelineConfig, RuntimeConfig};
pub use idx::{IdxManager, MAX_MODULE_NUM, MAX_STREAM_NUM};
pub use pipeline::{FrameDoneCallback, Pipeline};
pub use state::PipelineState;
