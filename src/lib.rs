pub mod core;
pub mod engine;
pub mod graph;
pub mod modules;
pub mod observability;
pub mod registry;

pub use crate::core::{Frame, FramePtr, Module, ModuleBase};
pub use engine::{Pipeline, PipelineConfig};
pub use registry::ModuleRegistry;
