use crate::core::{FramePtr, Module, ModuleBase};
use async_trait::async_trait;
use framegraph_macros::RegisterModule;

/// Forwards every frame untouched
#[derive(RegisterModule)]
#[module_meta(type_name = "Passthrough", description = "Forwards frames unchanged")]
pub struct Passthrough {
    base: ModuleBase,
}

impl Passthrough {
    pub fn new(name: &str) -> Self {
        Self {
            base: ModuleBase::new(name),
        }
    }
}

#[async_trait]
impl Module for Passthrough {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    async fn process(&self, _frame: &FramePtr) -> i32 {
        0
    }
}
