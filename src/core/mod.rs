pub mod collection;
pub mod event;
pub mod frame;
pub mod module;
pub mod stream;

pub use collection::Collection;
pub use event::{Event, EventBus, EventType};
pub use frame::{Frame, FrameFlag, FramePtr, RoutingAccess, INVALID_STREAM_INDEX, TIMESTAMP_UNSET};
pub use module::{
    dispatch, Container, Module, ModuleBase, ModuleObserver, ProcessError, INVALID_MODULE_ID,
};
pub use stream::{StreamRegistry, EOS_POLL_INTERVAL};
