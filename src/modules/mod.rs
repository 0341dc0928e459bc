pub mod frame_counter;
pub mod passthrough;

pub use frame_counter::FrameCounter;
pub use passthrough::Passthrough;
