//! Frame orchestration for the three-pass renderer.
//!
//! - Draw lists and their opaque / transparent classification ([`gather`])
//! - Extent-sized render targets and the pass graph ([`targets`], [`passes`])
//! - Set layouts and pipelines ([`pipelines`])
//! - Frames in flight and the frame state machine ([`frame`], [`scheduler`])
//! - Swapchain rebuilds on resize ([`lifecycle`])
//! - Model upload and command recording ([`gpu_scene`], [`recorder`])

pub mod frame;
pub mod gather;
pub mod gpu_scene;
pub mod lifecycle;
pub mod passes;
pub mod pipelines;
pub mod recorder;
mod renderer;
pub mod scheduler;
pub mod targets;

pub use gather::{DrawItem, DrawLists, gather};
pub use renderer::Renderer;
pub use scheduler::{FrameBackend, FrameOutcome, FrameScheduler, FrameState, FrameStats};
