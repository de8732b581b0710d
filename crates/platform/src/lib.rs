//! Platform layer: the winit window, its Vulkan surface and viewer input.

mod input;
mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window, get_required_extensions};
