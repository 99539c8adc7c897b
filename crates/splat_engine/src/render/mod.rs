//! Rendering
//!
//! GPU plumbing lives in [`vulkan`]; [`stages`], [`frame`] and [`renderer`]
//! build the splat pipeline on top of it.

pub mod camera;
pub mod frame;
pub mod renderer;
pub mod scene;
pub mod stages;
pub mod tiles;
pub mod vulkan;

pub use camera::{CameraUniform, OrbitCamera, CAMERA_UNIFORM_SIZE};
pub use frame::{FrameEngine, FrameOutcome, SurfaceInfo, FRAMES_IN_FLIGHT};
pub use renderer::SplatRenderer;
pub use tiles::{TileGrid, TILE_SIZE};
