//! # Splat Engine
//!
//! A Vulkan compute renderer for 3D Gaussian-Splatting point clouds.
//!
//! ## Features
//!
//! - **PLY loading**: standard splat attributes into flat arrays
//! - **Compute pipeline**: projection, sort and raster stages on the GPU
//! - **Frame pacing**: two frames in flight with fence-guarded per-slot buffers
//! - **Resize handling**: in-place swapchain recreation, pause while minimized
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use splat_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ViewerConfig::default();
//!     let mut window = Window::new(&config.window)?;
//!     let mut renderer = SplatRenderer::new(&mut window, &config.renderer)?;
//!     let mut camera = OrbitCamera::from_config(&config.camera);
//!
//!     renderer.load_point_cloud(&load_ply("scene.ply", true)?)?;
//!     while !window.should_close() {
//!         window.poll_events();
//!         if let Some(frame) = renderer.draw_frame(&camera.uniform())? {
//!             if frame.needs_recreation {
//!                 let surface = renderer.recreate_swapchain(&mut window)?;
//!                 camera.set_screen_size(surface.extent.width, surface.extent.height);
//!             }
//!         }
//!     }
//!     renderer.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc
)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{load_ply, AssetError, SplatSet},
        config::{Config, ConfigError, ViewerConfig},
        render::{
            vulkan::{VulkanError, Window, WindowError},
            CameraUniform, FrameOutcome, OrbitCamera, SplatRenderer,
        },
    };
}
