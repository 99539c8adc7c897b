//! Gaussian-splat viewer
//!
//! Opens a window, loads a PLY point cloud and renders it with an orbit camera.
//!
//! Controls: left drag rotates, right or middle drag pans, scroll zooms,
//! `R` reloads the point cloud, `Escape` quits.

use std::path::Path;

use glfw::{Action, Key, MouseButton, WindowEvent};
use splat_engine::assets::{load_ply, AssetResult, SplatSet};
use splat_engine::config::{Config, ConfigError, ViewerConfig};
use splat_engine::foundation::logging;
use splat_engine::render::vulkan::{VulkanError, VulkanResult, Window, WindowError};
use splat_engine::render::{OrbitCamera, SplatRenderer};
use thiserror::Error;

const CONFIG_PATH: &str = "splat_viewer.toml";

/// Receiver of loaded point clouds
trait SceneTarget {
    fn load(&mut self, splats: &SplatSet) -> VulkanResult<()>;
    fn clear(&mut self) -> VulkanResult<()>;
}

impl SceneTarget for SplatRenderer {
    fn load(&mut self, splats: &SplatSet) -> VulkanResult<()> {
        self.load_point_cloud(splats)
    }

    fn clear(&mut self) -> VulkanResult<()> {
        self.clear_scene()
    }
}

/// Hand a parsed cloud to `target`; a parse or upload failure leaves an empty scene
///
/// Returns whether the cloud is loaded. Only a failure to clear is fatal.
fn install_point_cloud<T: SceneTarget>(
    target: &mut T,
    path: &str,
    parsed: AssetResult<SplatSet>,
) -> VulkanResult<bool> {
    let failure = match parsed {
        Ok(splats) => match target.load(&splats) {
            Ok(()) => return Ok(true),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };
    log::warn!("Failed to load point cloud '{path}': {failure}; rendering background only");
    target.clear()?;
    Ok(false)
}

/// Fatal viewer errors
#[derive(Error, Debug)]
enum ViewerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    #[error("Renderer error: {0}")]
    Vulkan(#[from] VulkanError),
}

/// What a mouse drag currently does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragMode {
    None,
    Rotate,
    Pan,
}

impl DragMode {
    fn from_buttons(left: bool, right: bool, middle: bool) -> Self {
        if left {
            Self::Rotate
        } else if right || middle {
            Self::Pan
        } else {
            Self::None
        }
    }
}

#[derive(Debug, Default)]
struct MouseState {
    left: bool,
    right: bool,
    middle: bool,
    last_cursor: Option<(f64, f64)>,
}

impl MouseState {
    fn drag_mode(&self) -> DragMode {
        DragMode::from_buttons(self.left, self.right, self.middle)
    }

    fn set_button(&mut self, button: MouseButton, pressed: bool) {
        match button {
            MouseButton::Button1 => self.left = pressed,
            MouseButton::Button2 => self.right = pressed,
            MouseButton::Button3 => self.middle = pressed,
            _ => {}
        }
    }

    /// Cursor delta since the last event
    fn move_to(&mut self, x: f64, y: f64) -> (f32, f32) {
        let delta = self
            .last_cursor
            .map_or((0.0, 0.0), |(last_x, last_y)| ((x - last_x) as f32, (y - last_y) as f32));
        self.last_cursor = Some((x, y));
        delta
    }
}

struct Viewer {
    config: ViewerConfig,
    camera: OrbitCamera,
    mouse: MouseState,
    renderer: SplatRenderer,
    window: Window,
}

impl Viewer {
    fn new(config: ViewerConfig) -> Result<Self, ViewerError> {
        let mut window = Window::new(&config.window)?;
        let renderer = SplatRenderer::new(&mut window, &config.renderer)?;

        let mut camera = OrbitCamera::from_config(&config.camera);
        let extent = renderer.extent();
        camera.set_screen_size(extent.width, extent.height);

        Ok(Self {
            config,
            camera,
            mouse: MouseState::default(),
            renderer,
            window,
        })
    }

    /// Load the configured cloud; failures leave an empty scene
    fn load_point_cloud(&mut self) -> Result<(), ViewerError> {
        let Some(path) = self.config.point_cloud.path.clone() else {
            log::info!("No point cloud configured");
            return Ok(());
        };

        let parsed = load_ply(&path, self.config.point_cloud.convert_to_rub);
        install_point_cloud(&mut self.renderer, &path, parsed)?;
        Ok(())
    }

    fn handle_event(&mut self, event: WindowEvent) -> Result<(), ViewerError> {
        let camera_config = &self.config.camera;
        match event {
            WindowEvent::Key(Key::Escape, _, Action::Press, _) | WindowEvent::Close => {
                self.window.set_should_close(true);
            }
            WindowEvent::Key(Key::R, _, Action::Press, _) => {
                log::info!("Reloading point cloud");
                self.load_point_cloud()?;
            }
            WindowEvent::FramebufferSize(width, height) => {
                self.renderer
                    .handle_resize(width.max(0) as u32, height.max(0) as u32);
            }
            WindowEvent::MouseButton(button, action, _) => {
                self.mouse.set_button(button, action != Action::Release);
            }
            WindowEvent::CursorPos(x, y) => {
                let (dx, dy) = self.mouse.move_to(x, y);
                match self.mouse.drag_mode() {
                    DragMode::Rotate => self.camera.rotate(
                        -dx * camera_config.rotate_sensitivity,
                        dy * camera_config.rotate_sensitivity,
                    ),
                    DragMode::Pan => self.camera.pan(
                        dx * camera_config.pan_sensitivity,
                        dy * camera_config.pan_sensitivity,
                    ),
                    DragMode::None => {}
                }
            }
            WindowEvent::Scroll(_, y) => {
                self.camera.zoom(y as f32 * camera_config.zoom_sensitivity);
            }
            _ => {}
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), ViewerError> {
        self.load_point_cloud()?;

        while !self.window.should_close() {
            if self.renderer.is_paused() {
                self.window.wait_events();
            } else {
                self.window.poll_events();
            }

            let events: Vec<_> = self.window.flush_events().map(|(_, event)| event).collect();
            for event in events {
                self.handle_event(event)?;
            }
            if self.renderer.is_paused() || self.window.should_close() {
                continue;
            }

            let Some(frame) = self.renderer.draw_frame(&self.camera.uniform())? else {
                continue;
            };
            if frame.needs_recreation {
                let surface = self.renderer.recreate_swapchain(&mut self.window)?;
                self.camera
                    .set_screen_size(surface.extent.width, surface.extent.height);
            }
        }

        log::info!("Viewer closing");
        Ok(())
    }
}

fn load_config() -> Result<ViewerConfig, ViewerError> {
    let mut config = ViewerConfig::load_or_default(Path::new(CONFIG_PATH))?;
    if let Some(path) = std::env::args().nth(1) {
        config = config.with_point_cloud(path);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("info");

    let result = load_config()
        .and_then(Viewer::new)
        .and_then(|mut viewer| {
            let result = viewer.run();
            viewer.renderer.shutdown();
            result
        });

    if let Err(e) = result {
        log::error!("{e}");
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_mode_priority() {
        assert_eq!(DragMode::from_buttons(true, true, false), DragMode::Rotate);
        assert_eq!(DragMode::from_buttons(false, true, false), DragMode::Pan);
        assert_eq!(DragMode::from_buttons(false, false, true), DragMode::Pan);
        assert_eq!(DragMode::from_buttons(false, false, false), DragMode::None);
    }

    #[derive(Default)]
    struct RecordingTarget {
        fail_upload: bool,
        loaded: usize,
        cleared: usize,
    }

    impl SceneTarget for RecordingTarget {
        fn load(&mut self, splats: &SplatSet) -> VulkanResult<()> {
            if self.fail_upload {
                return Err(VulkanError::OutOfMemory {
                    requested: splats.positions.len() as u64 * 4,
                });
            }
            self.loaded += 1;
            Ok(())
        }

        fn clear(&mut self) -> VulkanResult<()> {
            self.cleared += 1;
            Ok(())
        }
    }

    fn one_splat() -> SplatSet {
        SplatSet {
            positions: vec![0.0, 0.0, 0.0],
            base_color: vec![0.5; 3],
            sh_rest: Vec::new(),
            opacity: vec![1.0],
            scale: vec![-2.0; 3],
            rotation: vec![1.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_upload_failure_degrades_to_empty_scene() {
        let mut target = RecordingTarget { fail_upload: true, ..Default::default() };
        let loaded = install_point_cloud(&mut target, "huge.ply", Ok(one_splat())).unwrap();
        assert!(!loaded);
        assert_eq!(target.cleared, 1);
        assert_eq!(target.loaded, 0);
    }

    #[test]
    fn test_parse_failure_degrades_to_empty_scene() {
        let mut target = RecordingTarget::default();
        let parsed = splat_engine::assets::load_ply("no/such/scene.ply", true);
        assert!(!install_point_cloud(&mut target, "no/such/scene.ply", parsed).unwrap());
        assert_eq!(target.cleared, 1);
    }

    #[test]
    fn test_successful_load_keeps_scene() {
        let mut target = RecordingTarget::default();
        assert!(install_point_cloud(&mut target, "scene.ply", Ok(one_splat())).unwrap());
        assert_eq!((target.loaded, target.cleared), (1, 0));
    }

    #[test]
    fn test_first_cursor_event_has_no_delta() {
        let mut mouse = MouseState::default();
        assert_eq!(mouse.move_to(100.0, 50.0), (0.0, 0.0));
        assert_eq!(mouse.move_to(110.0, 45.0), (10.0, -5.0));
    }
}
