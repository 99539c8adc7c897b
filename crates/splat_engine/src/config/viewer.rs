//! Viewer and renderer settings

use serde::{Serialize, Deserialize};
use std::path::Path;

use super::{Config, ConfigError};

/// Directories searched, in order, for compiled SPIR-V binaries
const SHADER_SEARCH_DIRS: [&str; 5] = [
    "target/shaders/",
    "shaders/",
    "resources/shaders/",
    "../shaders/",
    "./",
];

/// Window settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Gaussian Splatting".to_string(),
            width: 1600,
            height: 900,
        }
    }
}

impl WindowConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("Window size must be non-zero, got {}x{}", self.width, self.height));
        }
        Ok(())
    }
}

/// # Stage Shader Configuration
///
/// One compiled compute program per pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageShaderConfig {
    /// Projection stage SPIR-V path
    pub projection: String,
    /// Sort stage SPIR-V path
    pub sort: String,
    /// Raster stage SPIR-V path
    pub raster: String,
}

impl StageShaderConfig {
    /// Create a shader config from explicit paths
    pub fn new(
        projection: impl Into<String>,
        sort: impl Into<String>,
        raster: impl Into<String>,
    ) -> Self {
        Self {
            projection: projection.into(),
            sort: sort.into(),
            raster: raster.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Each file name is looked up in the usual build and resource directories so
    /// the viewer works from the workspace root as well as from its crate directory.
    pub fn with_path_resolution(projection: &str, sort: &str, raster: &str) -> Self {
        Self {
            projection: resolve_shader_path(projection),
            sort: resolve_shader_path(sort),
            raster: resolve_shader_path(raster),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), String> {
        for (stage, path) in self.entries() {
            if !Path::new(path).exists() {
                return Err(format!("{stage} shader not found: {path}"));
            }
        }
        Ok(())
    }

    /// (stage name, path) pairs in pipeline order
    pub fn entries(&self) -> [(&'static str, &str); 3] {
        [
            ("Projection", self.projection.as_str()),
            ("Sort", self.sort.as_str()),
            ("Raster", self.raster.as_str()),
        ]
    }
}

impl Default for StageShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("projection.spv", "sort.spv", "raster.spv")
    }
}

fn resolve_shader_path(file_name: &str) -> String {
    SHADER_SEARCH_DIRS
        .iter()
        .map(|dir| format!("{dir}{file_name}"))
        .find(|candidate| Path::new(candidate).exists())
        .unwrap_or_else(|| format!("target/shaders/{file_name}"))
}

/// # Renderer Configuration
///
/// Instance metadata, debug features and the per-stage programs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Whether to enable Vulkan validation layers (`None` follows the build type)
    pub enable_validation: Option<bool>,
    /// Background color of the presentation pass
    pub clear_color: [f32; 4],
    /// Compute stage programs
    pub shaders: StageShaderConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            enable_validation: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: StageShaderConfig::default(),
        }
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: StageShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the background color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Resolve the validation switch against the build type
    ///
    /// Validation is only ever compiled into debug builds.
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.enable_validation.unwrap_or(true)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if self.clear_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(format!("Clear color components must be in [0, 1]: {:?}", self.clear_color));
        }
        self.shaders.validate()
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Gaussian Splatting")
    }
}

/// Orbit camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Initial orbit distance
    pub distance: f32,
    /// Initial pitch in radians
    pub pitch: f32,
    /// Radians per pixel of mouse drag
    pub rotate_sensitivity: f32,
    /// World units per pixel of drag, multiplied by the orbit distance
    pub pan_sensitivity: f32,
    /// Distance change per scroll step
    pub zoom_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
            distance: 5.0,
            pitch: 0.3,
            rotate_sensitivity: 0.005,
            pan_sensitivity: 0.001,
            zoom_sensitivity: 0.5,
        }
    }
}

impl CameraConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(1.0..179.0).contains(&self.fov_y_degrees) {
            return Err(format!("Field of view out of range: {}", self.fov_y_degrees));
        }
        if self.near <= 0.0 || self.far <= self.near {
            return Err(format!("Invalid clip planes: near={} far={}", self.near, self.far));
        }
        Ok(())
    }
}

/// Point cloud source settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudConfig {
    /// PLY file to load at startup
    pub path: Option<String>,
    /// Convert from the capture convention (right, down, forward) to right, up, back
    pub convert_to_rub: bool,
}

impl Default for PointCloudConfig {
    fn default() -> Self {
        Self {
            path: None,
            convert_to_rub: true,
        }
    }
}

/// Top-level viewer configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Camera settings
    pub camera: CameraConfig,
    /// Point cloud settings
    pub point_cloud: PointCloudConfig,
}

impl ViewerConfig {
    /// Set the point cloud to load at startup
    pub fn with_point_cloud(mut self, path: impl Into<String>) -> Self {
        self.point_cloud.path = Some(path.into());
        self
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window
            .validate()
            .and_then(|()| self.renderer.validate())
            .and_then(|()| self.camera.validate())
            .map_err(ConfigError::Invalid)
    }
}

impl Config for ViewerConfig {}
impl Config for RendererConfig {}
impl Config for CameraConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_defaults_match_viewer_window() {
        let config = ViewerConfig::default();
        assert_eq!(config.window.title, "Gaussian Splatting");
        assert_eq!((config.window.width, config.window.height), (1600, 900));
        assert_eq!(config.renderer.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(config.point_cloud.convert_to_rub);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ViewerConfig::default()
            .with_point_cloud("garden.ply");
        let text = config.to_string_as(ConfigFormat::Toml).unwrap();
        let parsed = ViewerConfig::from_str_as(&text, ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let mut config = ViewerConfig::default();
        config.camera.distance = 12.5;
        config.renderer = config.renderer.with_validation(false);
        let text = config.to_string_as(ConfigFormat::Ron).unwrap();
        let parsed = ViewerConfig::from_str_as(&text, ConfigFormat::Ron).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = ViewerConfig::from_str_as(
            "[window]\nwidth = 800\n\n[point_cloud]\npath = \"bike.ply\"\n",
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(parsed.window.width, 800);
        assert_eq!(parsed.window.height, 900);
        assert_eq!(parsed.point_cloud.path.as_deref(), Some("bike.ply"));
        assert!(parsed.point_cloud.convert_to_rub);
    }

    #[test]
    fn test_window_validation() {
        let window = WindowConfig { width: 0, ..WindowConfig::default() };
        assert!(window.validate().is_err());
        assert!(WindowConfig::default().validate().is_ok());
    }

    #[test]
    fn test_camera_validation() {
        let camera = CameraConfig { near: 10.0, far: 1.0, ..CameraConfig::default() };
        assert!(camera.validate().is_err());
        assert!(CameraConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shader_validation_reports_stage() {
        let shaders = StageShaderConfig::new("nope/a.spv", "nope/b.spv", "nope/c.spv");
        let err = shaders.validate().unwrap_err();
        assert!(err.starts_with("Projection"));
    }

    #[test]
    fn test_unresolved_shader_falls_back_to_build_dir() {
        let shaders = StageShaderConfig::with_path_resolution("missing_a.spv", "missing_b.spv", "missing_c.spv");
        assert_eq!(shaders.sort, "target/shaders/missing_b.spv");
    }
}
