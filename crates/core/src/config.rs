//! Start-up configuration.
//!
//! The configuration is read once from a TOML file before the window opens.
//! Every field has a default, so a partial file (or no file at all) is valid:
//!
//! ```toml
//! [window]
//! width = 1600
//! height = 900
//!
//! [render]
//! buffering = 3
//! msaa_samples = 4
//! clear_color = [0.02, 0.02, 0.03, 1.0]
//!
//! [assets]
//! models = ["assets/models/DragonAttenuation.glb"]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::{Error, Result};

/// Window settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Translucent".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

/// Renderer settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Number of frames the CPU may record ahead of the GPU (2 or 3).
    pub buffering: u32,
    /// Requested multisample count for the opaque pass. Clamped to what the
    /// device supports.
    pub msaa_samples: u32,
    pub clear_color: [f32; 4],
    /// Enables the Khronos validation layer and the debug messenger.
    pub validation: bool,
    pub exposure: f32,
    /// Extra display gamma after tone mapping. The sRGB swapchain already
    /// encodes, so 1.0 leaves output unchanged.
    pub gamma: f32,
    pub ibl_scale: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            buffering: 2,
            msaa_samples: 4,
            clear_color: [0.02, 0.02, 0.025, 1.0],
            validation: cfg!(debug_assertions),
            exposure: 1.0,
            gamma: 1.0,
            ibl_scale: 1.0,
        }
    }
}

/// Asset locations.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetConfig {
    /// glTF files loaded at start-up, in draw order.
    pub models: Vec<PathBuf>,
    /// Directory containing the compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            shader_dir: PathBuf::from("shaders/spirv"),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub assets: AssetConfig,
}

impl Config {
    /// Reads, parses and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the renderer cannot honor.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.render.buffering, 2 | 3) {
            return Err(Error::Config(format!(
                "render.buffering must be 2 or 3, got {}",
                self.render.buffering
            )));
        }

        let samples = self.render.msaa_samples;
        if samples == 0 || samples > 64 || !samples.is_power_of_two() {
            return Err(Error::Config(format!(
                "render.msaa_samples must be a power of two in 1..=64, got {}",
                samples
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config("window size must be non-zero".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.render.buffering, 2);
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [render]
            buffering = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.render.buffering, 3);
        assert_eq!(config.render.msaa_samples, 4);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml(
            r#"
            [window]
            title = "Glass"
            width = 800
            height = 600
            resizable = false

            [render]
            msaa_samples = 1
            clear_color = [1.0, 0.0, 0.0, 1.0]

            [assets]
            models = ["a.gltf", "b.glb"]
            shader_dir = "out/spv"
            "#,
        )
        .unwrap();
        assert_eq!(config.window.title, "Glass");
        assert!(!config.window.resizable);
        assert_eq!(config.render.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.assets.models.len(), 2);
        assert_eq!(config.assets.shader_dir, PathBuf::from("out/spv"));
    }

    #[test]
    fn test_rejects_bad_buffering() {
        for depth in [0, 1, 4] {
            let text = format!("[render]\nbuffering = {}", depth);
            assert!(matches!(Config::from_toml(&text), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_rejects_bad_samples() {
        for samples in [0, 3, 6, 128] {
            let text = format!("[render]\nmsaa_samples = {}", samples);
            assert!(matches!(Config::from_toml(&text), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            Config::from_toml("[render"),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_or_default(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
