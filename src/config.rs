//! Configuration for the document orchestrator.
//!
//! Every knob the core needs (scratch directory, tool locations, timeouts,
//! densities) lives in [`MassageConfig`] and is handed to
//! [`crate::Massage::new`] once. Nothing below this module reads the process
//! environment; the only ambient lookup is the system temp directory, taken
//! when [`MassageConfig::default`] runs.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::Massage`] orchestrator.
///
/// # Example
/// ```rust
/// use pdf_massage::MassageConfig;
///
/// let config = MassageConfig::builder()
///     .scratch_dir("/var/tmp/massage")
///     .rotate_density(150)
///     .fetch_timeout_secs(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.rotate_density, 150);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassageConfig {
    /// Directory every temp artifact is created in. Must be writable.
    pub scratch_dir: PathBuf,

    /// Inspection tool (ImageMagick `identify`).
    pub identify_path: PathBuf,

    /// Rasterizer tool (ImageMagick `convert`).
    pub convert_path: PathBuf,

    /// Page-assembly tool (`pdftk`).
    pub pdftk_path: PathBuf,

    /// Timeout for locator HEAD/GET requests in seconds. Default: 10.
    ///
    /// Must be at least 1; a fetch is never unbounded.
    pub fetch_timeout_secs: u64,

    /// Wall-clock limit for a single external tool run in seconds. Default: 120.
    ///
    /// `0` disables the limit. An expired run is killed and reported as
    /// [`crate::MassageError::ProcessingFailure`].
    pub tool_timeout_secs: u64,

    /// `-density` passed to the rasterizer when rotating. Default: 300.
    pub rotate_density: u32,

    /// `-density` passed to the rasterizer when rendering thumbnails. Default: 72.
    pub thumbnail_density: u32,

    /// File extension (and therefore image format) of thumbnails. Default: `png`.
    pub thumbnail_format: String,

    /// `-density` passed to the inspection tool. Default: 72.
    ///
    /// At 72 one reported pixel is one PDF point, which is what the inch
    /// conversion in [`crate::MetaData`] assumes.
    pub inspect_density: u32,
}

impl Default for MassageConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
            identify_path: PathBuf::from("identify"),
            convert_path: PathBuf::from("convert"),
            pdftk_path: PathBuf::from("pdftk"),
            fetch_timeout_secs: 10,
            tool_timeout_secs: 120,
            rotate_density: 300,
            thumbnail_density: 72,
            thumbnail_format: "png".to_string(),
            inspect_density: 72,
        }
    }
}

impl MassageConfig {
    /// Create a new builder for `MassageConfig`.
    pub fn builder() -> MassageConfigBuilder {
        MassageConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub(crate) fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }
}

/// Builder for [`MassageConfig`].
#[derive(Debug)]
pub struct MassageConfigBuilder {
    config: MassageConfig,
}

impl MassageConfigBuilder {
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn identify_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.identify_path = path.into();
        self
    }

    pub fn convert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.convert_path = path.into();
        self
    }

    pub fn pdftk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdftk_path = path.into();
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs;
        self
    }

    pub fn rotate_density(mut self, dpi: u32) -> Self {
        self.config.rotate_density = dpi;
        self
    }

    pub fn thumbnail_density(mut self, dpi: u32) -> Self {
        self.config.thumbnail_density = dpi;
        self
    }

    pub fn thumbnail_format(mut self, ext: impl Into<String>) -> Self {
        self.config.thumbnail_format = ext.into();
        self
    }

    pub fn inspect_density(mut self, dpi: u32) -> Self {
        self.config.inspect_density = dpi;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MassageConfig, ConfigError> {
        let c = &self.config;
        for (field, value) in [
            ("rotate_density", c.rotate_density),
            ("thumbnail_density", c.thumbnail_density),
            ("inspect_density", c.inspect_density),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDensity { field, value });
            }
        }
        if c.fetch_timeout_secs == 0 {
            return Err(ConfigError::ZeroFetchTimeout);
        }
        for (tool, path) in [
            ("identify", &c.identify_path),
            ("convert", &c.convert_path),
            ("pdftk", &c.pdftk_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyToolPath { tool });
            }
        }
        let fmt = &c.thumbnail_format;
        if fmt.is_empty() || fmt.len() > 8 || !fmt.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidThumbnailFormat(fmt.clone()));
        }
        Ok(self.config)
    }
}
