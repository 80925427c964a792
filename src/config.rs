// THEORY:
// Every numeric contract of the engine (thresholds, grid shape, block sizes)
// lives in one `PipelineConfig`. The defaults reproduce the canonical artifacts
// exactly; a config file or `PALETTE_VISION_*` environment variables may
// override any key. The config is validated once up front so that the analyzers
// can assume sane values.

use crate::core_modules::black_bars::{DEFAULT_BRIGHTNESS_THRESHOLD, DEFAULT_COVERAGE_THRESHOLD};
use crate::core_modules::color_summary::DEFAULT_RESIZE_CAP;
use crate::error::{PaletteError, Result};
use serde::Deserialize;
use std::path::Path;

/// Largest grid edge, in cells.
pub const MAX_GRID_CELLS: u32 = 256;
/// Largest rendered artifact edge, in pixels.
pub const MAX_ARTIFACT_EDGE: u32 = 16_384;

/// Still-image format used for every persisted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Png => "png",
            ArtifactFormat::Jpeg => "jpg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            ArtifactFormat::Png => image::ImageFormat::Png,
            ArtifactFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// Configuration for the palette pipeline, allowing for tunable behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// A pixel whose luminosity is strictly below this value counts as black.
    pub brightness_threshold: f64,
    /// The fraction of black pixels a row needs to be treated as a black bar.
    pub coverage_threshold: f64,
    pub grid_rows: u32,
    pub grid_cols: u32,
    /// Size in pixels of one rendered palette/lightmap cell.
    pub block_width: u32,
    pub block_height: u32,
    /// Edge length of the dominant/average color blocks.
    pub summary_block_size: u32,
    /// The dominant color is computed on a copy whose longer side is at most this.
    pub dominant_resize_cap: u32,
    pub artifact_format: ArtifactFormat,
    /// Skip frames whose four artifacts already exist.
    pub skip_existing: bool,
    /// Run black-bar detection on every frame instead of the representative one.
    pub per_frame_detection: bool,
    /// Directory name, under a batch root, that receives the direction buckets.
    pub buckets_dir: String,
    /// Worker count for the parallel pipeline. `None` means one per CPU.
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
            grid_rows: 4,
            grid_cols: 4,
            block_width: 50,
            block_height: 50,
            summary_block_size: 100,
            dominant_resize_cap: DEFAULT_RESIZE_CAP,
            artifact_format: ArtifactFormat::Png,
            skip_existing: true,
            per_frame_detection: false,
            buckets_dir: "directions".to_string(),
            workers: None,
        }
    }
}

impl PipelineConfig {
    /// Loads the configuration from an optional file, then applies
    /// `PALETTE_VISION_*` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: PipelineConfig = builder
            .add_source(config::Environment::with_prefix("PALETTE_VISION").try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_rows == 0 || self.grid_cols == 0 {
            return Err(PaletteError::InvalidConfig(format!(
                "grid must have at least one row and column, got {}x{}",
                self.grid_rows, self.grid_cols
            )));
        }
        if self.grid_rows > MAX_GRID_CELLS || self.grid_cols > MAX_GRID_CELLS {
            return Err(PaletteError::InvalidConfig(format!(
                "grid of {}x{} exceeds {MAX_GRID_CELLS} cells per side",
                self.grid_rows, self.grid_cols
            )));
        }
        if self.block_width == 0 || self.block_height == 0 || self.summary_block_size == 0 {
            return Err(PaletteError::InvalidConfig(
                "block sizes must be non-zero".to_string(),
            ));
        }
        let rendered = (
            self.grid_cols.checked_mul(self.block_width),
            self.grid_rows.checked_mul(self.block_height),
        );
        let within = |edge: Option<u32>| edge.is_some_and(|edge| edge <= MAX_ARTIFACT_EDGE);
        if !within(rendered.0) || !within(rendered.1) || self.summary_block_size > MAX_ARTIFACT_EDGE {
            return Err(PaletteError::InvalidConfig(format!(
                "rendered artifacts must fit in {MAX_ARTIFACT_EDGE}x{MAX_ARTIFACT_EDGE} pixels"
            )));
        }
        if self.dominant_resize_cap == 0 {
            return Err(PaletteError::InvalidConfig(
                "dominant_resize_cap must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.coverage_threshold) {
            return Err(PaletteError::InvalidConfig(format!(
                "coverage_threshold must lie in [0, 1], got {}",
                self.coverage_threshold
            )));
        }
        if !(0.0..=256.0).contains(&self.brightness_threshold) {
            return Err(PaletteError::InvalidConfig(format!(
                "brightness_threshold must lie in [0, 256], got {}",
                self.brightness_threshold
            )));
        }
        if self.workers == Some(0) {
            return Err(PaletteError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.buckets_dir.is_empty() {
            return Err(PaletteError::InvalidConfig(
                "buckets_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_canonical_artifacts() {
        let config = PipelineConfig::default();
        assert_eq!((config.grid_rows, config.grid_cols), (4, 4));
        assert_eq!((config.block_width, config.block_height), (50, 50));
        assert_eq!(config.summary_block_size, 100);
        assert_eq!(config.dominant_resize_cap, 150);
        assert_eq!(config.brightness_threshold, 10.0);
        assert_eq!(config.coverage_threshold, 0.98);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_grid_is_rejected() {
        let config = PipelineConfig {
            grid_rows: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PaletteError::InvalidConfig(_))));
    }

    #[test]
    fn oversized_grid_or_blocks_are_rejected() {
        let huge_grid = PipelineConfig {
            grid_cols: 100_000,
            ..PipelineConfig::default()
        };
        assert!(matches!(huge_grid.validate(), Err(PaletteError::InvalidConfig(_))));

        let overflowing_blocks = PipelineConfig {
            block_width: u32::MAX,
            ..PipelineConfig::default()
        };
        assert!(matches!(overflowing_blocks.validate(), Err(PaletteError::InvalidConfig(_))));

        let widest = PipelineConfig {
            grid_cols: 4,
            block_width: MAX_ARTIFACT_EDGE / 4,
            ..PipelineConfig::default()
        };
        assert!(widest.validate().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("palette.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "grid_rows = 3").unwrap();
        writeln!(file, "artifact_format = \"jpeg\"").unwrap();
        drop(file);

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.grid_rows, 3);
        assert_eq!(config.grid_cols, 4);
        assert_eq!(config.artifact_format, ArtifactFormat::Jpeg);
        assert_eq!(config.artifact_format.extension(), "jpg");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PipelineConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(PaletteError::Config(_))));
    }
}
