// THEORY:
// A single error type covers the whole engine. Errors are sorted by blast radius:
// an item-level failure (one unreadable frame, one unwritable artifact) is
// reported and skipped by the orchestrator, while a set-level failure (the
// representative frame crops down to nothing, the set directory cannot be
// listed) abandons only that FrameSet. Nothing here aborts a batch.
//
// An ambiguous light direction is not an error: it is `Direction::Undetermined`.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaletteError>;

#[derive(Error, Debug)]
pub enum PaletteError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Image error on {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Degenerate input: {reason}")]
    DegenerateInput { reason: String },
    #[error("Grid region ({row}, {col}) contains no pixels")]
    EmptyRegion { row: u32, col: u32 },
    #[error("Image contains no pixels")]
    EmptyImage,
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl PaletteError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateInput {
            reason: reason.into(),
        }
    }
}
