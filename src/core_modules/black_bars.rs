// THEORY:
// Letterboxed footage carries black bars that would drag every palette and
// light map toward black. The detector finds them on a single representative
// frame and the resulting `CropOffsets` are shared by the whole FrameSet, on the
// assumption that bars are constant within one chunk of video.
//
// A row is black when at least `coverage_threshold` of its pixels have a
// luminosity strictly below `brightness_threshold`. Rows are counted from the
// top until the first non-black row, then from the bottom over the rows the top
// scan did not consume. A fully black frame therefore reports
// `top + bottom == height`; no other bound is imposed here. Deciding what to do
// with a crop that leaves nothing is the caller's job, via `CropOffsets::apply`.

use crate::core_modules::region::region::Region;
use crate::error::{PaletteError, Result};
use image::RgbImage;

pub const DEFAULT_BRIGHTNESS_THRESHOLD: f64 = 10.0;
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 0.98;

/// Top/bottom pixel rows removed from every frame of a set before reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropOffsets {
    pub top: u32,
    pub bottom: u32,
}

impl CropOffsets {
    pub const NONE: CropOffsets = CropOffsets { top: 0, bottom: 0 };

    pub fn new(top: u32, bottom: u32) -> Self {
        Self { top, bottom }
    }

    /// Height left after cropping a frame of `height` rows, if any.
    pub fn remaining_height(&self, height: u32) -> Option<u32> {
        height
            .checked_sub(self.top)
            .and_then(|rest| rest.checked_sub(self.bottom))
            .filter(|rest| *rest > 0)
    }

    /// Removes the bars from `frame`. A crop that leaves no rows is degenerate.
    pub fn apply(&self, frame: &RgbImage) -> Result<RgbImage> {
        let (width, height) = frame.dimensions();
        let Some(remaining) = self.remaining_height(height) else {
            return Err(PaletteError::degenerate(format!(
                "crop top={} bottom={} leaves no rows of a {width}x{height} frame",
                self.top, self.bottom
            )));
        };
        if width == 0 {
            return Err(PaletteError::degenerate("frame has zero width"));
        }
        if self.top == 0 && self.bottom == 0 {
            return Ok(frame.clone());
        }
        Ok(image::imageops::crop_imm(frame, 0, self.top, width, remaining).to_image())
    }
}

impl std::fmt::Display for CropOffsets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "top={} bottom={}", self.top, self.bottom)
    }
}

fn row_is_black(frame: &RgbImage, row: u32, brightness_threshold: f64, coverage_threshold: f64) -> bool {
    let region = Region::new(frame, 0, row, frame.width(), 1);
    if region.is_empty() {
        return false;
    }
    region.dark_fraction(brightness_threshold) >= coverage_threshold
}

/// Counts consecutive black rows from the top and from the bottom of `frame`.
pub fn detect_black_bars(frame: &RgbImage, brightness_threshold: f64, coverage_threshold: f64) -> CropOffsets {
    let height = frame.height();
    let is_black = |row: u32| row_is_black(frame, row, brightness_threshold, coverage_threshold);

    let top = (0..height).take_while(|&row| is_black(row)).count() as u32;
    let bottom = (top..height).rev().take_while(|&row| is_black(row)).count() as u32;

    CropOffsets { top, bottom }
}
