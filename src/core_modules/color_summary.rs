// THEORY:
// Whole-frame color summaries. Two numbers describe a frame at a glance:
// - the dominant color, the single most frequent exact RGB triple, and
// - the average color, the truncated arithmetic mean of each channel.
//
// The dominant color is computed on a downsampled copy (longer side at most
// `resize_cap`). Frequencies live in a `ColorHistogram`, an
// insertion-ordered map from color to count. Ties are broken by first
// appearance in a row-major scan. Histograms of consecutive slices merge in
// scan order without disturbing that insertion order.

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::region::region::Region;
use crate::error::{PaletteError, Result};
use image::RgbImage;
use image::imageops::{self, FilterType};
use indexmap::IndexMap;

pub const DEFAULT_RESIZE_CAP: u32 = 150;

/// Exact-color frequency table, ordered by first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorHistogram {
    counts: IndexMap<Pixel, u64>,
}

impl ColorHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pixels<I: IntoIterator<Item = Pixel>>(pixels: I) -> Self {
        let mut histogram = Self::new();
        for pixel in pixels {
            histogram.add(pixel);
        }
        histogram
    }

    pub fn add(&mut self, pixel: Pixel) {
        *self.counts.entry(pixel).or_insert(0) += 1;
    }

    /// Folds `later` into `self`. `later` must cover pixels scanned after the
    /// ones already counted here for the first-seen order to hold.
    pub fn merge(&mut self, later: ColorHistogram) {
        for (pixel, count) in later.counts {
            *self.counts.entry(pixel).or_insert(0) += count;
        }
    }

    pub fn count(&self, pixel: &Pixel) -> u64 {
        self.counts.get(pixel).copied().unwrap_or(0)
    }

    pub fn distinct_colors(&self) -> usize {
        self.counts.len()
    }

    /// The most frequent color; the earliest seen wins a tie.
    pub fn most_frequent(&self) -> Option<Pixel> {
        let mut best: Option<(Pixel, u64)> = None;
        for (pixel, &count) in &self.counts {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((*pixel, count)),
            }
        }
        best.map(|(pixel, _)| pixel)
    }
}

/// Scales `frame` down so its longer side is at most `resize_cap`.
fn downsample_for_mode(frame: &RgbImage, resize_cap: u32) -> Option<RgbImage> {
    let (width, height) = frame.dimensions();
    let longest = width.max(height);
    if longest <= resize_cap {
        return None;
    }
    let ratio = resize_cap as f64 / longest as f64;
    let new_width = ((width as f64 * ratio) as u32).max(1);
    let new_height = ((height as f64 * ratio) as u32).max(1);
    Some(imageops::resize(frame, new_width, new_height, FilterType::CatmullRom))
}

/// The most frequent exact color of `frame`, counted on a downsampled copy.
pub fn dominant_color(frame: &RgbImage, resize_cap: u32) -> Result<Pixel> {
    let resized = downsample_for_mode(frame, resize_cap);
    let source = resized.as_ref().unwrap_or(frame);
    ColorHistogram::from_pixels(Region::whole(source).pixels())
        .most_frequent()
        .ok_or(PaletteError::EmptyImage)
}

/// The truncated per-channel mean over every pixel of `frame`.
pub fn average_color(frame: &RgbImage) -> Result<Pixel> {
    Region::whole(frame).average_pixel()
}
