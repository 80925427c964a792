// THEORY:
// The light-direction classifier reads a frame's light map and decides where the
// dominant light comes from. It works on a coarse 3x3 gray grid obtained with
// an 8-bit box resize: the map is converted to 8-bit gray, then averaged over
// whole source pixels per axis, horizontally then vertically, with 22-bit
// fixed-point weights and rounding back to 8 bits after each pass.
//
// Decision procedure:
// 1.  A grid whose total luminosity is zero is fully black: `Undetermined`.
// 2.  A center cell strictly brighter than all eight neighbors: `Center`.
// 3.  Otherwise sum the top row, bottom row, left column and right column. Each
//     sum includes its two corners, so every corner is counted twice.
// 4.  The largest sum names the direction. A tie for the largest is ambiguous and
//     yields `Undetermined` instead of an arbitrary pick.

use crate::core_modules::grid_reducer::Grid;
use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{PaletteError, Result};
use image::RgbImage;
use std::path::Path;

pub const CLASSIFIER_GRID: usize = 3;

/// Classified light-source bearing relative to the frame center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Center,
    Top,
    Bottom,
    Left,
    Right,
    Undetermined,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Center,
        Direction::Top,
        Direction::Bottom,
        Direction::Left,
        Direction::Right,
        Direction::Undetermined,
    ];

    /// The bucket name used on disk.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Center => "center",
            Direction::Top => "top",
            Direction::Bottom => "bottom",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Undetermined => "undetermined",
        }
    }

    /// The direction after rotating the frame 90 degrees clockwise.
    pub fn rotated_clockwise(self) -> Direction {
        match self {
            Direction::Top => Direction::Right,
            Direction::Right => Direction::Bottom,
            Direction::Bottom => Direction::Left,
            Direction::Left => Direction::Top,
            other => other,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 3x3 luminosity grid, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightGrid {
    pub cells: [[f64; CLASSIFIER_GRID]; CLASSIFIER_GRID],
}

impl LightGrid {
    pub fn new(cells: [[f64; CLASSIFIER_GRID]; CLASSIFIER_GRID]) -> Self {
        Self { cells }
    }

    /// Box-filters a `width` x `height` 8-bit gray plane down to 3x3, as an
    /// 8-bit grayscale box resize does it: horizontal pass first, vertical pass
    /// second, each output rounded back to 8 bits before the next pass.
    pub fn from_plane(width: usize, height: usize, plane: &[u8]) -> Result<Self> {
        if width == 0 || height == 0 || plane.len() < width * height {
            return Err(PaletteError::EmptyImage);
        }

        let columns = box_taps(width);
        let rows = box_taps(height);

        let narrowed: Vec<[u8; CLASSIFIER_GRID]> = plane
            .chunks_exact(width)
            .take(height)
            .map(|line| std::array::from_fn(|out_x| columns[out_x].apply(|x| line[x])))
            .collect();

        let mut cells = [[0.0; CLASSIFIER_GRID]; CLASSIFIER_GRID];
        for (out_y, tap) in rows.iter().enumerate() {
            for (out_x, cell) in cells[out_y].iter_mut().enumerate() {
                *cell = tap.apply(|y| narrowed[y][out_x]) as f64;
            }
        }
        Ok(Self { cells })
    }

    /// Downsamples a rendered light map (or any RGB frame) by its gray level.
    pub fn from_image(image: &RgbImage) -> Result<Self> {
        let plane: Vec<u8> = image.pixels().map(|p| Pixel::from(p).gray_level()).collect();
        Self::from_plane(image.width() as usize, image.height() as usize, &plane)
    }

    /// Classifies an in-memory light map grid exactly as its rendered artifact
    /// would be classified once written with `block_width` x `block_height` cells.
    pub fn from_grid(grid: &Grid, block_width: u32, block_height: u32) -> Result<Self> {
        Self::from_image(&grid.render(block_width, block_height))
    }

    pub fn total(&self) -> f64 {
        self.cells.iter().flatten().sum()
    }

    pub fn center(&self) -> f64 {
        self.cells[1][1]
    }

    pub fn top_sum(&self) -> f64 {
        self.cells[0].iter().sum()
    }

    pub fn bottom_sum(&self) -> f64 {
        self.cells[2].iter().sum()
    }

    pub fn left_sum(&self) -> f64 {
        self.cells.iter().map(|row| row[0]).sum()
    }

    pub fn right_sum(&self) -> f64 {
        self.cells.iter().map(|row| row[2]).sum()
    }

    /// The grid rotated 90 degrees clockwise: the top row becomes the right column.
    pub fn rotated_clockwise(&self) -> Self {
        let mut cells = [[0.0; CLASSIFIER_GRID]; CLASSIFIER_GRID];
        for (row, values) in cells.iter_mut().enumerate() {
            for (col, value) in values.iter_mut().enumerate() {
                *value = self.cells[CLASSIFIER_GRID - 1 - col][row];
            }
        }
        Self { cells }
    }
}

const PRECISION_BITS: u32 = 32 - 8 - 2;

/// Fixed-point box weights of one output sample along an axis.
struct BoxTap {
    first: usize,
    weights: Vec<i32>,
}

impl BoxTap {
    fn apply(&self, sample: impl Fn(usize) -> u8) -> u8 {
        let mut acc: i32 = 1 << (PRECISION_BITS - 1);
        for (offset, weight) in self.weights.iter().enumerate() {
            acc += sample(self.first + offset) as i32 * weight;
        }
        (acc >> PRECISION_BITS).clamp(0, 255) as u8
    }
}

/// Box taps for the 3 output positions along an axis of `len` samples. A
/// source sample belongs to an output when its center falls in
/// `(center - scale / 2, center + scale / 2]`, so every weight is 0 or 1
/// before normalization.
fn box_taps(len: usize) -> [BoxTap; CLASSIFIER_GRID] {
    let scale = len as f64 / CLASSIFIER_GRID as f64;
    let filter_scale = scale.max(1.0);
    let support = 0.5 * filter_scale;

    std::array::from_fn(|out| {
        let center = (out as f64 + 0.5) * scale;
        let first = ((center - support + 0.5) as usize).min(len);
        let last = ((center + support + 0.5) as usize).min(len);

        let members: Vec<f64> = (first..last)
            .map(|src| {
                let t = (src as f64 - center + 0.5) / filter_scale;
                if t > -0.5 && t <= 0.5 { 1.0 } else { 0.0 }
            })
            .collect();
        let total: f64 = members.iter().sum();
        let weights = members
            .iter()
            .map(|member| {
                let normalized = if total != 0.0 { member / total } else { *member };
                (0.5 + normalized * (1u32 << PRECISION_BITS) as f64) as i32
            })
            .collect();
        BoxTap { first, weights }
    })
}

/// Classifies the dominant light direction of a 3x3 luminosity grid.
pub fn classify_direction(grid: &LightGrid) -> Direction {
    if grid.total() == 0.0 {
        return Direction::Undetermined;
    }

    let center = grid.center();
    let center_dominates = grid
        .cells
        .iter()
        .flatten()
        .enumerate()
        .filter(|(index, _)| *index != 4)
        .all(|(_, &value)| center > value);
    if center_dominates {
        return Direction::Center;
    }

    let sums = [
        (Direction::Top, grid.top_sum()),
        (Direction::Bottom, grid.bottom_sum()),
        (Direction::Left, grid.left_sum()),
        (Direction::Right, grid.right_sum()),
    ];
    let best = sums.iter().map(|(_, sum)| *sum).fold(f64::NEG_INFINITY, f64::max);
    let mut leaders = sums.iter().filter(|(_, sum)| *sum == best);

    match (leaders.next(), leaders.next()) {
        (Some((direction, _)), None) => *direction,
        _ => Direction::Undetermined,
    }
}

/// Loads a light-map artifact and classifies it.
pub fn classify_lightmap_file(path: &Path) -> Result<Direction> {
    let image = image::open(path)
        .map_err(|source| PaletteError::image(path, source))?
        .to_rgb8();
    Ok(classify_direction(&LightGrid::from_image(&image)?))
}
