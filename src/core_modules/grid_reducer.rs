// THEORY:
// The grid reducer turns one cropped frame into a fixed R x C summary. It is the
// bridge between raw pixels and every downstream artifact: the Palette (average
// color per cell) and the Lightmap (average luminosity per cell) are both just a
// `Grid` rendered as solid blocks.
//
// Key rules:
// 1.  **Integer partitioning**: each cell spans `width / cols` by `height / rows`
//     pixels. Trailing pixels that do not divide evenly are discarded, never
//     padded, so the grid shape is independent of the frame's resolution.
// 2.  **Truncated means**: every cell value is the integer truncation of its mean.
// 3.  **Loud failure**: a frame smaller than the grid in either dimension yields
//     zero-pixel cells. That is an upstream crop error and surfaces as
//     `PaletteError::EmptyRegion`, never as a silently black cell.
// 4.  **Row-major everywhere**: cells are stored, iterated and rendered row by row.

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::region::region::Region;
use crate::error::{PaletteError, Result};
use image::{Rgb, RgbImage};

/// What each grid cell summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionMode {
    AverageColor,
    AverageLuminosity,
}

/// The value of one reduced cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridCell {
    Color(Pixel),
    Luminosity(u8),
}

impl GridCell {
    /// The color a cell is painted with when rendered.
    pub fn to_pixel(self) -> Pixel {
        match self {
            GridCell::Color(pixel) => pixel,
            GridCell::Luminosity(value) => Pixel::gray(value),
        }
    }
}

/// An R x C arrangement of reduced cells, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: u32,
    cols: u32,
    cells: Vec<GridCell>,
}

impl Grid {
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<GridCell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get((row * self.cols + col) as usize).copied()
    }

    /// Renders the grid by tiling a `block_width` x `block_height` solid block
    /// per cell. The output is `(cols * block_width, rows * block_height)`.
    pub fn render(&self, block_width: u32, block_height: u32) -> RgbImage {
        let mut output = RgbImage::new(self.cols * block_width, self.rows * block_height);
        for (index, cell) in self.cells.iter().enumerate() {
            let row = index as u32 / self.cols;
            let col = index as u32 % self.cols;
            let color: Rgb<u8> = cell.to_pixel().into();
            for y in row * block_height..(row + 1) * block_height {
                for x in col * block_width..(col + 1) * block_width {
                    output.put_pixel(x, y, color);
                }
            }
        }
        output
    }
}

/// Partitions `frame` into `rows` x `cols` regions and reduces each one.
pub fn reduce_to_grid(frame: &RgbImage, rows: u32, cols: u32, mode: ReductionMode) -> Result<Grid> {
    if rows == 0 || cols == 0 {
        return Err(PaletteError::degenerate(format!(
            "grid of {rows}x{cols} has no cells"
        )));
    }

    let sub_width = frame.width() / cols;
    let sub_height = frame.height() / rows;
    let mut cells = Vec::with_capacity(rows as usize * cols as usize);

    for row in 0..rows {
        for col in 0..cols {
            let region = Region::new(frame, col * sub_width, row * sub_height, sub_width, sub_height);
            if region.is_empty() {
                return Err(PaletteError::EmptyRegion { row, col });
            }
            let cell = match mode {
                ReductionMode::AverageColor => GridCell::Color(region.average_pixel()?),
                ReductionMode::AverageLuminosity => {
                    GridCell::Luminosity(region.average_luminosity()? as u8)
                }
            };
            cells.push(cell);
        }
    }

    Ok(Grid { rows, cols, cells })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadrant_frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            match (x < width / 2, y < height / 2) {
                (true, true) => Rgb([200, 0, 0]),
                (false, true) => Rgb([0, 200, 0]),
                (true, false) => Rgb([0, 0, 200]),
                (false, false) => Rgb([100, 100, 100]),
            }
        })
    }

    #[test]
    fn produces_rows_times_cols_cells_for_any_aspect_ratio() {
        for (width, height) in [(64, 36), (36, 64), (17, 9), (400, 4)] {
            let frame = quadrant_frame(width, height);
            let grid = reduce_to_grid(&frame, 4, 4, ReductionMode::AverageColor).unwrap();
            assert_eq!(grid.cells().len(), 16);
            assert_eq!((grid.rows(), grid.cols()), (4, 4));
        }
    }

    #[test]
    fn cells_follow_row_major_order() {
        let frame = quadrant_frame(40, 40);
        let grid = reduce_to_grid(&frame, 2, 2, ReductionMode::AverageColor).unwrap();
        assert_eq!(grid.cell(0, 0), Some(GridCell::Color(Pixel::new(200, 0, 0))));
        assert_eq!(grid.cell(0, 1), Some(GridCell::Color(Pixel::new(0, 200, 0))));
        assert_eq!(grid.cell(1, 0), Some(GridCell::Color(Pixel::new(0, 0, 200))));
        assert_eq!(grid.cell(1, 1), Some(GridCell::Color(Pixel::gray(100))));
        assert_eq!(grid.cell(2, 0), None);
    }

    #[test]
    fn trailing_pixels_are_discarded() {
        // 5 columns into 2 cells: each cell is 2 pixels wide, column 4 is ignored.
        let mut frame = RgbImage::from_pixel(5, 1, Rgb([0, 0, 0]));
        frame.put_pixel(4, 0, Rgb([255, 255, 255]));
        let grid = reduce_to_grid(&frame, 1, 2, ReductionMode::AverageColor).unwrap();
        assert_eq!(grid.cell(0, 1), Some(GridCell::Color(Pixel::BLACK)));
    }

    #[test]
    fn luminosity_mode_truncates_the_mean() {
        let mut frame = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        frame.put_pixel(1, 0, Rgb([101, 101, 101]));
        let grid = reduce_to_grid(&frame, 1, 1, ReductionMode::AverageLuminosity).unwrap();
        assert_eq!(grid.cell(0, 0), Some(GridCell::Luminosity(100)));
    }

    #[test]
    fn gray_101_lands_one_level_below() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([101, 101, 101]));
        let grid = reduce_to_grid(&frame, 2, 2, ReductionMode::AverageLuminosity).unwrap();
        assert!(grid.cells().iter().all(|cell| *cell == GridCell::Luminosity(100)));
    }

    #[test]
    fn frame_smaller_than_grid_is_an_error() {
        let frame = RgbImage::new(3, 10);
        let result = reduce_to_grid(&frame, 4, 4, ReductionMode::AverageColor);
        assert!(matches!(result, Err(PaletteError::EmptyRegion { row: 0, col: 0 })));
    }

    #[test]
    fn render_tiles_solid_blocks() {
        let frame = quadrant_frame(40, 40);
        let grid = reduce_to_grid(&frame, 2, 2, ReductionMode::AverageColor).unwrap();
        let palette = grid.render(50, 30);
        assert_eq!(palette.dimensions(), (100, 60));
        assert_eq!(*palette.get_pixel(0, 0), Rgb([200, 0, 0]));
        assert_eq!(*palette.get_pixel(49, 29), Rgb([200, 0, 0]));
        assert_eq!(*palette.get_pixel(50, 0), Rgb([0, 200, 0]));
        assert_eq!(*palette.get_pixel(99, 59), Rgb([100, 100, 100]));
    }

    #[test]
    fn light_map_is_grayscale() {
        let frame = quadrant_frame(40, 40);
        let grid = reduce_to_grid(&frame, 2, 2, ReductionMode::AverageLuminosity).unwrap();
        let light_map = grid.render(10, 10);
        for pixel in light_map.pixels() {
            assert!(pixel[0] == pixel[1] && pixel[1] == pixel[2]);
        }
        assert_eq!(grid.cell(1, 1), Some(GridCell::Luminosity(100)));
    }
}
