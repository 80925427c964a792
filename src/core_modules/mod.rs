pub mod black_bars;
pub mod color_summary;
pub mod grid_reducer;
pub mod light_direction;
pub mod pixel;
pub mod region;
pub mod utils;
