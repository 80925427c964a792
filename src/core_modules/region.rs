// THEORY:
// A `Region` is a rectangular window onto a frame, the unit of spatial pooling
// behind every grid cell and every whole-frame summary. Averaging over a region
// cancels out per-pixel noise so that a 4x4 palette describes the composition
// of the shot rather than its grain.
//
// Like `Pixel`, a `Region` is a "dumb" view: it borrows the frame instead of
// copying it and only knows how to summarize its own pixels. All means are
// truncated to integers. An empty region is an upstream crop error and is
// reported, never averaged to a default.

pub mod region {
    use crate::core_modules::pixel::pixel::{Luminosity, Pixel, luminosity};
    use crate::error::{PaletteError, Result};
    use image::RgbImage;

    /// A borrowed rectangular block of pixels within a frame.
    #[derive(Debug, Clone, Copy)]
    pub struct Region<'a> {
        image: &'a RgbImage,
        /// The left edge of the region in pixels.
        pub x: u32,
        /// The top edge of the region in pixels.
        pub y: u32,
        /// The width of the region in pixels.
        pub width: u32,
        /// The height of the region in pixels.
        pub height: u32,
    }

    impl<'a> Region<'a> {
        /// Creates a window, clamped to the frame bounds.
        pub fn new(image: &'a RgbImage, x: u32, y: u32, width: u32, height: u32) -> Self {
            let x = x.min(image.width());
            let y = y.min(image.height());
            Self {
                image,
                x,
                y,
                width: width.min(image.width() - x),
                height: height.min(image.height() - y),
            }
        }

        /// The whole frame as a single region.
        pub fn whole(image: &'a RgbImage) -> Self {
            Self::new(image, 0, 0, image.width(), image.height())
        }

        pub fn pixel_count(&self) -> u64 {
            self.width as u64 * self.height as u64
        }

        pub fn is_empty(&self) -> bool {
            self.pixel_count() == 0
        }

        /// Row-major iterator over the region's pixels.
        pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
            (self.y..self.y + self.height).flat_map(move |py| {
                (self.x..self.x + self.width).map(move |px| Pixel::from(self.image.get_pixel(px, py)))
            })
        }

        /// Calculates the average pixel of the region, each channel truncated.
        pub fn average_pixel(&self) -> Result<Pixel> {
            let count = self.pixel_count();
            if count == 0 {
                return Err(PaletteError::EmptyImage);
            }

            let mut sum_r = 0u64;
            let mut sum_g = 0u64;
            let mut sum_b = 0u64;
            for pixel in self.pixels() {
                sum_r += pixel.red as u64;
                sum_g += pixel.green as u64;
                sum_b += pixel.blue as u64;
            }

            Ok(Pixel::new(
                (sum_r / count) as u8,
                (sum_g / count) as u8,
                (sum_b / count) as u8,
            ))
        }

        /// Mean luminosity of the region, accumulated per pixel in f64.
        pub fn average_luminosity(&self) -> Result<Luminosity> {
            let count = self.pixel_count();
            if count == 0 {
                return Err(PaletteError::EmptyImage);
            }

            let mut total: Luminosity = 0.0;
            for pixel in self.pixels() {
                total += luminosity(pixel.red, pixel.green, pixel.blue);
            }
            Ok(total / count as Luminosity)
        }

        /// Fraction of the region's pixels whose luminosity is below `threshold`.
        pub fn dark_fraction(&self, threshold: Luminosity) -> f64 {
            let count = self.pixel_count();
            if count == 0 {
                return 0.0;
            }
            let dark = self.pixels().filter(|p| p.luminosity() < threshold).count();
            dark as f64 / count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::region::*;
    use crate::core_modules::pixel::pixel::Pixel;
    use image::{Rgb, RgbImage};

    #[test]
    fn average_truncates_each_channel() {
        let mut image = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        image.put_pixel(1, 0, Rgb([11, 21, 32]));
        let average = Region::whole(&image).average_pixel().unwrap();
        assert_eq!(average, Pixel::new(10, 20, 31));
    }

    #[test]
    fn region_is_clamped_to_frame() {
        let image = RgbImage::new(10, 6);
        let region = Region::new(&image, 8, 4, 5, 5);
        assert_eq!((region.width, region.height), (2, 2));
        assert_eq!(region.pixels().count(), 4);
    }

    #[test]
    fn empty_region_fails_loudly() {
        let image = RgbImage::new(4, 4);
        let region = Region::new(&image, 0, 0, 0, 4);
        assert!(region.is_empty());
        assert!(region.average_pixel().is_err());
        assert!(region.average_luminosity().is_err());
    }

    #[test]
    fn dark_fraction_counts_pixels_below_threshold() {
        let mut image = RgbImage::from_pixel(4, 1, Rgb([200, 200, 200]));
        image.put_pixel(0, 0, Rgb([0, 0, 0]));
        let fraction = Region::whole(&image).dark_fraction(10.0);
        assert!((fraction - 0.25).abs() < 1e-12);
    }
}
