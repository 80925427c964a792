pub mod image_helper {
    use crate::config::ArtifactFormat;
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::error::{PaletteError, Result};
    use image::RgbImage;
    use std::path::Path;

    /// A `width` x `height` image filled with a single color.
    pub fn solid_block(color: Pixel, width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, color.to_rgb())
    }

    /// Decodes any supported still image and converts it to 8-bit RGB.
    pub fn load_frame(path: &Path) -> Result<RgbImage> {
        let image = image::open(path).map_err(|source| PaletteError::image(path, source))?;
        Ok(image.to_rgb8())
    }

    pub fn save(path: &Path, image: &RgbImage, format: ArtifactFormat) -> Result<()> {
        image
            .save_with_format(path, format.image_format())
            .map_err(|source| PaletteError::image(path, source))
    }
}
