// THEORY (single-pixel scope):
// `Pixel` is the most fundamental unit of the engine: a "dumb" container for one
// RGB sample plus its brightness. Black bars and light maps use the Rec. 601
// weighted sum (0.299 R + 0.587 G + 0.114 B) evaluated in f64 exactly in that
// order, so a value computed here and a value computed while reducing a region
// never disagree at a truncation boundary. Reading a light map back for
// classification uses the 8-bit gray level instead: the same weights in 16-bit
// fixed point, rounded.
//
// Nothing here reads neighbors; multi-pixel logic lives in `region` and above.

pub mod pixel {
    use image::Rgb;

    pub type Channel = u8;
    pub type Luminosity = f64;

    pub const RED_WEIGHT: Luminosity = 0.299;
    pub const GREEN_WEIGHT: Luminosity = 0.587;
    pub const BLUE_WEIGHT: Luminosity = 0.114;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    impl Pixel {
        pub const BLACK: Pixel = Pixel::new(0, 0, 0);

        pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        /// A neutral gray where every channel carries `value`.
        pub const fn gray(value: Channel) -> Self {
            Pixel::new(value, value, value)
        }

        /// Luminosity estimate (Rec. 601 luma) on the 0..255 scale.
        pub fn luminosity(&self) -> Luminosity {
            luminosity(self.red, self.green, self.blue)
        }

        /// 8-bit gray level, `(R * 19595 + G * 38470 + B * 7471 + 0x8000) >> 16`.
        pub fn gray_level(&self) -> Channel {
            ((self.red as u32 * 19595 + self.green as u32 * 38470 + self.blue as u32 * 7471 + 0x8000)
                >> 16) as Channel
        }

        pub fn to_rgb(self) -> Rgb<u8> {
            Rgb([self.red, self.green, self.blue])
        }
    }

    /// Rec. 601 luma of raw channels, without building a `Pixel`.
    #[inline]
    pub fn luminosity(red: Channel, green: Channel, blue: Channel) -> Luminosity {
        RED_WEIGHT * red as Luminosity
            + GREEN_WEIGHT * green as Luminosity
            + BLUE_WEIGHT * blue as Luminosity
    }

    impl From<&Rgb<u8>> for Pixel {
        fn from(rgb: &Rgb<u8>) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }

    impl From<Pixel> for Rgb<u8> {
        fn from(pixel: Pixel) -> Self {
            pixel.to_rgb()
        }
    }

    impl From<(u8, u8, u8)> for Pixel {
        fn from((red, green, blue): (u8, u8, u8)) -> Self {
            Pixel::new(red, green, blue)
        }
    }

    impl std::fmt::Display for Pixel {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "({}, {}, {})", self.red, self.green, self.blue)
        }
    }
}
