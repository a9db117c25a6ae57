use embedded_graphics_core::pixelcolor::{Rgb565, raw::RawU16};
use embedded_graphics_core::prelude::RawData;

/// Pixel encoding negotiated with the controller through COLMOD (0x3A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PixelFormat {
    /// 5-6-5, two bus bytes per pixel
    #[default]
    Rgb565,
    /// 6-6-6, three bus bytes per pixel
    Rgb666,
    /// 8-8-8, three bus bytes per pixel
    Rgb888,
}

/// A color already packed for one [`PixelFormat`].
///
/// The packing is format specific; build values with [`PixelFormat::rgb`]
/// (or the display's `rgb` helper) rather than by hand unless the layout is
/// known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0);

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for Color {
    fn from(raw: u32) -> Self {
        Color(raw)
    }
}

impl From<Rgb565> for Color {
    fn from(color: Rgb565) -> Self {
        Color(RawU16::from(color).into_inner() as u32)
    }
}

impl PixelFormat {
    /// Color depth in bits.
    pub const fn bits(self) -> u8 {
        match self {
            PixelFormat::Rgb565 => 16,
            PixelFormat::Rgb666 => 18,
            PixelFormat::Rgb888 => 24,
        }
    }

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            16 => Some(PixelFormat::Rgb565),
            18 => Some(PixelFormat::Rgb666),
            24 => Some(PixelFormat::Rgb888),
            _ => None,
        }
    }

    /// COLMOD parameter, same value for the RGB and MCU interface nibbles.
    pub const fn interface_code(self) -> u8 {
        match self {
            PixelFormat::Rgb565 => 0x55,
            PixelFormat::Rgb666 => 0x66,
            PixelFormat::Rgb888 => 0x77,
        }
    }

    /// Bytes written to the bus per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb666 | PixelFormat::Rgb888 => 3,
        }
    }

    /// Pack 8-bit channels, truncating the low bits the format cannot hold.
    pub const fn rgb(self, r: u8, g: u8, b: u8) -> Color {
        let (r, g, b) = (r as u32, g as u32, b as u32);
        let packed = match self {
            PixelFormat::Rgb565 => ((r & 0xF8) << 8) | ((g & 0xFC) << 3) | (b >> 3),
            PixelFormat::Rgb666 => ((r >> 2) << 12) | ((g >> 2) << 6) | (b >> 2),
            PixelFormat::Rgb888 => (r << 16) | (g << 8) | b,
        };
        Color(packed)
    }

    /// Unpack to 8-bit channels. Truncated low bits come back as zero.
    pub const fn channels(self, color: Color) -> (u8, u8, u8) {
        let c = color.0;
        match self {
            PixelFormat::Rgb565 => (
                ((c >> 8) & 0xF8) as u8,
                ((c >> 3) & 0xFC) as u8,
                ((c << 3) & 0xF8) as u8,
            ),
            PixelFormat::Rgb666 => (
                (((c >> 12) & 0x3F) << 2) as u8,
                (((c >> 6) & 0x3F) << 2) as u8,
                ((c & 0x3F) << 2) as u8,
            ),
            PixelFormat::Rgb888 => ((c >> 16) as u8, (c >> 8) as u8, c as u8),
        }
    }

    /// Bytes the controller expects on the bus for one pixel, most
    /// significant first. Only the first [`bytes_per_pixel`] entries are used.
    ///
    /// [`bytes_per_pixel`]: PixelFormat::bytes_per_pixel
    pub const fn bus_bytes(self, color: Color) -> [u8; 3] {
        let c = color.0;
        match self {
            PixelFormat::Rgb565 => [(c >> 8) as u8, c as u8, 0],
            PixelFormat::Rgb666 => [
                ((c >> 10) & 0xFF) as u8,
                ((c >> 2) & 0xFF) as u8,
                ((c << 4) & 0xF0) as u8,
            ],
            PixelFormat::Rgb888 => [(c >> 16) as u8, (c >> 8) as u8, c as u8],
        }
    }
}
