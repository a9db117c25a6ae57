//! Raw RGB565 and 24-bit BMP blitters.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadExactError, Seek, SeekFrom};

use crate::bus::GpioRegisters;
use crate::color::PixelFormat;
use crate::display::Ili9xxx;
use crate::fmt::warn;
use crate::{Error, Timer};

/// Bytes read from the file per bus burst.
const CHUNK: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BmpError {
    /// File does not start with `BM`
    BadMagic,
    /// Only uncompressed single-plane 24-bit images are drawn
    Unsupported { planes: u16, depth: u16, compression: u32 },
    /// File shorter than its headers
    Truncated,
    /// Pixel array does not fit in a file with a 32-bit size field
    Oversized { width: u32, height: u32 },
}

/// The fields of BITMAPFILEHEADER + BITMAPINFOHEADER the blitter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BmpHeader {
    pub pixel_offset: u32,
    pub width: u32,
    pub height: u32,
    /// Negative height in the file
    pub top_down: bool,
    pub planes: u16,
    pub depth: u16,
    pub compression: u32,
}

impl BmpHeader {
    /// Header bytes up to and including the compression field.
    pub const LEN: usize = 34;

    pub fn parse(bytes: &[u8; Self::LEN]) -> Result<Self, BmpError> {
        if bytes[..2] != *b"BM" {
            return Err(BmpError::BadMagic);
        }
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        let width = u32_at(18) as i32;
        let height = u32_at(22) as i32;
        Ok(Self {
            pixel_offset: u32_at(10),
            width: width.unsigned_abs(),
            height: height.unsigned_abs(),
            top_down: height < 0,
            planes: u16_at(26),
            depth: u16_at(28),
            compression: u32_at(30),
        })
    }

    pub fn ensure_supported(&self) -> Result<(), BmpError> {
        if self.planes != 1 || self.depth != 24 || self.compression != 0 {
            return Err(BmpError::Unsupported {
                planes: self.planes,
                depth: self.depth,
                compression: self.compression,
            });
        }
        let end = self.pixel_offset as u64 + self.stride() * self.height as u64;
        if end > u32::MAX as u64 {
            return Err(BmpError::Oversized {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Row size in the file, padded to four bytes.
    ///
    /// `None` when a single row is larger than a BMP file can be.
    pub fn row_stride(&self) -> Option<u32> {
        u32::try_from(self.stride()).ok()
    }

    fn stride(&self) -> u64 {
        (self.width as u64 * 3 + 3) & !3
    }
}

fn read_pixels<F: Read>(file: &mut F, buf: &mut [u8]) -> Result<(), Error<F::Error>> {
    file.read_exact(buf).map_err(|e| match e {
        ReadExactError::UnexpectedEof => Error::UnexpectedEof,
        ReadExactError::Other(e) => Error::Io(e),
    })
}

impl<'f, REGS, RST, TIMER> Ili9xxx<'f, REGS, RST, TIMER>
where
    REGS: GpioRegisters,
    RST: OutputPin<Error = Infallible>,
    TIMER: Timer,
{
    /// Blit a headerless RGB565 stream (big-endian pixels, row-major)
    /// of `width` x `height` pixels with its top-left corner at `x`, `y`.
    ///
    /// Only available in 16-bit mode. Parts outside the screen are read
    /// and discarded.
    pub fn draw_raw_image<F: Read>(
        &mut self,
        file: &mut F,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Result<(), Error<F::Error>> {
        let format = self.pixel_format();
        if format != PixelFormat::Rgb565 {
            warn!("raw images need 16-bit color, display is {}-bit", format.bits());
            return Err(Error::UnsupportedFormat(format));
        }
        let Some((x0, y0, x1, y1)) = self.clip(x as i32, y as i32, width as i32, height as i32)
        else {
            return Ok(());
        };

        self.bus.window(x0, y0, x1, y1);
        let visible = (x1 - x0 + 1) as usize * 2;
        let skipped = width as usize * 2 - visible;
        let result = self.stream_raw(file, y1 - y0 + 1, visible, skipped);
        self.bus.deselect();
        result
    }

    fn stream_raw<F: Read>(
        &mut self,
        file: &mut F,
        rows: u16,
        visible: usize,
        skipped: usize,
    ) -> Result<(), Error<F::Error>> {
        let mut buf = [0u8; CHUNK];
        for _ in 0..rows {
            let mut left = visible;
            while left > 0 {
                let chunk = &mut buf[..left.min(CHUNK)];
                read_pixels(file, chunk)?;
                for &byte in chunk.iter() {
                    self.bus.data_byte(byte);
                }
                left -= chunk.len();
            }
            let mut left = skipped;
            while left > 0 {
                let chunk = &mut buf[..left.min(CHUNK)];
                read_pixels(file, chunk)?;
                left -= chunk.len();
            }
        }
        Ok(())
    }

    /// Blit an uncompressed 24-bit BMP with its top-left corner at `x`, `y`,
    /// clipped to the screen.
    ///
    /// Rows are taken in file order, so only top-down files come out upright.
    pub fn draw_bmp<F: Read + Seek>(
        &mut self,
        file: &mut F,
        x: u16,
        y: u16,
    ) -> Result<(), Error<F::Error>> {
        let mut raw = [0u8; BmpHeader::LEN];
        file.seek(SeekFrom::Start(0)).map_err(Error::Io)?;
        file.read_exact(&mut raw).map_err(|e| match e {
            ReadExactError::UnexpectedEof => Error::Bmp(BmpError::Truncated),
            ReadExactError::Other(e) => Error::Io(e),
        })?;
        let header = BmpHeader::parse(&raw).and_then(|header| {
            header.ensure_supported()?;
            Ok(header)
        });
        let header = match header {
            Ok(header) => header,
            Err(error) => {
                warn!("bmp rejected: {}", error);
                return Err(error.into());
            }
        };

        if x >= self.width || y >= self.height {
            return Ok(());
        }
        let frame_w = header.width.min((self.width - x) as u32) as u16;
        let frame_h = header.height.min((self.height - y) as u32) as u16;
        if frame_w == 0 || frame_h == 0 {
            return Ok(());
        }

        self.bus.window(x, y, x + frame_w - 1, y + frame_h - 1);
        let result = self.stream_bmp(file, &header, frame_w, frame_h);
        self.bus.deselect();
        result
    }

    fn stream_bmp<F: Read + Seek>(
        &mut self,
        file: &mut F,
        header: &BmpHeader,
        frame_w: u16,
        frame_h: u16,
    ) -> Result<(), Error<F::Error>> {
        let format = self.pixel_format();
        let stride = header.stride();
        let row_bytes = frame_w as usize * 3;
        let mut position = None;
        let mut buf = [0u8; CHUNK];

        for row in 0..frame_h as u64 {
            let start = header.pixel_offset as u64 + row * stride;
            if position != Some(start) {
                file.seek(SeekFrom::Start(start)).map_err(Error::Io)?;
            }

            let mut left = row_bytes;
            while left > 0 {
                let chunk = &mut buf[..left.min(CHUNK)];
                read_pixels(file, chunk)?;
                for bgr in chunk.chunks_exact(3) {
                    let (b, g, r) = (bgr[0], bgr[1], bgr[2]);
                    match format {
                        PixelFormat::Rgb565 => {
                            self.bus.data_byte((r & 0xF8) | (g >> 5));
                            self.bus.data_byte(((g & 0x1C) << 3) | (b >> 3));
                        }
                        PixelFormat::Rgb666 | PixelFormat::Rgb888 => {
                            self.bus.data_byte(r);
                            self.bus.data_byte(g);
                            self.bus.data_byte(b);
                        }
                    }
                }
                left -= chunk.len();
            }
            position = Some(start + row_bytes as u64);
        }
        Ok(())
    }
}
