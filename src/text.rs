//! Bitmap fonts, icons and text layout.
//!
//! Layout is character-level: a glyph that would cross the right edge moves
//! to the next line, `'\n'` forces a line break and `'\t'` is a space.
//! Spaces take two cells.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;

use crate::bus::GpioRegisters;
use crate::color::Color;
use crate::display::Ili9xxx;
use crate::fmt::warn;
use crate::{Error, Timer};

/// One pre-rasterized glyph.
///
/// `bitmap` holds `height` rows of `ceil(width / 8)` bytes each, most
/// significant bit leftmost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph<'a> {
    pub bitmap: &'a [u8],
    pub height: u16,
    pub width: u16,
}

impl Glyph<'_> {
    /// Whether the pixel at `col`, `row` is foreground. Pixels past the end
    /// of `bitmap` are background.
    pub fn is_set(&self, col: u16, row: u16) -> bool {
        if col >= self.width || row >= self.height {
            return false;
        }
        let stride = (self.width as usize).div_ceil(8);
        let index = row as usize * stride + col as usize / 8;
        self.bitmap
            .get(index)
            .is_some_and(|byte| byte & (0x80 >> (col % 8)) != 0)
    }
}

/// Glyph source, e.g. a font table generated offline.
pub trait Font {
    fn glyph(&self, ch: char) -> Glyph<'_>;
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), self = "Ili9xxx",),
    async(feature = "async", keep_self)
)]
impl<'f, REGS, RST, TIMER> Ili9xxx<'f, REGS, RST, TIMER>
where
    REGS: GpioRegisters,
    RST: OutputPin<Error = Infallible>,
    TIMER: Timer,
{
    /// Opaque text that scrolls the panel up one text line at a time once
    /// the bottom is reached, clearing the freed line with `bg`.
    ///
    /// Uses the hardware scroll area, so the panel must be at a rotation
    /// whose height matches the native one.
    pub async fn scroll_text(
        &mut self,
        text: &str,
        x: u16,
        y: u16,
        color: Color,
        bg: Color,
        delay_ms: u64,
    ) -> Result<(), Error> {
        let font = self.require_font()?;
        self.vertical_scroll(0, self.height, 0)?;

        let (screen_w, screen_h) = (self.width as i32, self.height as i32);
        let (x_start, mut x, mut y) = (x as i32, x as i32, y as i32);
        let mut scrolling = false;

        for ch in text.chars() {
            if ch == '\n' {
                x = screen_w;
                continue;
            }
            let ch = if ch == '\t' { ' ' } else { ch };
            let glyph = font.glyph(ch);
            let (gw, gh) = (glyph.width as i32, glyph.height as i32);

            if x + gw >= screen_w {
                x = x_start;
                y += gh;
                if y + gh > screen_h {
                    scrolling = true;
                    y = 0;
                }
                if scrolling {
                    self.scroll_line(y, gh, bg, delay_ms).await;
                }
            }

            self.draw_glyph_fast(&glyph, x, y, color, bg);
            x += gw;
            if ch == ' ' && x + gw <= screen_w {
                self.draw_glyph_fast(&glyph, x, y, color, bg);
                x += gw;
            }
        }
        Ok(())
    }

    async fn scroll_line(&mut self, y: i32, rows: i32, bg: Color, delay_ms: u64) {
        for row in y..y + rows {
            self.vertical_scroll_start((row + 1) as u16);
            self.fill_rect(0, row, self.width, 1, bg);
            TIMER::delay_ms(delay_ms).await;
        }
    }
}

impl<'f, REGS, RST, TIMER> Ili9xxx<'f, REGS, RST, TIMER>
where
    REGS: GpioRegisters,
    RST: OutputPin<Error = Infallible>,
    TIMER: Timer,
{
    pub fn set_font(&mut self, font: &'f dyn Font) {
        self.font = Some(font);
    }

    pub fn font(&self) -> Option<&'f dyn Font> {
        self.font
    }

    fn require_font(&self) -> Result<&'f dyn Font, Error> {
        self.font.ok_or_else(|| {
            warn!("font not set");
            Error::MissingFont
        })
    }

    /// Transparent text, drawn pixel by pixel. Stops silently at the bottom
    /// of the screen.
    pub fn draw_text(&mut self, text: &str, x: u16, y: u16, color: Color) -> Result<(), Error> {
        let font = self.require_font()?;
        let (screen_w, screen_h) = (self.width as i32, self.height as i32);
        let (x_start, mut x, mut y) = (x as i32, x as i32, y as i32);

        for ch in text.chars() {
            if ch == '\n' {
                x = screen_w;
                continue;
            }
            let ch = if ch == '\t' { ' ' } else { ch };
            let glyph = font.glyph(ch);
            let (gw, gh) = (glyph.width as i32, glyph.height as i32);

            if ch == ' ' {
                x += gw;
            }
            if x + gw > screen_w {
                x = x_start;
                y += gh;
            }
            if y + gh > screen_h {
                break;
            }
            self.draw_glyph(&glyph, x, y, color);
            x += gw;
        }
        Ok(())
    }

    /// Opaque text, one window and burst per glyph.
    pub fn draw_text_fast(
        &mut self,
        text: &str,
        x: u16,
        y: u16,
        color: Color,
        bg: Color,
    ) -> Result<(), Error> {
        let font = self.require_font()?;
        let (screen_w, screen_h) = (self.width as i32, self.height as i32);
        let (x_start, mut x, mut y) = (x as i32, x as i32, y as i32);

        for ch in text.chars() {
            if ch == '\n' {
                x = screen_w;
                continue;
            }
            let ch = if ch == '\t' { ' ' } else { ch };
            let glyph = font.glyph(ch);
            let (gw, gh) = (glyph.width as i32, glyph.height as i32);

            if x + gw >= screen_w {
                x = x_start;
                y += gh;
            }
            if y + gh >= screen_h {
                break;
            }
            self.draw_glyph_fast(&glyph, x, y, color, bg);
            x += gw;
            if ch == ' ' && x + gw <= screen_w {
                self.draw_glyph_fast(&glyph, x, y, color, bg);
                x += gw;
            }
        }
        Ok(())
    }

    fn draw_glyph(&mut self, glyph: &Glyph<'_>, x: i32, y: i32, color: Color) {
        for row in 0..glyph.height {
            for col in 0..glyph.width {
                if glyph.is_set(col, row) {
                    self.draw_pixel(x + col as i32, y + row as i32, color);
                }
            }
        }
    }

    fn draw_glyph_fast(&mut self, glyph: &Glyph<'_>, x: i32, y: i32, color: Color, bg: Color) {
        self.draw_mask(x, y, glyph.width, glyph.height, color, bg, |col, row| {
            glyph.is_set(col, row)
        });
    }

    /// Square 1-bit icon, one word per row, bit 0 leftmost. Clear bits are
    /// left untouched.
    pub fn draw_bitmap(&mut self, rows: &[u32], x: i32, y: i32, size: u16, color: Color) {
        for (dy, &bits) in rows.iter().take(size as usize).enumerate() {
            for dx in 0..size.min(32) {
                if (bits >> dx) & 1 != 0 {
                    self.draw_pixel(x + dx as i32, y + dy as i32, color);
                }
            }
        }
    }

    /// Opaque variant of [`draw_bitmap`](Self::draw_bitmap) through a single
    /// window.
    pub fn draw_bitmap_fast(
        &mut self,
        rows: &[u32],
        x: i32,
        y: i32,
        size: u16,
        color: Color,
        bg: Color,
    ) {
        self.draw_mask(x, y, size, size, color, bg, |col, row| {
            col < 32
                && rows
                    .get(row as usize)
                    .is_some_and(|&bits| (bits >> col) & 1 != 0)
        });
    }

    /// Fill the visible part of a `width` x `height` cell at `x`, `y`,
    /// choosing `color` or `bg` per pixel.
    #[allow(clippy::too_many_arguments)]
    fn draw_mask<F>(
        &mut self,
        x: i32,
        y: i32,
        width: u16,
        height: u16,
        color: Color,
        bg: Color,
        is_set: F,
    ) where
        F: Fn(u16, u16) -> bool,
    {
        let Some((x0, y0, x1, y1)) = self.clip(x, y, width as i32, height as i32) else {
            return;
        };
        let format = self.pixel_format();
        let fg = self.bus.pixel_words(format, color);
        let bg = self.bus.pixel_words(format, bg);

        self.bus.window(x0, y0, x1, y1);
        for py in y0..=y1 {
            let row = (py as i32 - y) as u16;
            for px in x0..=x1 {
                let col = (px as i32 - x) as u16;
                let pixel = if is_set(col, row) { &fg } else { &bg };
                self.bus.pixel(pixel);
            }
        }
        self.bus.deselect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::PixelFormat;
    use crate::controller::Controller;
    use crate::display::Config;
    use crate::sim::{self, BoxFont, Panel, block_on};

    const FG: Color = Color(0xFFFF);
    const BG: Color = Color(0x0841);

    fn panel(trace: &sim::SharedTrace) -> Panel {
        Panel::replay(&trace.borrow(), PixelFormat::Rgb565, 240, 320)
    }

    #[test]
    fn glyph_bits_msb_first() {
        let glyph = Glyph {
            bitmap: &[0b1000_0000, 0b0100_0000, 0x00, 0b0100_0000],
            height: 2,
            width: 10,
        };
        assert!(glyph.is_set(0, 0));
        assert!(glyph.is_set(9, 0));
        assert!(glyph.is_set(9, 1));
        assert!(!glyph.is_set(0, 1));
        assert!(!glyph.is_set(8, 0));
        assert!(!glyph.is_set(10, 0));
        assert!(!glyph.is_set(0, 5));
    }

    #[test]
    fn text_needs_font() {
        let (mut display, trace) = sim::display(Config::new(Controller::Ili9341));
        assert!(matches!(display.draw_text("hi", 0, 0, FG), Err(Error::MissingFont)));
        assert!(matches!(
            display.draw_text_fast("hi", 0, 0, FG, BG),
            Err(Error::MissingFont)
        ));
        assert!(matches!(
            block_on(display.scroll_text("hi", 0, 0, FG, BG, 0)),
            Err(Error::MissingFont)
        ));
        assert!(trace.borrow().events.is_empty());
    }

    #[test]
    fn transparent_text_wraps_at_edge() {
        let font = BoxFont;
        let (mut display, trace) = sim::display(Config::new(Controller::Ili9341));
        display.set_font(&font);
        let text: String = core::iter::repeat_n('A', 31).collect();
        display.draw_text(&text, 0, 0, FG).unwrap();

        let panel = panel(&trace);
        assert_eq!(panel.pixel(232, 0), Some(0xFFFF));
        assert_eq!(panel.pixel(0, 10), Some(0xFFFF));
        assert_eq!(panel.pixel(8, 10), None);
        // inside of the box glyph is never written
        assert_eq!(panel.pixel(3, 3), None);
    }

    #[test]
    fn newline_and_double_space() {
        let font = BoxFont;
        let (mut display, trace) = sim::display(Config::new(Controller::Ili9341));
        display.set_font(&font);
        display.draw_text("A A\nA", 0, 0, FG).unwrap();

        let panel = panel(&trace);
        assert_eq!(panel.pixel(0, 0), Some(0xFFFF));
        assert_eq!(panel.pixel(8, 0), None);
        assert_eq!(panel.pixel(24, 0), Some(0xFFFF));
        assert_eq!(panel.pixel(0, 10), Some(0xFFFF));
    }

    #[test]
    fn text_stops_at_bottom() {
        let font = BoxFont;
        let (mut display, trace) = sim::display(Config::new(Controller::Ili9341));
        display.set_font(&font);
        display.draw_text("A\nB\nC", 0, 300, FG).unwrap();

        let panel = panel(&trace);
        assert_eq!(panel.pixel(0, 310), Some(0xFFFF));
        assert_eq!(panel.written_rows().max(), Some(319));
    }

    #[test]
    fn fast_text_is_opaque() {
        let font = BoxFont;
        let (mut display, trace) = sim::display(Config::new(Controller::Ili9341));
        display.set_font(&font);
        display.draw_text_fast("A A", 0, 0, FG, BG).unwrap();

        let panel = panel(&trace);
        assert_eq!(panel.pixel(0, 0), Some(0xFFFF));
        assert_eq!(panel.pixel(3, 3), Some(0x0841));
        // the space fills two cells
        assert_eq!(panel.pixel(8, 0), Some(0x0841));
        assert_eq!(panel.pixel(23, 9), Some(0x0841));
        assert_eq!(panel.pixel(24, 0), Some(0xFFFF));
        assert_eq!(panel.pixel(32, 0), None);
        assert_eq!(panel.overrun, 0);
        assert!(!trace.borrow().selected);
    }

    #[test]
    fn fast_text_wraps_one_cell_early() {
        let font = BoxFont;
        let (mut display, trace) = sim::display(Config::new(Controller::Ili9341));
        display.set_font(&font);
        let text: String = core::iter::repeat_n('A', 30).collect();
        display.draw_text_fast(&text, 0, 0, FG, BG).unwrap();

        let panel = panel(&trace);
        assert_eq!(panel.pixel(224, 0), Some(0xFFFF));
        assert_eq!(panel.pixel(232, 0), None);
        assert_eq!(panel.pixel(0, 10), Some(0xFFFF));
    }

    #[test]
    fn scroll_text_scrolls_after_last_line() {
        let font = BoxFont;
        let (mut display, trace) = sim::display(Config::new(Controller::Ili9341));
        display.set_font(&font);
        let mut text = String::from("A");
        for _ in 0..32 {
            text.push_str("\nA");
        }
        block_on(display.scroll_text(&text, 0, 0, FG, BG, 0)).unwrap();

        let panel = panel(&trace);
        assert_eq!(panel.scroll_areas, Some((0, 320, 0)));
        assert_eq!(panel.scroll_start, Some(10));
        assert_eq!(panel.commands.iter().filter(|(c, _)| *c == 0x37).count(), 10);
        assert_eq!(panel.pixel(0, 0), Some(0xFFFF));
        assert_eq!(panel.pixel(0, 310), Some(0xFFFF));
    }

    #[test]
    fn scroll_text_accepts_empty_text() {
        let font = BoxFont;
        let (mut display, trace) = sim::display(Config::new(Controller::Ili9341));
        display.set_font(&font);
        block_on(display.scroll_text("", 0, 0, FG, BG, 0)).unwrap();
        assert_eq!(panel(&trace).scroll_areas, Some((0, 320, 0)));
    }

    #[test]
    fn bitmap_lsb_is_left() {
        let rows = [0b0000_0001, 0b1000_0000, 0, 0, 0, 0, 0, 0];
        let (mut display, trace) = sim::display(Config::new(Controller::Ili9341));
        display.draw_bitmap(&rows, 10, 10, 8, FG);
        display.draw_bitmap_fast(&rows, 236, 20, 8, FG, BG);

        let panel = panel(&trace);
        assert_eq!(panel.pixel(10, 10), Some(0xFFFF));
        assert_eq!(panel.pixel(17, 11), Some(0xFFFF));
        assert_eq!(panel.pixel(11, 10), None);
        assert_eq!(panel.pixel(236, 20), Some(0xFFFF));
        assert_eq!(panel.pixel(239, 21), Some(0x0841));
        assert_eq!(panel.overrun, 0);
    }
}
