use core::convert::Infallible;
use core::marker::PhantomData;

use embedded_graphics_core::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Size},
    pixelcolor::{Rgb888, RgbColor},
    primitives::Rectangle,
};
use embedded_hal::digital::OutputPin;

use crate::bus::{Bus, GpioRegisters};
use crate::color::{Color, PixelFormat};
use crate::controller::{Controller, InitStep, Instruction, Rotation};
use crate::fmt::{info, warn};
use crate::text::Font;
use crate::{Error, Timer};

/// Display configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub controller: Controller,
    pub pixel_format: PixelFormat,
    /// Width at rotation 0
    pub width: u16,
    /// Height at rotation 0
    pub height: u16,
}

impl Config {
    /// Native panel size of `controller`, 16-bit color.
    pub const fn new(controller: Controller) -> Self {
        let (width, height) = controller.native_size();
        Self {
            controller,
            pixel_format: PixelFormat::Rgb565,
            width,
            height,
        }
    }

    pub const fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Controller::Ili9488)
    }
}

/// Content adaptive brightness control modes (0x55).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Cabc {
    Off = 0,
    UserInterface = 1,
    StillPicture = 2,
    MovingImage = 3,
}

/// Display driver over a bit-banged 8080 bus.
pub struct Ili9xxx<'f, REGS, RST, TIMER>
where
    REGS: GpioRegisters,
    RST: OutputPin<Error = Infallible>,
    TIMER: Timer,
{
    pub(crate) bus: Bus<REGS>,
    rst: RST,
    config: Config,
    rotation: Rotation,
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) font: Option<&'f dyn Font>,
    _timer: PhantomData<TIMER>,
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
    /// Hardware reset followed by a software reset.
    pub async fn reset(&mut self) -> Result<(), Error> {
        self.rst.set_low().map_err(Error::Pin)?;
        TIMER::delay_ms(10).await;
        self.rst.set_high().map_err(Error::Pin)?;
        TIMER::delay_ms(120).await;
        self.bus.write_command(Instruction::SoftwareReset.into());
        TIMER::delay_ms(120).await;
        Ok(())
    }

    /// Reset the panel and run the controller's power-on sequence.
    ///
    /// Leaves the driver at rotation 0.
    pub async fn init(&mut self) -> Result<(), Error> {
        info!("display init: {}", self.config.controller);
        self.reset().await?;

        for step in self.config.controller.init_sequence() {
            match *step {
                InitStep::Command(command, params) => self.bus.write_command_with(command, params),
                InitStep::PixelFormat => self.bus.write_command_with(
                    Instruction::PixelFormatSet.into(),
                    &[self.config.pixel_format.interface_code()],
                ),
                InitStep::Delay(ms) => TIMER::delay_ms(ms).await,
            }
        }

        self.rotation = Rotation::Deg0;
        self.width = self.config.width;
        self.height = self.config.height;
        info!("display ready: {}x{}", self.width, self.height);
        Ok(())
    }

    /// Scroll the whole panel through one full turn, one line per `delay_ms`.
    pub async fn scroll(&mut self, delay_ms: u64) {
        for line in 0..self.native_height() {
            self.vertical_scroll_start(line + 1);
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
    /// Wrap a bus. The panel is not touched until [`init`](Self::init).
    pub fn new(config: Config, bus: Bus<REGS>, rst: RST) -> Result<Self, Error> {
        if !config.controller.supports(config.pixel_format) {
            return Err(Error::UnsupportedController {
                controller: config.controller,
                format: config.pixel_format,
            });
        }
        Ok(Self {
            bus,
            rst,
            config,
            rotation: Rotation::Deg0,
            width: config.width,
            height: config.height,
            font: None,
            _timer: PhantomData,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.config.pixel_format
    }

    /// Width in the current rotation.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Height in the current rotation.
    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Pack 8-bit channels for the active pixel format.
    pub fn rgb(&self, r: u8, g: u8, b: u8) -> Color {
        self.config.pixel_format.rgb(r, g, b)
    }

    pub fn write_command(&mut self, command: u8) {
        self.bus.write_command(command);
    }

    pub fn write_data(&mut self, data: u8) {
        self.bus.write_data(data);
    }

    pub fn write_data_burst(&mut self, data: &[u8]) {
        self.bus.write_data_burst(data);
    }

    /// Rebuild the byte table from the current output register, e.g. after
    /// a touch scan reconfigured shared pins.
    pub fn refresh_lookup_table(&mut self) {
        self.bus.rebuild_lookup_table();
    }

    /// Give back the register block and reset pin.
    pub fn release(self) -> (REGS, RST) {
        (self.bus.release(), self.rst)
    }

    /// Set rotation by index (0..=3, quarter turns clockwise).
    pub fn set_rotation(&mut self, rotation: u8) -> Result<(), Error> {
        let rotation = Rotation::try_from(rotation).map_err(|index| {
            warn!("rotation {} out of range", index);
            Error::InvalidRotation(index)
        })?;
        self.set_orientation(rotation);
        Ok(())
    }

    pub fn set_orientation(&mut self, rotation: Rotation) {
        if rotation.is_transposed() != self.rotation.is_transposed() {
            core::mem::swap(&mut self.width, &mut self.height);
        }
        self.rotation = rotation;
        let madctl = self.config.controller.madctl(rotation);
        self.bus
            .write_command_with(Instruction::MemoryAccessControl.into(), &[madctl.bits()]);
    }

    pub fn set_display_on(&mut self, on: bool) {
        let command = if on { Instruction::DisplayOn } else { Instruction::DisplayOff };
        self.bus.write_command(command.into());
    }

    pub fn invert_display(&mut self, invert: bool) {
        let command = if invert { Instruction::InversionOn } else { Instruction::InversionOff };
        self.bus.write_command(command.into());
    }

    pub fn idle_mode(&mut self, idle: bool) {
        let command = if idle { Instruction::IdleModeOn } else { Instruction::IdleModeOff };
        self.bus.write_command(command.into());
    }

    pub fn set_adaptive_brightness(&mut self, mode: Cabc) {
        self.bus
            .write_command_with(Instruction::WriteCabc.into(), &[mode as u8]);
    }

    pub fn tearing_effect(&mut self, enable: bool) {
        if enable {
            self.bus
                .write_command_with(Instruction::TearingEffectOn.into(), &[0x00]);
        } else {
            self.bus.write_command(Instruction::TearingEffectOff.into());
        }
    }

    /// Panel height along the scroll axis, which does not rotate.
    fn native_height(&self) -> u16 {
        if self.rotation.is_transposed() {
            self.width
        } else {
            self.height
        }
    }

    /// Define the vertical scroll areas. The three heights must add up to
    /// the panel height.
    pub fn vertical_scroll(&mut self, top: u16, scroll: u16, bottom: u16) -> Result<(), Error> {
        let screen = self.native_height();
        let requested = top as u32 + scroll as u32 + bottom as u32;
        if requested != screen as u32 {
            warn!("scroll areas {} != screen {}", requested, screen);
            return Err(Error::ScrollMismatch { requested, screen });
        }
        let [t0, t1] = top.to_be_bytes();
        let [s0, s1] = scroll.to_be_bytes();
        let [b0, b1] = bottom.to_be_bytes();
        self.bus.write_command_with(
            Instruction::VerticalScrollDefinition.into(),
            &[t0, t1, s0, s1, b0, b1],
        );
        Ok(())
    }

    pub fn vertical_scroll_start(&mut self, line: u16) {
        self.bus
            .write_command_with(Instruction::VerticalScrollStart.into(), &line.to_be_bytes());
    }

    /// Program the address window and open memory write.
    ///
    /// The bus stays selected; follow with exactly
    /// `(x1 - x0 + 1) * (y1 - y0 + 1)` pixels through
    /// [`write_data_burst`](Self::write_data_burst). Coordinates are not
    /// checked.
    pub fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) {
        self.bus.window(x0, y0, x1, y1);
    }

    /// Intersect a rectangle with the screen.
    pub(crate) fn clip(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Option<(u16, u16, u16, u16)> {
        if width <= 0 || height <= 0 {
            return None;
        }
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(width - 1).min(self.width as i32 - 1);
        let y1 = y.saturating_add(height - 1).min(self.height as i32 - 1);
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some((x0 as u16, y0 as u16, x1 as u16, y1 as u16))
    }

    pub fn draw_pixel(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let (x, y) = (x as u16, y as u16);
        let pixel = self.bus.pixel_words(self.config.pixel_format, color);
        self.bus.window(x, y, x, y);
        self.bus.pixel(&pixel);
        self.bus.deselect();
    }

    /// Bresenham line, both end points included.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        let dx = (x1 - x0).abs();
        let dy = (y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx - dy;
        let (mut x, mut y) = (x0, y0);

        loop {
            self.draw_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Horizontal line `length` long and `thickness` high.
    pub fn draw_hline(&mut self, x: i32, y: i32, length: u16, color: Color, thickness: u16) {
        self.fill_rect(x, y, length, thickness, color);
    }

    /// Vertical line `length` high and `thickness` wide.
    pub fn draw_vline(&mut self, x: i32, y: i32, length: u16, color: Color, thickness: u16) {
        self.fill_rect(x, y, thickness, length, color);
    }

    /// Rectangle outline built from four filled strips.
    ///
    /// The bottom and right strips sit just outside `width`/`height`, so the
    /// outer extent is `width + thickness` by `height + thickness`.
    pub fn draw_rect(
        &mut self,
        x: i32,
        y: i32,
        width: u16,
        height: u16,
        color: Color,
        thickness: u16,
    ) {
        let t = thickness as i32;
        self.fill_rect(x, y, width, thickness, color);
        self.fill_rect(x, y + t, thickness, height, color);
        self.fill_rect(x + t, y + height as i32, width, thickness, color);
        self.fill_rect(x + width as i32, y, thickness, height, color);
    }

    /// Fill a clipped rectangle through one window and one burst.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u16, height: u16, color: Color) {
        let Some((x0, y0, x1, y1)) = self.clip(x, y, width as i32, height as i32) else {
            return;
        };
        let pixel = self.bus.pixel_words(self.config.pixel_format, color);
        let count = (x1 - x0 + 1) as u32 * (y1 - y0 + 1) as u32;
        self.bus.window(x0, y0, x1, y1);
        self.bus.repeat(&pixel, count);
        self.bus.deselect();
    }

    pub fn fill_screen(&mut self, color: Color) {
        self.fill_rect(0, 0, self.width, self.height, color);
    }

    /// Circle outline `border` rings thick, the outermost ring at
    /// `radius - 1`.
    ///
    /// Skipped when the center lies off screen.
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: u16, color: Color, border: u16) {
        if cx < 0 || cy < 0 || cx >= self.width as i32 || cy >= self.height as i32 {
            warn!("circle center {},{} off screen", cx, cy);
            return;
        }
        let radius = radius as i32;
        for r in (radius - border as i32).max(0)..radius {
            let (mut x, mut y) = (-r, 0);
            let mut err = 2 - 2 * r;
            loop {
                self.draw_pixel(cx - x, cy + y, color);
                self.draw_pixel(cx + x, cy + y, color);
                self.draw_pixel(cx + x, cy - y, color);
                self.draw_pixel(cx - x, cy - y, color);
                let mut e2 = err;
                if e2 <= y {
                    y += 1;
                    err += 2 * y + 1;
                    if -x == y && e2 <= x {
                        e2 = 0;
                    }
                }
                if e2 > x {
                    x += 1;
                    err += 2 * x + 1;
                }
                if x > 0 {
                    break;
                }
            }
        }
    }

    /// Filled circle, one horizontal span per scanline.
    pub fn fill_circle(&mut self, cx: i32, cy: i32, radius: u16, color: Color) {
        let r = radius as u32;
        let (cx, cy) = (cx as i64, cy as i64);
        let rows = (cy - r as i64).max(0)..=(cy + r as i64).min(self.height as i64 - 1);
        for y in rows {
            let dy = (y - cy).unsigned_abs() as u32;
            let half = (r * r - dy * dy).isqrt() as i64;
            let left = (cx - half).max(0);
            let right = (cx + half).min(self.width as i64);
            if left < right {
                self.fill_rect(left as i32, y as i32, (right - left) as u16, 1, color);
            }
        }
    }

    /// Stream colors into the window `(x0, y0)..=(x1, y1)`, row-major.
    ///
    /// The window is clipped to the screen; colors beyond the visible
    /// pixel count are ignored.
    pub fn draw_pixels<I>(&mut self, x0: u16, y0: u16, x1: u16, y1: u16, colors: I)
    where
        I: IntoIterator<Item = Color>,
    {
        if x0 > x1 || y0 > y1 || x0 >= self.width || y0 >= self.height {
            return;
        }
        let x1 = x1.min(self.width - 1);
        let y1 = y1.min(self.height - 1);
        let count = (x1 - x0 + 1) as usize * (y1 - y0 + 1) as usize;
        let format = self.config.pixel_format;
        self.bus.window(x0, y0, x1, y1);
        for color in colors.into_iter().take(count) {
            let pixel = self.bus.pixel_words(format, color);
            self.bus.pixel(&pixel);
        }
        self.bus.deselect();
    }
}

impl<REGS, RST, TIMER> OriginDimensions for Ili9xxx<'_, REGS, RST, TIMER>
where
    REGS: GpioRegisters,
    RST: OutputPin<Error = Infallible>,
    TIMER: Timer,
{
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl<REGS, RST, TIMER> DrawTarget for Ili9xxx<'_, REGS, RST, TIMER>
where
    REGS: GpioRegisters,
    RST: OutputPin<Error = Infallible>,
    TIMER: Timer,
{
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let color = self.rgb(color.r(), color.g(), color.b());
            self.draw_pixel(point.x, point.y, color);
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let color = self.rgb(color.r(), color.g(), color.b());
        let width = area.size.width.min(u16::MAX as u32) as u16;
        let height = area.size.height.min(u16::MAX as u32) as u16;
        self.fill_rect(area.top_left.x, area.top_left.y, width, height, color);
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let color = self.rgb(color.r(), color.g(), color.b());
        self.fill_screen(color);
        Ok(())
    }
}
