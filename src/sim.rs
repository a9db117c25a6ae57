//! Simulated bus, panel and touch hardware for unit tests.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::Timer;
use crate::bus::{Bus, BusConfig, BusPins, GpioRegisters, Platform};
use crate::color::PixelFormat;
use crate::display::{Config, Ili9xxx};
use crate::text::{Font, Glyph};
use crate::touch::{Electrode, TouchPanel};

pub(crate) type SharedTrace = Rc<RefCell<Trace>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BusEvent {
    Command(u8),
    Data(u8),
}

/// Bytes latched by the controller, in order.
#[derive(Debug, Default)]
pub(crate) struct Trace {
    pub events: Vec<BusEvent>,
    /// CS low-to-high transitions
    pub deselects: usize,
    /// CS currently low
    pub selected: bool,
}

/// Output register that decodes WR rising edges while CS is low.
pub(crate) struct SimRegisters {
    output: u32,
    config: BusConfig,
    trace: SharedTrace,
}

impl SimRegisters {
    pub fn new(config: BusConfig) -> (Self, SharedTrace) {
        let trace = SharedTrace::default();
        let regs = Self {
            output: config.cs_bit() | config.wr_bit(),
            config,
            trace: trace.clone(),
        };
        (regs, trace)
    }
}

impl GpioRegisters for SimRegisters {
    fn output(&self) -> u32 {
        self.output
    }

    fn write_output(&mut self, word: u32) {
        self.output = word;
        self.trace.borrow_mut().selected = word & self.config.cs_bit() == 0;
    }

    fn set_bits(&mut self, mask: u32) {
        let mut trace = self.trace.borrow_mut();
        let selected = self.output & self.config.cs_bit() == 0;
        let wr_rising = mask & self.config.wr_bit() != 0 && self.output & self.config.wr_bit() == 0;
        if wr_rising && selected {
            let byte = self.config.gather(self.output);
            let event = if self.output & self.config.dc_bit() == 0 {
                BusEvent::Command(byte)
            } else {
                BusEvent::Data(byte)
            };
            trace.events.push(event);
        }
        if mask & self.config.cs_bit() != 0 && selected {
            trace.deselects += 1;
        }
        self.output |= mask;
        trace.selected = self.output & self.config.cs_bit() == 0;
    }
}

pub(crate) fn test_pins() -> BusPins {
    BusPins {
        data: [8, 9, 2, 3, 4, 5, 6, 7],
        cs: 10,
        dc: 11,
        wr: 12,
        rd: 13,
        rst: 14,
    }
}

pub(crate) fn bus_config() -> BusConfig {
    BusConfig::new(test_pins(), Platform::Rp2040).unwrap()
}

pub(crate) fn bus() -> (Bus<SimRegisters>, SharedTrace) {
    let (regs, trace) = SimRegisters::new(bus_config());
    (Bus::new(regs, bus_config()), trace)
}

pub(crate) type SimDisplay<'f> = Ili9xxx<'f, SimRegisters, NoopPin, NoopTimer>;

pub(crate) fn display<'f>(config: Config) -> (SimDisplay<'f>, SharedTrace) {
    let (bus, trace) = bus();
    (Ili9xxx::new(config, bus, NoopPin).unwrap(), trace)
}

pub(crate) struct NoopPin;

impl ErrorType for NoopPin {
    type Error = Infallible;
}

impl OutputPin for NoopPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub(crate) struct NoopTimer;

#[cfg(feature = "async")]
impl Timer for NoopTimer {
    async fn delay_ms(_milliseconds: u64) {}
}

#[cfg(not(feature = "async"))]
impl Timer for NoopTimer {
    fn delay_ms(_milliseconds: u64) {}
}

#[cfg(feature = "async")]
pub(crate) fn block_on<F: core::future::Future>(future: F) -> F::Output {
    embassy_futures::block_on(future)
}

/// Blocking builds return values directly.
#[cfg(not(feature = "async"))]
pub(crate) fn block_on<T>(value: T) -> T {
    value
}

/// In-memory file.
pub(crate) struct MemFile {
    data: Vec<u8>,
    position: usize,
}

impl MemFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

impl embedded_io::ErrorType for MemFile {
    type Error = Infallible;
}

impl embedded_io::Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let rest = self.data.get(self.position..).unwrap_or(&[]);
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.position += n;
        Ok(n)
    }
}

impl embedded_io::Seek for MemFile {
    fn seek(&mut self, pos: embedded_io::SeekFrom) -> Result<u64, Self::Error> {
        let target = match pos {
            embedded_io::SeekFrom::Start(offset) => offset as i64,
            embedded_io::SeekFrom::End(offset) => self.data.len() as i64 + offset,
            embedded_io::SeekFrom::Current(offset) => self.position as i64 + offset,
        };
        self.position = target.max(0) as usize;
        Ok(self.position as u64)
    }
}

/// 8x10 font: every glyph is a hollow box, space is blank.
pub(crate) struct BoxFont;

const BOX: [u8; 10] = [0xFF, 0x81, 0x81, 0x81, 0x81, 0x81, 0x81, 0x81, 0x81, 0xFF];
const BLANK: [u8; 10] = [0; 10];

impl Font for BoxFont {
    fn glyph(&self, ch: char) -> Glyph<'_> {
        Glyph {
            bitmap: if ch == ' ' { &BLANK } else { &BOX },
            height: 10,
            width: 8,
        }
    }
}

/// Frame buffer rebuilt from a bus trace.
///
/// Pixels are stored as the bytes sent for them, most significant first.
/// MADCTL is recorded but not applied.
pub(crate) struct Panel {
    width: u16,
    height: u16,
    pixels: Vec<Option<u32>>,
    /// Inclusive x0, y0, x1, y1
    pub window: (u16, u16, u16, u16),
    /// Pixels sent past the end of the window or the panel
    pub overrun: usize,
    pub commands: Vec<(u8, Vec<u8>)>,
    pub madctl_history: Vec<u8>,
    pub scroll_areas: Option<(u16, u16, u16)>,
    pub scroll_start: Option<u16>,
}

impl Panel {
    pub fn replay(trace: &Trace, format: PixelFormat, width: u16, height: u16) -> Self {
        let mut panel = Self {
            width,
            height,
            pixels: vec![None; width as usize * height as usize],
            window: (0, 0, width - 1, height - 1),
            overrun: 0,
            commands: Vec::new(),
            madctl_history: Vec::new(),
            scroll_areas: None,
            scroll_start: None,
        };
        let bpp = format.bytes_per_pixel();
        let mut current: Option<(u8, Vec<u8>)> = None;
        let mut cursor = (0u16, 0u16);
        let mut pending = Vec::new();

        for event in &trace.events {
            match *event {
                BusEvent::Command(command) => {
                    if let Some((previous, params)) = current.take() {
                        panel.apply(previous, params);
                    }
                    if command == 0x2C {
                        cursor = (panel.window.0, panel.window.1);
                        pending.clear();
                    }
                    current = Some((command, Vec::new()));
                }
                BusEvent::Data(byte) => match current.as_mut() {
                    Some((0x2C, _)) => {
                        pending.push(byte);
                        if pending.len() == bpp {
                            let value = pending.iter().fold(0u32, |v, &b| (v << 8) | b as u32);
                            pending.clear();
                            panel.write(&mut cursor, value);
                        }
                    }
                    Some((_, params)) => params.push(byte),
                    None => {}
                },
            }
        }
        if let Some((previous, params)) = current.take() {
            panel.apply(previous, params);
        }
        panel
    }

    fn apply(&mut self, command: u8, params: Vec<u8>) {
        let word = |i: usize| u16::from_be_bytes([params[i], params[i + 1]]);
        match (command, params.len()) {
            (0x2A, 4) => (self.window.0, self.window.2) = (word(0), word(2)),
            (0x2B, 4) => (self.window.1, self.window.3) = (word(0), word(2)),
            (0x33, 6) => self.scroll_areas = Some((word(0), word(2), word(4))),
            (0x36, 1) => self.madctl_history.push(params[0]),
            (0x37, 2) => self.scroll_start = Some(word(0)),
            _ => {}
        }
        self.commands.push((command, params));
    }

    fn write(&mut self, cursor: &mut (u16, u16), value: u32) {
        let (x, y) = *cursor;
        let (x0, _, x1, y1) = self.window;
        if y > y1 || x >= self.width || y >= self.height {
            self.overrun += 1;
            return;
        }
        self.pixels[y as usize * self.width as usize + x as usize] = Some(value);
        *cursor = if x >= x1 { (x0, y + 1) } else { (x + 1, y) };
    }

    pub fn pixel(&self, x: u16, y: u16) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Number of distinct pixels ever written.
    pub fn written(&self) -> usize {
        self.pixels.iter().filter(|p| p.is_some()).count()
    }

    pub fn written_rows(&self) -> impl Iterator<Item = u16> + '_ {
        self.pixels
            .chunks(self.width as usize)
            .enumerate()
            .filter(|(_, row)| row.iter().any(Option::is_some))
            .map(|(y, _)| y as u16)
    }
}

/// Touch panel with fixed readings per measurement phase.
pub(crate) struct FakeTouch {
    pub x: u16,
    pub y: u16,
    pub z1: u16,
    pub z2: u16,
    /// Consumed before `x` by X-phase reads
    pub x_spikes: Vec<u16>,
    phase: Phase,
    pins: [Option<bool>; 4],
}

#[derive(Clone, Copy)]
enum Phase {
    Idle,
    Pressure,
    X,
    Y,
}

impl FakeTouch {
    pub fn pressed(x: u16, y: u16) -> Self {
        Self {
            x,
            y,
            z1: 30000,
            z2: 30000,
            x_spikes: Vec::new(),
            phase: Phase::Idle,
            pins: [None; 4],
        }
    }

    /// Every electrode driven low.
    pub fn idle(&self) -> bool {
        self.pins.iter().all(|pin| *pin == Some(false))
    }
}

impl TouchPanel for FakeTouch {
    fn drive(&mut self, electrode: Electrode, high: bool) {
        self.pins[electrode as usize] = Some(high);
        if high {
            self.phase = match electrode {
                Electrode::YDown => Phase::Pressure,
                Electrode::YUp => Phase::X,
                Electrode::XRight => Phase::Y,
                Electrode::XLeft => self.phase,
            };
        }
    }

    fn release(&mut self, electrode: Electrode) {
        self.pins[electrode as usize] = None;
    }

    fn sample(&mut self, electrode: Electrode) -> u16 {
        match (self.phase, electrode) {
            (Phase::X, Electrode::XRight) if !self.x_spikes.is_empty() => self.x_spikes.remove(0),
            (Phase::X, Electrode::XRight) => self.x,
            (Phase::Y, Electrode::YUp) => self.y,
            (Phase::Pressure, Electrode::XRight) => self.z1,
            (Phase::Pressure, Electrode::YUp) => self.z2,
            _ => 0,
        }
    }
}
