//! 4-wire resistive touch panel sampled through the display's pins.
//!
//! One sample runs: pressure check, X median, Y median, range check, noise
//! check. Accepted raw values go through a per-axis linear calibration and
//! are then mirrored or swapped to match the display rotation.
//!
//! The electrodes are usually shared with the 8080 data bus. Call
//! [`TouchScreen::reset_pins`] (done after every sample) and
//! `Ili9xxx::refresh_lookup_table` if the touch scan changed any output
//! register bit the display relies on.

use core::convert::Infallible;
use core::marker::PhantomData;

use embedded_hal::digital::OutputPin;

use crate::Timer;
use crate::controller::Rotation;
use crate::fmt::{debug, info};

/// Upper bound for [`TouchConfig::samples`].
pub const MAX_SAMPLES: usize = 31;

/// The four panel electrodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Electrode {
    /// Y+, doubles as the Y sense input
    YUp,
    XLeft,
    YDown,
    /// X+, doubles as the X sense input
    XRight,
}

/// Pin reconfiguration and ADC access for the electrodes.
pub trait TouchPanel {
    /// Make `electrode` a push-pull output at the given level.
    fn drive(&mut self, electrode: Electrode, high: bool);
    /// Make `electrode` a high-impedance input.
    fn release(&mut self, electrode: Electrode);
    /// 16-bit ADC reading of `electrode`. Only [`Electrode::XRight`] and
    /// [`Electrode::YUp`] are sampled.
    fn sample(&mut self, electrode: Electrode) -> u16;
}

/// Edge of the panel where an axis reads highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Direction {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Self {
        match code & 3 {
            0 => Direction::Up,
            1 => Direction::Right,
            2 => Direction::Down,
            _ => Direction::Left,
        }
    }

    /// The same edge seen from a display turned by `rotation`.
    pub const fn rotated(self, rotation: Rotation) -> Self {
        Self::from_code(self.code() + 4 - rotation.index())
    }
}

/// Raw ADC bounds of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisCalibration {
    pub min: u16,
    pub max: u16,
    pub direction: Direction,
}

/// Calibration at rotation 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchCalibration {
    pub x: AxisCalibration,
    pub y: AxisCalibration,
}

impl Default for TouchCalibration {
    fn default() -> Self {
        Self {
            x: AxisCalibration {
                min: 8017,
                max: 55965,
                direction: Direction::Left,
            },
            y: AxisCalibration {
                min: 8177,
                max: 58398,
                direction: Direction::Up,
            },
        }
    }
}

impl TouchCalibration {
    /// Derive a calibration from raw readings taken on a 3x3 grid of
    /// targets, listed row by row from the top-left one.
    pub fn from_targets(targets: &[RawPoint; 9]) -> Self {
        let axis = |values: [u16; 9]| {
            let direction = strongest_edge(&values);
            let (min, max) = edge_bounds(&values, direction);
            AxisCalibration { min, max, direction }
        };
        Self {
            x: axis(targets.map(|p| p.x)),
            y: axis(targets.map(|p| p.y)),
        }
    }

    /// Whether the X electrodes run along the panel's long side.
    fn axes_swapped(&self) -> bool {
        self.y.direction.code() & 1 == 1
    }
}

const TOP: [usize; 3] = [0, 1, 2];
const BOTTOM: [usize; 3] = [6, 7, 8];
const LEFT: [usize; 3] = [0, 3, 6];
const RIGHT: [usize; 3] = [2, 5, 8];

fn edge_average(values: &[u16; 9], edge: [usize; 3]) -> u32 {
    edge.iter().map(|&i| values[i] as u32).sum::<u32>() / 3
}

/// Ties resolve in the order up, right, down, left.
fn strongest_edge(values: &[u16; 9]) -> Direction {
    let up = edge_average(values, TOP);
    let right = edge_average(values, RIGHT);
    let down = edge_average(values, BOTTOM);
    let left = edge_average(values, LEFT);
    let max = up.max(right).max(down).max(left);
    if max == up {
        Direction::Up
    } else if max == right {
        Direction::Right
    } else if max == down {
        Direction::Down
    } else {
        Direction::Left
    }
}

/// Minimum from the edge opposite `direction`, maximum from the edge itself.
fn edge_bounds(values: &[u16; 9], direction: Direction) -> (u16, u16) {
    let (low, high) = match direction {
        Direction::Up => (BOTTOM, TOP),
        Direction::Right => (LEFT, RIGHT),
        Direction::Down => (TOP, BOTTOM),
        Direction::Left => (RIGHT, LEFT),
    };
    let min = low.iter().map(|&i| values[i]).min().unwrap_or(0);
    let max = high.iter().map(|&i| values[i]).max().unwrap_or(u16::MAX);
    (min, max)
}

/// Sampling thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchConfig {
    /// Readings at or below this are rejected
    pub min_level: u16,
    /// Readings at or above this are rejected
    pub max_level: u16,
    /// Pressure below this means no touch
    pub pressure_threshold: u32,
    /// Largest accepted jump of `x + y` between consecutive samples
    pub noise_level: u32,
    /// ADC reads per axis, median taken
    pub samples: usize,
    /// Widen the calibration bounds with every accepted sample outside them
    pub auto_calibration: bool,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            min_level: 6500,
            max_level: 59000,
            pressure_threshold: 2000,
            noise_level: 8000,
            samples: 11,
            auto_calibration: false,
        }
    }
}

/// Median ADC values of one accepted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawPoint {
    pub x: u16,
    pub y: u16,
}

/// Touch position in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchPoint {
    pub x: u16,
    pub y: u16,
}

/// Why a sample was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rejection {
    /// Pressure under the threshold
    NoPress { pressure: u32 },
    /// A median outside `min_level..max_level`
    OutOfRange { x: u16, y: u16 },
    /// `x + y` moved too far from the previous sample, or there was none
    Noise { sum: u32, previous: Option<u32> },
}

/// A bounds change made by auto-calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationUpdate {
    pub previous: TouchCalibration,
    pub current: TouchCalibration,
}

/// Linear raw-to-pixel mapping derived from a calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform {
    x_coef: f32,
    y_coef: f32,
    x_corr: f32,
    y_corr: f32,
    x_len: i32,
    y_len: i32,
}

impl Transform {
    fn new(calibration: &TouchCalibration, width: u16, height: u16) -> Self {
        let (x_len, y_len) = if calibration.axes_swapped() {
            (height, width)
        } else {
            (width, height)
        };
        let coef = |axis: &AxisCalibration, len: u16| {
            axis.max.saturating_sub(axis.min).max(1) as f32 / len.max(1) as f32
        };
        let x_coef = coef(&calibration.x, x_len);
        let y_coef = coef(&calibration.y, y_len);
        Self {
            x_coef,
            y_coef,
            x_corr: calibration.x.min as f32 / x_coef,
            y_corr: calibration.y.min as f32 / y_coef,
            x_len: x_len as i32,
            y_len: y_len as i32,
        }
    }
}

/// Resistive touch sampler.
pub struct TouchScreen<PANEL, RD, TIMER>
where
    PANEL: TouchPanel,
    RD: OutputPin<Error = Infallible>,
    TIMER: Timer,
{
    panel: PANEL,
    rd: RD,
    config: TouchConfig,
    calibration: TouchCalibration,
    transform: Transform,
    update: Option<CalibrationUpdate>,
    width: u16,
    height: u16,
    rotation: Rotation,
    previous_sum: Option<u32>,
    _timer: PhantomData<TIMER>,
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), self = "TouchScreen",),
    async(feature = "async", keep_self)
)]
impl<PANEL, RD, TIMER> TouchScreen<PANEL, RD, TIMER>
where
    PANEL: TouchPanel,
    RD: OutputPin<Error = Infallible>,
    TIMER: Timer,
{
    /// Poll every `delay_ms` until a sample lands on the screen.
    pub async fn listening(&mut self, delay_ms: u64) -> TouchPoint {
        let (x_len, y_len) = self.screen_size();
        loop {
            if let Ok((x, y)) = self.read_coordinates() {
                if (0..x_len as i32).contains(&x) && (0..y_len as i32).contains(&y) {
                    debug!("touch at {},{}", x, y);
                    return TouchPoint {
                        x: x as u16,
                        y: y as u16,
                    };
                }
            }
            TIMER::delay_ms(delay_ms).await;
        }
    }
}

impl<PANEL, RD, TIMER> TouchScreen<PANEL, RD, TIMER>
where
    PANEL: TouchPanel,
    RD: OutputPin<Error = Infallible>,
    TIMER: Timer,
{
    /// `width` and `height` are the panel size at rotation 0, width the
    /// shorter side.
    pub fn new(
        panel: PANEL,
        rd: RD,
        width: u16,
        height: u16,
        calibration: TouchCalibration,
        config: TouchConfig,
    ) -> Self {
        let mut touch = Self {
            panel,
            rd,
            config,
            calibration,
            transform: Transform::new(&calibration, width, height),
            update: None,
            width,
            height,
            rotation: Rotation::Deg0,
            previous_sum: None,
            _timer: PhantomData,
        };
        touch.reset_pins();
        touch
    }

    pub fn config(&self) -> &TouchConfig {
        &self.config
    }

    pub fn set_auto_calibration(&mut self, enable: bool) {
        self.config.auto_calibration = enable;
    }

    pub fn calibration(&self) -> &TouchCalibration {
        &self.calibration
    }

    pub fn set_calibration(&mut self, calibration: TouchCalibration) {
        self.calibration = calibration;
        self.transform = Transform::new(&calibration, self.width, self.height);
    }

    /// Most recent auto-calibration change not yet taken.
    pub fn take_calibration_update(&mut self) -> Option<CalibrationUpdate> {
        self.update.take()
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Follow the display rotation.
    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Screen size in the current rotation.
    pub fn screen_size(&self) -> (u16, u16) {
        if self.rotation.is_transposed() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    pub fn release(self) -> (PANEL, RD) {
        (self.panel, self.rd)
    }

    /// All electrodes output low, read-enable high.
    pub fn reset_pins(&mut self) {
        for electrode in [Electrode::XLeft, Electrode::XRight, Electrode::YUp, Electrode::YDown] {
            self.panel.drive(electrode, false);
        }
        let Ok(()) = self.rd.set_high();
    }

    fn read_pressure(&mut self) -> u32 {
        self.panel.drive(Electrode::XLeft, false);
        self.panel.drive(Electrode::YDown, true);
        self.panel.drive(Electrode::XRight, false);
        self.panel.release(Electrode::XRight);
        self.panel.drive(Electrode::YUp, false);
        self.panel.release(Electrode::YUp);

        let z1 = self.panel.sample(Electrode::XRight) as u32;
        let z2 = self.panel.sample(Electrode::YUp) as u32;
        65535 - z2 + z1
    }

    fn median(&mut self, sense: Electrode, first: u16) -> u16 {
        let count = self.config.samples.clamp(1, MAX_SAMPLES);
        let mut readings = [0u16; MAX_SAMPLES];
        readings[0] = first;
        for reading in readings[1..count].iter_mut() {
            *reading = self.panel.sample(sense);
        }
        let readings = &mut readings[..count];
        readings.sort_unstable();
        readings[count / 2]
    }

    fn read_x(&mut self) -> u16 {
        self.panel.drive(Electrode::YUp, true);
        self.panel.drive(Electrode::YDown, false);
        self.panel.release(Electrode::XLeft);
        self.panel.release(Electrode::XRight);
        let first = self.panel.sample(Electrode::XRight);
        self.median(Electrode::XRight, first)
    }

    fn read_y(&mut self) -> u16 {
        self.panel.drive(Electrode::XRight, true);
        self.panel.drive(Electrode::XLeft, false);
        self.panel.release(Electrode::YUp);
        self.panel.release(Electrode::YDown);
        let first = self.panel.sample(Electrode::YUp);
        self.median(Electrode::YUp, first)
    }

    /// One filtered raw sample.
    pub fn read_touch(&mut self) -> Result<RawPoint, Rejection> {
        let pressure = self.read_pressure();
        self.reset_pins();
        if pressure < self.config.pressure_threshold {
            return Err(Rejection::NoPress { pressure });
        }

        let x = self.read_x();
        self.reset_pins();
        let y = self.read_y();
        self.reset_pins();

        let (min, max) = (self.config.min_level, self.config.max_level);
        let in_range = |v: u16| min < v && v < max;
        if !(in_range(x) && in_range(y)) {
            debug!("touch out of range: {},{}", x, y);
            return Err(Rejection::OutOfRange { x, y });
        }

        let sum = x as u32 + y as u32;
        let previous = self.previous_sum.replace(sum);
        match previous {
            Some(prev) if sum.abs_diff(prev) < self.config.noise_level => {}
            _ => {
                debug!("touch noise: {} vs {}", sum, previous);
                return Err(Rejection::Noise { sum, previous });
            }
        }

        if self.config.auto_calibration {
            self.auto_calibrate(x, y);
        }
        Ok(RawPoint { x, y })
    }

    /// One filtered sample in screen pixels. The result may lie slightly
    /// outside the screen near the edges.
    pub fn read_coordinates(&mut self) -> Result<(i32, i32), Rejection> {
        let raw = self.read_touch()?;
        Ok(self.to_screen(raw))
    }

    /// Map a raw sample to pixels for the current rotation.
    pub fn to_screen(&self, raw: RawPoint) -> (i32, i32) {
        let t = &self.transform;
        let x_pix = (raw.x as f32 / t.x_coef - t.x_corr) as i32;
        let y_pix = (raw.y as f32 / t.y_coef - t.y_corr) as i32;

        let x_dir = self.calibration.x.direction.rotated(self.rotation);
        let y_dir = self.calibration.y.direction.rotated(self.rotation);
        let swap = self.calibration.axes_swapped() != self.rotation.is_transposed();

        if swap {
            let y = if y_dir == Direction::Left { t.y_len - y_pix } else { y_pix };
            let x = if x_dir == Direction::Up { t.x_len - x_pix } else { x_pix };
            (y, x)
        } else {
            let x = if x_dir == Direction::Left { t.x_len - x_pix } else { x_pix };
            let y = if y_dir == Direction::Up { t.y_len - y_pix } else { y_pix };
            (x, y)
        }
    }

    fn auto_calibrate(&mut self, x: u16, y: u16) {
        let previous = self.calibration;
        let mut current = previous;
        current.x.min = current.x.min.min(x);
        current.x.max = current.x.max.max(x);
        current.y.min = current.y.min.min(y);
        current.y.max = current.y.max.max(y);
        if current != previous {
            info!("touch recalibrated: {} -> {}", previous, current);
            self.set_calibration(current);
            self.update = Some(CalibrationUpdate { previous, current });
        }
    }
}
