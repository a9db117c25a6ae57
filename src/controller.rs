//! Controller profiles: command set, power-on sequences and MADCTL tables.

use crate::color::PixelFormat;

/// Command opcodes shared by the ILI93xx/ILI94xx family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    /// Software Reset
    SoftwareReset = 0x01,
    /// Sleep Out
    SleepOut = 0x11,
    /// Normal Display Mode On
    NormalDisplayOn = 0x13,
    /// Display Inversion Off
    InversionOff = 0x20,
    /// Display Inversion On
    InversionOn = 0x21,
    /// Gamma Set
    GammaSet = 0x26,
    /// Display Off
    DisplayOff = 0x28,
    /// Display On
    DisplayOn = 0x29,
    /// Column Address Set
    ColumnAddressSet = 0x2A,
    /// Page Address Set
    PageAddressSet = 0x2B,
    /// Memory Write
    MemoryWrite = 0x2C,
    /// Vertical Scrolling Definition
    VerticalScrollDefinition = 0x33,
    /// Tearing Effect Line Off
    TearingEffectOff = 0x34,
    /// Tearing Effect Line On
    TearingEffectOn = 0x35,
    /// Memory Access Control
    MemoryAccessControl = 0x36,
    /// Vertical Scrolling Start Address
    VerticalScrollStart = 0x37,
    /// Idle Mode Off
    IdleModeOff = 0x38,
    /// Idle Mode On
    IdleModeOn = 0x39,
    /// Interface Pixel Format
    PixelFormatSet = 0x3A,
    /// Write Content Adaptive Brightness Control
    WriteCabc = 0x55,
    /// Frame Rate Control (normal mode)
    FrameRateControl = 0xB1,
    /// Display Inversion Control
    InversionControl = 0xB4,
    /// Display Function Control
    DisplayFunctionControl = 0xB6,
    /// Power Control 1
    PowerControl1 = 0xC0,
    /// Power Control 2
    PowerControl2 = 0xC1,
    /// VCOM Control 1
    VcomControl1 = 0xC5,
    /// VCOM Control 2
    VcomControl2 = 0xC7,
    /// Power Control A
    PowerControlA = 0xCB,
    /// Power Control B
    PowerControlB = 0xCF,
    /// Positive Gamma Correction
    PositiveGamma = 0xE0,
    /// Negative Gamma Correction
    NegativeGamma = 0xE1,
    /// Driver Timing Control A
    DriverTimingA = 0xE8,
    /// Driver Timing Control B
    DriverTimingB = 0xEA,
    /// Power On Sequence Control
    PowerOnSequence = 0xED,
    /// Enable 3 Gamma (ILI9341), vendor register on ILI9486
    Enable3Gamma = 0xF2,
    /// Pump Ratio Control
    PumpRatioControl = 0xF7,
    /// Vendor register, ILI9486 only
    Ili9486Vendor = 0xF8,
}

impl From<Instruction> for u8 {
    fn from(instruction: Instruction) -> Self {
        instruction as u8
    }
}

/// Memory Access Control (0x36) flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Madctl {
    /// MY, row address order
    pub row_order: bool,
    /// MX, column address order
    pub column_order: bool,
    /// MV, row/column exchange
    pub exchange: bool,
    /// ML, vertical refresh order
    pub vertical_refresh: bool,
    /// BGR panel order
    pub bgr: bool,
    /// MH, horizontal refresh order
    pub horizontal_refresh: bool,
}

impl Madctl {
    const fn bgr(row_order: bool, column_order: bool, exchange: bool) -> Self {
        Self {
            row_order,
            column_order,
            exchange,
            vertical_refresh: false,
            bgr: true,
            horizontal_refresh: false,
        }
    }

    pub const fn bits(self) -> u8 {
        (self.row_order as u8) << 7
            | (self.column_order as u8) << 6
            | (self.exchange as u8) << 5
            | (self.vertical_refresh as u8) << 4
            | (self.bgr as u8) << 3
            | (self.horizontal_refresh as u8) << 2
    }
}

/// Display rotation in 90° steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// 90° and 270° exchange the logical width and height.
    pub const fn is_transposed(self) -> bool {
        self.index() & 1 == 1
    }
}

impl TryFrom<u8> for Rotation {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Rotation::Deg0),
            1 => Ok(Rotation::Deg90),
            2 => Ok(Rotation::Deg180),
            3 => Ok(Rotation::Deg270),
            other => Err(other),
        }
    }
}

/// One step of a power-on sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Command(u8, &'static [u8]),
    /// COLMOD with the configured pixel format
    PixelFormat,
    /// Settle time in milliseconds
    Delay(u64),
}

use Instruction::*;
use InitStep::{Command, Delay};

const fn cmd(instruction: Instruction, params: &'static [u8]) -> InitStep {
    Command(instruction as u8, params)
}

const GENERIC_INIT: &[InitStep] = &[
    cmd(DisplayOff, &[]),
    cmd(MemoryAccessControl, &[0x48]),
    InitStep::PixelFormat,
    cmd(SleepOut, &[]),
    Delay(120),
    cmd(DisplayOn, &[]),
];

const ILI9341_INIT: &[InitStep] = &[
    cmd(DisplayOff, &[]),
    cmd(PowerControlA, &[0x39, 0x2C, 0x00, 0x34, 0x02]),
    cmd(PowerControlB, &[0x00, 0xC1, 0x30]),
    cmd(DriverTimingA, &[0x85, 0x00, 0x78]),
    cmd(DriverTimingB, &[0x00, 0x00]),
    cmd(PowerOnSequence, &[0x64, 0x03, 0x12, 0x81]),
    cmd(PumpRatioControl, &[0x20]),
    cmd(PowerControl1, &[0x23]),
    cmd(PowerControl2, &[0x10]),
    cmd(VcomControl1, &[0x3E, 0x28]),
    cmd(VcomControl2, &[0x86]),
    cmd(MemoryAccessControl, &[0x48]),
    InitStep::PixelFormat,
    cmd(FrameRateControl, &[0x00, 0x18]),
    cmd(DisplayFunctionControl, &[0x08, 0x82, 0x27]),
    cmd(Enable3Gamma, &[0x00]),
    cmd(GammaSet, &[0x01]),
    cmd(
        PositiveGamma,
        &[0x0F, 0x31, 0x2B, 0x0C, 0x0E, 0x08, 0x4E, 0xF1, 0x37, 0x07, 0x10, 0x03, 0x0E, 0x09, 0x00],
    ),
    cmd(
        NegativeGamma,
        &[0x00, 0x0E, 0x14, 0x03, 0x11, 0x07, 0x31, 0xC1, 0x48, 0x08, 0x0F, 0x0C, 0x31, 0x36, 0x0F],
    ),
    cmd(SleepOut, &[]),
    Delay(120),
    cmd(DisplayOn, &[]),
];

const ILI9486_INIT: &[InitStep] = &[
    cmd(Enable3Gamma, &[0x18, 0xA3, 0x12, 0x02, 0xB2, 0x12, 0xFF, 0x10, 0x00]),
    cmd(Ili9486Vendor, &[0x21, 0x04]),
    cmd(NormalDisplayOn, &[]),
    cmd(MemoryAccessControl, &[0x08]),
    cmd(InversionControl, &[0x02]),
    cmd(DisplayFunctionControl, &[0x02, 0x22, 0x3B]),
    cmd(PowerControl2, &[0x41]),
    cmd(VcomControl1, &[0x00, 0x18]),
    InitStep::PixelFormat,
    Delay(50),
    cmd(
        PositiveGamma,
        &[0x0F, 0x24, 0x1C, 0x0A, 0x0F, 0x08, 0x43, 0x88, 0x32, 0x0F, 0x10, 0x06, 0x0F, 0x07, 0x00],
    ),
    cmd(
        NegativeGamma,
        &[0x0F, 0x38, 0x30, 0x09, 0x0F, 0x0F, 0x4E, 0x77, 0x3C, 0x07, 0x10, 0x05, 0x23, 0x1B, 0x00],
    ),
    cmd(SleepOut, &[]),
    Delay(120),
    cmd(DisplayOn, &[]),
];

const ILI9488_INIT: &[InitStep] = &[
    cmd(NormalDisplayOn, &[]),
    cmd(
        PositiveGamma,
        &[0x00, 0x03, 0x09, 0x08, 0x16, 0x0A, 0x3F, 0x78, 0x4C, 0x09, 0x0A, 0x08, 0x16, 0x1A, 0x0F],
    ),
    cmd(
        NegativeGamma,
        &[0x00, 0x16, 0x19, 0x03, 0x0F, 0x05, 0x32, 0x45, 0x46, 0x04, 0x0E, 0x0D, 0x35, 0x37, 0x0F],
    ),
    cmd(PowerControl1, &[0x17, 0x15]),
    cmd(PowerControl2, &[0x41]),
    cmd(VcomControl1, &[0x00, 0x12, 0x80]),
    cmd(MemoryAccessControl, &[0x48]),
    cmd(InversionOn, &[]),
    InitStep::PixelFormat,
    cmd(SleepOut, &[]),
    Delay(120),
    cmd(DisplayOn, &[]),
];

/// Rotation 0..=3: 0x08, 0x68, 0xC8, 0xA8
const PORTRAIT_BGR: [Madctl; 4] = [
    Madctl::bgr(false, false, false),
    Madctl::bgr(false, true, true),
    Madctl::bgr(true, true, false),
    Madctl::bgr(true, false, true),
];

/// Rotation 0..=3: 0x48, 0x28, 0x88, 0xE8
const MIRRORED_BGR: [Madctl; 4] = [
    Madctl::bgr(false, true, false),
    Madctl::bgr(false, false, true),
    Madctl::bgr(true, false, false),
    Madctl::bgr(true, true, true),
];

/// Supported controller models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Controller {
    /// Minimal sequence understood by most ILI9xxx parts
    Generic,
    Ili9341,
    Ili9486,
    Ili9488,
}

impl Controller {
    /// Panel size at rotation 0.
    pub const fn native_size(self) -> (u16, u16) {
        match self {
            Controller::Ili9341 => (240, 320),
            Controller::Generic | Controller::Ili9486 | Controller::Ili9488 => (320, 480),
        }
    }

    pub const fn init_sequence(self) -> &'static [InitStep] {
        match self {
            Controller::Generic => GENERIC_INIT,
            Controller::Ili9341 => ILI9341_INIT,
            Controller::Ili9486 => ILI9486_INIT,
            Controller::Ili9488 => ILI9488_INIT,
        }
    }

    pub const fn madctl(self, rotation: Rotation) -> Madctl {
        let table = match self {
            Controller::Generic | Controller::Ili9486 => &PORTRAIT_BGR,
            Controller::Ili9341 | Controller::Ili9488 => &MIRRORED_BGR,
        };
        table[rotation.index() as usize]
    }

    /// ILI9341 and ILI9486 have no 24-bit mode on the 8080 bus.
    pub const fn supports(self, format: PixelFormat) -> bool {
        match self {
            Controller::Ili9341 | Controller::Ili9486 => {
                !matches!(format, PixelFormat::Rgb888)
            }
            Controller::Generic | Controller::Ili9488 => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROTATIONS: [Rotation; 4] =
        [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270];

    #[test]
    fn rotation_tables() {
        let bits = |c: Controller| ROTATIONS.map(|r| c.madctl(r).bits());
        assert_eq!(bits(Controller::Generic), [0x08, 0x68, 0xC8, 0xA8]);
        assert_eq!(bits(Controller::Ili9486), [0x08, 0x68, 0xC8, 0xA8]);
        assert_eq!(bits(Controller::Ili9341), [0x48, 0x28, 0x88, 0xE8]);
        assert_eq!(bits(Controller::Ili9488), [0x48, 0x28, 0x88, 0xE8]);
    }

    #[test]
    fn rotation_from_index() {
        assert_eq!(Rotation::try_from(2), Ok(Rotation::Deg180));
        assert_eq!(Rotation::try_from(4), Err(4));
        assert!(Rotation::Deg270.is_transposed());
        assert!(!Rotation::Deg180.is_transposed());
    }

    #[test]
    fn every_sequence_sets_format_and_wakes() {
        for controller in [
            Controller::Generic,
            Controller::Ili9341,
            Controller::Ili9486,
            Controller::Ili9488,
        ] {
            let steps = controller.init_sequence();
            assert!(steps.contains(&InitStep::PixelFormat));
            assert_eq!(steps.last(), Some(&Command(DisplayOn as u8, &[])));
            let sleep_out = steps.iter().position(|s| *s == Command(SleepOut as u8, &[]));
            assert_eq!(steps.get(sleep_out.unwrap() + 1), Some(&Delay(120)));
        }
    }

    #[test]
    fn format_support() {
        assert!(!Controller::Ili9341.supports(PixelFormat::Rgb888));
        assert!(Controller::Ili9488.supports(PixelFormat::Rgb888));
        assert!(Controller::Ili9486.supports(PixelFormat::Rgb666));
    }
}
