//! 8080 parallel bus, bit-banged through a GPIO output register.
//!
//! The eight data lines plus CS, DC and WR must all live in the same 32-bit
//! output register. A byte is written by storing its precomputed word from
//! the [`LookupTable`] into the output register (CS low, WR low, DC and data
//! lines set) and then raising WR through the atomic set register; the
//! controller latches on that rising edge.

use core::fmt;

use crate::color::{Color, PixelFormat};
use crate::controller::Instruction;

/// Output register and its atomic "set bits" alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterAddresses {
    pub output: usize,
    pub output_set: usize,
}

/// Host chips with a known GPIO register layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Platform {
    Esp32,
    Esp32S3,
    Esp32C3,
    Rp2040,
}

impl Platform {
    pub const fn registers(self) -> RegisterAddresses {
        match self {
            Platform::Esp32 => RegisterAddresses {
                output: 0x3FF4_4004,
                output_set: 0x3FF4_4008,
            },
            Platform::Esp32S3 | Platform::Esp32C3 => RegisterAddresses {
                output: 0x6000_4004,
                output_set: 0x6000_4008,
            },
            Platform::Rp2040 => RegisterAddresses {
                output: 0xD000_0010,
                output_set: 0xD000_0014,
            },
        }
    }

    /// Pins that cannot drive the bus on this chip (strapping, flash,
    /// input-only or not bonded out).
    pub const fn reserved_pins(self) -> &'static [u8] {
        match self {
            Platform::Esp32 => &[0, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47],
            Platform::Esp32S3 => &[
                0, 12, 26, 27, 28, 29, 30, 31, 32, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45,
                46, 47,
            ],
            Platform::Esp32C3 => &[],
            Platform::Rp2040 => &[23, 24, 25, 29],
        }
    }
}

/// GPIO numbers of the bus lines. `data[0]` carries D0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusPins {
    pub data: [u8; 8],
    pub cs: u8,
    pub dc: u8,
    pub wr: u8,
    pub rd: u8,
    pub rst: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinRole {
    Data(u8),
    Cs,
    Dc,
    Wr,
    Rd,
    Rst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinFault {
    /// Unusable on the selected platform
    Reserved,
    /// Not reachable through the 32-bit output register
    OutsideRegister,
    /// Already assigned to another bus line
    Duplicate,
}

/// Rejected pin assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinError {
    pub pin: u8,
    pub role: PinRole,
    pub fault: PinFault,
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.fault {
            PinFault::Reserved => "is not suitable for connection",
            PinFault::OutsideRegister => "is outside the GPIO output register",
            PinFault::Duplicate => "is assigned twice",
        };
        write!(f, "Pin {} ({:?}) {}", self.pin, self.role, reason)
    }
}

/// Validated pin assignment with its register masks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pins: BusPins,
    registers: RegisterAddresses,
    data_mask: u32,
    cs_bit: u32,
    dc_bit: u32,
    wr_bit: u32,
    idle_high: u32,
}

impl BusConfig {
    pub fn new(pins: BusPins, platform: Platform) -> Result<Self, PinError> {
        Self::with_registers(pins, platform.registers(), platform.reserved_pins())
    }

    /// Validate against a custom register block and reserved-pin list.
    ///
    /// Data, CS, DC and WR must sit in the output register. RD and RST only
    /// need to be usable; when they happen to be in the register too they are
    /// held high by every bus word.
    pub fn with_registers(
        pins: BusPins,
        registers: RegisterAddresses,
        reserved: &[u8],
    ) -> Result<Self, PinError> {
        let mut assigned: [(u8, PinRole); 13] = [(0, PinRole::Cs); 13];
        for (i, &pin) in pins.data.iter().enumerate() {
            assigned[i] = (pin, PinRole::Data(i as u8));
        }
        assigned[8] = (pins.cs, PinRole::Cs);
        assigned[9] = (pins.dc, PinRole::Dc);
        assigned[10] = (pins.wr, PinRole::Wr);
        assigned[11] = (pins.rd, PinRole::Rd);
        assigned[12] = (pins.rst, PinRole::Rst);

        for (i, &(pin, role)) in assigned.iter().enumerate() {
            let error = |fault| PinError { pin, role, fault };
            if reserved.contains(&pin) {
                return Err(error(PinFault::Reserved));
            }
            if pin >= 32 && !matches!(role, PinRole::Rd | PinRole::Rst) {
                return Err(error(PinFault::OutsideRegister));
            }
            if assigned[..i].iter().any(|&(other, _)| other == pin) {
                return Err(error(PinFault::Duplicate));
            }
        }

        let bit = |pin: u8| if pin < 32 { 1u32 << pin } else { 0 };
        Ok(Self {
            pins,
            registers,
            data_mask: pins.data.iter().fold(0, |mask, &pin| mask | bit(pin)),
            cs_bit: bit(pins.cs),
            dc_bit: bit(pins.dc),
            wr_bit: bit(pins.wr),
            idle_high: bit(pins.rd) | bit(pins.rst),
        })
    }

    pub fn pins(&self) -> &BusPins {
        &self.pins
    }

    pub fn registers(&self) -> RegisterAddresses {
        self.registers
    }

    pub fn data_mask(&self) -> u32 {
        self.data_mask
    }

    pub fn cs_bit(&self) -> u32 {
        self.cs_bit
    }

    pub fn dc_bit(&self) -> u32 {
        self.dc_bit
    }

    pub fn wr_bit(&self) -> u32 {
        self.wr_bit
    }

    /// Place `byte` on the data lines.
    pub fn spread(&self, byte: u8) -> u32 {
        self.pins
            .data
            .iter()
            .enumerate()
            .filter(|&(bit, _)| byte & (1 << bit) != 0)
            .fold(0, |word, (_, &pin)| word | (1 << pin))
    }

    /// Read the byte currently on the data lines of `word`.
    pub fn gather(&self, word: u32) -> u8 {
        self.pins
            .data
            .iter()
            .enumerate()
            .filter(|&(_, &pin)| word & (1 << pin) != 0)
            .fold(0, |byte, (bit, _)| byte | (1 << bit))
    }
}

/// Raw access to the GPIO output register pair.
pub trait GpioRegisters {
    /// Current output register value.
    fn output(&self) -> u32;
    /// Store a whole word into the output register.
    fn write_output(&mut self, word: u32);
    /// Atomically raise the bits in `mask`.
    fn set_bits(&mut self, mask: u32);
}

/// Memory-mapped output registers of the running chip.
pub struct MmioRegisters {
    output: *mut u32,
    output_set: *mut u32,
}

impl MmioRegisters {
    /// # Safety
    ///
    /// `addresses` must be the GPIO output and output-set registers of the
    /// chip the code runs on, and nothing else may drive the bus pins while
    /// this value is alive.
    pub const unsafe fn new(addresses: RegisterAddresses) -> Self {
        Self {
            output: addresses.output as *mut u32,
            output_set: addresses.output_set as *mut u32,
        }
    }
}

impl GpioRegisters for MmioRegisters {
    #[inline(always)]
    fn output(&self) -> u32 {
        // SAFETY: valid register address per `MmioRegisters::new`.
        unsafe { core::ptr::read_volatile(self.output) }
    }

    #[inline(always)]
    fn write_output(&mut self, word: u32) {
        // SAFETY: valid register address per `MmioRegisters::new`.
        unsafe { core::ptr::write_volatile(self.output, word) }
    }

    #[inline(always)]
    fn set_bits(&mut self, mask: u32) {
        // SAFETY: valid register address per `MmioRegisters::new`.
        unsafe { core::ptr::write_volatile(self.output_set, mask) }
    }
}

/// Output register word for every data byte.
///
/// Each word keeps the register bits of unrelated pins as they were when the
/// table was built, drives CS and WR low, DC high, RD and RST high. Rebuild
/// it after other pins on the register changed meaning.
#[derive(Clone)]
pub struct LookupTable {
    words: [u32; 256],
}

impl LookupTable {
    pub fn build(config: &BusConfig, current: u32) -> Self {
        let cleared = config.data_mask | config.cs_bit | config.wr_bit;
        let baseline = (current & !cleared) | config.dc_bit | config.idle_high;
        let mut words = [0; 256];
        for (byte, word) in words.iter_mut().enumerate() {
            *word = baseline | config.spread(byte as u8);
        }
        Self { words }
    }

    #[inline(always)]
    pub fn word(&self, byte: u8) -> u32 {
        self.words[byte as usize]
    }

    /// The word for 0x00, i.e. every non-data bit of the table.
    pub fn baseline(&self) -> u32 {
        self.words[0]
    }
}

/// Register words for one pixel, resolved once per fill.
#[derive(Debug, Clone, Copy)]
pub struct PixelWords {
    words: [u32; 3],
    len: usize,
}

impl PixelWords {
    pub fn as_slice(&self) -> &[u32] {
        &self.words[..self.len]
    }
}

/// Bus write primitives.
///
/// Each public write is a complete logical operation and leaves CS high.
/// The crate-internal pieces (`command_byte`, `data_byte`, `window`, ...)
/// keep CS low until [`Bus::deselect`] is called.
pub struct Bus<R> {
    regs: R,
    config: BusConfig,
    table: LookupTable,
}

impl<R> Bus<R>
where
    R: GpioRegisters,
{
    pub fn new(regs: R, config: BusConfig) -> Self {
        let table = LookupTable::build(&config, regs.output());
        Self { regs, config, table }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn table(&self) -> &LookupTable {
        &self.table
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Recapture the register baseline.
    pub fn rebuild_lookup_table(&mut self) {
        self.table = LookupTable::build(&self.config, self.regs.output());
    }

    pub fn release(self) -> R {
        self.regs
    }

    #[inline(always)]
    fn strobe(&mut self, word: u32) {
        self.regs.write_output(word);
        self.regs.set_bits(self.config.wr_bit);
    }

    #[inline(always)]
    pub(crate) fn command_byte(&mut self, command: u8) {
        self.strobe(self.table.word(command) & !self.config.dc_bit);
    }

    #[inline(always)]
    pub(crate) fn data_byte(&mut self, byte: u8) {
        self.strobe(self.table.word(byte));
    }

    /// End the current logical operation.
    #[inline(always)]
    pub fn deselect(&mut self) {
        self.regs.set_bits(self.config.cs_bit);
    }

    pub fn write_command(&mut self, command: u8) {
        self.command_byte(command);
        self.deselect();
    }

    pub fn write_data(&mut self, byte: u8) {
        self.data_byte(byte);
        self.deselect();
    }

    pub fn write_data_burst(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.data_byte(byte);
        }
        self.deselect();
    }

    /// Command followed by its parameter bytes as one operation.
    pub fn write_command_with(&mut self, command: u8, params: &[u8]) {
        self.command_byte(command);
        for &param in params {
            self.data_byte(param);
        }
        self.deselect();
    }

    /// Program the address window and open memory write. CS stays low.
    pub(crate) fn window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) {
        self.command_byte(Instruction::ColumnAddressSet.into());
        for byte in [x0.to_be_bytes(), x1.to_be_bytes()].as_flattened() {
            self.data_byte(*byte);
        }
        self.command_byte(Instruction::PageAddressSet.into());
        for byte in [y0.to_be_bytes(), y1.to_be_bytes()].as_flattened() {
            self.data_byte(*byte);
        }
        self.command_byte(Instruction::MemoryWrite.into());
    }

    pub(crate) fn pixel_words(&self, format: PixelFormat, color: Color) -> PixelWords {
        let bytes = format.bus_bytes(color);
        let mut words = [0; 3];
        for (word, &byte) in words.iter_mut().zip(bytes.iter()) {
            *word = self.table.word(byte);
        }
        PixelWords {
            words,
            len: format.bytes_per_pixel(),
        }
    }

    #[inline(always)]
    pub(crate) fn pixel(&mut self, pixel: &PixelWords) {
        for &word in pixel.as_slice() {
            self.strobe(word);
        }
    }

    pub(crate) fn repeat(&mut self, pixel: &PixelWords, count: u32) {
        match *pixel.as_slice() {
            [hi, lo] => {
                for _ in 0..count {
                    self.strobe(hi);
                    self.strobe(lo);
                }
            }
            _ => {
                for _ in 0..count {
                    self.pixel(pixel);
                }
            }
        }
    }
}
