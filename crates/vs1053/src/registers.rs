//! VS1053 register map
//!
//! Source: VLSI Solution VS1053b Datasheet v1.31, section 9.6 (SCI registers)
//! and application note "VS1053b Ogg Vorbis / ADPCM recording".
//!
//! # Serial Control Interface (SCI)
//!
//! Every command is one 4-byte frame on the xCS channel:
//!
//! ```text
//! [ opcode | address | data[15:8] | data[7:0] ]
//! ```
//!
//! A read clocks the register contents back during the last two bytes.
//! The chip drops DREQ while it is busy with a command; the next frame must
//! wait until DREQ is HIGH again.
//!
//! # Serial Data Interface (SDI)
//!
//! Audio bytes go out on the xDCS channel. When DREQ is HIGH the decoder FIFO
//! can take at least 32 more bytes, which is why playback is framed in
//! 32-byte chunks.

use crate::error::CodecError;

// ---------------------------------------------------------------------------
// Opcodes and frames
// ---------------------------------------------------------------------------

/// SCI opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Write a 16-bit register.
    Write = 0x02,
    /// Read a 16-bit register.
    Read = 0x03,
}

/// SCI register addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// Mode control
    Mode = 0x00,
    /// Status
    Status = 0x01,
    /// Built-in bass/treble control
    Bass = 0x02,
    /// Clock frequency + multiplier
    ClockF = 0x03,
    /// Decode time in seconds
    DecodeTime = 0x04,
    /// Misc. audio data (sample rate, channels)
    AuData = 0x05,
    /// RAM write/read data port
    Wram = 0x06,
    /// Base address for RAM write/read
    WramAddr = 0x07,
    /// Stream header data 0; recording sample FIFO
    HDat0 = 0x08,
    /// Stream header data 1; recording FIFO fill level (samples)
    HDat1 = 0x09,
    /// Start address of application (plugin entry point)
    AiAddr = 0x0A,
    /// Volume control
    Vol = 0x0B,
    /// Application control register 0 (recording: channel layout)
    AiCtrl0 = 0x0C,
    /// Application control register 1 (recording: gain, 0 = AGC)
    AiCtrl1 = 0x0D,
    /// Application control register 2 (recording: max autogain)
    AiCtrl2 = 0x0E,
    /// Application control register 3 (recording: stop handshake)
    AiCtrl3 = 0x0F,
}

impl Register {
    /// Raw SCI address.
    #[must_use]
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Register {
    type Error = CodecError;

    fn try_from(addr: u8) -> Result<Self, Self::Error> {
        Ok(match addr {
            0x00 => Self::Mode,
            0x01 => Self::Status,
            0x02 => Self::Bass,
            0x03 => Self::ClockF,
            0x04 => Self::DecodeTime,
            0x05 => Self::AuData,
            0x06 => Self::Wram,
            0x07 => Self::WramAddr,
            0x08 => Self::HDat0,
            0x09 => Self::HDat1,
            0x0A => Self::AiAddr,
            0x0B => Self::Vol,
            0x0C => Self::AiCtrl0,
            0x0D => Self::AiCtrl1,
            0x0E => Self::AiCtrl2,
            0x0F => Self::AiCtrl3,
            other => {
                return Err(CodecError::InvalidParameter {
                    value: u32::from(other),
                    min: 0,
                    max: 0x0F,
                })
            }
        })
    }
}

/// One SCI command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandFrame {
    /// Read or write
    pub opcode: Opcode,
    /// Target register address (raw, so patch records can address any SCI slot)
    pub address: u8,
    /// Value to write; ignored by the chip for reads
    pub payload: u16,
}

impl CommandFrame {
    /// Register read request.
    #[must_use]
    pub const fn read(register: Register) -> Self {
        Self {
            opcode: Opcode::Read,
            address: register.addr(),
            payload: 0,
        }
    }

    /// Register write request.
    #[must_use]
    pub const fn write(register: Register, payload: u16) -> Self {
        Self::write_raw(register.addr(), payload)
    }

    /// Write to a raw address.
    #[must_use]
    pub const fn write_raw(address: u8, payload: u16) -> Self {
        Self {
            opcode: Opcode::Write,
            address,
            payload,
        }
    }

    /// Wire encoding: `[opcode, address, payload_hi, payload_lo]`.
    #[must_use]
    pub const fn encode(self) -> [u8; 4] {
        let [hi, lo] = self.payload.to_be_bytes();
        [self.opcode as u8, self.address, hi, lo]
    }
}

// ---------------------------------------------------------------------------
// SCI_MODE bits
// ---------------------------------------------------------------------------

/// Soft reset (self-clearing)
pub const SM_RESET: u16 = 0x0004;
/// Allow SDI tests (sine test)
pub const SM_TESTS: u16 = 0x0020;
/// Native SPI modes (xDCS separate from xCS); required for the 2-select wiring
pub const SM_SDINEW: u16 = 0x0800;
/// ADPCM recording active
pub const SM_ADPCM: u16 = 0x1000;
/// Line input selected instead of microphone
pub const SM_LINE1: u16 = 0x4000;

// ---------------------------------------------------------------------------
// Register values
// ---------------------------------------------------------------------------

/// SCI_CLOCKF for playback: SC_MULT = 5.0x (XTALI 12.288 MHz → 61.44 MHz CLKI)
pub const CLOCKF_PLAYBACK: u16 = 0xA000;

/// SCI_CLOCKF for recording: SC_MULT = 5.5x
pub const CLOCKF_RECORDING: u16 = 0xC000;

/// SCI_VOL probe written during init and read back to confirm the chip responds
pub const VOL_PROBE: u16 = 0x0101;

/// X-memory address of the ADC interrupt enable word
pub const WRAM_ADDR_INT_ENABLE: u16 = 0xC01A;

/// Interrupt enable value that leaves only the SCI interrupt active
pub const WRAM_INT_SCI_ONLY: u16 = 0x0002;

/// Entry point of the recording plugin loaded by the ADPCM patch
pub const RECORDER_START_ADDR: u16 = 0x0034;

/// AICTRL3 bit 0: ask the encoder plugin to finish
pub const AICTRL3_STOP_REQUEST: u16 = 0x0001;

/// AICTRL3 bit 1: set by the plugin once encoding has stopped
pub const AICTRL3_STOPPED: u16 = 0x0002;

/// AICTRL0 channel layout: plugin default
pub const AICTRL0_DEFAULT: u16 = 0x0000;
/// AICTRL0 channel layout: mono
pub const AICTRL0_MONO: u16 = 0x8000;
/// AICTRL0 channel layout: stereo
pub const AICTRL0_STEREO: u16 = 0x8080;

// ---------------------------------------------------------------------------
// SDI sine test
// ---------------------------------------------------------------------------

/// Sine test entry sequence; byte 3 (`n`) selects the frequency.
pub const SINE_TEST_START: [u8; 8] = [0x53, 0xEF, 0x6E, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Index of the frequency byte inside [`SINE_TEST_START`]
pub const SINE_TEST_PATTERN_INDEX: usize = 3;

/// Sine test exit sequence ("Exit")
pub const SINE_TEST_EXIT: [u8; 8] = [0x45, 0x78, 0x69, 0x74, 0x00, 0x00, 0x00, 0x00];

/// Sine test start sequence with the frequency byte filled in.
///
/// `pattern` encodes `Fs index << 5 | S`; `0x7E` is 5168 Hz, `0x44` is 1 kHz.
#[must_use]
pub fn sine_test_start(pattern: u8) -> [u8; 8] {
    let mut seq = SINE_TEST_START;
    if let Some(slot) = seq.get_mut(SINE_TEST_PATTERN_INDEX) {
        *slot = pattern;
    }
    seq
}
