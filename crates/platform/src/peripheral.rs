//! Peripheral abstraction layer
//!
//! The codec exposes two serial channels that share one physical bus:
//!
//! | Channel | Chip select | Traffic                                  |
//! |---------|-------------|------------------------------------------|
//! | Command | xCS         | 4-byte register frames, 2-byte read-back |
//! | Data    | xDCS        | raw audio bytes (32-byte frames)         |
//!
//! plus a DREQ line that is HIGH while the device can accept a transfer.
//!
//! [`CodecTransport`] and [`ReadySignal`] describe those collaborators;
//! [`SpiTransport`] and [`DreqPin`] implement them on top of embedded-hal.

use embedded_hal::digital::InputPin;
use embedded_hal::spi::{Error as _, ErrorKind};
use embedded_hal_async::spi::{Operation, SpiDevice};

/// Length of one command-channel frame: opcode, register, payload hi, payload lo.
pub const COMMAND_FRAME_LEN: usize = 4;

/// Command/data transport to the codec.
pub trait CodecTransport {
    /// Error type
    type Error: core::fmt::Debug;

    /// Send one command frame and read back `read.len()` bytes.
    ///
    /// The read-back bytes are clocked in while the trailing `read.len()`
    /// bytes of `frame` are clocked out. An empty `read` is a plain write.
    fn exchange(
        &mut self,
        frame: &[u8; COMMAND_FRAME_LEN],
        read: &mut [u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Write bytes on the data channel.
    fn write_bulk(
        &mut self,
        data: &[u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;
}

/// Device readiness input (DREQ).
pub trait ReadySignal {
    /// Error type
    type Error: core::fmt::Debug;

    /// `true` when the device can accept the next transfer.
    fn is_ready(&mut self) -> Result<bool, Self::Error>;
}

/// Errors reported by [`SpiTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiTransportError {
    /// The command-channel SPI device failed.
    Command(ErrorKind),
    /// The data-channel SPI device failed.
    Data(ErrorKind),
    /// More read-back bytes were requested than the frame carries.
    ResponseTooLong,
}

/// [`CodecTransport`] over two async SPI devices sharing one bus.
///
/// `CMD` must assert the command chip select (xCS), `DATA` the data chip
/// select (xDCS). On hardware both are usually `embedded_hal_bus`
/// `SpiDevice`s built over the same SPI peripheral.
pub struct SpiTransport<CMD, DATA> {
    command: CMD,
    data: DATA,
}

impl<CMD, DATA> SpiTransport<CMD, DATA>
where
    CMD: SpiDevice,
    DATA: SpiDevice,
{
    /// Create a transport from the command and data SPI devices.
    pub fn new(command: CMD, data: DATA) -> Self {
        Self { command, data }
    }

    /// Release the underlying SPI devices.
    pub fn release(self) -> (CMD, DATA) {
        (self.command, self.data)
    }
}

impl<CMD, DATA> CodecTransport for SpiTransport<CMD, DATA>
where
    CMD: SpiDevice,
    DATA: SpiDevice,
{
    type Error = SpiTransportError;

    async fn exchange(
        &mut self,
        frame: &[u8; COMMAND_FRAME_LEN],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        if read.is_empty() {
            return self
                .command
                .write(frame)
                .await
                .map_err(|e| SpiTransportError::Command(e.kind()));
        }

        // Header goes out first; the padding bytes are clocked out while the
        // response is clocked in (full duplex).
        let split = COMMAND_FRAME_LEN
            .checked_sub(read.len())
            .ok_or(SpiTransportError::ResponseTooLong)?;
        let (header, padding) = frame.split_at(split);
        self.command
            .transaction(&mut [Operation::Write(header), Operation::Transfer(read, padding)])
            .await
            .map_err(|e| SpiTransportError::Command(e.kind()))
    }

    async fn write_bulk(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if data.is_empty() {
            return Ok(());
        }
        self.data
            .write(data)
            .await
            .map_err(|e| SpiTransportError::Data(e.kind()))
    }
}

/// [`ReadySignal`] backed by a GPIO input (DREQ is active HIGH).
pub struct DreqPin<P> {
    pin: P,
}

impl<P: InputPin> DreqPin<P> {
    /// Wrap the DREQ input pin.
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    /// Release the underlying pin.
    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: InputPin> ReadySignal for DreqPin<P> {
    type Error = P::Error;

    fn is_ready(&mut self) -> Result<bool, Self::Error> {
        self.pin.is_high()
    }
}
