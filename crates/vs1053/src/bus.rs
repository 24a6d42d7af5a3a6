//! Bus transaction layer.
//!
//! Every SCI command and SDI transfer goes through [`CodecBus`]. It owns the
//! transport, the DREQ input and the delay source, and it is the only place
//! that knows the wire format.
//!
//! The driver keeps the bus behind an async mutex; holding the guard is what
//! "owning the bus" means. Nothing here locks anything itself.

use embedded_hal_async::delay::DelayNs;
use platform::{CodecTransport, ReadySignal};

use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::registers::{CommandFrame, Register};

/// Bytes per recorded sample in `SCI_HDAT0`.
pub const SAMPLE_BYTES: usize = 2;

/// Command/data access to one codec.
pub struct CodecBus<T, R, D> {
    transport: T,
    ready: R,
    delay: D,
    poll_interval_us: u32,
    max_polls: Option<u32>,
}

impl<T, R, D> CodecBus<T, R, D>
where
    T: CodecTransport,
    R: ReadySignal,
    D: DelayNs,
{
    /// Wrap the collaborators; polling behaviour comes from `config`.
    pub fn new(transport: T, ready: R, delay: D, config: &CodecConfig) -> Self {
        Self {
            transport,
            ready,
            delay,
            poll_interval_us: config.ready_poll_interval_us,
            max_polls: config.max_ready_polls(),
        }
    }

    /// Block until DREQ is HIGH.
    ///
    /// Polls every `ready_poll_interval_us`. Without a configured timeout this
    /// never gives up.
    ///
    /// # Errors
    ///
    /// [`CodecError::DeviceNotReady`] once the poll budget is spent,
    /// [`CodecError::ReadySignal`] if the pin cannot be read.
    pub async fn wait_ready(&mut self) -> Result<()> {
        let mut polls: u32 = 0;
        loop {
            if self.ready.is_ready().map_err(|_| CodecError::ReadySignal)? {
                return Ok(());
            }
            polls = polls.saturating_add(1);
            if self.max_polls.is_some_and(|max| polls >= max) {
                warn!("DREQ still low after {} polls", polls);
                return Err(CodecError::DeviceNotReady);
            }
            self.delay.delay_us(self.poll_interval_us).await;
        }
    }

    async fn command(&mut self, frame: CommandFrame, read: &mut [u8]) -> Result<()> {
        self.transport
            .exchange(&frame.encode(), read)
            .await
            .map_err(|_| CodecError::Transport)
    }

    /// Read a 16-bit register (big-endian on the wire).
    pub async fn read_register(&mut self, register: Register) -> Result<u16> {
        self.wait_ready().await?;
        let mut reply = [0u8; 2];
        self.command(CommandFrame::read(register), &mut reply).await?;
        Ok(u16::from_be_bytes(reply))
    }

    /// Write a 16-bit register.
    pub async fn write_register(&mut self, register: Register, value: u16) -> Result<()> {
        self.write_register_raw(register.addr(), value).await
    }

    /// Write to a raw SCI address (patch records).
    pub async fn write_register_raw(&mut self, address: u8, value: u16) -> Result<()> {
        self.wait_ready().await?;
        self.command(CommandFrame::write_raw(address, value), &mut [])
            .await
    }

    /// Send bytes on the data channel after DREQ goes HIGH.
    ///
    /// DREQ only guarantees room for 32 bytes; callers frame accordingly.
    pub async fn write_data(&mut self, bytes: &[u8]) -> Result<()> {
        self.wait_ready().await?;
        self.transport
            .write_bulk(bytes)
            .await
            .map_err(|_| CodecError::Transport)
    }

    /// Pull samples out of `SCI_HDAT0` into `out`, two big-endian bytes each.
    ///
    /// No DREQ wait between reads: the caller has already read the fill
    /// level from `SCI_HDAT1`, so the samples are known to be there. A
    /// trailing odd byte in `out` is left untouched.
    pub async fn read_samples(&mut self, out: &mut [u8]) -> Result<()> {
        let frame = CommandFrame::read(Register::HDat0);
        for sample in out.chunks_exact_mut(SAMPLE_BYTES) {
            self.command(frame, sample).await?;
        }
        Ok(())
    }

    /// Sleep without releasing the bus.
    pub async fn settle_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }
}
