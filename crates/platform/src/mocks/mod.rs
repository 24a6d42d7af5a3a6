//! Mock implementations for testing
//!
//! - [`SimulatedCodec`]: a software VS1053 behind [`CodecTransport`] and
//!   [`ReadySignal`]. Register writes are echoed back on read, resets and
//!   encoder stops are modelled, sample counts are scripted.
//! - [`MemorySink`]: an `embedded_io_async::Write` that keeps everything
//!   written to it.
//! - [`ChunkedReader`]: an `embedded_io_async::Read` that hands out data in
//!   small pieces, for exercising stream parsers.
//!
//! All three are cheap `Clone` handles over shared state, so a test can give
//! one copy to the driver and inspect another.

#![cfg(any(test, feature = "std"))]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::peripheral::{CodecTransport, ReadySignal, COMMAND_FRAME_LEN};

const OP_WRITE: u8 = 0x02;
const OP_READ: u8 = 0x03;

const REG_MODE: u8 = 0x00;
const REG_HDAT0: u8 = 0x08;
const REG_HDAT1: u8 = 0x09;
const REG_VOL: u8 = 0x0B;
const REG_AICTRL3: u8 = 0x0F;

const SM_RESET: u16 = 0x0004;
const AICTRL3_STOP_REQUEST: u16 = 0x0001;
const AICTRL3_STOPPED: u16 = 0x0002;

const REGISTER_COUNT: usize = 16;

fn lock<S>(m: &Mutex<S>) -> MutexGuard<'_, S> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── SimulatedCodec ───────────────────────────────────────────────────────────

/// Faults reported by [`SimulatedCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFault {
    /// Frame opcode was neither read (0x03) nor write (0x02).
    UnknownOpcode(u8),
    /// Frame addressed a register above 0x0F.
    BadRegister(u8),
    /// Injected command-channel failure.
    Command,
    /// Injected data-channel failure.
    Data,
    /// Injected DREQ read failure.
    ReadyPin,
}

/// One transaction seen by the simulated device, in bus order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Register write on the command channel.
    Write {
        /// Register address
        register: u8,
        /// Value written
        value: u16,
    },
    /// Register read on the command channel.
    Read {
        /// Register address
        register: u8,
        /// Value returned
        value: u16,
    },
    /// Bulk write on the data channel.
    Data(Vec<u8>),
}

#[derive(Debug, Default)]
struct CodecModel {
    registers: [u16; REGISTER_COUNT],
    events: Vec<BusEvent>,
    resets: usize,
    vol_readback: Option<u16>,

    // Encoder
    running_counts: VecDeque<u16>,
    drain_counts: VecDeque<u16>,
    stop_latency: u32,
    stop_countdown: Option<u32>,
    next_sample: u16,
    samples_read: usize,

    // DREQ
    not_ready_polls: u32,
    never_ready: bool,
    ready_polls: usize,

    // Fault injection
    fail_command: bool,
    fail_ready: bool,
    fail_data_after: Option<usize>,
    data_writes: usize,
}

impl CodecModel {
    fn register_slot(&mut self, register: u8) -> Result<&mut u16, SimulatedFault> {
        self.registers
            .get_mut(usize::from(register))
            .ok_or(SimulatedFault::BadRegister(register))
    }

    fn write(&mut self, register: u8, value: u16) -> Result<(), SimulatedFault> {
        let mut stored = value;
        if register == REG_MODE && value & SM_RESET != 0 {
            // Soft reset: the bit self-clears and the encoder stops.
            stored &= !SM_RESET;
            self.resets = self.resets.saturating_add(1);
            self.stop_countdown = None;
            *self.register_slot(REG_AICTRL3)? = 0;
        }
        if register == REG_AICTRL3 && value & AICTRL3_STOP_REQUEST != 0 {
            self.stop_countdown = Some(self.stop_latency);
        }
        *self.register_slot(register)? = stored;
        self.events.push(BusEvent::Write { register, value });
        Ok(())
    }

    fn read(&mut self, register: u8) -> Result<u16, SimulatedFault> {
        let value = match register {
            REG_VOL => match self.vol_readback {
                Some(v) => v,
                None => *self.register_slot(register)?,
            },
            REG_AICTRL3 => {
                match self.stop_countdown {
                    Some(0) => {
                        self.stop_countdown = None;
                        *self.register_slot(REG_AICTRL3)? |= AICTRL3_STOPPED;
                    }
                    Some(n) => self.stop_countdown = Some(n.saturating_sub(1)),
                    None => {}
                }
                *self.register_slot(register)?
            }
            REG_HDAT1 => {
                let stopped = *self.register_slot(REG_AICTRL3)? & AICTRL3_STOPPED != 0;
                let queue = if stopped {
                    &mut self.drain_counts
                } else {
                    &mut self.running_counts
                };
                queue.pop_front().unwrap_or(0)
            }
            REG_HDAT0 => {
                let sample = self.next_sample;
                self.next_sample = self.next_sample.wrapping_add(1);
                self.samples_read = self.samples_read.saturating_add(1);
                sample
            }
            _ => *self.register_slot(register)?,
        };
        self.events.push(BusEvent::Read { register, value });
        Ok(value)
    }
}

/// Software stand-in for a VS1053 on the bus.
///
/// Implements both [`CodecTransport`] and [`ReadySignal`]; hand one clone to
/// the driver as transport, another as ready pin and keep a third for
/// assertions.
///
/// Behaviour:
/// - writes are stored and echoed back on read (except the scripted
///   registers below),
/// - a `MODE` write with `SM_RESET` counts a reset and clears the bit,
/// - writing `AICTRL3` bit 0 starts an encoder stop that reports bit 1
///   after [`with_stop_latency`](Self::with_stop_latency) further reads,
/// - `HDAT1` pops scripted fill levels ([`script_samples`](Self::script_samples)
///   while the encoder runs, [`script_drain`](Self::script_drain) once it
///   reports stopped), `0` when the script is exhausted,
/// - `HDAT0` returns an incrementing sample counter.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCodec {
    model: Arc<Mutex<CodecModel>>,
}

impl SimulatedCodec {
    /// Create an idle, always-ready device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of extra `AICTRL3` polls before the encoder reports stopped.
    #[must_use]
    pub fn with_stop_latency(self, polls: u32) -> Self {
        lock(&self.model).stop_latency = polls;
        self
    }

    /// Force the value returned for `SCI_VOL` reads.
    #[must_use]
    pub fn with_volume_readback(self, value: u16) -> Self {
        lock(&self.model).vol_readback = Some(value);
        self
    }

    /// Report "not ready" for the next `polls` DREQ reads.
    #[must_use]
    pub fn with_not_ready_polls(self, polls: u32) -> Self {
        lock(&self.model).not_ready_polls = polls;
        self
    }

    /// Never report ready.
    #[must_use]
    pub fn never_ready(self) -> Self {
        lock(&self.model).never_ready = true;
        self
    }

    /// Fail every command-channel exchange.
    #[must_use]
    pub fn failing_commands(self) -> Self {
        lock(&self.model).fail_command = true;
        self
    }

    /// Fail every DREQ read.
    #[must_use]
    pub fn failing_ready_pin(self) -> Self {
        lock(&self.model).fail_ready = true;
        self
    }

    /// Accept `writes` data-channel writes, then fail the rest.
    #[must_use]
    pub fn failing_data_after(self, writes: usize) -> Self {
        lock(&self.model).fail_data_after = Some(writes);
        self
    }

    /// Queue `HDAT1` fill levels reported while the encoder runs.
    pub fn script_samples(&self, counts: impl IntoIterator<Item = u16>) {
        lock(&self.model).running_counts.extend(counts);
    }

    /// Queue `HDAT1` fill levels reported after the encoder stopped.
    pub fn script_drain(&self, counts: impl IntoIterator<Item = u16>) {
        lock(&self.model).drain_counts.extend(counts);
    }

    /// Current register contents.
    pub fn register(&self, register: u8) -> u16 {
        lock(&self.model)
            .registers
            .get(usize::from(register))
            .copied()
            .unwrap_or(0)
    }

    /// Every bus transaction so far.
    pub fn events(&self) -> Vec<BusEvent> {
        lock(&self.model).events.clone()
    }

    /// Forget recorded transactions (register contents are kept).
    pub fn clear_events(&self) {
        lock(&self.model).events.clear();
    }

    /// All register writes as `(register, value)`.
    pub fn writes(&self) -> Vec<(u8, u16)> {
        lock(&self.model)
            .events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Write { register, value } => Some((*register, *value)),
                _ => None,
            })
            .collect()
    }

    /// Values written to one register, in order.
    pub fn writes_to(&self, register: u8) -> Vec<u16> {
        self.writes()
            .into_iter()
            .filter(|(r, _)| *r == register)
            .map(|(_, v)| v)
            .collect()
    }

    /// How many times a register was read.
    pub fn reads_of(&self, register: u8) -> usize {
        lock(&self.model)
            .events
            .iter()
            .filter(|e| matches!(e, BusEvent::Read { register: r, .. } if *r == register))
            .count()
    }

    /// Data-channel writes, one entry per transaction.
    pub fn data_frames(&self) -> Vec<Vec<u8>> {
        lock(&self.model)
            .events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Data(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// All data-channel bytes, concatenated.
    pub fn data_bytes(&self) -> Vec<u8> {
        self.data_frames().concat()
    }

    /// Number of soft resets (`MODE` writes with `SM_RESET`).
    pub fn resets(&self) -> usize {
        lock(&self.model).resets
    }

    /// Number of samples handed out through `HDAT0`.
    pub fn samples_read(&self) -> usize {
        lock(&self.model).samples_read
    }

    /// Number of DREQ reads.
    pub fn ready_polls(&self) -> usize {
        lock(&self.model).ready_polls
    }
}

impl CodecTransport for SimulatedCodec {
    type Error = SimulatedFault;

    async fn exchange(
        &mut self,
        frame: &[u8; COMMAND_FRAME_LEN],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        let mut model = lock(&self.model);
        if model.fail_command {
            return Err(SimulatedFault::Command);
        }
        let [opcode, register, hi, lo] = *frame;
        match opcode {
            OP_WRITE => model.write(register, u16::from_be_bytes([hi, lo])),
            OP_READ => {
                let value = model.read(register)?.to_be_bytes();
                for (dst, src) in read.iter_mut().zip(value.iter()) {
                    *dst = *src;
                }
                Ok(())
            }
            other => Err(SimulatedFault::UnknownOpcode(other)),
        }
    }

    async fn write_bulk(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let mut model = lock(&self.model);
        if model
            .fail_data_after
            .is_some_and(|limit| model.data_writes >= limit)
        {
            return Err(SimulatedFault::Data);
        }
        model.data_writes = model.data_writes.saturating_add(1);
        model.events.push(BusEvent::Data(data.to_vec()));
        Ok(())
    }
}

impl ReadySignal for SimulatedCodec {
    type Error = SimulatedFault;

    fn is_ready(&mut self) -> Result<bool, Self::Error> {
        let mut model = lock(&self.model);
        model.ready_polls = model.ready_polls.saturating_add(1);
        if model.fail_ready {
            return Err(SimulatedFault::ReadyPin);
        }
        if model.never_ready {
            return Ok(false);
        }
        if model.not_ready_polls > 0 {
            model.not_ready_polls = model.not_ready_polls.saturating_sub(1);
            return Ok(false);
        }
        Ok(true)
    }
}

// ── Byte I/O ─────────────────────────────────────────────────────────────────

/// Injected I/O failure for [`MemorySink`] and [`ChunkedReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockIoError;

impl embedded_io::Error for MockIoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

#[derive(Debug, Default)]
struct SinkState {
    bytes: Vec<u8>,
    flushes: usize,
    bytes_at_first_flush: Option<usize>,
    fail_after: Option<usize>,
}

/// In-memory recording sink.
///
/// The driver consumes its copy by value and drops it when the session ends;
/// [`is_released`](Self::is_released) reports whether that has happened.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail writes once `bytes` bytes have been accepted.
    #[must_use]
    pub fn failing_after(self, bytes: usize) -> Self {
        lock(&self.state).fail_after = Some(bytes);
        self
    }

    /// Everything written so far.
    pub fn bytes(&self) -> Vec<u8> {
        lock(&self.state).bytes.clone()
    }

    /// Number of `flush` calls.
    pub fn flushes(&self) -> usize {
        lock(&self.state).flushes
    }

    /// Length of the data at the first `flush`.
    pub fn bytes_at_first_flush(&self) -> Option<usize> {
        lock(&self.state).bytes_at_first_flush
    }

    /// `true` once every other handle (the driver's) has been dropped.
    pub fn is_released(&self) -> bool {
        Arc::strong_count(&self.state) == 1
    }
}

impl embedded_io::ErrorType for MemorySink {
    type Error = MockIoError;
}

impl embedded_io_async::Write for MemorySink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = lock(&self.state);
        if state
            .fail_after
            .is_some_and(|limit| state.bytes.len() >= limit)
        {
            return Err(MockIoError);
        }
        state.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        state.flushes = state.flushes.saturating_add(1);
        if state.bytes_at_first_flush.is_none() {
            state.bytes_at_first_flush = Some(state.bytes.len());
        }
        Ok(())
    }
}

/// Byte source that returns at most `chunk` bytes per read.
#[derive(Debug, Clone)]
pub struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    fail_at: Option<usize>,
}

impl ChunkedReader {
    /// Serve `data` in reads of at most `chunk` bytes (minimum 1).
    pub fn new(data: &[u8], chunk: usize) -> Self {
        Self {
            data: data.to_vec(),
            pos: 0,
            chunk: chunk.max(1),
            fail_at: None,
        }
    }

    /// Serve little-endian encoded words, the on-disk patch format.
    pub fn from_words(words: &[u16], chunk: usize) -> Self {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        Self::new(&bytes, chunk)
    }

    /// Fail the read that would start at byte offset `offset`.
    #[must_use]
    pub fn failing_at(mut self, offset: usize) -> Self {
        self.fail_at = Some(offset);
        self
    }
}

impl embedded_io::ErrorType for ChunkedReader {
    type Error = MockIoError;
}

impl embedded_io_async::Read for ChunkedReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.fail_at.is_some_and(|offset| self.pos >= offset) {
            return Err(MockIoError);
        }
        let rest = self.data.get(self.pos..).unwrap_or(&[]);
        let n = rest.len().min(self.chunk).min(buf.len());
        for (dst, src) in buf.iter_mut().zip(rest.iter().take(n)) {
            *dst = *src;
        }
        self.pos = self.pos.saturating_add(n);
        Ok(n)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use embedded_io_async::{Read, Write};

    #[tokio::test]
    async fn test_register_echo() {
        let mut codec = SimulatedCodec::new();
        codec.exchange(&[0x02, 0x0B, 0x12, 0x34], &mut []).await.unwrap();

        let mut reply = [0u8; 2];
        codec.exchange(&[0x03, 0x0B, 0, 0], &mut reply).await.unwrap();
        assert_eq!(reply, [0x12, 0x34]);
        assert_eq!(codec.writes_to(0x0B), vec![0x1234]);
    }

    #[tokio::test]
    async fn test_reset_bit_self_clears() {
        let mut codec = SimulatedCodec::new();
        codec.exchange(&[0x02, 0x00, 0x08, 0x04], &mut []).await.unwrap();
        assert_eq!(codec.resets(), 1);
        assert_eq!(codec.register(0x00), 0x0800);
    }

    #[tokio::test]
    async fn test_encoder_stop_latency() {
        let mut codec = SimulatedCodec::new().with_stop_latency(2);
        codec.exchange(&[0x02, 0x0F, 0x00, 0x01], &mut []).await.unwrap();

        let mut reply = [0u8; 2];
        let mut polls = 0;
        loop {
            polls += 1;
            codec.exchange(&[0x03, 0x0F, 0, 0], &mut reply).await.unwrap();
            if u16::from_be_bytes(reply) & 0x0002 != 0 {
                break;
            }
        }
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn test_fill_level_scripts() {
        let mut codec = SimulatedCodec::new();
        codec.script_samples([4]);
        codec.script_drain([2]);

        let mut reply = [0u8; 2];
        codec.exchange(&[0x03, 0x09, 0, 0], &mut reply).await.unwrap();
        assert_eq!(u16::from_be_bytes(reply), 4);
        codec.exchange(&[0x03, 0x09, 0, 0], &mut reply).await.unwrap();
        assert_eq!(u16::from_be_bytes(reply), 0, "running script exhausted");

        codec.exchange(&[0x02, 0x0F, 0x00, 0x01], &mut []).await.unwrap();
        codec.exchange(&[0x03, 0x0F, 0, 0], &mut reply).await.unwrap();
        codec.exchange(&[0x03, 0x09, 0, 0], &mut reply).await.unwrap();
        assert_eq!(u16::from_be_bytes(reply), 2, "drain script after stop");
    }

    #[test]
    fn test_ready_scripting() {
        let mut codec = SimulatedCodec::new().with_not_ready_polls(2);
        assert!(!codec.is_ready().unwrap());
        assert!(!codec.is_ready().unwrap());
        assert!(codec.is_ready().unwrap());
        assert_eq!(codec.ready_polls(), 3);
    }

    #[tokio::test]
    async fn test_memory_sink_release() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        handle.write_all(&[1, 2, 3]).await.unwrap();
        handle.flush().await.unwrap();
        assert!(!sink.is_released());
        drop(handle);

        assert!(sink.is_released());
        assert_eq!(sink.bytes(), vec![1, 2, 3]);
        assert_eq!(sink.bytes_at_first_flush(), Some(3));
    }

    #[tokio::test]
    async fn test_chunked_reader() {
        let mut reader = ChunkedReader::from_words(&[0x0102, 0x0304], 3);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf[..3], &[0x02, 0x01, 0x04]);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 1);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }
}
