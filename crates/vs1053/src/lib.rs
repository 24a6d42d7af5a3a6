//! Async driver for VS1053-class serial audio codecs.
//!
//! The chip sits on two SPI chip selects sharing one bus: a command channel
//! for 16-bit registers (SCI) and a data channel for audio bytes (SDI). A
//! DREQ line goes high when the chip can take another command or 32 bytes of
//! audio.
//!
//! ```text
//! Vs1053 (device state, sessions)
//!   ├── playback   32-byte frames → SDI
//!   ├── recording  ADPCM encoder plugin, HDAT1/HDAT0 → sink
//!   ├── patch      register-write tables (array or stream)
//!   └── CodecBus   SCI/SDI transactions + DREQ polling
//!         └── platform::{CodecTransport, ReadySignal}
//! ```
//!
//! # Example
//!
//! ```no_run
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//! use embedded_hal_async::delay::DelayNs;
//! use platform::{CodecTransport, ReadySignal};
//! use vs1053::{CodecConfig, Vs1053};
//!
//! async fn beep<T, R, D>(transport: T, dreq: R, delay: D, mp3: &[u8]) -> vs1053::Result<()>
//! where
//!     T: CodecTransport,
//!     R: ReadySignal,
//!     D: DelayNs,
//! {
//!     let codec: Vs1053<NoopRawMutex, _, _, _> =
//!         Vs1053::new(transport, dreq, delay, CodecConfig::default()).await?;
//!     codec.set_volume_percent(60).await?;
//!     let report = codec.play(mp3).await?;
//!     assert!(!report.stopped);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `defmt`: log through `defmt`, derive `defmt::Format` on public types
//! - `tracing`: log through `tracing` (host builds)

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::print_stdout)]
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(async_fn_in_trait)] // Embassy: single-threaded executors, no Send bounds

#[macro_use]
mod fmt;

pub mod bus;
pub mod config;
mod driver;
pub mod error;
pub mod patch;
mod playback;
mod recording;
pub mod registers;

pub use bus::CodecBus;
pub use config::{ChannelMode, CodecConfig, RecorderSettings};
pub use driver::Vs1053;
pub use error::{CodecError, PatchError, Result};
pub use patch::{PatchImage, PatchRecord};
pub use playback::{PlaybackReport, PlaybackState, FRAME_LEN};
pub use recording::{RecordingReport, RecordingState, RECORD_CHUNK_SAMPLES};
pub use registers::{CommandFrame, Opcode, Register};
