//! Hardware Abstraction Layer (HAL) for the VS1053 music codec driver
//!
//! This crate provides trait-based abstractions for the collaborators the
//! codec driver consumes, enabling development and testing without physical
//! hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (board firmware)
//!         ↓
//! Codec driver (vs1053 crate)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (Embassy HAL + embedded-hal implementations)
//! ```
//!
//! # Abstractions
//!
//! - [`CodecTransport`] - command channel (4-byte frames, optional read-back)
//!   and data channel (bulk audio bytes)
//! - [`ReadySignal`] - the device "ready for more" line (DREQ)
//! - [`audio_types`] - volume newtypes and the volume register encoding
//!
//! Adapters bind them to embedded-hal: [`SpiTransport`] wraps two async
//! `SpiDevice`s (command and data chip selects on one bus), [`DreqPin`] wraps
//! an `InputPin`.
//!
//! # Features
//!
//! - `std`: host-side mocks in [`mocks`] (simulated codec, memory sink)
//! - `defmt`: `defmt::Format` derives on platform types
//!
//! # Example
//!
//! ```no_run
//! use platform::{CodecTransport, COMMAND_FRAME_LEN};
//!
//! async fn read_mode<T: CodecTransport>(bus: &mut T) -> Result<u16, T::Error> {
//!     let frame: [u8; COMMAND_FRAME_LEN] = [0x03, 0x00, 0x00, 0x00];
//!     let mut reply = [0u8; 2];
//!     bus.exchange(&frame, &mut reply).await?;
//!     Ok(u16::from_be_bytes(reply))
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors; callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod audio_types;
pub mod peripheral;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

// Re-export the collaborator traits and their embedded-hal adapters
pub use peripheral::{
    CodecTransport, DreqPin, ReadySignal, SpiTransport, SpiTransportError, COMMAND_FRAME_LEN,
};

// Re-export audio domain newtypes
pub use audio_types::{OutOfRangeError, StereoVolume, VolumePercent, VolumeRegister};
