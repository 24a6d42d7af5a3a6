//! Audio domain newtypes for compile-time safety.
//!
//! - `VolumePercent`: clamps 0–100, the user-facing volume scale
//! - `StereoVolume`: per-channel codec level, 0 = silent, 255 = loudest
//! - `VolumeRegister`: VS1053 `SCI_VOL` encoding, derived from `StereoVolume` only

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

// ── VolumePercent ────────────────────────────────────────────────────────────

/// Volume as a percentage, clamped to 0–100.
///
/// Construct with [`VolumePercent::new`] (clamping) or
/// [`VolumePercent::try_new`] (fallible, strict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct VolumePercent(u8);

impl VolumePercent {
    /// Full volume.
    pub const MAX: Self = Self(100);

    /// Create a `VolumePercent`, clamping values above 100 to 100.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    /// Create a `VolumePercent`, returning an error if `value > 100`.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `value > 100`.
    pub fn try_new(value: u8) -> Result<Self, OutOfRangeError> {
        if value > 100 {
            Err(OutOfRangeError {
                value: u32::from(value),
                min: 0,
                max: 100,
            })
        } else {
            Ok(Self(value))
        }
    }

    /// Return the inner volume value (0–100).
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Scale to the codec's 0–255 channel level (100 % → 255, 0 % → 0).
    #[must_use]
    pub fn to_level(self) -> u8 {
        // pct * 255 / 100 <= 255 for pct <= 100, so the narrowing is lossless.
        #[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]
        let level = (u16::from(self.0) * 255 / 100) as u8;
        level
    }
}

// ── StereoVolume ─────────────────────────────────────────────────────────────

/// Per-channel output level. `0` is silent, `255` is the loudest setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StereoVolume {
    /// Left channel level.
    pub left: u8,
    /// Right channel level.
    pub right: u8,
}

impl StereoVolume {
    /// Both channels at the loudest setting.
    pub const MAX: Self = Self::both(u8::MAX);

    /// Both channels silent.
    pub const SILENT: Self = Self::both(0);

    /// Separate left/right levels.
    #[must_use]
    pub const fn new(left: u8, right: u8) -> Self {
        Self { left, right }
    }

    /// Same level on both channels.
    #[must_use]
    pub const fn both(level: u8) -> Self {
        Self {
            left: level,
            right: level,
        }
    }

    /// Both channels from a percentage.
    #[must_use]
    pub fn from_percent(pct: VolumePercent) -> Self {
        Self::both(pct.to_level())
    }

    /// Encode for `SCI_VOL`.
    #[must_use]
    pub fn register(self) -> VolumeRegister {
        VolumeRegister::from_stereo(self)
    }
}

// ── VolumeRegister ───────────────────────────────────────────────────────────

/// VS1053 `SCI_VOL` register value.
///
/// The chip stores attenuation in 0.5 dB steps per channel: high byte left,
/// low byte right, `0x00` = loudest, `0xFF` = silent. A level `l` maps to the
/// attenuation byte `255 - l`, so the full value is
/// `((255 - left) << 8) | (255 - right)`.
///
/// Constructed from a [`StereoVolume`] only, so the inversion is applied in
/// exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct VolumeRegister(u16);

impl VolumeRegister {
    /// Encode left/right levels.
    #[must_use]
    pub fn from_stereo(volume: StereoVolume) -> Self {
        // `!level` is `255 - level` for u8
        Self(u16::from_be_bytes([!volume.left, !volume.right]))
    }

    /// Return the raw register value.
    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }

    /// Decode a raw register value back into levels.
    #[must_use]
    pub fn to_stereo(self) -> StereoVolume {
        let [left, right] = self.0.to_be_bytes();
        StereoVolume::new(!left, !right)
    }
}

impl From<StereoVolume> for VolumeRegister {
    fn from(volume: StereoVolume) -> Self {
        Self::from_stereo(volume)
    }
}
