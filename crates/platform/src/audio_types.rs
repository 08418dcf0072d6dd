//! Audio domain newtypes for compile-time safety.
//!
//! - `VolumePercent`: clamps 0–100, prevents register overflow
//! - `VolumeRegister`: VS10xx `SCI_VOL` encoding, derived from VolumePercent only

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

impl core::fmt::Display for OutOfRangeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "value {} outside {}..={}",
            self.value, self.min, self.max
        )
    }
}

// ── VolumePercent ────────────────────────────────────────────────────────────

/// Volume as a percentage, clamped to 0–100.
///
/// Wraps a `u8` with the invariant `0 <= value <= 100`.
/// Construct with [`VolumePercent::new`] (clamping) or
/// [`VolumePercent::try_new`] (fallible, strict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct VolumePercent(u8);

impl VolumePercent {
    /// Silence.
    pub const MUTE: Self = Self(0);

    /// Full scale.
    pub const MAX: Self = Self(100);

    /// Create a `VolumePercent`, clamping values above 100 to 100.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        if value > 100 {
            Self(100)
        } else {
            Self(value)
        }
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
    pub const fn get(self) -> u8 {
        self.0
    }
}

// ── VolumeRegister ───────────────────────────────────────────────────────────

/// VS10xx `SCI_VOL` register value.
///
/// The high byte attenuates the left channel and the low byte the right
/// channel, each in 0.5 dB steps: `0x00` = loudest, `0xFE` = quietest
/// (`0xFF` powers the analog stage down and is never produced here).
///
/// Formula per channel: `attenuation = (100 - volume_percent) * 254 / 100`,
/// replicated into both halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct VolumeRegister(u16);

impl VolumeRegister {
    /// Largest per-channel attenuation step written by this encoding.
    pub const MAX_ATTENUATION: u8 = 254;

    /// Encode a volume percentage for both stereo channels.
    ///
    /// - 100% volume → `0x0000`
    /// - 75% volume  → `0x3F3F`
    /// - 0% volume   → `0xFEFE`
    #[must_use]
    pub fn from_volume(vol: VolumePercent) -> Self {
        let per_channel = Self::attenuation(vol);
        Self(u16::from_be_bytes([per_channel, per_channel]))
    }

    /// Per-channel attenuation step for `vol`.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // vol <= 100, so 100 - vol and the product (max 25_400) fit u16
    pub fn attenuation(vol: VolumePercent) -> u8 {
        let steps = (u16::from(100 - vol.get()) * u16::from(Self::MAX_ATTENUATION)) / 100;
        u8::try_from(steps).unwrap_or(Self::MAX_ATTENUATION)
    }

    /// Return the raw 16-bit register value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Left-channel attenuation byte.
    #[must_use]
    pub const fn left(self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    /// Right-channel attenuation byte.
    #[must_use]
    pub const fn right(self) -> u8 {
        self.0.to_be_bytes()[1]
    }
}

impl From<VolumePercent> for VolumeRegister {
    fn from(vol: VolumePercent) -> Self {
        Self::from_volume(vol)
    }
}
