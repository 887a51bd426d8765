//! Wake-timer interval encoding shared by the firmware and emulator.
//!
//! The radio's wake-up timer register packs a mantissa in the low byte and a
//! power-of-two exponent in bits 8-12. The effective period is
//! `mantissa * 2^exponent` milliseconds. The node sleeps for the exact period
//! and rounds it to whole seconds for diagnostics.

use core::fmt;
use core::time::Duration;

use crate::config::ConfigFault;

const MANTISSA_MASK: u16 = 0x00FF;
const EXPONENT_SHIFT: u16 = 8;
const EXPONENT_MASK: u16 = 0x1F;
/// Bits above the exponent field; any of them set marks the code as corrupt.
const RESERVED_MASK: u16 = 0xE000;
/// Shortest period that still rounds to one second.
const MIN_PERIOD_MILLIS: u64 = 500;

/// Largest exponent the register can hold.
pub const MAX_EXPONENT: u8 = 31;

/// Fallback used when the stored code is unconfigured or corrupt (205 * 2^9 ms, about 105 s).
pub const DEFAULT_WAKE_INTERVAL_CODE: WakeIntervalCode = WakeIntervalCode::from_parts(205, 9);

/// Compact wake-timer register value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct WakeIntervalCode(u16);

impl WakeIntervalCode {
    /// Wraps a raw register value without validation.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Packs a mantissa and exponent. Exponents wider than five bits are masked.
    #[must_use]
    pub const fn from_parts(mantissa: u8, exponent: u8) -> Self {
        let exponent = (exponent as u16) & EXPONENT_MASK;
        Self((exponent << EXPONENT_SHIFT) | mantissa as u16)
    }

    /// Returns the raw register value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns the low-byte mantissa.
    #[must_use]
    pub const fn mantissa(self) -> u8 {
        (self.0 & MANTISSA_MASK) as u8
    }

    /// Returns the five-bit exponent.
    #[must_use]
    pub const fn exponent(self) -> u8 {
        ((self.0 >> EXPONENT_SHIFT) & EXPONENT_MASK) as u8
    }

    /// Returns `true` when the code is zero, carries bits outside the register
    /// fields, or describes a period that rounds to zero seconds.
    #[must_use]
    pub const fn is_unusable(self) -> bool {
        self.0 == 0 || self.0 & RESERVED_MASK != 0 || self.period_millis() < MIN_PERIOD_MILLIS
    }

    /// Replaces an unusable code with [`DEFAULT_WAKE_INTERVAL_CODE`].
    #[must_use]
    pub const fn sanitize(self) -> (Self, Option<ConfigFault>) {
        if self.is_unusable() {
            (
                DEFAULT_WAKE_INTERVAL_CODE,
                Some(ConfigFault::WakeIntervalDefaulted { stored: self.0 }),
            )
        } else {
            (self, None)
        }
    }

    /// Raw period in milliseconds before rounding.
    #[must_use]
    pub const fn period_millis(self) -> u64 {
        (self.mantissa() as u64) << self.exponent()
    }
}

impl Default for WakeIntervalCode {
    fn default() -> Self {
        DEFAULT_WAKE_INTERVAL_CODE
    }
}

impl fmt::Display for WakeIntervalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X} ({}*2^{}ms)", self.0, self.mantissa(), self.exponent())
    }
}

/// Decoded wake interval, carrying the code actually applied to the hardware.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WakeInterval {
    pub code: WakeIntervalCode,
    pub seconds: u32,
}

impl WakeInterval {
    /// Unrounded sleep period.
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        Duration::from_millis(self.code.period_millis())
    }
}

/// Converts a register code into whole seconds, rounding half up.
///
/// A zero code (unconfigured storage) decodes as [`DEFAULT_WAKE_INTERVAL_CODE`].
#[must_use]
pub const fn decode(code: WakeIntervalCode) -> WakeInterval {
    let code = if code.raw() == 0 {
        DEFAULT_WAKE_INTERVAL_CODE
    } else {
        code
    };

    let rounded = (code.period_millis() + 500) / 1_000;
    let seconds = if rounded > u32::MAX as u64 {
        u32::MAX
    } else {
        rounded as u32
    };

    WakeInterval { code, seconds }
}
