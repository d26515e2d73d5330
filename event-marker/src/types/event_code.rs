//! Event code type for the single-byte marker protocol.

use std::fmt;
use std::num::NonZeroU8;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single event marker value.
///
/// The firmware renders the byte's bit pattern as pulses on its eight output
/// pins, so 255 pulses every pin and powers of two pulse one pin each. Zero
/// would pulse nothing and is not a valid code.
///
/// Internally stores a `NonZeroU8`, which guarantees the value is in 1..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct EventCode(NonZeroU8);

impl EventCode {
    /// Smallest valid code.
    pub const MIN: EventCode = EventCode(NonZeroU8::MIN);

    /// Largest valid code: every output pin pulses.
    pub const MAX: EventCode = EventCode(NonZeroU8::MAX);

    /// Create a code, rejecting values outside 1..=255.
    pub fn new(value: i64) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .and_then(NonZeroU8::new)
            .map(Self)
            .ok_or(Error::InvalidCode(value))
    }

    /// The byte that goes on the wire.
    pub fn as_byte(&self) -> u8 {
        self.0.get()
    }

    /// Whether the given output pin (0..8) pulses for this code.
    pub fn pulses_pin(&self, pin: u8) -> bool {
        pin < 8 && self.as_byte() & (1 << pin) != 0
    }

    /// Validate every value of a sequence before any of it is sent.
    pub fn sequence<I>(values: I) -> Result<Vec<EventCode>>
    where
        I: IntoIterator,
        I::Item: Into<i64>,
    {
        values.into_iter().map(|v| Self::new(v.into())).collect()
    }

    /// Every code in `start..=end`, validated up front.
    pub fn range(start: i64, end: i64) -> Result<Vec<EventCode>> {
        Self::new(start)?;
        Self::new(end)?;
        Self::sequence(start..=end)
    }
}

impl TryFrom<i64> for EventCode {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EventCode> for i64 {
    fn from(code: EventCode) -> i64 {
        i64::from(code.as_byte())
    }
}

impl From<EventCode> for u8 {
    fn from(code: EventCode) -> u8 {
        code.as_byte()
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte())
    }
}
