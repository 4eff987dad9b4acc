//! Pre-FEC bit-error-rate encoding used by coherent transceivers.
//!
//! The BER is stored in two consecutive register bytes as a 16-bit word:
//!
//! ```text
//!  15      11 10                    0
//! +----------+-----------------------+
//! | exponent |       mantissa        |
//! +----------+-----------------------+
//! ```
//!
//! A mantissa of 1000 or more is read as `mantissa / 1000` with the exponent
//! biased by 21; smaller mantissas are used as-is with a bias of 24. Both
//! branches describe `value × 10^exponent`.
//!
//! ```
//! use mpa_scpi::ber::BerValue;
//!
//! let ber = BerValue::from_bytes(0xCB, 0xE8);
//! assert_eq!(ber.exponent(), 4);
//! assert_eq!(ber.to_string(), "1.0 E 4");
//! ```

use crate::error::{AppResult, MpaError};
use std::fmt;

const MANTISSA_MASK: u16 = 0x07FF;
const EXPONENT_SHIFT: u16 = 11;
const SCALE_THRESHOLD: u16 = 1000;
const SCALED_BIAS: i32 = 21;
const RAW_BIAS: i32 = 24;

/// A decoded BER word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BerValue {
    bits: u16,
}

impl BerValue {
    /// Wrap a raw 16-bit word.
    pub const fn from_bits(bits: u16) -> Self {
        Self { bits }
    }

    /// Combine the high and low register bytes.
    pub const fn from_bytes(high: u8, low: u8) -> Self {
        Self::from_bits(((high as u16) << 8) | low as u16)
    }

    /// Parse two hexadecimal byte strings such as `"cb"` and `"e8"`.
    pub fn from_hex(high: &str, low: &str) -> AppResult<Self> {
        Ok(Self::from_bytes(parse_hex_byte(high)?, parse_hex_byte(low)?))
    }

    /// The raw word.
    pub const fn bits(self) -> u16 {
        self.bits
    }

    /// Top five bits, unbiased.
    pub const fn exponent_bits(self) -> u16 {
        self.bits >> EXPONENT_SHIFT
    }

    /// Low eleven bits.
    pub const fn mantissa(self) -> u16 {
        self.bits & MANTISSA_MASK
    }

    /// Whether the mantissa is read as thousandths.
    pub const fn is_scaled(self) -> bool {
        self.mantissa() >= SCALE_THRESHOLD
    }

    /// Significand: `mantissa / 1000` when scaled, else the mantissa.
    pub fn value(self) -> f64 {
        if self.is_scaled() {
            f64::from(self.mantissa()) / f64::from(SCALE_THRESHOLD)
        } else {
            f64::from(self.mantissa())
        }
    }

    /// Biased decimal exponent.
    pub fn exponent(self) -> i32 {
        let bias = if self.is_scaled() {
            SCALED_BIAS
        } else {
            RAW_BIAS
        };
        i32::from(self.exponent_bits()) - bias
    }

    /// `value × 10^exponent`.
    pub fn as_f64(self) -> f64 {
        self.value() * 10f64.powi(self.exponent())
    }
}

impl fmt::Display for BerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scaled() {
            let value = self.value();
            if value.fract() == 0.0 {
                write!(f, "{value:.1} E {}", self.exponent())
            } else {
                write!(f, "{value} E {}", self.exponent())
            }
        } else {
            write!(f, "{} E {}", self.mantissa(), self.exponent())
        }
    }
}

fn parse_hex_byte(text: &str) -> AppResult<u8> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u8::from_str_radix(digits, 16)
        .map_err(|_| MpaError::InvalidArgument(format!("'{text}' is not a hexadecimal byte")))
}
