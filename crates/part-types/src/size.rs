use crate::sector::{GIBIBYTE, MEBIBYTE, TEBIBYTE};
use std::str::FromStr;

/// A target size parsed from a human-readable expression such as `64GB` or
/// `256m`. The suffix selects the magnitude only; arithmetic is base-1024
/// regardless of whether the `B` is spelled out.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct SizeSpec {
    bytes: u64,
}

impl SizeSpec {
    pub fn as_bytes(self) -> u64 { self.bytes }
}

/// Raised when a size expression cannot be understood.
#[derive(Debug, Fail, PartialEq, Eq, Clone)]
pub enum SizeParseError {
    #[fail(display = "size expression is empty")]
    Empty,
    #[fail(display = "'{}' is not a whole number", value)]
    InvalidNumber { value: String },
    #[fail(display = "'{}' is not a recognized unit (expected M, MB, G, GB, T, or TB)", unit)]
    InvalidUnit { unit: String },
    #[fail(display = "size expression '{}' overflows", value)]
    Overflow { value: String },
}

impl FromStr for SizeSpec {
    type Err = SizeParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SizeParseError::Empty);
        }

        let split = input.find(|c: char| !c.is_ascii_digit()).unwrap_or(input.len());
        let (digits, unit) = input.split_at(split);

        if digits.is_empty() {
            return Err(SizeParseError::InvalidNumber { value: input.into() });
        }

        let value = digits
            .parse::<u64>()
            .map_err(|_| SizeParseError::InvalidNumber { value: digits.into() })?;

        let multiplier = match unit.to_uppercase().as_str() {
            "M" | "MB" => MEBIBYTE,
            "G" | "GB" => GIBIBYTE,
            "T" | "TB" => TEBIBYTE,
            _ => return Err(SizeParseError::InvalidUnit { unit: unit.into() }),
        };

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| SizeParseError::Overflow { value: input.into() })?;

        Ok(SizeSpec { bytes })
    }
}
