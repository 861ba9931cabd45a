use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::parse_util;
use crate::parse_util::ParseError;

/// Rules of Conway's Game of Life.
pub const B3S23: RuleSet = RuleSet::new(0b1000, 0b1100);

/// # Representation
/// Life rules are represented as
/// ```notrust
/// |------birth------|
/// 0000_0000_0000_0000_0000_0000_0000_0000
///                     |----survival-----|
/// ```
///
/// # Examples
/// ```notrust
/// b3s23:                0000_0000_0000_1000_0000_0000_0000_1100
///
/// b0s0:                 0000_0000_0000_0000_0000_0000_0000_0000
/// b012345678s012345678: 0000_0001_1111_1111_0000_0001_1111_1111
/// ```
///
/// See: https://conwaylife.com/wiki/Rulestring
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleSet {
    rule: u32,
}

impl Default for RuleSet {
    fn default() -> Self {
        B3S23
    }
}

impl RuleSet {
    /// Create a new `RuleSet` for the given births and survivals. For both `b` and
    /// `s`, numbers are set on a bit basis. For instance if bit `i` in `b` is on, it
    /// means `i` is included in the set of births. Any bit past the 8th is ignored.
    pub const fn new(b: u16, s: u16) -> Self {
        let b = b & 0x1FF;
        let s = s & 0x1FF;

        Self {
            rule: (b as u32) << 16 | s as u32,
        }
    }

    pub fn births(&self) -> u16 {
        ((self.rule & 0x1FF0000) >> 0x10) as u16
    }

    pub fn survivals(&self) -> u16 {
        (self.rule & 0x1FF) as u16
    }

    /// Next state of a cell with `neighbors` live neighbors.
    pub fn next(&self, alive: bool, neighbors: u32) -> bool {
        if neighbors > 8 {
            return false;
        }

        let set = if alive {
            self.survivals()
        } else {
            self.births()
        };

        set & (1 << neighbors) != 0
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = |set: u16| -> String {
            (0..=8u8)
                .filter(|n| set & (1 << n) != 0)
                .map(|n| char::from(b'0' + n))
                .collect()
        };

        write!(f, "B{}/S{}", digits(self.births()), digits(self.survivals()))
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleSet({self})")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    #[error("Neighbor count '{got}' is not in 0..=8")]
    InvalidCount { got: char },

    #[error("Unexpected trailing input \"{rest}\"")]
    Trailing { rest: String },
}

impl FromStr for RuleSet {
    type Err = RuleError;

    /// Accepts `B3/S23`, `b3s23`, `S23/B3` and the legacy `23/3` (survival/birth) form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (set, rest) = parse_rule(s.trim().as_bytes())?;

        if !rest.is_empty() {
            return Err(RuleError::Trailing {
                rest: String::from_utf8_lossy(rest).to_string(),
            });
        }

        Ok(set)
    }
}

/// Parse a rule string, returning whatever input follows it.
pub(crate) fn parse_rule(bytes: &[u8]) -> Result<(RuleSet, &[u8]), RuleError> {
    match parse_util::peek_1(bytes) {
        Some(b'b' | b'B') => {
            let (b, bytes) = read_counts(&bytes[1..])?;
            let bytes = skip_slash(bytes);
            let bytes = parse_util::expect_slice(b"s", bytes)?;
            let (s, bytes) = read_counts(bytes)?;

            Ok((RuleSet::new(b, s), bytes))
        }
        Some(b's' | b'S') => {
            let (s, bytes) = read_counts(&bytes[1..])?;
            let bytes = skip_slash(bytes);
            let bytes = parse_util::expect_slice(b"b", bytes)?;
            let (b, bytes) = read_counts(bytes)?;

            Ok((RuleSet::new(b, s), bytes))
        }
        _ => {
            let (s, bytes) = read_counts(bytes)?;
            let bytes = parse_util::expect(b'/', bytes)?;
            let (b, bytes) = read_counts(bytes)?;

            Ok((RuleSet::new(b, s), bytes))
        }
    }
}

fn skip_slash(bytes: &[u8]) -> &[u8] {
    parse_util::expect(b'/', bytes).unwrap_or(bytes)
}

/// Convert the human readable neighbor counts to a packed bit representation
fn read_counts(bytes: &[u8]) -> Result<(u16, &[u8]), RuleError> {
    let (Some(digits), bytes) = parse_util::take_digits(bytes) else {
        return Ok((0, bytes));
    };

    let mut n = 0;

    for &d in digits {
        if d > b'8' {
            return Err(RuleError::InvalidCount { got: d as char });
        }

        n |= 1 << (d - b'0');
    }

    Ok((n, bytes))
}
