//! A1 addresses, column letters and sheet-bound wraparound

use crate::error::{ConvertError, ConvertResult};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Number of rows in a worksheet
pub const MAX_ROWS: u32 = 1_048_576;
/// Number of columns in a worksheet (A..XFD)
pub const MAX_COLS: u32 = 16_384;

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)([0-9]+)$").expect("address pattern is valid"));

/// Convert a 1-based column number to letters (1 -> "A", 27 -> "AA").
///
/// Returns an empty string for 0, which has no letter form.
pub fn column_to_letters(column: u32) -> String {
    let mut n = column;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - rem - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert column letters to a 1-based column number, case-insensitive.
pub fn letters_to_column(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut column: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        column = column.checked_mul(26)?.checked_add(digit)?;
    }
    Some(column)
}

/// A 1-based cell position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub row: u32,
    pub column: u32,
}

impl CellAddress {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Parse an A1 address such as `AA22`.
    pub fn parse(address: &str) -> ConvertResult<Self> {
        let syntax_error = || ConvertError::AddressSyntax {
            address: address.to_string(),
        };

        let caps = ADDRESS_RE.captures(address).ok_or_else(syntax_error)?;
        let column = letters_to_column(&caps[1]).ok_or_else(syntax_error)?;
        let row: u32 = caps[2].parse().map_err(|_| syntax_error())?;

        if row == 0 || row > MAX_ROWS || column > MAX_COLS {
            return Err(syntax_error());
        }

        Ok(Self { row, column })
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_to_letters(self.column), self.row)
    }
}

/// Sheet axis, each with its own bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Column,
}

impl Axis {
    pub fn bound(self) -> u32 {
        match self {
            Axis::Row => MAX_ROWS,
            Axis::Column => MAX_COLS,
        }
    }
}

/// Wrap a coordinate into the sheet range: `value mod bound`.
///
/// Negative values wrap to the far end of the sheet. The result is 0 when
/// `value` is a multiple of the bound.
pub fn normalize(value: i64, axis: Axis) -> u32 {
    value.rem_euclid(axis.bound() as i64) as u32
}

/// Like [`normalize`], but a zero residue maps to the last row/column.
pub fn wrap_coordinate(value: i64, axis: Axis) -> u32 {
    match normalize(value, axis) {
        0 => axis.bound(),
        n => n,
    }
}
