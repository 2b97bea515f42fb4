//! R1C1 reference tokenizer
//!
//! A reference is an optional row part (`R`, `R<n>` or `R[<offset>]`) directly
//! followed by an optional column part of the same shape. At least one part is
//! present. References are only recognised at identifier boundaries and outside
//! quoted text, so function names like `COUNT` are left alone.

use super::address::{Axis, CellAddress, column_to_letters, wrap_coordinate};
use crate::error::{ConvertError, ConvertResult};
use std::ops::Range;

/// One axis of an R1C1 reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisPart {
    /// Bare `R`/`C`: the anchor's own coordinate
    Anchor,
    /// `R<n>`/`C<n>`
    Absolute(u32),
    /// `R[<n>]`/`C[<n>]`, added to the anchor's coordinate
    Relative(i64),
}

impl AxisPart {
    fn resolve(self, anchor: u32, axis: Axis) -> u32 {
        let value = match self {
            AxisPart::Anchor => anchor as i64,
            AxisPart::Absolute(n) => n as i64,
            AxisPart::Relative(offset) => {
                anchor as i64 + offset.rem_euclid(axis.bound() as i64)
            }
        };
        wrap_coordinate(value, axis)
    }
}

/// A parsed reference; a missing part means "the anchor's coordinate"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub row: Option<AxisPart>,
    pub column: Option<AxisPart>,
}

impl Reference {
    /// Resolve against `anchor`, wrapping out-of-range coordinates.
    pub fn resolve(&self, anchor: CellAddress) -> CellAddress {
        let row = self
            .row
            .unwrap_or(AxisPart::Anchor)
            .resolve(anchor.row, Axis::Row);
        let column = self
            .column
            .unwrap_or(AxisPart::Anchor)
            .resolve(anchor.column, Axis::Column);
        CellAddress::new(row, column)
    }

    /// Render as `<letters><digits>`.
    pub fn to_a1(&self, anchor: CellAddress) -> String {
        let target = self.resolve(anchor);
        format!("{}{}", column_to_letters(target.column), target.row)
    }
}

/// A reference found in a formula, with its byte span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub span: Range<usize>,
    pub reference: Reference,
}

/// Scan `formula` left to right for references.
///
/// `address` is only used for error reporting.
pub fn tokenize<'a>(formula: &'a str, address: &str) -> ConvertResult<Vec<Token<'a>>> {
    let bytes = formula.as_bytes();
    let mut tokens = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        if b == b'"' || b == b'\'' {
            quote = Some(b);
            i += 1;
            continue;
        }

        let at_boundary = i == 0 || !is_identifier_byte(bytes[i - 1]);
        if at_boundary && (b == b'R' || b == b'C') {
            if let Some(token) = scan_reference(formula, i, address)? {
                i = token.span.end;
                tokens.push(token);
                continue;
            }
        }

        i += 1;
    }

    Ok(tokens)
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b >= 0x80
}

fn scan_reference<'a>(
    formula: &'a str,
    start: usize,
    address: &str,
) -> ConvertResult<Option<Token<'a>>> {
    let bytes = formula.as_bytes();
    let mut pos = start;

    let row = if bytes.get(pos) == Some(&b'R') {
        pos += 1;
        Some(scan_part(formula, start, &mut pos, address)?)
    } else {
        None
    };

    let column = if bytes.get(pos) == Some(&b'C') {
        pos += 1;
        Some(scan_part(formula, start, &mut pos, address)?)
    } else {
        None
    };

    if row.is_none() && column.is_none() {
        return Ok(None);
    }

    if let Some(&next) = bytes.get(pos) {
        if next == b'R' || next == b'C' {
            // Another reference glued to this one, e.g. `R1C1R[1]C`
            if let Some(glued) = scan_reference(formula, pos, address)? {
                return Err(ConvertError::formula(
                    &formula[start..glued.span.end],
                    address,
                    "adjacent references without a separator",
                ));
            }
            return Ok(None);
        }
        if is_identifier_byte(next) || next == b'(' {
            return Ok(None);
        }
    }

    Ok(Some(Token {
        text: &formula[start..pos],
        span: start..pos,
        reference: Reference { row, column },
    }))
}

fn scan_part(
    formula: &str,
    token_start: usize,
    pos: &mut usize,
    address: &str,
) -> ConvertResult<AxisPart> {
    let bytes = formula.as_bytes();

    match bytes.get(*pos) {
        Some(b'[') => {
            let Some(close) = formula[*pos..].find(']').map(|i| *pos + i) else {
                return Err(ConvertError::formula(
                    &formula[token_start..],
                    address,
                    "unterminated offset",
                ));
            };
            let inner = &formula[*pos + 1..close];
            let offset = inner.parse::<i64>().map_err(|_| {
                ConvertError::formula(
                    &formula[token_start..=close],
                    address,
                    format!("offset '{inner}' is not an integer"),
                )
            })?;
            *pos = close + 1;
            Ok(AxisPart::Relative(offset))
        }
        Some(b) if b.is_ascii_digit() => {
            let digits_start = *pos;
            while bytes.get(*pos).is_some_and(|b| b.is_ascii_digit()) {
                *pos += 1;
            }
            let digits = &formula[digits_start..*pos];
            let value = digits.parse::<u32>().map_err(|_| {
                ConvertError::formula(
                    &formula[token_start..*pos],
                    address,
                    format!("index '{digits}' is out of range"),
                )
            })?;
            Ok(AxisPart::Absolute(value))
        }
        _ => Ok(AxisPart::Anchor),
    }
}
