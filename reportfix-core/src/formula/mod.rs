//! R1C1 shorthand to A1 formula translation

pub mod address;
pub mod tokenizer;

pub use address::{
    Axis, CellAddress, MAX_COLS, MAX_ROWS, column_to_letters, letters_to_column, normalize,
};
pub use tokenizer::{AxisPart, Reference, Token, tokenize};

use crate::error::ConvertResult;

/// Translate an R1C1 formula body (without the leading `=`) anchored at `address`.
///
/// `;` separators become `,`. Unless the formula is sheet-qualified (contains `!`),
/// it is uppercased and stripped of spaces. A trailing `@format@` directive is
/// dropped. Each reference is replaced by its A1 form, left to right.
pub fn translate(formula: &str, address: &str) -> ConvertResult<String> {
    let mut text = formula.replace(';', ",");
    if !text.contains('!') {
        text = text.to_uppercase().replace(' ', "");
    }
    let text = strip_format(&text);

    let anchor = CellAddress::parse(&address.to_ascii_uppercase())?;
    let tokens = tokenize(&text, address)?;

    let mut translated = String::with_capacity(text.len());
    let mut last = 0;
    for token in &tokens {
        translated.push_str(&text[last..token.span.start]);
        translated.push_str(&token.reference.to_a1(anchor));
        last = token.span.end;
    }
    translated.push_str(&text[last..]);

    Ok(translated)
}

/// Return the text between the first and last `@`, or "" if there are fewer than two.
pub fn extract_format(formula: &str) -> String {
    match (formula.find('@'), formula.rfind('@')) {
        (Some(first), Some(last)) if first < last => formula[first + 1..last].to_string(),
        _ => String::new(),
    }
}

fn strip_format(formula: &str) -> String {
    match (formula.find('@'), formula.rfind('@')) {
        (Some(first), Some(last)) if first < last => {
            format!("{}{}", &formula[..first], &formula[last + 1..])
        }
        _ => formula.to_string(),
    }
}
