//! Error types for formula translation

use thiserror::Error;

/// Result type for translation operations
pub type ConvertResult<T> = std::result::Result<T, ConvertError>;

/// Errors raised while translating a single cell's formula
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// Cell position is not `<letters><digits>`
    #[error("invalid cell address '{address}'")]
    AddressSyntax { address: String },

    /// A reference token could not be interpreted
    #[error("invalid reference '{token}' in formula at {address}: {reason}")]
    FormulaSyntax {
        token: String,
        address: String,
        reason: String,
    },
}

impl ConvertError {
    pub(crate) fn formula(token: &str, address: &str, reason: impl Into<String>) -> Self {
        ConvertError::FormulaSyntax {
            token: token.to_string(),
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error only affects the current cell
    pub fn is_cell_local(&self) -> bool {
        matches!(self, ConvertError::FormulaSyntax { .. })
    }
}
