//! Error vocabulary shared by the scanner, the envelope, the book and the book set.
//!
//! Every failure is one of three kinds: a tag that is not in the message
//! ([`BookError::UnknownField`]), bytes that do not form a valid message
//! ([`BookError::Malformed`]), or a well-formed update that contradicts the
//! current book state ([`BookError::ProtocolViolation`]). All three are fatal
//! to the message being processed.

use std::fmt;

use thiserror::Error;

/// Result type alias for book operations.
pub type Result<T> = std::result::Result<T, BookError>;

/// Coarse classification of a [`BookError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownField,
    Malformed,
    ProtocolViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::UnknownField => "unknown field",
            ErrorKind::Malformed => "malformed message",
            ErrorKind::ProtocolViolation => "protocol violation",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookError {
    /// Required tag absent from the searched range.
    #[error("unknown field: tag {tag} not found (searched from byte {offset})")]
    UnknownField { tag: String, offset: usize },

    /// Envelope or value that does not decode.
    #[error("malformed message at byte {offset}: {reason}")]
    Malformed { reason: &'static str, offset: usize },

    /// Update inconsistent with the current book.
    #[error("protocol violation: {reason}{}", describe_context(.symbol, .price))]
    ProtocolViolation {
        reason: &'static str,
        symbol: Option<String>,
        price: Option<f64>,
    },
}

fn describe_context(symbol: &Option<String>, price: &Option<f64>) -> String {
    match (symbol, price) {
        (Some(s), Some(p)) => format!(" (symbol {s}, price {p})"),
        (Some(s), None) => format!(" (symbol {s})"),
        (None, Some(p)) => format!(" (price {p})"),
        (None, None) => String::new(),
    }
}

impl BookError {
    pub(crate) fn unknown_field(tag: &[u8], offset: usize) -> Self {
        let tag = String::from_utf8_lossy(tag);
        BookError::UnknownField {
            tag: tag.trim_end_matches('=').to_string(),
            offset,
        }
    }

    pub(crate) fn malformed(reason: &'static str, offset: usize) -> Self {
        BookError::Malformed { reason, offset }
    }

    pub(crate) fn violation(reason: &'static str) -> Self {
        BookError::ProtocolViolation {
            reason,
            symbol: None,
            price: None,
        }
    }

    pub(crate) fn at_price(self, at: f64) -> Self {
        match self {
            BookError::ProtocolViolation { reason, symbol, .. } => BookError::ProtocolViolation {
                reason,
                symbol,
                price: Some(at),
            },
            other => other,
        }
    }

    /// Attach the symbol to a protocol violation raised below the book set.
    pub fn for_symbol(self, name: &str) -> Self {
        match self {
            BookError::ProtocolViolation { reason, price, .. } => BookError::ProtocolViolation {
                reason,
                symbol: Some(name.to_string()),
                price,
            },
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BookError::UnknownField { .. } => ErrorKind::UnknownField,
            BookError::Malformed { .. } => ErrorKind::Malformed,
            BookError::ProtocolViolation { .. } => ErrorKind::ProtocolViolation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = BookError::unknown_field(b"55=", 12);
        assert_eq!(err.to_string(), "unknown field: tag 55 not found (searched from byte 12)");

        let err = BookError::violation("no snapshot for book").for_symbol("EUR/USD");
        assert_eq!(err.to_string(), "protocol violation: no snapshot for book (symbol EUR/USD)");

        let err = BookError::violation("add without remove").at_price(1.1);
        assert_eq!(err.to_string(), "protocol violation: add without remove (price 1.1)");
    }

    #[test]
    fn kind_classifies_variants() {
        assert_eq!(BookError::malformed("bad", 0).kind(), ErrorKind::Malformed);
        assert_eq!(BookError::violation("x").kind(), ErrorKind::ProtocolViolation);
        assert_eq!(BookError::unknown_field(b"34=", 0).kind(), ErrorKind::UnknownField);
        // context helpers leave other kinds alone
        assert_eq!(
            BookError::malformed("bad", 3).for_symbol("X"),
            BookError::malformed("bad", 3)
        );
    }
}
