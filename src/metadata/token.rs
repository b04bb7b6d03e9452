//! Metadata tokens identifying definitions inside a module.
//!
//! A [`Token`] packs a table identifier into the high byte and a 1-based row index into the
//! low 24 bits, the same layout the runtime uses for `ldtoken`/`call` operands. Every
//! [`crate::metadata::module::TypeDef`], [`crate::metadata::method::MethodDef`], field and
//! property receives a token when it is added to a [`crate::metadata::module::Module`]; debug
//! symbols in the companion file are keyed by method token.
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::metadata::token::Token;
//!
//! let token = Token::from_parts(Token::METHOD_DEF, 5);
//! assert_eq!(token.value(), 0x0600_0005);
//! assert_eq!(token.table(), 0x06);
//! assert_eq!(token.row(), 5);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-bit metadata token (`table << 24 | row`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token(pub u32);

impl Token {
    /// `TypeDef` table
    pub const TYPE_DEF: u8 = 0x02;
    /// `Field` table
    pub const FIELD: u8 = 0x04;
    /// `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// `Property` table
    pub const PROPERTY: u8 = 0x17;
    /// `AssemblyRef` table
    pub const ASSEMBLY_REF: u8 = 0x23;

    /// Creates a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table identifier and a 1-based row.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token(u32::from(table) << 24 | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the table identifier (high byte).
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the row index (low 24 bits).
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_parts() {
        let token = Token::from_parts(Token::TYPE_DEF, 0x12);
        assert_eq!(token.value(), 0x0200_0012);
        assert_eq!(token.table(), Token::TYPE_DEF);
        assert_eq!(token.row(), 0x12);
        assert!(!token.is_null());
        assert!(Token::new(0).is_null());
    }

    #[test]
    fn token_row_is_masked() {
        let token = Token::from_parts(Token::FIELD, 0x0100_0001);
        assert_eq!(token.table(), Token::FIELD);
        assert_eq!(token.row(), 1);
    }

    #[test]
    fn token_formatting() {
        let token = Token(0x06000001);
        assert_eq!(format!("{}", token), "0x06000001");

        let debug_str = format!("{:?}", token);
        assert!(debug_str.contains("Token(0x06000001"));
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }

    #[test]
    fn token_conversions() {
        let token: Token = 0x1700_0002u32.into();
        assert_eq!(token.table(), Token::PROPERTY);
        let raw: u32 = token.into();
        assert_eq!(raw, 0x1700_0002);
    }
}
