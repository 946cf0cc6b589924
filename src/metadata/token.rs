use std::fmt;
use std::hash::{Hash, Hasher};

/// Table identifiers used in the high byte of a [`Token`].
///
/// Only the tables the weaver creates or follows are listed here. The values match
/// ECMA-335 II.22 so tokens stay meaningful when printed.
pub mod table {
    /// `TypeRef` - a type defined in another assembly
    pub const TYPE_REF: u8 = 0x01;
    /// `TypeDef` - a type defined in the current module
    pub const TYPE_DEF: u8 = 0x02;
    /// `Field` - a field defined in the current module
    pub const FIELD: u8 = 0x04;
    /// `MethodDef` - a method defined in the current module
    pub const METHOD_DEF: u8 = 0x06;
    /// `MemberRef` - a method or field of a referenced type
    pub const MEMBER_REF: u8 = 0x0A;
    /// `Property` - a property defined in the current module
    pub const PROPERTY: u8 = 0x17;
    /// `AssemblyRef` - a referenced assembly
    pub const ASSEMBLY_REF: u8 = 0x23;
}

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
///
/// Rows are 1-based, a row of 0 is the null token of that table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table identifier and a 1-based row
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Zero-based arena index of the row, `None` for a null row
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.row().checked_sub(1).map(|row| row as usize)
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token points into the given table
    #[must_use]
    pub fn is_table(&self, table: u8) -> bool {
        self.table() == table && self.row() != 0
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

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
