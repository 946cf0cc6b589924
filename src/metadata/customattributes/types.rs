//! Custom attribute instances and their argument values.
//!
//! Aspects are attached to members as custom attributes. The constructor token names the
//! attribute type, the named arguments carry the aspect's configured properties.

use crate::metadata::token::Token;

/// A custom attribute attached to a type, method, property or field
#[derive(Debug, Clone)]
pub struct CustomAttribute {
    /// Constructor of the attribute type, a `MethodDef` or `MemberRef` token
    pub constructor: Token,
    /// Decoded argument values
    pub value: CustomAttributeValue,
}

impl CustomAttribute {
    /// Creates an attribute without arguments
    #[must_use]
    pub fn new(constructor: Token) -> Self {
        CustomAttribute {
            constructor,
            value: CustomAttributeValue::default(),
        }
    }

    /// Adds a named property argument
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: CustomAttributeArgument) -> Self {
        self.value.named_args.push(CustomAttributeNamedArgument {
            is_field: false,
            name: name.into(),
            value,
        });
        self
    }

    /// Adds a named field argument
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: CustomAttributeArgument) -> Self {
        self.value.named_args.push(CustomAttributeNamedArgument {
            is_field: true,
            name: name.into(),
            value,
        });
        self
    }
}

/// Represents a decoded custom attribute value with arguments and named arguments
#[derive(Debug, Clone, Default)]
pub struct CustomAttributeValue {
    /// Fixed arguments from the constructor signature
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Named arguments (fields and properties)
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttributeValue {
    /// Value of the named property argument, if present
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&CustomAttributeArgument> {
        self.named_args
            .iter()
            .find(|arg| !arg.is_field && arg.name == name)
            .map(|arg| &arg.value)
    }

    /// Named property arguments in declaration order
    pub fn properties(&self) -> impl Iterator<Item = &CustomAttributeNamedArgument> {
        self.named_args.iter().filter(|arg| !arg.is_field)
    }
}

/// Represents a single custom attribute argument value
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// Null string or object reference
    Null,
    /// Boolean value
    Bool(bool),
    /// Character value (16-bit Unicode)
    Char(char),
    /// Signed 8-bit integer
    I1(i8),
    /// Unsigned 8-bit integer
    U1(u8),
    /// Signed 16-bit integer
    I2(i16),
    /// Unsigned 16-bit integer
    U2(u16),
    /// Signed 32-bit integer
    I4(i32),
    /// Unsigned 32-bit integer
    U4(u32),
    /// Signed 64-bit integer
    I8(i64),
    /// Unsigned 64-bit integer
    U8(u64),
    /// 32-bit floating point
    R4(f32),
    /// 64-bit floating point
    R8(f64),
    /// UTF-8 string
    String(String),
    /// Type reference (as string)
    Type(String),
    /// Array of arguments
    Array(Vec<CustomAttributeArgument>),
    /// Enum value (enum type name + underlying value)
    Enum(String, Box<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// Short name of the value kind, used in diagnostics
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            CustomAttributeArgument::Null => "null",
            CustomAttributeArgument::Bool(_) => "bool",
            CustomAttributeArgument::Char(_) => "char",
            CustomAttributeArgument::I1(_) => "int8",
            CustomAttributeArgument::U1(_) => "uint8",
            CustomAttributeArgument::I2(_) => "int16",
            CustomAttributeArgument::U2(_) => "uint16",
            CustomAttributeArgument::I4(_) => "int32",
            CustomAttributeArgument::U4(_) => "uint32",
            CustomAttributeArgument::I8(_) => "int64",
            CustomAttributeArgument::U8(_) => "uint64",
            CustomAttributeArgument::R4(_) => "float32",
            CustomAttributeArgument::R8(_) => "float64",
            CustomAttributeArgument::String(_) => "string",
            CustomAttributeArgument::Type(_) => "type",
            CustomAttributeArgument::Array(_) => "array",
            CustomAttributeArgument::Enum(_, _) => "enum",
        }
    }

    /// The value as `i32`, for 32-bit and narrower integers
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            CustomAttributeArgument::I1(v) => Some(i32::from(*v)),
            CustomAttributeArgument::U1(v) => Some(i32::from(*v)),
            CustomAttributeArgument::I2(v) => Some(i32::from(*v)),
            CustomAttributeArgument::U2(v) => Some(i32::from(*v)),
            CustomAttributeArgument::I4(v) => Some(*v),
            _ => None,
        }
    }
}

/// Represents a named argument (field or property) in a custom attribute
#[derive(Debug, Clone)]
pub struct CustomAttributeNamedArgument {
    /// Whether this is a field (true) or property (false)
    pub is_field: bool,
    /// Name of the field or property
    pub name: String,
    /// Value of the argument
    pub value: CustomAttributeArgument,
}
