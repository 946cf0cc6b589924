use std::fmt;

use crate::metadata::token::Token;

/// Represents a type in member signatures, locals and instruction operands
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeSignature {
    #[default]
    /// Not defined
    Unknown,
    /// void
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// System.String
    String,
    /// System.Object
    Object,
    /// Type by reference
    ByRef(Box<TypeSignature>),
    /// CIL value-type
    // TypeDef | TypeRef
    ValueType(Token),
    /// CIL Class
    // TypeDef | TypeRef
    Class(Token),
    /// Generic type parameter, index into the declaring type's generic parameters
    GenericParamType(u32),
    /// Generic method parameter, index into the method's generic parameters
    GenericParamMethod(u32),
    /// Single dimension array
    SzArray(SignatureSzArray),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
}

/// A single-dimensional, zero-based array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureSzArray {
    /// Element type
    pub base: Box<TypeSignature>,
}

impl TypeSignature {
    /// `object[]`, the element container the generated code passes arguments in
    #[must_use]
    pub fn object_array() -> Self {
        TypeSignature::SzArray(SignatureSzArray {
            base: Box::new(TypeSignature::Object),
        })
    }

    /// Builds a single-dimensional array of `element`
    #[must_use]
    pub fn sz_array(element: TypeSignature) -> Self {
        TypeSignature::SzArray(SignatureSzArray {
            base: Box::new(element),
        })
    }

    /// True for `void`
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSignature::Void)
    }

    /// True for the built-in numeric, boolean and character types
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeSignature::Boolean
                | TypeSignature::Char
                | TypeSignature::I1
                | TypeSignature::U1
                | TypeSignature::I2
                | TypeSignature::U2
                | TypeSignature::I4
                | TypeSignature::U4
                | TypeSignature::I8
                | TypeSignature::U8
                | TypeSignature::R4
                | TypeSignature::R8
                | TypeSignature::I
                | TypeSignature::U
        )
    }

    /// True if values of this type live inline rather than on the heap
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            TypeSignature::ValueType(_) => true,
            TypeSignature::GenericInst(base, _) => base.is_value_type(),
            other => other.is_primitive(),
        }
    }

    /// True for a type or method generic parameter
    #[must_use]
    pub fn is_generic_parameter(&self) -> bool {
        matches!(
            self,
            TypeSignature::GenericParamType(_) | TypeSignature::GenericParamMethod(_)
        )
    }

    /// True if converting a value of this type to `object` needs a `box`
    ///
    /// Generic parameters are boxed unconditionally, `box` on a reference type
    /// instantiation is a no-op at runtime.
    #[must_use]
    pub fn requires_boxing(&self) -> bool {
        self.is_value_type() || self.is_generic_parameter()
    }

    /// Type definition or reference token behind a class, value type or generic instance
    #[must_use]
    pub fn type_token(&self) -> Option<Token> {
        match self {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => Some(*token),
            TypeSignature::GenericInst(base, _) => base.type_token(),
            _ => None,
        }
    }

    /// Fully qualified runtime name of a built-in type, e.g. `System.Int32`
    #[must_use]
    pub fn builtin_name(&self) -> Option<&'static str> {
        let name = match self {
            TypeSignature::Void => "System.Void",
            TypeSignature::Boolean => "System.Boolean",
            TypeSignature::Char => "System.Char",
            TypeSignature::I1 => "System.SByte",
            TypeSignature::U1 => "System.Byte",
            TypeSignature::I2 => "System.Int16",
            TypeSignature::U2 => "System.UInt16",
            TypeSignature::I4 => "System.Int32",
            TypeSignature::U4 => "System.UInt32",
            TypeSignature::I8 => "System.Int64",
            TypeSignature::U8 => "System.UInt64",
            TypeSignature::R4 => "System.Single",
            TypeSignature::R8 => "System.Double",
            TypeSignature::I => "System.IntPtr",
            TypeSignature::U => "System.UIntPtr",
            TypeSignature::String => "System.String",
            TypeSignature::Object => "System.Object",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Unknown => f.write_str("?"),
            TypeSignature::Void => f.write_str("void"),
            TypeSignature::Boolean => f.write_str("bool"),
            TypeSignature::Char => f.write_str("char"),
            TypeSignature::I1 => f.write_str("int8"),
            TypeSignature::U1 => f.write_str("uint8"),
            TypeSignature::I2 => f.write_str("int16"),
            TypeSignature::U2 => f.write_str("uint16"),
            TypeSignature::I4 => f.write_str("int32"),
            TypeSignature::U4 => f.write_str("uint32"),
            TypeSignature::I8 => f.write_str("int64"),
            TypeSignature::U8 => f.write_str("uint64"),
            TypeSignature::R4 => f.write_str("float32"),
            TypeSignature::R8 => f.write_str("float64"),
            TypeSignature::I => f.write_str("native int"),
            TypeSignature::U => f.write_str("native uint"),
            TypeSignature::String => f.write_str("string"),
            TypeSignature::Object => f.write_str("object"),
            TypeSignature::ByRef(inner) => write!(f, "{inner}&"),
            TypeSignature::ValueType(token) => write!(f, "valuetype {token}"),
            TypeSignature::Class(token) => write!(f, "class {token}"),
            TypeSignature::GenericParamType(index) => write!(f, "!{index}"),
            TypeSignature::GenericParamMethod(index) => write!(f, "!!{index}"),
            TypeSignature::SzArray(array) => write!(f, "{}[]", array.base),
            TypeSignature::GenericInst(base, args) => {
                write!(f, "{base}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
        }
    }
}

/// Signature of a method definition or method reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethod {
    /// Instance method, argument 0 is `this`
    pub has_this: bool,
    /// Number of generic parameters of the method
    pub param_count_generic: u32,
    /// Return type, `Void` for none
    pub return_type: TypeSignature,
    /// Declared parameter types, excluding `this`
    pub params: Vec<TypeSignature>,
}

impl SignatureMethod {
    /// Signature of an instance method
    #[must_use]
    pub fn instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: true,
            param_count_generic: 0,
            return_type,
            params,
        }
    }

    /// Signature of a static method
    #[must_use]
    pub fn static_method(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: false,
            param_count_generic: 0,
            return_type,
            params,
        }
    }

    /// Number of IL arguments, including `this`
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// True if the method returns a value
    #[must_use]
    pub fn has_return(&self) -> bool {
        !self.return_type.is_void()
    }
}

/// Signature of a field definition or field reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureField {
    /// Field type
    pub base: TypeSignature,
}
