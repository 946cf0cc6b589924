//! Runtime value representation for CIL emulation.

use std::fmt;

use crate::{
    emulation::value::{Member, RuntimeType},
    metadata::signatures::TypeSignature,
};

/// Opaque handle to an object on the [`crate::emulation::ManagedHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapRef(u32);

impl HeapRef {
    /// Creates a handle from a raw heap slot
    #[must_use]
    pub fn new(id: u32) -> Self {
        HeapRef(id)
    }

    /// The raw heap slot
    #[must_use]
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Runtime value during CIL emulation.
///
/// `EmValue` represents every value that can live on the evaluation stack, in a local
/// or argument slot, or in a field.
///
/// # CIL Type Mapping
///
/// | CIL Type | EmValue Variant |
/// |----------|-----------------|
/// | `bool`, `char`, `int8` .. `uint32` | [`EmValue::I32`] (widened, bit pattern preserved) |
/// | `int64`, `uint64` | [`EmValue::I64`] |
/// | `float32` | [`EmValue::F32`] |
/// | `float64` | [`EmValue::F64`] |
/// | `native int`, `native uint` | [`EmValue::NativeInt`] |
/// | Object reference | [`EmValue::ObjectRef`] |
/// | `null` | [`EmValue::Null`] |
/// | `RuntimeTypeHandle` | [`EmValue::TypeHandle`] |
/// | `RuntimeMethodHandle` | [`EmValue::MethodHandle`] |
/// | Method pointer (`ldftn`) | [`EmValue::FnPtr`] |
#[derive(Clone, Debug, PartialEq)]
pub enum EmValue<'m> {
    /// No value, the result of a `void` call
    Void,
    /// 32-bit integer, also used for all narrower integers, `bool` and `char`
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 32-bit floating point
    F32(f32),
    /// 64-bit floating point
    F64(f64),
    /// Native-sized integer, emulated as 64 bits
    NativeInt(i64),
    /// Reference to a heap object
    ObjectRef(HeapRef),
    /// The null reference
    Null,
    /// Result of `ldtoken` on a type
    TypeHandle(RuntimeType<'m>),
    /// Result of `ldtoken` on a method
    MethodHandle(Member<'m>),
    /// Result of `ldftn`
    FnPtr(Member<'m>),
}

impl<'m> EmValue<'m> {
    /// Zero value of a slot of the given type
    #[must_use]
    pub fn default_for(signature: &TypeSignature) -> Self {
        match signature {
            TypeSignature::Boolean
            | TypeSignature::Char
            | TypeSignature::I1
            | TypeSignature::U1
            | TypeSignature::I2
            | TypeSignature::U2
            | TypeSignature::I4
            | TypeSignature::U4
            // Enums are the only value types the emulated runtime knows
            | TypeSignature::ValueType(_) => EmValue::I32(0),
            TypeSignature::I8 | TypeSignature::U8 => EmValue::I64(0),
            TypeSignature::R4 => EmValue::F32(0.0),
            TypeSignature::R8 => EmValue::F64(0.0),
            TypeSignature::I | TypeSignature::U => EmValue::NativeInt(0),
            TypeSignature::Void => EmValue::Void,
            _ => EmValue::Null,
        }
    }

    /// Signature used when boxing a value whose static type is a generic parameter
    #[must_use]
    pub fn natural_type(&self) -> TypeSignature {
        match self {
            EmValue::I32(_) => TypeSignature::I4,
            EmValue::I64(_) => TypeSignature::I8,
            EmValue::F32(_) => TypeSignature::R4,
            EmValue::F64(_) => TypeSignature::R8,
            EmValue::NativeInt(_) | EmValue::FnPtr(_) => TypeSignature::I,
            _ => TypeSignature::Object,
        }
    }

    /// True for `null`
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, EmValue::Null)
    }

    /// The heap object this value refers to
    #[must_use]
    pub fn as_object(&self) -> Option<HeapRef> {
        match self {
            EmValue::ObjectRef(r) => Some(*r),
            _ => None,
        }
    }

    /// The value as a 32-bit integer, truncating wider integers
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            EmValue::I32(v) => Some(*v),
            EmValue::I64(v) | EmValue::NativeInt(v) => Some(*v as i32),
            _ => None,
        }
    }

    /// The value as a 64-bit integer
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EmValue::I32(v) => Some(i64::from(*v)),
            EmValue::I64(v) | EmValue::NativeInt(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a 64-bit float
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EmValue::F32(v) => Some(f64::from(*v)),
            EmValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// CIL truth: non-zero integers and non-null references
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            EmValue::I32(v) => *v != 0,
            EmValue::I64(v) | EmValue::NativeInt(v) => *v != 0,
            EmValue::F32(v) => *v != 0.0,
            EmValue::F64(v) => *v != 0.0,
            EmValue::Null | EmValue::Void => false,
            EmValue::ObjectRef(_)
            | EmValue::TypeHandle(_)
            | EmValue::MethodHandle(_)
            | EmValue::FnPtr(_) => true,
        }
    }

    /// Short name of the variant, used in error messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EmValue::Void => "void",
            EmValue::I32(_) => "int32",
            EmValue::I64(_) => "int64",
            EmValue::F32(_) => "float32",
            EmValue::F64(_) => "float64",
            EmValue::NativeInt(_) => "native int",
            EmValue::ObjectRef(_) => "object",
            EmValue::Null => "null",
            EmValue::TypeHandle(_) => "RuntimeTypeHandle",
            EmValue::MethodHandle(_) => "RuntimeMethodHandle",
            EmValue::FnPtr(_) => "method pointer",
        }
    }
}

impl fmt::Display for EmValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmValue::Void => f.write_str("void"),
            EmValue::I32(v) => write!(f, "{v}"),
            EmValue::I64(v) => write!(f, "{v}L"),
            EmValue::F32(v) => write!(f, "{v}f"),
            EmValue::F64(v) => write!(f, "{v}"),
            EmValue::NativeInt(v) => write!(f, "{v}n"),
            EmValue::ObjectRef(r) => write!(f, "{r}"),
            EmValue::Null => f.write_str("null"),
            EmValue::TypeHandle(ty) => write!(f, "typeof({ty})"),
            EmValue::MethodHandle(m) | EmValue::FnPtr(m) => write!(f, "{m}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(EmValue::default_for(&TypeSignature::Boolean), EmValue::I32(0));
        assert_eq!(EmValue::default_for(&TypeSignature::U8), EmValue::I64(0));
        assert_eq!(EmValue::default_for(&TypeSignature::String), EmValue::Null);
        assert_eq!(
            EmValue::default_for(&TypeSignature::GenericParamMethod(0)),
            EmValue::Null
        );
    }

    #[test]
    fn test_truth() {
        assert!(EmValue::I32(-1).is_true());
        assert!(!EmValue::I64(0).is_true());
        assert!(EmValue::ObjectRef(HeapRef::new(3)).is_true());
        assert!(!EmValue::Null.is_true());
    }

    #[test]
    fn test_integer_views() {
        assert_eq!(EmValue::I64(0x1_0000_0005).as_i32(), Some(5));
        assert_eq!(EmValue::I32(-2).as_i64(), Some(-2));
        assert_eq!(EmValue::Null.as_i32(), None);
        assert_eq!(EmValue::F32(1.5).as_f64(), Some(1.5));
    }
}
