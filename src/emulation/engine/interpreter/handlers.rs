//! Arithmetic, comparison and conversion semantics of CIL instructions.
//!
//! These operate on values only. Faults a real runtime reports as exceptions are
//! returned as [`Fault`] and turned into managed exceptions by the interpreter.

use crate::{assembly::OpCode, emulation::EmValue};

/// Failure of a numeric instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Fault {
    /// Integer division or remainder by zero
    DivideByZero,
    /// Integer division overflow, `int.MinValue / -1`
    Overflow,
    /// Operand kinds the instruction does not accept
    Operands(&'static str, &'static str),
}

/// Comparison performed by `ceq`/`cgt`/`clt` and the conditional branches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Comparison {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Comparison {
    /// Comparison of a conditional branch, `None` for other opcodes
    pub(super) fn of_branch(opcode: OpCode) -> Option<Self> {
        Some(match opcode {
            OpCode::Beq | OpCode::BeqS => Comparison::Equal,
            OpCode::BneUn | OpCode::BneUnS => Comparison::NotEqual,
            OpCode::Bgt | OpCode::BgtS => Comparison::Greater,
            OpCode::Bge | OpCode::BgeS => Comparison::GreaterOrEqual,
            OpCode::Blt | OpCode::BltS => Comparison::Less,
            OpCode::Ble | OpCode::BleS => Comparison::LessOrEqual,
            _ => return None,
        })
    }
}

macro_rules! integer_op {
    ($name:ident, $ty:ty) => {
        fn $name(opcode: OpCode, a: $ty, b: $ty) -> Result<$ty, Fault> {
            match opcode {
                OpCode::Add => Ok(a.wrapping_add(b)),
                OpCode::Sub => Ok(a.wrapping_sub(b)),
                OpCode::Mul => Ok(a.wrapping_mul(b)),
                OpCode::Div | OpCode::Rem if b == 0 => Err(Fault::DivideByZero),
                OpCode::Div => a.checked_div(b).ok_or(Fault::Overflow),
                OpCode::Rem => a.checked_rem(b).ok_or(Fault::Overflow),
                OpCode::And => Ok(a & b),
                OpCode::Or => Ok(a | b),
                OpCode::Xor => Ok(a ^ b),
                _ => Err(Fault::Operands("integer", "integer")),
            }
        }
    };
}

integer_op!(int32, i32);
integer_op!(int64, i64);

fn float(opcode: OpCode, a: f64, b: f64) -> Result<f64, Fault> {
    match opcode {
        OpCode::Add => Ok(a + b),
        OpCode::Sub => Ok(a - b),
        OpCode::Mul => Ok(a * b),
        OpCode::Div => Ok(a / b),
        OpCode::Rem => Ok(a % b),
        _ => Err(Fault::Operands("float", "float")),
    }
}

/// `add`, `sub`, `mul`, `div`, `rem`, `and`, `or`, `xor`
#[allow(clippy::cast_possible_truncation)]
pub(super) fn binary<'m>(
    opcode: OpCode,
    left: &EmValue<'m>,
    right: &EmValue<'m>,
) -> Result<EmValue<'m>, Fault> {
    match (left, right) {
        (EmValue::I32(a), EmValue::I32(b)) => int32(opcode, *a, *b).map(EmValue::I32),
        (EmValue::I64(a), EmValue::I64(b)) => int64(opcode, *a, *b).map(EmValue::I64),
        (EmValue::NativeInt(a), EmValue::NativeInt(b)) => {
            int64(opcode, *a, *b).map(EmValue::NativeInt)
        }
        (EmValue::NativeInt(a), EmValue::I32(b)) => {
            int64(opcode, *a, i64::from(*b)).map(EmValue::NativeInt)
        }
        (EmValue::I32(a), EmValue::NativeInt(b)) => {
            int64(opcode, i64::from(*a), *b).map(EmValue::NativeInt)
        }
        (EmValue::F32(a), EmValue::F32(b)) => {
            float(opcode, f64::from(*a), f64::from(*b)).map(|v| EmValue::F32(v as f32))
        }
        (EmValue::F32(_) | EmValue::F64(_), EmValue::F32(_) | EmValue::F64(_)) => {
            match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => float(opcode, a, b).map(EmValue::F64),
                _ => Err(Fault::Operands(left.kind(), right.kind())),
            }
        }
        _ => Err(Fault::Operands(left.kind(), right.kind())),
    }
}

/// `shl`, `shr`
pub(super) fn shift<'m>(
    opcode: OpCode,
    value: &EmValue<'m>,
    amount: &EmValue<'m>,
) -> Result<EmValue<'m>, Fault> {
    let Some(amount) = amount.as_i32() else {
        return Err(Fault::Operands("integer", amount.kind()));
    };
    #[allow(clippy::cast_sign_loss)]
    let amount = amount as u32;
    let left = opcode == OpCode::Shl;
    match value {
        EmValue::I32(v) if left => Ok(EmValue::I32(v.wrapping_shl(amount))),
        EmValue::I32(v) => Ok(EmValue::I32(v.wrapping_shr(amount))),
        EmValue::I64(v) if left => Ok(EmValue::I64(v.wrapping_shl(amount))),
        EmValue::I64(v) => Ok(EmValue::I64(v.wrapping_shr(amount))),
        EmValue::NativeInt(v) if left => Ok(EmValue::NativeInt(v.wrapping_shl(amount))),
        EmValue::NativeInt(v) => Ok(EmValue::NativeInt(v.wrapping_shr(amount))),
        other => Err(Fault::Operands("integer", other.kind())),
    }
}

/// `neg`, `not`
pub(super) fn unary<'m>(opcode: OpCode, value: &EmValue<'m>) -> Result<EmValue<'m>, Fault> {
    let negate = opcode == OpCode::Neg;
    match value {
        EmValue::I32(v) if negate => Ok(EmValue::I32(v.wrapping_neg())),
        EmValue::I32(v) => Ok(EmValue::I32(!v)),
        EmValue::I64(v) if negate => Ok(EmValue::I64(v.wrapping_neg())),
        EmValue::I64(v) => Ok(EmValue::I64(!v)),
        EmValue::NativeInt(v) if negate => Ok(EmValue::NativeInt(v.wrapping_neg())),
        EmValue::NativeInt(v) => Ok(EmValue::NativeInt(!v)),
        EmValue::F32(v) if negate => Ok(EmValue::F32(-v)),
        EmValue::F64(v) if negate => Ok(EmValue::F64(-v)),
        other => Err(Fault::Operands("number", other.kind())),
    }
}

/// Compares two stack values.
///
/// Integers compare by value across widths, references by identity. Ordering is only
/// defined for numbers.
pub(super) fn compare(
    comparison: Comparison,
    left: &EmValue<'_>,
    right: &EmValue<'_>,
) -> Result<bool, Fault> {
    let ordering = match (left.as_i64(), right.as_i64()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    let numeric = left.as_i64().is_some() || left.as_f64().is_some();

    let equal = match ordering {
        Some(ordering) => ordering.is_eq(),
        // NaN is unordered, and unequal to everything
        None if numeric => false,
        None => left == right,
    };

    match comparison {
        Comparison::Equal => Ok(equal),
        Comparison::NotEqual => Ok(!equal),
        _ if !numeric => Err(Fault::Operands(left.kind(), right.kind())),
        Comparison::Greater => Ok(ordering.is_some_and(std::cmp::Ordering::is_gt)),
        Comparison::GreaterOrEqual => Ok(ordering.is_some_and(std::cmp::Ordering::is_ge)),
        Comparison::Less => Ok(ordering.is_some_and(std::cmp::Ordering::is_lt)),
        Comparison::LessOrEqual => Ok(ordering.is_some_and(std::cmp::Ordering::is_le)),
    }
}

/// `conv.*`
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
pub(super) fn convert<'m>(opcode: OpCode, value: &EmValue<'m>) -> Result<EmValue<'m>, Fault> {
    let integer = match value {
        EmValue::I32(v) => i64::from(*v),
        EmValue::I64(v) | EmValue::NativeInt(v) => *v,
        EmValue::F32(v) => *v as i64,
        EmValue::F64(v) => *v as i64,
        other => return Err(Fault::Operands("number", other.kind())),
    };
    let real = value.as_f64().unwrap_or(integer as f64);

    Ok(match opcode {
        OpCode::ConvI1 => EmValue::I32(i32::from(integer as i8)),
        OpCode::ConvU1 => EmValue::I32(i32::from(integer as u8)),
        OpCode::ConvI2 => EmValue::I32(i32::from(integer as i16)),
        OpCode::ConvU2 => EmValue::I32(i32::from(integer as u16)),
        OpCode::ConvI4 | OpCode::ConvU4 => EmValue::I32(integer as i32),
        OpCode::ConvI8 => EmValue::I64(integer),
        // A 32-bit source is zero extended
        OpCode::ConvU8 => match value {
            EmValue::I32(v) => EmValue::I64(i64::from(*v as u32)),
            _ => EmValue::I64(integer),
        },
        OpCode::ConvR4 => EmValue::F32(real as f32),
        OpCode::ConvR8 => EmValue::F64(real),
        _ => return Err(Fault::Operands("conversion", value.kind())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::HeapRef;

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(
            binary(OpCode::Add, &EmValue::I32(2), &EmValue::I32(3)),
            Ok(EmValue::I32(5))
        );
        assert_eq!(
            binary(OpCode::Add, &EmValue::I32(i32::MAX), &EmValue::I32(1)),
            Ok(EmValue::I32(i32::MIN))
        );
        assert_eq!(
            binary(OpCode::Div, &EmValue::I32(7), &EmValue::I32(0)),
            Err(Fault::DivideByZero)
        );
        assert_eq!(
            binary(OpCode::Div, &EmValue::I32(i32::MIN), &EmValue::I32(-1)),
            Err(Fault::Overflow)
        );
        assert_eq!(
            binary(OpCode::Rem, &EmValue::I64(-7), &EmValue::I64(2)),
            Ok(EmValue::I64(-1))
        );
        assert_eq!(
            binary(OpCode::Add, &EmValue::NativeInt(8), &EmValue::I32(-2)),
            Ok(EmValue::NativeInt(6))
        );
    }

    #[test]
    fn test_mixed_kinds_are_rejected() {
        assert_eq!(
            binary(OpCode::Add, &EmValue::I32(1), &EmValue::I64(1)),
            Err(Fault::Operands("int32", "int64"))
        );
        assert!(binary(OpCode::And, &EmValue::F64(1.0), &EmValue::F64(1.0)).is_err());
    }

    #[test]
    fn test_float_arithmetic() {
        assert_eq!(
            binary(OpCode::Div, &EmValue::F64(1.0), &EmValue::F64(4.0)),
            Ok(EmValue::F64(0.25))
        );
        assert_eq!(
            binary(OpCode::Mul, &EmValue::F32(1.5), &EmValue::F32(2.0)),
            Ok(EmValue::F32(3.0))
        );
    }

    #[test]
    fn test_shift_and_unary() {
        assert_eq!(
            shift(OpCode::Shl, &EmValue::I32(1), &EmValue::I32(4)),
            Ok(EmValue::I32(16))
        );
        assert_eq!(
            shift(OpCode::Shr, &EmValue::I32(-8), &EmValue::I32(1)),
            Ok(EmValue::I32(-4))
        );
        assert_eq!(unary(OpCode::Neg, &EmValue::I32(5)), Ok(EmValue::I32(-5)));
        assert_eq!(unary(OpCode::Not, &EmValue::I32(0)), Ok(EmValue::I32(-1)));
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            compare(Comparison::Greater, &EmValue::I32(3), &EmValue::I32(2)),
            Ok(true)
        );
        assert_eq!(
            compare(Comparison::Equal, &EmValue::I32(3), &EmValue::NativeInt(3)),
            Ok(true)
        );
        assert_eq!(
            compare(Comparison::Equal, &EmValue::Null, &EmValue::Null),
            Ok(true)
        );
        let object = EmValue::ObjectRef(HeapRef::new(1));
        assert_eq!(
            compare(Comparison::NotEqual, &object, &EmValue::Null),
            Ok(true)
        );
        assert!(compare(Comparison::Less, &object, &EmValue::Null).is_err());
        assert_eq!(
            compare(Comparison::Equal, &EmValue::F64(f64::NAN), &EmValue::F64(f64::NAN)),
            Ok(false)
        );
        assert_eq!(Comparison::of_branch(OpCode::BltS), Some(Comparison::Less));
        assert_eq!(Comparison::of_branch(OpCode::Br), None);
    }

    #[test]
    fn test_convert() {
        assert_eq!(convert(OpCode::ConvI1, &EmValue::I32(200)), Ok(EmValue::I32(-56)));
        assert_eq!(convert(OpCode::ConvU1, &EmValue::I32(-1)), Ok(EmValue::I32(255)));
        assert_eq!(convert(OpCode::ConvI8, &EmValue::I32(-1)), Ok(EmValue::I64(-1)));
        assert_eq!(
            convert(OpCode::ConvU8, &EmValue::I32(-1)),
            Ok(EmValue::I64(0xFFFF_FFFF))
        );
        assert_eq!(convert(OpCode::ConvI4, &EmValue::F64(3.9)), Ok(EmValue::I32(3)));
        assert_eq!(convert(OpCode::ConvR8, &EmValue::I32(2)), Ok(EmValue::F64(2.0)));
        assert!(convert(OpCode::ConvI4, &EmValue::Null).is_err());
    }
}
