//! One-input blocks: conversions, counters, negation and array length.

use super::{array, boolean, float, int, unary_block};
use crate::block::Block;
use crate::error::BlockError;
use crate::types::{Type, Value};

/// Truncates toward zero. NaN and out-of-range values are rejected.
pub fn float_to_int() -> Block {
    unary_block("float_to_int", Type::Float, Type::Int, |v| {
        let f = float(v)?;
        if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            Ok(Value::Int(f as i64))
        } else {
            Err(BlockError::value(format!("{f} does not fit an Int")))
        }
    })
}

pub fn int_to_float() -> Block {
    unary_block("int_to_float", Type::Int, Type::Float, |v| {
        Ok(Value::Float(int(v)? as f64))
    })
}

pub fn increment() -> Block {
    unary_block("increment", Type::Int, Type::Int, |v| {
        let n = int(v)?;
        n.checked_add(1)
            .map(Value::Int)
            .ok_or_else(|| BlockError::value(format!("cannot increment {n}")))
    })
}

pub fn decrement() -> Block {
    unary_block("decrement", Type::Int, Type::Int, |v| {
        let n = int(v)?;
        n.checked_sub(1)
            .map(Value::Int)
            .ok_or_else(|| BlockError::value(format!("cannot decrement {n}")))
    })
}

pub fn invert_float() -> Block {
    unary_block("invert_float", Type::Float, Type::Float, |v| {
        Ok(Value::Float(-float(v)?))
    })
}

pub fn invert_int() -> Block {
    unary_block("invert_int", Type::Int, Type::Int, |v| {
        let n = int(v)?;
        n.checked_neg()
            .map(Value::Int)
            .ok_or_else(|| BlockError::value(format!("cannot negate {n}")))
    })
}

pub fn invert_bool() -> Block {
    unary_block("invert_bool", Type::Bool, Type::Bool, |v| {
        Ok(Value::Bool(!boolean(v)?))
    })
}

pub fn array_len() -> Block {
    unary_block("array_len", Type::NumArray, Type::Int, |v| {
        let len = array(v)?.len();
        i64::try_from(len)
            .map(Value::Int)
            .map_err(|_| BlockError::value(format!("length {len} does not fit an Int")))
    })
}
