//! Two-input blocks: arithmetic, logic, comparison and array access.

use super::{array, binary_block, boolean, float, int, num};
use crate::block::Block;
use crate::error::BlockError;
use crate::types::{Type, Value};

const FLOAT_OP: [(&str, Type); 3] = [("A", Type::Float), ("B", Type::Float), ("OUT", Type::Float)];
const INT_OP: [(&str, Type); 3] = [("A", Type::Int), ("B", Type::Int), ("OUT", Type::Int)];
const BOOL_OP: [(&str, Type); 3] = [("A", Type::Bool), ("B", Type::Bool), ("OUT", Type::Bool)];
const COMPARE: [(&str, Type); 3] = [("A", Type::Num), ("B", Type::Num), ("OUT", Type::Bool)];

fn float_op(name: &str, op: fn(f64, f64) -> f64) -> Block {
    binary_block(name, FLOAT_OP, move |a, b| Ok(Value::Float(op(float(a)?, float(b)?))))
}

/// Integer arithmetic; `None` from `op` is reported with `failure`
fn int_op(name: &str, failure: &'static str, op: fn(i64, i64) -> Option<i64>) -> Block {
    binary_block(name, INT_OP, move |a, b| {
        let (a, b) = (int(a)?, int(b)?);
        op(a, b)
            .map(Value::Int)
            .ok_or_else(|| BlockError::value(format!("{failure}: {a}, {b}")))
    })
}

fn bool_op(name: &str, op: fn(bool, bool) -> bool) -> Block {
    binary_block(name, BOOL_OP, move |a, b| Ok(Value::Bool(op(boolean(a)?, boolean(b)?))))
}

fn compare(name: &str, op: fn(f64, f64) -> bool) -> Block {
    binary_block(name, COMPARE, move |a, b| Ok(Value::Bool(op(num(a)?, num(b)?))))
}

pub fn plus_float() -> Block {
    float_op("numeric_plus_float", |a, b| a + b)
}

pub fn sub_float() -> Block {
    float_op("numeric_subtract_float", |a, b| a - b)
}

pub fn mult_float() -> Block {
    float_op("numeric_multiply_float", |a, b| a * b)
}

/// IEEE division; dividing by zero yields an infinity or NaN
pub fn div_float() -> Block {
    float_op("numeric_divide_float", |a, b| a / b)
}

pub fn plus_int() -> Block {
    int_op("numeric_plus_int", "integer overflow", i64::checked_add)
}

pub fn sub_int() -> Block {
    int_op("numeric_subtract_int", "integer overflow", i64::checked_sub)
}

pub fn mult_int() -> Block {
    int_op("numeric_multiply_int", "integer overflow", i64::checked_mul)
}

pub fn div_int() -> Block {
    int_op(
        "numeric_divide_int",
        "division by zero or overflow",
        i64::checked_div,
    )
}

pub fn mod_int() -> Block {
    int_op(
        "numeric_mod_int",
        "modulo by zero or overflow",
        i64::checked_rem,
    )
}

pub fn and() -> Block {
    bool_op("logical_and", |a, b| a && b)
}

pub fn or() -> Block {
    bool_op("logical_or", |a, b| a || b)
}

pub fn xor() -> Block {
    bool_op("logical_xor", |a, b| a != b)
}

pub fn greater_than() -> Block {
    compare("greater_than", |a, b| a > b)
}

pub fn lesser_than() -> Block {
    compare("lesser_than", |a, b| a < b)
}

pub fn equals() -> Block {
    compare("equals", |a, b| a == b)
}

/// `X[Index]`: reads `X: NumArray` and `Index: Int`, writes `OUT: Float`
pub fn index() -> Block {
    binary_block(
        "index",
        [("X", Type::NumArray), ("Index", Type::Int), ("OUT", Type::Float)],
        |x, i| {
            let (x, i) = (array(x)?, int(i)?);
            usize::try_from(i)
                .ok()
                .and_then(|i| x.get(i))
                .map(|v| Value::Float(*v))
                .ok_or_else(|| {
                    BlockError::value(format!("index {i} out of bounds for length {}", x.len()))
                })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_util::binary;
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::values;

    #[tokio::test]
    async fn test_arithmetic() {
        assert_eq!(binary(plus_int(), Value::Int(5), Value::Int(2)).await.unwrap(), Value::Int(7));
        assert_eq!(binary(sub_int(), Value::Int(5), Value::Int(2)).await.unwrap(), Value::Int(3));
        assert_eq!(binary(mult_int(), Value::Int(5), Value::Int(2)).await.unwrap(), Value::Int(10));
        assert_eq!(binary(div_int(), Value::Int(7), Value::Int(2)).await.unwrap(), Value::Int(3));
        assert_eq!(binary(mod_int(), Value::Int(7), Value::Int(2)).await.unwrap(), Value::Int(1));
        assert_eq!(
            binary(plus_float(), Value::Float(1.5), Value::Float(2.0)).await.unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            binary(div_float(), Value::Float(1.0), Value::Float(4.0)).await.unwrap(),
            Value::Float(0.25)
        );
    }

    #[tokio::test]
    async fn test_integer_division_by_zero_is_value_error() {
        let err = binary(div_int(), Value::Int(1), Value::Int(0)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        let err = binary(mod_int(), Value::Int(1), Value::Int(0)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        let err = binary(plus_int(), Value::Int(i64::MAX), Value::Int(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
    }

    #[tokio::test]
    async fn test_logic_and_comparison() {
        assert_eq!(
            binary(and(), Value::Bool(true), Value::Bool(false)).await.unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            binary(or(), Value::Bool(true), Value::Bool(false)).await.unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(xor(), Value::Bool(true), Value::Bool(true)).await.unwrap(),
            Value::Bool(false)
        );
        // Num ports take either kind of number.
        assert_eq!(
            binary(greater_than(), Value::Int(3), Value::Float(2.5)).await.unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(lesser_than(), Value::Int(3), Value::Float(2.5)).await.unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            binary(equals(), Value::Int(2), Value::Float(2.0)).await.unwrap(),
            Value::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_index() {
        let x = Value::from(vec![1.0, 2.0, 3.0]);
        let inputs = |i: i64| values([("X", x.clone()), ("Index", Value::Int(i))]);

        let out = index().call(inputs(1), 0).await.unwrap();
        assert_eq!(out["OUT"], Value::Float(2.0));

        for bad in [3, -1] {
            let err = index().call(inputs(bad), 0).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Value);
        }
    }
}
