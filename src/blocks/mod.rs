//! Standard library of primitive blocks.
//!
//! Binary blocks read `A` and `B` and write `OUT`; unary blocks read `IN`
//! and write `OUT`. Every constructor returns a fresh [`Block`] that can be
//! placed into any graph.

mod binary;
mod switch;
mod unary;

pub use binary::*;
pub use switch::*;
pub use unary::*;

use crate::block::Block;
use crate::error::BlockError;
use crate::primitive::Primitive;
use crate::types::{signature, values, Type, Value, Values};

fn port<'a>(inputs: &'a Values, name: &str) -> Result<&'a Value, BlockError> {
    inputs
        .get(name)
        .ok_or_else(|| BlockError::dne(format!("no value for port `{name}`")))
}

fn mismatch(expected: Type, value: &Value) -> BlockError {
    BlockError::type_mismatch(format!("expected {expected}, got {}", value.ty()))
}

fn int(value: &Value) -> Result<i64, BlockError> {
    value.as_int().ok_or_else(|| mismatch(Type::Int, value))
}

fn float(value: &Value) -> Result<f64, BlockError> {
    value.as_float().ok_or_else(|| mismatch(Type::Float, value))
}

fn num(value: &Value) -> Result<f64, BlockError> {
    value.as_num().ok_or_else(|| mismatch(Type::Num, value))
}

fn boolean(value: &Value) -> Result<bool, BlockError> {
    value.as_bool().ok_or_else(|| mismatch(Type::Bool, value))
}

fn array(value: &Value) -> Result<&[f64], BlockError> {
    value.as_array().ok_or_else(|| mismatch(Type::NumArray, value))
}

/// `IN -> OUT`
fn unary_block<F>(name: &str, input: Type, output: Type, op: F) -> Block
where
    F: Fn(&Value) -> Result<Value, BlockError> + Send + Sync + 'static,
{
    Primitive::new(
        name,
        signature([("IN", input)]),
        signature([("OUT", output)]),
        move |inputs| Ok(values([("OUT", op(port(inputs, "IN")?)?)])),
    )
    .into()
}

/// `A, B -> OUT`, or other port names given as `[a, b, out]`
fn binary_block<F>(name: &str, ports: [(&'static str, Type); 3], op: F) -> Block
where
    F: Fn(&Value, &Value) -> Result<Value, BlockError> + Send + Sync + 'static,
{
    let [(a, a_ty), (b, b_ty), (out, out_ty)] = ports;
    Primitive::new(
        name,
        signature([(a, a_ty), (b, b_ty)]),
        signature([(out, out_ty)]),
        move |inputs| {
            let result = op(port(inputs, a)?, port(inputs, b)?)?;
            Ok(values([(out, result)]))
        },
    )
    .into()
}
