//! The closed set of value kinds and the port type rules.

use crate::error::BlockError;
use std::collections::HashMap;
use std::fmt;

/// Declared type of a port.
///
/// `Num` only ever appears on declarations: it accepts either an `Int` or a
/// `Float` value, and no value is ever tagged `Num`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Num,
    Bool,
    String,
    NumArray,
}

impl Type {
    pub fn accepts(self, value: &Value) -> bool {
        check_type(self, value)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Int => "Int",
            Type::Float => "Float",
            Type::Num => "Num",
            Type::Bool => "Bool",
            Type::String => "String",
            Type::NumArray => "NumArray",
        };
        f.write_str(name)
    }
}

/// A value crossing a port boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    NumArray(Vec<f64>),
}

impl Value {
    /// The concrete tag of this value; never `Type::Num`
    pub fn ty(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Bool(_) => Type::Bool,
            Value::String(_) => Type::String,
            Value::NumArray(_) => Type::NumArray,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Reads an `Int` or a `Float` as `f64`
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            Value::NumArray(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::NumArray(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::NumArray(v)
    }
}

/// Port name to value, as handed to and returned from a block
pub type Values = HashMap<String, Value>;

/// Port name to declared type
pub type Signature = HashMap<String, Type>;

/// Builds a [`Signature`] from `(port, type)` pairs
pub fn signature<const N: usize>(ports: [(&str, Type); N]) -> Signature {
    ports
        .into_iter()
        .map(|(name, ty)| (name.to_string(), ty))
        .collect()
}

/// Builds a [`Values`] map from `(port, value)` pairs
pub fn values<const N: usize>(entries: [(&str, Value); N]) -> Values {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Whether `value` may sit in a port declared as `ty`
pub fn check_type(ty: Type, value: &Value) -> bool {
    match (ty, value) {
        (Type::Num, Value::Int(_) | Value::Float(_)) => true,
        _ => ty == value.ty(),
    }
}

/// Whether ports of types `a` and `b` may be linked. Symmetric.
pub fn check_compatible(a: Type, b: Type) -> bool {
    a == b
        || matches!(
            (a, b),
            (Type::Num, Type::Int | Type::Float) | (Type::Int | Type::Float, Type::Num)
        )
}

/// Whether every declared port has a correctly typed value. Extra values are ignored.
pub fn check_all(values: &Values, ports: &Signature) -> bool {
    validate(values, ports).is_ok()
}

/// Like [`check_all`], but reports which port failed and how.
///
/// A missing value is a `Dne` error, a wrongly typed one a `Type` error.
pub fn validate(values: &Values, ports: &Signature) -> Result<(), BlockError> {
    for (name, ty) in ports {
        match values.get(name) {
            None => return Err(BlockError::dne(format!("no value for port `{name}`"))),
            Some(value) if !check_type(*ty, value) => {
                return Err(BlockError::type_mismatch(format!(
                    "port `{name}` expects {ty}, got {}",
                    value.ty()
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Keeps only the entries declared in `ports`
pub fn project(values: Values, ports: &Signature) -> Values {
    values
        .into_iter()
        .filter(|(name, _)| ports.contains_key(name))
        .collect()
}
