//! Routing blocks.

use super::{boolean, port};
use crate::block::Block;
use crate::primitive::Primitive;
use crate::types::{signature, values, Type};

/// Forwards `A` when `Condition` holds and `B` otherwise, for ports of type `ty`
pub fn input_switch(ty: Type) -> Block {
    Primitive::new(
        "input_switch",
        signature([("A", ty), ("B", ty), ("Condition", Type::Bool)]),
        signature([("OUT", ty)]),
        |inputs| {
            let chosen = if boolean(port(inputs, "Condition")?)? {
                port(inputs, "A")?
            } else {
                port(inputs, "B")?
            };
            Ok(values([("OUT", chosen.clone())]))
        },
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::Value;

    #[tokio::test]
    async fn test_switch_selects_by_condition() {
        let inputs = |cond| {
            values([
                ("A", Value::Int(1)),
                ("B", Value::Int(2)),
                ("Condition", Value::Bool(cond)),
            ])
        };
        let out = input_switch(Type::Int).call(inputs(true), 0).await.unwrap();
        assert_eq!(out["OUT"], Value::Int(1));
        let out = input_switch(Type::Int).call(inputs(false), 0).await.unwrap();
        assert_eq!(out["OUT"], Value::Int(2));
    }

    #[tokio::test]
    async fn test_num_switch_keeps_value_kind() {
        let out = input_switch(Type::Num)
            .call(
                values([
                    ("A", Value::Float(1.5)),
                    ("B", Value::Int(2)),
                    ("Condition", Value::Bool(true)),
                ]),
                0,
            )
            .await
            .unwrap();
        assert_eq!(out["OUT"], Value::Float(1.5));

        let err = input_switch(Type::Num)
            .call(
                values([
                    ("A", Value::Bool(true)),
                    ("B", Value::Int(2)),
                    ("Condition", Value::Bool(true)),
                ]),
                0,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
    }
}
