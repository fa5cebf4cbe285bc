//! Composite blocks assembled from the standard library.

use crate::blocks;
use crate::error::BlockError;
use crate::graph::Graph;
use crate::loops::{Loop, DONE, INDEX};
use crate::types::{signature, Type, Value};

/// Sums a `NumArray` element by element: `X: NumArray -> OUT: Float`.
///
/// One loop round adds `X[Index]` to a running total carried in a register;
/// the body reports `Done` once `Index` reaches the last element. An empty
/// array fails with a `Value` error from the index lookup.
pub fn array_sum() -> Result<Loop, BlockError> {
    let mut body = Graph::new(
        "array_sum",
        signature([("X", Type::NumArray), (INDEX, Type::Int), ("Total", Type::Float)]),
        signature([("OUT", Type::Float), (DONE, Type::Bool)]),
    );

    let index = body.place(blocks::index(), 0)?;
    let plus = body.place(blocks::plus_float(), 0)?;
    let len = body.place(blocks::array_len(), 0)?;
    let len_float = body.place(blocks::int_to_float(), 0)?;
    let index_float = body.place(blocks::int_to_float(), 1)?;
    let last = body.place(blocks::sub_float(), 0)?;
    let at_end = body.place(blocks::equals(), 0)?;

    body.link_in("X", "X", &index)?;
    body.link_in("X", "IN", &len)?;
    body.link_in(INDEX, "Index", &index)?;
    body.link_in(INDEX, "IN", &index_float)?;
    body.link_in("Total", "B", &plus)?;

    body.add_edge(&index, "OUT", &plus, "A")?;
    body.add_edge(&len, "OUT", &len_float, "IN")?;
    body.add_edge(&len_float, "OUT", &last, "A")?;
    body.add_constant(Value::Float(1.0), &last, "B")?;
    body.add_edge(&last, "OUT", &at_end, "A")?;
    body.add_edge(&index_float, "OUT", &at_end, "B")?;

    body.link_out(&plus, "OUT", "OUT")?;
    body.link_out(&at_end, "OUT", DONE)?;

    let mut sum = Loop::new(
        "summation_loop",
        signature([("X", Type::NumArray)]),
        signature([("OUT", Type::Float)]),
        body,
    )?;
    sum.link_in("X", "X")?;
    sum.add_default_register("OUT", "Total", Type::Float, Value::Float(0.0))?;
    sum.link_out("OUT", "OUT")?;
    Ok(sum)
}

/// `!(A && B)`: `A, B: Bool -> OUT: Bool`
pub fn nand() -> Result<Graph, BlockError> {
    let mut g = Graph::new(
        "logical_nand",
        signature([("A", Type::Bool), ("B", Type::Bool)]),
        signature([("OUT", Type::Bool)]),
    );
    let and = g.place(blocks::and(), 0)?;
    let not = g.place(blocks::invert_bool(), 0)?;
    g.link_in("A", "A", &and)?;
    g.link_in("B", "B", &and)?;
    g.add_edge(&and, "OUT", &not, "IN")?;
    g.link_out(&not, "OUT", "OUT")?;
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::error::ErrorKind;
    use crate::types::values;

    #[tokio::test]
    async fn test_array_sum() {
        let sum = Block::from(array_sum().unwrap());
        let out = sum
            .call(values([("X", Value::from(vec![1.0, 2.0, 3.0]))]), 0)
            .await
            .unwrap();
        assert_eq!(out["OUT"], Value::Float(6.0));

        let out = sum
            .call(values([("X", Value::from(vec![0.5]))]), 1)
            .await
            .unwrap();
        assert_eq!(out["OUT"], Value::Float(0.5));
    }

    #[tokio::test]
    async fn test_empty_array_is_value_error() {
        let sum = Block::from(array_sum().unwrap());
        let err = sum
            .call(values([("X", Value::NumArray(vec![]))]), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        assert_eq!(err.origin.name, "index");
    }

    #[tokio::test]
    async fn test_nand_truth_table() {
        let nand = Block::from(nand().unwrap());
        for (a, b, expected) in [
            (false, false, true),
            (false, true, true),
            (true, false, true),
            (true, true, false),
        ] {
            let out = nand
                .call(values([("A", Value::Bool(a)), ("B", Value::Bool(b))]), 0)
                .await
                .unwrap();
            assert_eq!(out["OUT"], Value::Bool(expected), "nand({a}, {b})");
        }
    }
}
