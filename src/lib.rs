//! # Blockflow
//!
//! An embeddable dataflow engine. Typed blocks are wired into graphs, and a
//! graph runs every node as soon as all of its inputs are available.
//!
//! ## Key Features
//!
//! - **Uniform blocks**: primitives, graphs and loops share one invocation
//!   contract, so any of them can be nested inside a graph or a loop
//! - **Event-driven**: each child answers over its own private channels and
//!   a single coordinator per graph reacts to whatever finishes first
//! - **Typed ports**: values are checked at every block boundary, and edges
//!   are checked when they are added
//! - **Cascading stop**: stopping a run, or any failure inside it, stops every
//!   child that is still running
//!
//! ```no_run
//! use blockflow::{blocks, signature, values, Block, Graph, Type, Value};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut g = Graph::new(
//!     "adder",
//!     signature([("A", Type::Int), ("B", Type::Int)]),
//!     signature([("OUT", Type::Int)]),
//! );
//! let add = g.place(blocks::plus_int(), 0)?;
//! g.link_in("A", "A", &add)?;
//! g.link_in("B", "B", &add)?;
//! g.link_out(&add, "OUT", "OUT")?;
//!
//! let out = Block::from(g)
//!     .call(values([("A", Value::Int(5)), ("B", Value::Int(2))]), 0)
//!     .await?;
//! assert_eq!(out["OUT"], Value::Int(7));
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod block;
pub mod blocks;
pub mod error;
mod executor;
pub mod graph;
pub mod graphs;
pub mod loops;
pub mod mock;
pub mod primitive;
pub mod types;

pub use address::{Address, Direction, InstanceId, Parameter};
pub use block::{channels, spawn, stop_after, Block, Channels, Handle, Reply, RunFuture, StopSignal};
pub use error::{BlockError, ErrorKind, FlowError};
pub use executor::NodeState;
pub use graph::Graph;
pub use loops::{Loop, DONE, INDEX};
pub use mock::{generate_mock_graph, MockConfig, MockGraph};
pub use primitive::{Operation, Primitive, StreamOperation};
pub use types::{
    check_all, check_compatible, check_type, signature, values, Signature, Type, Value, Values,
};
