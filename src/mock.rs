//! Random graph generation for demos and tests

use crate::address::{Address, InstanceId};
use crate::block::{Block, Channels};
use crate::error::BlockError;
use crate::graph::Graph;
use crate::primitive::Primitive;
use crate::types::{signature, values, Type, Value, Values};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Name shared by every node of a generated graph
pub const ADDER: &str = "slow_adder";

const MAX_LAYERS: usize = 32;

/// Configuration for mock graph generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConfig {
    /// Number of adder layers before the sink (1..=32)
    pub layers: usize,
    /// Adders per layer
    pub width: usize,
    /// Upper bound of the random delay each adder sleeps before answering
    pub max_delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            layers: 5,
            width: 4,
            max_delay_ms: 200,
        }
    }
}

impl MockConfig {
    /// Reads `FLOW_MOCK_LAYERS`, `FLOW_MOCK_WIDTH` and `FLOW_MOCK_MAX_DELAY_MS`.
    /// Missing or unparsable variables keep their default.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());
        Self {
            layers: read("FLOW_MOCK_LAYERS").map_or(defaults.layers, |v| v as usize),
            width: read("FLOW_MOCK_WIDTH").map_or(defaults.width, |v| v as usize),
            max_delay_ms: read("FLOW_MOCK_MAX_DELAY_MS").unwrap_or(defaults.max_delay_ms),
        }
    }
}

/// A generated graph together with a run it should reproduce
pub struct MockGraph {
    pub graph: Graph,
    pub inputs: Values,
    pub expected: Values,
}

/// Integer adder that sleeps for a random time and gives up on stop
fn slow_adder(max_delay_ms: u64) -> Block {
    Primitive::streaming(
        ADDER,
        signature([("A", Type::Int), ("B", Type::Int)]),
        signature([("OUT", Type::Int)]),
        move |inputs, io, origin| {
            Box::pin(async move {
                // ThreadRng is not Send; drop it before sleeping.
                let delay_ms = {
                    let mut rng = rand::thread_rng();
                    rng.gen_range(0..=max_delay_ms)
                };
                let Channels { reply, mut stop } = io;
                tokio::select! {
                    _ = stop.wait() => {
                        tracing::debug!(node = %origin, "Adder stopped while sleeping");
                        return;
                    }
                    _ = sleep(Duration::from_millis(delay_ms)) => {}
                }

                let a = inputs.get("A").and_then(Value::as_int);
                let b = inputs.get("B").and_then(Value::as_int);
                match a.zip(b).and_then(|(a, b)| a.checked_add(b)) {
                    Some(sum) => reply.emit(values([("OUT", Value::Int(sum))])),
                    None => reply.fail(BlockError::value("integer overflow").at(origin)),
                }
            })
        },
    )
    .into()
}

/// Generates a layered random graph `IN: Int -> OUT: Int`
///
/// Layer zero adds the external input to a random constant. Every later
/// adder takes `A` from a random adder of the previous layer and `B` either
/// from any earlier adder or from a constant, so edges only ever point to
/// later layers. A final sink adds two adders of the last layer.
pub fn generate_mock_graph(config: &MockConfig) -> Result<MockGraph, BlockError> {
    let mut rng = rand::thread_rng();
    let layers = config.layers.clamp(1, MAX_LAYERS);
    let width = config.width.max(1);
    let adder = slow_adder(config.max_delay_ms);

    let mut graph = Graph::new(
        "mock_graph",
        signature([("IN", Type::Int)]),
        signature([("OUT", Type::Int)]),
    );
    let input: i64 = rng.gen_range(0..10);

    let mut next_id: InstanceId = 0;
    let mut place = |graph: &mut Graph| {
        let addr = graph.place(adder.clone(), next_id);
        next_id += 1;
        addr
    };

    // Every adder placed so far, with the value it will produce
    let mut earlier: Vec<(Address, i64)> = Vec::new();
    let mut previous: Vec<(Address, i64)> = Vec::new();
    for layer in 0..layers {
        let mut current = Vec::with_capacity(width);
        for _ in 0..width {
            let addr = place(&mut graph)?;
            let a = if layer == 0 {
                graph.link_in("IN", "A", &addr)?;
                input
            } else {
                let (src, value) = &previous[rng.gen_range(0..previous.len())];
                graph.add_edge(src, "OUT", &addr, "A")?;
                *value
            };
            let b = if !earlier.is_empty() && rng.gen_bool(0.5) {
                let (src, value) = &earlier[rng.gen_range(0..earlier.len())];
                graph.add_edge(src, "OUT", &addr, "B")?;
                *value
            } else {
                let constant = rng.gen_range(0..10);
                graph.add_constant(Value::Int(constant), &addr, "B")?;
                constant
            };
            current.push((addr, a + b));
        }
        earlier.extend(current.iter().cloned());
        previous = current;
    }

    let sink = place(&mut graph)?;
    let (a_src, a) = &previous[rng.gen_range(0..previous.len())];
    let (b_src, b) = &previous[rng.gen_range(0..previous.len())];
    graph.add_edge(a_src, "OUT", &sink, "A")?;
    graph.add_edge(b_src, "OUT", &sink, "B")?;
    graph.link_out(&sink, "OUT", "OUT")?;

    tracing::debug!(nodes = graph.node_count(), layers, width, "Generated mock graph");
    Ok(MockGraph {
        graph,
        inputs: values([("IN", Value::Int(input))]),
        expected: values([("OUT", Value::Int(a + b))]),
    })
}
