use blockflow::{generate_mock_graph, graphs, values, Block, MockConfig, Value};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = MockConfig::from_env();
    info!(
        layers = config.layers,
        width = config.width,
        max_delay_ms = config.max_delay_ms,
        "Generating mock graph"
    );
    let mock = generate_mock_graph(&config)?;
    info!(nodes = mock.graph.node_count(), "Running mock graph");

    let started = Instant::now();
    let out = Block::from(mock.graph).call(mock.inputs.clone(), 0).await?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        output = ?out,
        expected = ?mock.expected,
        matches = out == mock.expected,
        "Mock graph finished"
    );

    let array = vec![1.0, 2.0, 3.0, 4.5];
    let sum = Block::from(graphs::array_sum()?);
    let out = sum
        .call(values([("X", Value::from(array.clone()))]), 0)
        .await?;
    info!(input = ?array, output = ?out, "Array summed");

    Ok(())
}
