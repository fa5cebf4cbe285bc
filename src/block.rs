//! The invocation contract shared by every block kind.
//!
//! Every block runs with a private trio of channels: a single-slot result
//! channel, a single-slot error channel and a one-shot stop signal. A run
//! answers on exactly one of result or error, exactly once, unless it is
//! stopped, in which case it answers nothing.

use crate::address::{Address, InstanceId};
use crate::error::FlowError;
use crate::graph::Graph;
use crate::loops::Loop;
use crate::primitive::Primitive;
use crate::types::{Signature, Values};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Future returned by [`Block::run`]
pub type RunFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A schedulable unit: a leaf operation, a composite graph, or a loop.
///
/// Cloning is cheap; clones share the same read-only blueprint.
#[derive(Clone)]
pub enum Block {
    Primitive(Arc<Primitive>),
    Graph(Arc<Graph>),
    Loop(Arc<Loop>),
}

impl Block {
    pub fn name(&self) -> &str {
        match self {
            Block::Primitive(p) => p.name(),
            Block::Graph(g) => g.name(),
            Block::Loop(l) => l.name(),
        }
    }

    pub fn inputs(&self) -> &Signature {
        match self {
            Block::Primitive(p) => p.inputs(),
            Block::Graph(g) => g.inputs(),
            Block::Loop(l) => l.inputs(),
        }
    }

    pub fn outputs(&self) -> &Signature {
        match self {
            Block::Primitive(p) => p.outputs(),
            Block::Graph(g) => g.outputs(),
            Block::Loop(l) => l.outputs(),
        }
    }

    /// Declared input and output types
    pub fn params(&self) -> (&Signature, &Signature) {
        (self.inputs(), self.outputs())
    }

    /// The address instance `id` of this block has
    pub fn at(&self, id: InstanceId) -> Address {
        Address::new(self.name(), id)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Block::Primitive(_) => "primitive",
            Block::Graph(_) => "graph",
            Block::Loop(_) => "loop",
        }
    }

    /// Runs instance `id` of this block, answering through `io`
    pub fn run(&self, inputs: Values, io: Channels, id: InstanceId) -> RunFuture {
        let block = self.clone();
        Box::pin(async move {
            let Channels { reply, mut stop } = io;
            let outcome = match &block {
                Block::Primitive(p) => p.invoke(inputs, &mut stop, id).await,
                Block::Graph(g) => g.invoke(inputs, &mut stop, id).await,
                Block::Loop(l) => l.invoke(inputs, &mut stop, id).await,
            };
            reply.deliver(outcome);
        })
    }

    /// Runs this block to completion on its own task
    pub async fn call(&self, inputs: Values, id: InstanceId) -> Result<Values, FlowError> {
        let mut handle = spawn(self, inputs, id);
        match handle.outcome().await {
            Some(outcome) => outcome,
            None => Err(FlowError::stopping(self.at(id))),
        }
    }
}

impl From<Primitive> for Block {
    fn from(p: Primitive) -> Self {
        Block::Primitive(Arc::new(p))
    }
}

impl From<Graph> for Block {
    fn from(g: Graph) -> Self {
        Block::Graph(Arc::new(g))
    }
}

impl From<Loop> for Block {
    fn from(l: Loop) -> Self {
        Block::Loop(Arc::new(l))
    }
}

/// The child side of the private channel trio.
pub struct Channels {
    pub reply: Reply,
    pub stop: StopSignal,
}

/// Sends the single answer of a run. Consumed by the send.
pub struct Reply {
    result: mpsc::Sender<Values>,
    error: mpsc::Sender<FlowError>,
}

impl Reply {
    pub fn emit(self, values: Values) {
        // The slot is fresh and ours alone; failure only means nobody listens.
        let _ = self.result.try_send(values);
    }

    pub fn fail(self, error: FlowError) {
        let _ = self.error.try_send(error);
    }

    /// Emits or fails according to `outcome`; a stop answers nothing
    pub fn deliver(self, outcome: Result<Values, FlowError>) {
        match outcome {
            Ok(values) => self.emit(values),
            Err(e) if e.is_stopping() => {
                tracing::debug!(block = %e.origin, "Stopped without answering");
            }
            Err(e) => self.fail(e),
        }
    }
}

enum StopState {
    Armed,
    Fired,
    /// The sender went away without firing; no stop can arrive any more
    Orphaned,
}

/// The receiving end of a private stop channel.
pub struct StopSignal {
    rx: oneshot::Receiver<()>,
    state: StopState,
}

impl StopSignal {
    /// Resolves once stop has been signalled. Cancel-safe.
    pub async fn wait(&mut self) {
        match self.state {
            StopState::Fired => return,
            StopState::Orphaned => std::future::pending::<()>().await,
            StopState::Armed => {}
        }
        match (&mut self.rx).await {
            Ok(()) => self.state = StopState::Fired,
            Err(_) => {
                self.state = StopState::Orphaned;
                std::future::pending::<()>().await
            }
        }
    }

    /// Non-blocking check for a stop
    pub fn is_stopped(&mut self) -> bool {
        if let StopState::Armed = self.state {
            match self.rx.try_recv() {
                Ok(()) => self.state = StopState::Fired,
                Err(oneshot::error::TryRecvError::Closed) => self.state = StopState::Orphaned,
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
        }
        matches!(self.state, StopState::Fired)
    }
}

/// The parent side of the private channel trio.
pub struct Handle {
    result: mpsc::Receiver<Values>,
    error: mpsc::Receiver<FlowError>,
    stop: Option<oneshot::Sender<()>>,
}

impl Handle {
    /// Signals stop. Returns false if it was already sent or handed off.
    pub fn stop(&mut self) -> bool {
        match self.stop.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Hands the stop sender to someone else
    pub fn take_stop(&mut self) -> Option<oneshot::Sender<()>> {
        self.stop.take()
    }

    /// Waits for the single answer. `None` means the run was stopped.
    pub async fn outcome(&mut self) -> Option<Result<Values, FlowError>> {
        tokio::select! {
            Some(values) = self.result.recv() => Some(Ok(values)),
            Some(error) = self.error.recv() => Some(Err(error)),
            else => None,
        }
    }
}

/// Creates a fresh private channel trio
pub fn channels() -> (Channels, Handle) {
    let (result_tx, result_rx) = mpsc::channel(1);
    let (error_tx, error_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = oneshot::channel();
    let io = Channels {
        reply: Reply {
            result: result_tx,
            error: error_tx,
        },
        stop: StopSignal {
            rx: stop_rx,
            state: StopState::Armed,
        },
    };
    let handle = Handle {
        result: result_rx,
        error: error_rx,
        stop: Some(stop_tx),
    };
    (io, handle)
}

/// Starts instance `id` of `block` on its own task
pub fn spawn(block: &Block, inputs: Values, id: InstanceId) -> Handle {
    let (io, handle) = channels();
    tokio::spawn(block.run(inputs, io, id));
    handle
}

/// Watchdog: fires the handle's stop once `after` has elapsed.
///
/// Takes the stop sender out of `handle`, so `Handle::stop` no longer works
/// on it afterwards.
pub fn stop_after(handle: &mut Handle, after: Duration) -> JoinHandle<()> {
    let stop = handle.take_stop();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if let Some(tx) = stop {
            let _ = tx.send(());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BlockError, ErrorKind};
    use crate::types::{signature, values, Type, Value};
    use tokio::time::{sleep, timeout};

    fn double() -> Block {
        Primitive::new(
            "double",
            signature([("IN", Type::Int)]),
            signature([("OUT", Type::Int)]),
            |inputs| {
                let n = inputs["IN"]
                    .as_int()
                    .ok_or_else(|| BlockError::type_mismatch("IN"))?;
                Ok(values([("OUT", Value::Int(n * 2))]))
            },
        )
        .into()
    }

    fn sleeper() -> Block {
        Primitive::streaming(
            "sleeper",
            signature([]),
            signature([("OUT", Type::Bool)]),
            |_inputs, io, _origin| {
                Box::pin(async move {
                    let Channels { reply, mut stop } = io;
                    tokio::select! {
                        _ = stop.wait() => {}
                        _ = sleep(Duration::from_secs(30)) => {
                            reply.emit(values([("OUT", Value::Bool(true))]))
                        }
                    }
                })
            },
        )
        .into()
    }

    #[tokio::test]
    async fn test_call_returns_result() {
        let out = double()
            .call(values([("IN", Value::Int(21))]), 0)
            .await
            .unwrap();
        assert_eq!(out["OUT"], Value::Int(42));
    }

    #[tokio::test]
    async fn test_exactly_one_answer() {
        let mut handle = spawn(&double(), values([("IN", Value::Int(1))]), 0);
        assert!(matches!(handle.outcome().await, Some(Ok(_))));
        // Both channels are closed after the single answer.
        assert!(handle.outcome().await.is_none());
    }

    #[tokio::test]
    async fn test_bad_input_is_an_error_not_a_panic() {
        let err = double()
            .call(values([("IN", Value::Bool(true))]), 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
        assert_eq!(err.origin, Address::new("double", 4));
    }

    #[tokio::test]
    async fn test_stopped_run_answers_nothing() {
        let mut handle = spawn(&sleeper(), Values::new(), 0);
        sleep(Duration::from_millis(20)).await;
        assert!(handle.stop());
        let outcome = timeout(Duration::from_secs(1), handle.outcome())
            .await
            .expect("stopped run should close its channels");
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_watchdog_stops_run() {
        let mut handle = spawn(&sleeper(), Values::new(), 0);
        stop_after(&mut handle, Duration::from_millis(20));
        assert!(!handle.stop());
        let outcome = timeout(Duration::from_secs(1), handle.outcome())
            .await
            .expect("watchdog should have fired");
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_stop_signal_states() {
        let (mut io, mut handle) = channels();
        assert!(!io.stop.is_stopped());
        handle.stop();
        io.stop.wait().await;
        assert!(io.stop.is_stopped());
        // Waiting again after firing returns immediately.
        io.stop.wait().await;

        let (mut orphan, handle) = channels();
        drop(handle);
        assert!(!orphan.stop.is_stopped());
        assert!(timeout(Duration::from_millis(20), orphan.stop.wait()).await.is_err());
    }
}
