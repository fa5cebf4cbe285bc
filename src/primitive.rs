//! Leaf blocks wrapping a single operation.
//!
//! The operation runs on its own task with its own private channel trio, so
//! from the outside a primitive behaves exactly like a composite block. Inputs
//! are checked before the operation is started and outputs before they are
//! passed on.

use crate::address::{Address, InstanceId};
use crate::block::{channels, Channels, Handle, RunFuture, StopSignal};
use crate::error::{BlockError, ErrorKind, FlowError};
use crate::types::{check_all, project, validate, Signature, Values};
use std::sync::Arc;

/// A pure mapping from validated inputs to outputs
pub type Operation = Arc<dyn Fn(&Values) -> Result<Values, BlockError> + Send + Sync>;

/// An operation that talks over its own channel trio and may observe stop
pub type StreamOperation = Arc<dyn Fn(Values, Channels, Address) -> RunFuture + Send + Sync>;

#[derive(Clone)]
enum Body {
    Pure(Operation),
    Stream(StreamOperation),
}

pub struct Primitive {
    name: String,
    inputs: Signature,
    outputs: Signature,
    body: Body,
}

impl Primitive {
    /// Wraps a pure operation.
    ///
    /// The returned map must hold every declared output with a correctly
    /// typed value; extra entries are dropped.
    pub fn new<F>(name: impl Into<String>, inputs: Signature, outputs: Signature, op: F) -> Self
    where
        F: Fn(&Values) -> Result<Values, BlockError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inputs,
            outputs,
            body: Body::Pure(Arc::new(op)),
        }
    }

    /// Wraps an operation that answers through a channel trio of its own
    pub fn streaming<F>(
        name: impl Into<String>,
        inputs: Signature,
        outputs: Signature,
        op: F,
    ) -> Self
    where
        F: Fn(Values, Channels, Address) -> RunFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inputs,
            outputs,
            body: Body::Stream(Arc::new(op)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &Signature {
        &self.inputs
    }

    pub fn outputs(&self) -> &Signature {
        &self.outputs
    }

    /// Starts the operation on its own task
    fn launch(&self, inputs: Values, origin: Address) -> Handle {
        let (io, handle) = channels();
        match &self.body {
            Body::Pure(op) => {
                let op = Arc::clone(op);
                tokio::spawn(async move {
                    let Channels { reply, .. } = io;
                    match op(&inputs) {
                        Ok(values) => reply.emit(values),
                        Err(e) => reply.fail(e.at(origin)),
                    }
                });
            }
            Body::Stream(op) => {
                tokio::spawn(op(inputs, io, origin));
            }
        }
        handle
    }

    #[tracing::instrument(level = "trace", skip_all, fields(block = %self.name, id = id))]
    pub(crate) async fn invoke(
        &self,
        inputs: Values,
        stop: &mut StopSignal,
        id: InstanceId,
    ) -> Result<Values, FlowError> {
        let addr = Address::new(&self.name, id);
        validate(&inputs, &self.inputs).map_err(|e| e.at(addr.clone()))?;

        let mut task = self.launch(inputs, addr.clone());
        tokio::select! {
            _ = stop.wait() => {
                tracing::debug!(block = %addr, "Stop received, forwarding to operation");
                task.stop();
                Err(FlowError::stopping(addr))
            }
            outcome = task.outcome() => match outcome {
                Some(Ok(values)) if check_all(&values, &self.outputs) => {
                    Ok(project(values, &self.outputs))
                }
                Some(Ok(_)) => Err(FlowError::new(
                    ErrorKind::Type,
                    "operation outputs do not match the declared output types",
                    addr,
                )),
                Some(Err(e)) => Err(e),
                None => Err(FlowError::new(
                    ErrorKind::Dne,
                    "operation ended without producing outputs",
                    addr,
                )),
            },
        }
    }
}
