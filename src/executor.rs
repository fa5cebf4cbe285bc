//! Per-run scheduling state for one graph invocation.
//!
//! A single coordinator owns all of this state. Nodes are launched as
//! concurrent tasks as soon as every one of their inputs has a value; each
//! child answers over its own private channels, and a small relay forwards
//! that answer into the coordinator's inbox tagged with the child's address.
//! The coordinator only ever suspends while waiting on that inbox or on its
//! own stop signal.

use crate::address::{Address, Parameter};
use crate::block::{channels, Block, StopSignal};
use crate::error::{ErrorKind, FlowError};
use crate::graph::Graph;
use crate::types::{check_type, validate, Value, Values};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

/// Lifecycle of one node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not launched; still collecting inputs
    Waiting,
    /// Launched; its task has not answered yet
    Running,
    /// Answered; some outputs have not been shifted downstream
    Suspended,
    /// Answered and fully drained. Nodes run at most once per invocation.
    Finished,
}

/// What a relay reports back to the coordinator
enum Event {
    Finished { addr: Address, values: Values },
    Failed(FlowError),
}

pub(crate) struct Executor<'g> {
    graph: &'g Graph,
    addr: Address,
    states: HashMap<Address, NodeState>,
    /// Values sitting at node inputs, not yet consumed by a launch
    data_in: HashMap<Parameter, Value>,
    /// Values produced by nodes, not yet shifted along edges
    data_out: HashMap<Parameter, Value>,
    /// Stop senders of every running child
    stops: HashMap<Address, oneshot::Sender<()>>,
    graph_out: Values,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl<'g> Executor<'g> {
    pub(crate) fn new(graph: &'g Graph, addr: Address) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let states = graph
            .nodes
            .keys()
            .map(|addr| (addr.clone(), NodeState::Waiting))
            .collect();
        Self {
            graph,
            addr,
            states,
            data_in: HashMap::new(),
            data_out: HashMap::new(),
            stops: HashMap::new(),
            graph_out: Values::new(),
            events_tx,
            events_rx,
        }
    }

    /// Runs the graph once. Every child still running afterwards is stopped,
    /// whether the run finished, failed or was stopped itself.
    pub(crate) async fn run(
        mut self,
        inputs: Values,
        stop: &mut StopSignal,
    ) -> Result<Values, FlowError> {
        let outcome = self.drive(inputs, stop).await;
        self.stop_all();
        match &outcome {
            Ok(_) => tracing::debug!(graph = %self.addr, "Graph finished"),
            Err(e) if e.is_stopping() => tracing::debug!(graph = %self.addr, "Graph stopped"),
            Err(e) => tracing::warn!(graph = %self.addr, error = %e, "Graph failed"),
        }
        outcome
    }

    async fn drive(&mut self, inputs: Values, stop: &mut StopSignal) -> Result<Values, FlowError> {
        validate(&inputs, self.graph.inputs()).map_err(|e| e.at(self.addr.clone()))?;
        self.check_outfeeds()?;
        self.load(&inputs)?;
        if self.is_done() {
            return self.finish();
        }

        loop {
            self.check_waiting();
            if self.running_count() == 0 {
                return Err(self.stalled());
            }

            let event = tokio::select! {
                _ = stop.wait() => return Err(FlowError::stopping(self.addr.clone())),
                Some(event) = self.events_rx.recv() => event,
            };
            self.check_running(event)?;
            self.shift_data()?;
            if self.is_done() {
                return self.finish();
            }
            self.check_suspended();
        }
    }

    /// Every declared output needs something to produce it
    fn check_outfeeds(&self) -> Result<(), FlowError> {
        match self
            .graph
            .outputs()
            .keys()
            .find(|name| !self.graph.outfeed.contains_key(*name))
        {
            Some(name) => Err(FlowError::new(
                ErrorKind::Dne,
                format!("output `{name}` is not linked to any node"),
                self.addr.clone(),
            )),
            None => Ok(()),
        }
    }

    /// Copies external inputs and constants to the node inputs they feed
    fn load(&mut self, inputs: &Values) -> Result<(), FlowError> {
        let graph = self.graph;
        for (name, targets) in &graph.infeed {
            let value = inputs.get(name).ok_or_else(|| {
                FlowError::new(
                    ErrorKind::Dne,
                    format!("external input `{name}` was not supplied"),
                    self.addr.clone(),
                )
            })?;
            for target in targets {
                self.handle_input(target, value.clone())?;
            }
        }
        for (target, value) in &graph.constants {
            self.handle_input(target, value.clone())?;
        }
        Ok(())
    }

    fn handle_input(&mut self, param: &Parameter, value: Value) -> Result<(), FlowError> {
        if !check_type(param.ty, &value) {
            return Err(FlowError::new(
                ErrorKind::Type,
                format!("{param} expects {}, got {}", param.ty, value.ty()),
                self.addr.clone(),
            ));
        }
        self.data_in.insert(param.clone(), value);
        Ok(())
    }

    /// Returns addresses of waiting nodes whose inputs are all present
    fn get_ready_nodes(&self) -> Vec<Address> {
        self.states
            .iter()
            .filter(|(_, state)| **state == NodeState::Waiting)
            .filter(|(addr, _)| {
                self.graph.nodes[*addr].inputs().iter().all(|(name, ty)| {
                    self.data_in
                        .contains_key(&Parameter::input(name.clone(), (*addr).clone(), *ty))
                })
            })
            .map(|(addr, _)| addr.clone())
            .collect()
    }

    /// Launches every ready node, consuming its inputs
    fn check_waiting(&mut self) {
        let graph = self.graph;
        let ready = self.get_ready_nodes();
        if !ready.is_empty() {
            tracing::debug!(graph = %self.addr, count = ready.len(), "Launching ready nodes");
        }
        for addr in ready {
            let node = &graph.nodes[&addr];
            let inputs: Values = node
                .inputs()
                .iter()
                .filter_map(|(name, ty)| {
                    let param = Parameter::input(name.clone(), addr.clone(), *ty);
                    self.data_in
                        .remove(&param)
                        .map(|value| (name.clone(), value))
                })
                .collect();
            self.launch(addr, node, inputs);
        }
    }

    fn launch(&mut self, addr: Address, node: &Block, inputs: Values) {
        tracing::debug!(graph = %self.addr, node = %addr, kind = node.kind(), "Starting node");
        let (io, mut handle) = channels();
        if let Some(stop) = handle.take_stop() {
            self.stops.insert(addr.clone(), stop);
        }

        let child = node.run(inputs, io, addr.id);
        let events = self.events_tx.clone();
        let relay_addr = addr.clone();
        tokio::spawn(async move {
            child.await;
            let event = match handle.outcome().await {
                Some(Ok(values)) => Event::Finished {
                    addr: relay_addr,
                    values,
                },
                Some(Err(e)) => Event::Failed(e),
                // Stopped: nothing to report.
                None => return,
            };
            let _ = events.send(event);
        });

        self.states.insert(addr, NodeState::Running);
    }

    fn running_count(&self) -> usize {
        self.states
            .values()
            .filter(|state| **state == NodeState::Running)
            .count()
    }

    /// Applies one child answer
    fn check_running(&mut self, event: Event) -> Result<(), FlowError> {
        let (addr, mut values) = match event {
            Event::Failed(e) => {
                tracing::debug!(graph = %self.addr, origin = %e.origin, "Child failed");
                return Err(e);
            }
            Event::Finished { addr, values } => (addr, values),
        };
        self.stops.remove(&addr);

        let graph = self.graph;
        let node = &graph.nodes[&addr];
        validate(&values, node.outputs()).map_err(|e| {
            FlowError::new(
                ErrorKind::Type,
                format!("node {addr} answered badly: {}", e.info),
                self.addr.clone(),
            )
        })?;

        for (name, ty) in node.outputs() {
            let param = Parameter::output(name.clone(), addr.clone(), *ty);
            if !graph.is_routed(&param) {
                continue;
            }
            if let Some(value) = values.remove(name) {
                self.data_out.insert(param, value);
            }
        }
        tracing::debug!(graph = %self.addr, node = %addr, "Node answered");
        self.states.insert(addr, NodeState::Suspended);
        Ok(())
    }

    /// Moves produced values along edges and into the graph's own outputs
    fn shift_data(&mut self) -> Result<(), FlowError> {
        let graph = self.graph;
        let pending: Vec<(Parameter, Value)> = self.data_out.drain().collect();
        for (param, value) in pending {
            if let Some(targets) = graph.edges.get(&param) {
                for target in targets {
                    tracing::trace!(from = %param, to = %target, "Shifting value");
                    self.handle_input(target, value.clone())?;
                }
            }
            for name in graph.outfeed_names(&param) {
                self.graph_out.insert(name.to_string(), value.clone());
            }
        }
        Ok(())
    }

    /// Retires suspended nodes whose outputs have all been drained
    fn check_suspended(&mut self) {
        let drained: Vec<Address> = self
            .states
            .iter()
            .filter(|(_, state)| **state == NodeState::Suspended)
            .filter(|(addr, _)| !self.data_out.keys().any(|param| param.owner == **addr))
            .map(|(addr, _)| addr.clone())
            .collect();
        for addr in drained {
            self.states.insert(addr, NodeState::Finished);
        }
    }

    /// Hands out the collected outputs once they match the declared types
    fn finish(&mut self) -> Result<Values, FlowError> {
        let out = std::mem::take(&mut self.graph_out);
        validate(&out, self.graph.outputs()).map_err(|e| {
            FlowError::new(
                ErrorKind::Type,
                format!("graph output rejected: {}", e.info),
                self.addr.clone(),
            )
        })?;
        Ok(out)
    }

    fn is_done(&self) -> bool {
        self.graph
            .outputs()
            .keys()
            .all(|name| self.graph_out.contains_key(name))
    }

    fn stalled(&self) -> FlowError {
        let mut missing: Vec<&str> = self
            .graph
            .outputs()
            .keys()
            .filter(|name| !self.graph_out.contains_key(*name))
            .map(String::as_str)
            .collect();
        missing.sort_unstable();
        FlowError::new(
            ErrorKind::Dne,
            format!("no node can run; outputs never produced: {}", missing.join(", ")),
            self.addr.clone(),
        )
    }

    /// Sends stop to every child still running
    fn stop_all(&mut self) {
        for (addr, stop) in self.stops.drain() {
            tracing::debug!(graph = %self.addr, node = %addr, "Stopping node");
            let _ = stop.send(());
        }
    }
}
