//! Composite blocks: typed nodes wired into a directed graph.
//!
//! A [`Graph`] is assembled once through its construction calls and is then
//! a read-only blueprint. All per-run state lives in the executor and is
//! dropped when the run ends.

use crate::address::{Address, Direction, InstanceId, Parameter};
use crate::block::{Block, StopSignal};
use crate::error::{BlockError, FlowError};
use crate::executor::Executor;
use crate::types::{check_compatible, check_type, Signature, Type, Value, Values};
use std::collections::{HashMap, HashSet};

pub struct Graph {
    name: String,
    inputs: Signature,
    outputs: Signature,
    pub(crate) nodes: HashMap<Address, Block>,
    /// Output port to every input port it feeds
    pub(crate) edges: HashMap<Parameter, Vec<Parameter>>,
    /// External input name to the inner input ports it feeds
    pub(crate) infeed: HashMap<String, Vec<Parameter>>,
    /// External output name to the inner output port that produces it
    pub(crate) outfeed: HashMap<String, Parameter>,
    pub(crate) constants: HashMap<Parameter, Value>,
    /// Input ports that already have a source
    sourced: HashSet<Parameter>,
}

impl Graph {
    pub fn new(name: impl Into<String>, inputs: Signature, outputs: Signature) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            infeed: HashMap::new(),
            outfeed: HashMap::new(),
            constants: HashMap::new(),
            sourced: HashSet::new(),
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

    pub fn params(&self) -> (&Signature, &Signature) {
        (&self.inputs, &self.outputs)
    }

    pub fn node(&self, addr: &Address) -> Option<&Block> {
        self.nodes.get(addr)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Declares a new external port.
    ///
    /// Redeclaring a port fails with `AlreadyExists` if the types are
    /// compatible and with `Type` if they are not.
    pub fn add_feed(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        direction: Direction,
    ) -> Result<(), BlockError> {
        let name = name.into();
        let ports = match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        };
        match ports.get(&name) {
            Some(existing) if check_compatible(*existing, ty) => Err(BlockError::already_exists(
                format!("port `{name}` is already declared"),
            )),
            Some(existing) => Err(BlockError::type_mismatch(format!(
                "port `{name}` is already declared as {existing}"
            ))),
            None => {
                ports.insert(name, ty);
                Ok(())
            }
        }
    }

    /// Places `block` in the graph at `addr`
    pub fn add_node(&mut self, block: impl Into<Block>, addr: Address) -> Result<(), BlockError> {
        if self.nodes.contains_key(&addr) {
            return Err(BlockError::already_exists(format!("node {addr} already exists")));
        }
        self.nodes.insert(addr, block.into());
        Ok(())
    }

    /// Places `block` as instance `id` and returns its address
    pub fn place(
        &mut self,
        block: impl Into<Block>,
        id: InstanceId,
    ) -> Result<Address, BlockError> {
        let block = block.into();
        let addr = block.at(id);
        self.add_node(block, addr.clone())?;
        Ok(addr)
    }

    /// Looks up port `name` on side `direction` of node `addr`
    pub fn find_param(
        &self,
        addr: &Address,
        name: &str,
        direction: Direction,
    ) -> Result<Parameter, BlockError> {
        let node = self
            .nodes
            .get(addr)
            .ok_or_else(|| BlockError::dne(format!("no node {addr}")))?;
        let ports = match direction {
            Direction::Input => node.inputs(),
            Direction::Output => node.outputs(),
        };
        let ty = ports
            .get(name)
            .ok_or_else(|| {
                BlockError::dne(format!("node {addr} has no {direction:?} port `{name}`"))
            })?;
        Ok(Parameter {
            name: name.to_string(),
            owner: addr.clone(),
            ty: *ty,
            direction,
        })
    }

    /// Resolves the input port a new source would write to
    fn target(&self, addr: &Address, name: &str) -> Result<Parameter, BlockError> {
        match self.find_param(addr, name, Direction::Input) {
            Ok(param) => Ok(param),
            Err(e) => match self.find_param(addr, name, Direction::Output) {
                Ok(_) => Err(BlockError::not_input(format!("{addr}.{name} is an output"))),
                Err(_) => Err(e),
            },
        }
    }

    fn check_unsourced(&self, param: &Parameter) -> Result<(), BlockError> {
        if self.sourced.contains(param) {
            return Err(BlockError::already_exists(format!("{param} already has a source")));
        }
        Ok(())
    }

    /// Links output `out_port` of `out_addr` to input `in_port` of `in_addr`
    pub fn add_edge(
        &mut self,
        out_addr: &Address,
        out_port: &str,
        in_addr: &Address,
        in_port: &str,
    ) -> Result<(), BlockError> {
        let source = self.find_param(out_addr, out_port, Direction::Output)?;
        let target = self.target(in_addr, in_port)?;
        if !source.can_link_to(&target) {
            return Err(BlockError::type_mismatch(format!(
                "cannot link {source} ({}) to {target} ({})",
                source.ty, target.ty
            )));
        }
        self.check_unsourced(&target)?;

        tracing::trace!(graph = %self.name, from = %source, to = %target, "Edge added");
        self.sourced.insert(target.clone());
        self.edges.entry(source).or_default().push(target);
        Ok(())
    }

    /// Feeds external input `external` into input `in_port` of `in_addr`
    pub fn link_in(
        &mut self,
        external: &str,
        in_port: &str,
        in_addr: &Address,
    ) -> Result<(), BlockError> {
        let ty = *self
            .inputs
            .get(external)
            .ok_or_else(|| BlockError::dne(format!("graph has no input `{external}`")))?;
        let target = self.target(in_addr, in_port)?;
        if !check_compatible(ty, target.ty) {
            return Err(BlockError::type_mismatch(format!(
                "input `{external}` ({ty}) cannot feed {target} ({})",
                target.ty
            )));
        }
        self.check_unsourced(&target)?;

        self.sourced.insert(target.clone());
        self.infeed
            .entry(external.to_string())
            .or_default()
            .push(target);
        Ok(())
    }

    /// Publishes output `out_port` of `out_addr` as external output `external`
    pub fn link_out(
        &mut self,
        out_addr: &Address,
        out_port: &str,
        external: &str,
    ) -> Result<(), BlockError> {
        let ty = *self
            .outputs
            .get(external)
            .ok_or_else(|| BlockError::dne(format!("graph has no output `{external}`")))?;
        if self.outfeed.contains_key(external) {
            return Err(BlockError::already_exists(format!(
                "output `{external}` is already linked"
            )));
        }
        let source = self.find_param(out_addr, out_port, Direction::Output)?;
        if !check_compatible(source.ty, ty) {
            return Err(BlockError::type_mismatch(format!(
                "{source} ({}) cannot feed output `{external}` ({ty})",
                source.ty
            )));
        }
        self.outfeed.insert(external.to_string(), source);
        Ok(())
    }

    /// Binds a fixed value to input `port` of `addr`
    pub fn add_constant(
        &mut self,
        value: impl Into<Value>,
        addr: &Address,
        port: &str,
    ) -> Result<(), BlockError> {
        let value = value.into();
        let target = self.target(addr, port)?;
        if !check_type(target.ty, &value) {
            return Err(BlockError::type_mismatch(format!(
                "{target} ({}) cannot hold {}",
                target.ty,
                value.ty()
            )));
        }
        self.check_unsourced(&target)?;

        self.sourced.insert(target.clone());
        self.constants.insert(target, value);
        Ok(())
    }

    /// External output names fed by `param`
    pub(crate) fn outfeed_names<'a>(
        &'a self,
        param: &'a Parameter,
    ) -> impl Iterator<Item = &'a str> {
        self.outfeed
            .iter()
            .filter(move |(_, p)| *p == param)
            .map(|(name, _)| name.as_str())
    }

    /// Whether anything downstream consumes `param`
    pub(crate) fn is_routed(&self, param: &Parameter) -> bool {
        self.edges.contains_key(param) || self.outfeed.values().any(|p| p == param)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(graph = %self.name, id = id))]
    pub(crate) async fn invoke(
        &self,
        inputs: Values,
        stop: &mut StopSignal,
        id: InstanceId,
    ) -> Result<Values, FlowError> {
        Executor::new(self, Address::new(&self.name, id))
            .run(inputs, stop)
            .await
    }
}
