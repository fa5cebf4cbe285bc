//! Repeated execution of a body graph.
//!
//! Each round runs the body once with the current input set. The body
//! reports through its `Done` output whether it is finished; otherwise
//! registered outputs are fed back into their paired inputs, `Index` is
//! incremented and the next round starts. Rounds never overlap.

use crate::address::{Address, Direction, InstanceId};
use crate::block::{spawn, Block, StopSignal};
use crate::error::{BlockError, ErrorKind, FlowError};
use crate::graph::Graph;
use crate::types::{check_compatible, check_type, validate, Signature, Type, Value, Values};
use std::collections::HashMap;
use std::sync::Arc;

/// Iteration counter input added to every loop body
pub const INDEX: &str = "Index";
/// Completion flag output added to every loop body
pub const DONE: &str = "Done";

pub struct Loop {
    name: String,
    inputs: Signature,
    outputs: Signature,
    body: Arc<Graph>,
    /// Body input to the loop input feeding it
    infeed: HashMap<String, String>,
    /// Loop output to the body output producing it
    outfeed: HashMap<String, String>,
    /// Body input to the body output that feeds it on the next round
    registers: HashMap<String, String>,
    /// Round-zero values of default registers, by body input
    initial: Values,
    max_iterations: Option<u64>,
}

impl Loop {
    /// Wraps `body` in a loop.
    ///
    /// The body must produce its completion flag on a linked `Done: Bool`
    /// output. `Index: Int` is added to its inputs when missing.
    pub fn new(
        name: impl Into<String>,
        inputs: Signature,
        outputs: Signature,
        mut body: Graph,
    ) -> Result<Self, BlockError> {
        if !body.outputs().values().any(|ty| *ty == Type::Bool) {
            return Err(BlockError::type_mismatch(format!(
                "body `{}` has no Bool output to signal completion",
                body.name()
            )));
        }
        ensure_port(&mut body, INDEX, Type::Int, Direction::Input)?;
        match body.outputs().get(DONE) {
            None => {
                return Err(BlockError::dne(format!(
                    "body `{}` declares no `Done` output",
                    body.name()
                )))
            }
            Some(Type::Bool) => {}
            Some(ty) => {
                return Err(BlockError::type_mismatch(format!(
                    "body output `Done` is {ty}, not Bool"
                )))
            }
        }
        if !body.outfeed.contains_key(DONE) {
            return Err(BlockError::dne(format!(
                "body `{}` never produces `Done`",
                body.name()
            )));
        }

        Ok(Self {
            name: name.into(),
            inputs,
            outputs,
            body: Arc::new(body),
            infeed: HashMap::new(),
            outfeed: HashMap::new(),
            registers: HashMap::new(),
            initial: Values::new(),
            max_iterations: None,
        })
    }

    /// Fails any run that would start round `n`
    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
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

    pub fn body(&self) -> &Graph {
        &self.body
    }

    fn body_input(&self, name: &str) -> Result<Type, BlockError> {
        self.body
            .inputs()
            .get(name)
            .copied()
            .ok_or_else(|| BlockError::dne(format!("body has no input `{name}`")))
    }

    fn body_output(&self, name: &str) -> Result<Type, BlockError> {
        self.body
            .outputs()
            .get(name)
            .copied()
            .ok_or_else(|| BlockError::dne(format!("body has no output `{name}`")))
    }

    /// Body inputs that already receive a value every round
    fn check_unfed(&self, body_input: &str) -> Result<(), BlockError> {
        if body_input == INDEX {
            return Err(BlockError::already_exists("`Index` is fed by the loop itself"));
        }
        if self.infeed.contains_key(body_input) {
            return Err(BlockError::already_exists(format!(
                "body input `{body_input}` is already fed from outside"
            )));
        }
        if self.registers.contains_key(body_input) {
            return Err(BlockError::already_exists(format!(
                "body input `{body_input}` already has a register"
            )));
        }
        Ok(())
    }

    /// Feeds loop input `loop_input` to body input `body_input` every round
    pub fn link_in(&mut self, loop_input: &str, body_input: &str) -> Result<(), BlockError> {
        let outer = *self
            .inputs
            .get(loop_input)
            .ok_or_else(|| BlockError::dne(format!("loop has no input `{loop_input}`")))?;
        let inner = self.body_input(body_input)?;
        if !check_compatible(outer, inner) {
            return Err(BlockError::type_mismatch(format!(
                "loop input `{loop_input}` ({outer}) cannot feed \
                 body input `{body_input}` ({inner})"
            )));
        }
        self.check_unfed(body_input)?;
        self.infeed
            .insert(body_input.to_string(), loop_input.to_string());
        Ok(())
    }

    /// Publishes body output `body_output` of the final round as `loop_output`
    pub fn link_out(&mut self, body_output: &str, loop_output: &str) -> Result<(), BlockError> {
        let inner = self.body_output(body_output)?;
        let outer = *self
            .outputs
            .get(loop_output)
            .ok_or_else(|| BlockError::dne(format!("loop has no output `{loop_output}`")))?;
        if !check_compatible(inner, outer) {
            return Err(BlockError::type_mismatch(format!(
                "body output `{body_output}` ({inner}) cannot feed \
                 loop output `{loop_output}` ({outer})"
            )));
        }
        if self.outfeed.contains_key(loop_output) {
            return Err(BlockError::already_exists(format!(
                "loop output `{loop_output}` is already linked"
            )));
        }
        self.outfeed
            .insert(loop_output.to_string(), body_output.to_string());
        Ok(())
    }

    /// Declares `name` on the loop and binds it to the body port of the
    /// same name, which must already exist.
    ///
    /// Redeclaring a loop port fails with `AlreadyExists` if the types are
    /// compatible and with `Type` if they are not.
    pub fn add_feed(
        &mut self,
        name: &str,
        ty: Type,
        direction: Direction,
    ) -> Result<(), BlockError> {
        let ports = match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        };
        match ports.get(name) {
            Some(existing) if check_compatible(*existing, ty) => {
                return Err(BlockError::already_exists(format!(
                    "loop port `{name}` is already declared"
                )))
            }
            Some(existing) => {
                return Err(BlockError::type_mismatch(format!(
                    "loop port `{name}` is already declared as {existing}"
                )))
            }
            None => {}
        }

        let inner = match direction {
            Direction::Input => self.body_input(name)?,
            Direction::Output => self.body_output(name)?,
        };
        if !check_compatible(ty, inner) {
            return Err(BlockError::type_mismatch(format!(
                "loop port `{name}` ({ty}) does not fit body port `{name}` ({inner})"
            )));
        }
        match direction {
            Direction::Input => {
                self.check_unfed(name)?;
                self.inputs.insert(name.to_string(), ty);
                self.infeed.insert(name.to_string(), name.to_string());
            }
            Direction::Output => {
                self.outputs.insert(name.to_string(), ty);
                self.outfeed.insert(name.to_string(), name.to_string());
            }
        }
        Ok(())
    }

    /// Checks that `out -> in` can carry values of type `ty`
    fn check_register_ports(&self, out: &str, input: &str, ty: Type) -> Result<(), BlockError> {
        let out_ty = self.body_output(out)?;
        let in_ty = self.body_input(input)?;
        if !check_compatible(out_ty, ty) || !check_compatible(ty, in_ty) {
            return Err(BlockError::type_mismatch(format!(
                "register `{out}` ({out_ty}) -> `{input}` ({in_ty}) cannot carry {ty}"
            )));
        }
        Ok(())
    }

    /// Feeds body output `out` back into body input `input`, starting from
    /// `initial` on round zero. `input` must not be fed from outside.
    pub fn add_default_register(
        &mut self,
        out: &str,
        input: &str,
        ty: Type,
        initial: impl Into<Value>,
    ) -> Result<(), BlockError> {
        let initial = initial.into();
        self.check_register_ports(out, input, ty)?;
        let in_ty = self.body_input(input)?;
        if !check_type(ty, &initial) || !check_type(in_ty, &initial) {
            return Err(BlockError::type_mismatch(format!(
                "initial value {initial} does not fit register `{input}` ({ty})"
            )));
        }
        self.check_unfed(input)?;

        self.registers.insert(input.to_string(), out.to_string());
        self.initial.insert(input.to_string(), initial);
        Ok(())
    }

    /// Feeds body output `out` back into body input `input`.
    ///
    /// `input` must already be linked to a loop input, which supplies its
    /// round-zero value.
    pub fn add_register(&mut self, out: &str, input: &str, ty: Type) -> Result<(), BlockError> {
        if self.registers.contains_key(input) {
            return Err(BlockError::already_exists(format!(
                "body input `{input}` already has a register"
            )));
        }
        self.check_register_ports(out, input, ty)?;
        if !self.infeed.contains_key(input) {
            return Err(BlockError::dne(format!(
                "body input `{input}` has no outside feed to start from"
            )));
        }
        self.registers.insert(input.to_string(), out.to_string());
        Ok(())
    }

    /// Round-zero inputs of the body
    fn seed(&self, inputs: &Values) -> Values {
        let mut round = self.initial.clone();
        for (body_input, loop_input) in &self.infeed {
            if let Some(value) = inputs.get(loop_input) {
                round.insert(body_input.clone(), value.clone());
            }
        }
        round
    }

    #[tracing::instrument(level = "debug", skip_all, fields(block = %self.name, id = id))]
    pub(crate) async fn invoke(
        &self,
        inputs: Values,
        stop: &mut StopSignal,
        id: InstanceId,
    ) -> Result<Values, FlowError> {
        let addr = Address::new(&self.name, id);
        validate(&inputs, &self.inputs).map_err(|e| e.at(addr.clone()))?;
        if let Some(name) = self.outputs.keys().find(|n| !self.outfeed.contains_key(*n)) {
            return Err(FlowError::new(
                ErrorKind::Dne,
                format!("output `{name}` is not linked to the body"),
                addr,
            ));
        }

        let body = Block::Graph(Arc::clone(&self.body));
        let mut round = self.seed(&inputs);
        let mut index: i64 = 0;
        loop {
            if let Some(max) = self.max_iterations {
                if index as u64 >= max {
                    tracing::warn!(block = %addr, max, "Iteration limit reached");
                    return Err(FlowError::new(
                        ErrorKind::Value,
                        format!("no completion after {max} iterations"),
                        addr,
                    ));
                }
            }
            round.insert(INDEX.to_string(), Value::Int(index));
            tracing::debug!(block = %addr, index, "Starting iteration");

            let mut handle = spawn(&body, round.clone(), id);
            let outcome = tokio::select! {
                _ = stop.wait() => {
                    handle.stop();
                    return Err(FlowError::stopping(addr));
                }
                outcome = handle.outcome() => outcome,
            };
            let out = match outcome {
                Some(Ok(values)) => values,
                Some(Err(e)) => return Err(e),
                None => return Err(FlowError::stopping(addr)),
            };

            let done = match out.get(DONE) {
                Some(Value::Bool(done)) => *done,
                _ => {
                    return Err(FlowError::new(
                        ErrorKind::Type,
                        "body did not produce a Bool `Done`",
                        addr,
                    ))
                }
            };
            if done {
                tracing::debug!(block = %addr, iterations = index + 1, "Loop finished");
                return self.collect(&out, addr);
            }

            for (input, output) in &self.registers {
                let value = out.get(output).ok_or_else(|| {
                    FlowError::new(
                        ErrorKind::Dne,
                        format!("body did not produce register output `{output}`"),
                        addr.clone(),
                    )
                })?;
                round.insert(input.clone(), value.clone());
            }
            index += 1;
        }
    }

    /// Maps the final round's body outputs to the loop outputs
    fn collect(&self, out: &Values, addr: Address) -> Result<Values, FlowError> {
        let result: Values = self
            .outfeed
            .iter()
            .filter_map(|(loop_output, body_output)| {
                out.get(body_output)
                    .map(|value| (loop_output.clone(), value.clone()))
            })
            .collect();
        validate(&result, &self.outputs).map_err(|e| e.at(addr))?;
        Ok(result)
    }
}

/// Declares `name` on `body` unless it is already there with a fitting type
fn ensure_port(
    body: &mut Graph,
    name: &str,
    ty: Type,
    direction: Direction,
) -> Result<(), BlockError> {
    match body.add_feed(name, ty, direction) {
        Err(e) if e.kind == ErrorKind::AlreadyExists => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Channels;
    use crate::blocks;
    use crate::primitive::Primitive;
    use crate::types::{signature, values};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    /// Counts up from Index until `Index + 1 == Limit`, publishing `Index + 1`
    fn counter_body() -> Graph {
        let mut body = Graph::new(
            "counter",
            signature([("Limit", Type::Int)]),
            signature([("OUT", Type::Int), ("Done", Type::Bool)]),
        );
        body.add_feed(INDEX, Type::Int, Direction::Input).unwrap();
        let inc = body.place(blocks::increment(), 0).unwrap();
        let eq = body.place(blocks::equals(), 0).unwrap();
        body.link_in(INDEX, "IN", &inc).unwrap();
        body.link_in("Limit", "B", &eq).unwrap();
        body.add_edge(&inc, "OUT", &eq, "A").unwrap();
        body.link_out(&inc, "OUT", "OUT").unwrap();
        body.link_out(&eq, "OUT", DONE).unwrap();
        body
    }

    fn counter() -> Loop {
        let mut lp = Loop::new(
            "count_to",
            signature([("Limit", Type::Int)]),
            signature([("OUT", Type::Int)]),
            counter_body(),
        )
        .unwrap();
        lp.link_in("Limit", "Limit").unwrap();
        lp.link_out("OUT", "OUT").unwrap();
        lp
    }

    #[tokio::test]
    async fn test_runs_until_done() {
        let out = Block::from(counter())
            .call(values([("Limit", Value::Int(3))]), 0)
            .await
            .unwrap();
        assert_eq!(out["OUT"], Value::Int(3));
    }

    #[tokio::test]
    async fn test_iteration_limit_is_value_error() {
        let lp = counter().with_max_iterations(2);
        let err = Block::from(lp)
            .call(values([("Limit", Value::Int(5))]), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        assert_eq!(err.origin, Address::new("count_to", 1));
    }

    #[test]
    fn test_body_needs_bool_output() {
        let body = Graph::new("b", signature([]), signature([("OUT", Type::Int)]));
        let err = Loop::new("l", signature([]), signature([]), body).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn test_index_added_to_body() {
        let lp = Loop::new("l", signature([]), signature([]), counter_body()).unwrap();
        assert_eq!(lp.body().inputs()[INDEX], Type::Int);
        assert_eq!(lp.body().outputs()[DONE], Type::Bool);
    }

    #[test]
    fn test_done_must_be_declared_and_linked() {
        // A Bool output under another name is not a completion flag.
        let body = Graph::new("b", signature([]), signature([("Flag", Type::Bool)]));
        let err = Loop::new("l", signature([]), signature([]), body).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Dne);

        let mut body = Graph::new("b", signature([]), signature([(DONE, Type::Bool)]));
        body.place(blocks::invert_bool(), 0).unwrap();
        let err = Loop::new("l", signature([]), signature([]), body).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Dne);

        let body = Graph::new(
            "b",
            signature([]),
            signature([(DONE, Type::Int), ("Flag", Type::Bool)]),
        );
        let err = Loop::new("l", signature([]), signature([]), body).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[tokio::test]
    async fn test_add_feed_binds_body_ports() {
        let mut lp = Loop::new("count_to", signature([]), signature([]), counter_body()).unwrap();
        lp.add_feed("Limit", Type::Int, Direction::Input).unwrap();
        lp.add_feed("OUT", Type::Int, Direction::Output).unwrap();
        assert_eq!(lp.inputs()["Limit"], Type::Int);
        assert_eq!(lp.outputs()["OUT"], Type::Int);

        assert_eq!(
            lp.add_feed("Limit", Type::Num, Direction::Input).unwrap_err().kind,
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            lp.add_feed("OUT", Type::Bool, Direction::Output).unwrap_err().kind,
            ErrorKind::Type
        );
        assert_eq!(
            lp.add_feed("Missing", Type::Int, Direction::Input).unwrap_err().kind,
            ErrorKind::Dne
        );
        assert_eq!(
            lp.add_feed(INDEX, Type::Int, Direction::Input).unwrap_err().kind,
            ErrorKind::AlreadyExists
        );

        let out = Block::from(lp)
            .call(values([("Limit", Value::Int(3))]), 0)
            .await
            .unwrap();
        assert_eq!(out["OUT"], Value::Int(3));
    }

    #[test]
    fn test_index_with_wrong_type_rejected() {
        let body = Graph::new(
            "b",
            signature([(INDEX, Type::Bool)]),
            signature([(DONE, Type::Bool)]),
        );
        let err = Loop::new("l", signature([]), signature([]), body).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn test_link_errors() {
        let mut lp = counter();
        assert_eq!(lp.link_in("Nope", "Limit").unwrap_err().kind, ErrorKind::Dne);
        assert_eq!(
            lp.link_in("Limit", "Limit").unwrap_err().kind,
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            lp.link_in("Limit", INDEX).unwrap_err().kind,
            ErrorKind::AlreadyExists
        );
        assert_eq!(lp.link_out("OUT", "OUT").unwrap_err().kind, ErrorKind::AlreadyExists);
        assert_eq!(lp.link_out(DONE, "Missing").unwrap_err().kind, ErrorKind::Dne);
    }

    #[test]
    fn test_register_rules() {
        let mut lp = counter();
        // Limit is fed from outside, so only a plain register may target it.
        assert_eq!(
            lp.add_default_register("OUT", "Limit", Type::Int, Value::Int(0))
                .unwrap_err()
                .kind,
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            lp.add_register("OUT", "Limit", Type::Float).unwrap_err().kind,
            ErrorKind::Type
        );
        assert_eq!(
            lp.add_register("Missing", "Limit", Type::Int).unwrap_err().kind,
            ErrorKind::Dne
        );
        lp.add_register("OUT", "Limit", Type::Int).unwrap();
        assert_eq!(
            lp.add_register("OUT", "Limit", Type::Int).unwrap_err().kind,
            ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn test_register_needs_outside_feed() {
        let mut body = counter_body();
        body.add_feed("Acc", Type::Int, Direction::Input).unwrap();
        let mut lp = Loop::new("l", signature([]), signature([]), body).unwrap();
        assert_eq!(lp.add_register("OUT", "Acc", Type::Int).unwrap_err().kind, ErrorKind::Dne);
        assert_eq!(
            lp.add_default_register("OUT", "Acc", Type::Int, Value::Bool(true))
                .unwrap_err()
                .kind,
            ErrorKind::Type
        );
        lp.add_default_register("OUT", "Acc", Type::Int, Value::Int(0))
            .unwrap();
    }

    #[tokio::test]
    async fn test_unlinked_output_is_dne() {
        let lp = Loop::new(
            "l",
            signature([("Limit", Type::Int)]),
            signature([("OUT", Type::Int)]),
            counter_body(),
        )
        .unwrap();
        let err = Block::from(lp)
            .call(values([("Limit", Value::Int(1))]), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Dne);
    }

    #[tokio::test]
    async fn test_stop_mid_iteration() {
        let slow = Primitive::streaming(
            "slow_flag",
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
        );
        let mut body = Graph::new("b", signature([]), signature([(DONE, Type::Bool)]));
        let flag = body.place(slow, 0).unwrap();
        body.link_out(&flag, "OUT", DONE).unwrap();
        let lp = Loop::new("l", signature([]), signature([]), body).unwrap();

        let mut handle = spawn(&lp.into(), Values::new(), 0);
        sleep(Duration::from_millis(20)).await;
        handle.stop();
        let outcome = timeout(Duration::from_secs(1), handle.outcome()).await.unwrap();
        assert!(outcome.is_none());
    }
}
