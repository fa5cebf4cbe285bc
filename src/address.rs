//! Identity of block instances and their ports.

use crate::types::{check_compatible, Type};
use std::fmt;

/// Separates instances of the same block inside one graph.
pub type InstanceId = u32;

/// Identifies one instantiated block inside its enclosing graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    /// Name of the block this instance runs
    pub name: String,
    /// Instance number, chosen by whoever places the block
    pub id: InstanceId,
}

impl Address {
    /// Creates an address for instance `id` of the block called `name`
    pub fn new(name: impl Into<String>, id: InstanceId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Which side of a block a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// One typed port of one block instance.
///
/// Parameters are plain value keys: the scheduler indexes pending data,
/// edges and feeds by them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub owner: Address,
    pub ty: Type,
    pub direction: Direction,
}

impl Parameter {
    /// An input port named `name` on `owner`
    pub fn input(name: impl Into<String>, owner: Address, ty: Type) -> Self {
        Self {
            name: name.into(),
            owner,
            ty,
            direction: Direction::Input,
        }
    }

    /// An output port named `name` on `owner`
    pub fn output(name: impl Into<String>, owner: Address, ty: Type) -> Self {
        Self {
            name: name.into(),
            owner,
            ty,
            direction: Direction::Output,
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    /// Whether an edge may run from `self` to `target`
    pub fn can_link_to(&self, target: &Parameter) -> bool {
        !self.is_input() && target.is_input() && check_compatible(self.ty, target.ty)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}
