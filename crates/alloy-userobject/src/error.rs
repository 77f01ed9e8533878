//! Dependency-graph error types.

use std::error::Error;
use std::fmt;

use crate::graph::GraphState;

/// Errors from building, sorting or partitioning a [`UserObjectGraph`].
///
/// [`UserObjectGraph`]: crate::UserObjectGraph
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphError {
    /// The dependencies contain a cycle.
    CyclicDependency {
        /// Names along the cycle; the first name is repeated at the end.
        cycle: Vec<String>,
    },
    /// A node depends on a name that was never registered.
    UnknownDependency {
        /// The dependent node.
        node: String,
        /// The missing dependency.
        dependency: String,
    },
    /// A node with this name is already registered.
    DuplicateNode {
        /// The duplicated name.
        name: String,
    },
    /// No node with this name is registered.
    UnknownNode {
        /// The requested name.
        name: String,
    },
    /// The operation is not legal in the graph's current state.
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state the graph was in.
        state: GraphState,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CyclicDependency { cycle } => {
                write!(f, "cyclic user object dependency: {}", cycle.join(" -> "))
            }
            Self::UnknownDependency { node, dependency } => {
                write!(f, "'{node}' depends on unknown user object '{dependency}'")
            }
            Self::DuplicateNode { name } => {
                write!(f, "user object '{name}' is already registered")
            }
            Self::UnknownNode { name } => write!(f, "no user object named '{name}'"),
            Self::InvalidState { operation, state } => {
                write!(f, "cannot {operation} while the graph is {state:?}")
            }
        }
    }
}

impl Error for GraphError {}
