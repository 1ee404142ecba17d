//! Push-based processing graph.
//!
//! - [`Node`] - transforms one input into an optional output
//! - [`Pushable`] - object-safe receiver
//! - [`GraphNode`] - wraps a `Node`, fans output out to attached receivers
//! - [`push_chain!`](crate::push_chain) - wires a list of nodes into a chain

pub mod dyn_traits;
pub mod graph_node;
pub mod traits;

pub use dyn_traits::Pushable;
pub use graph_node::{GraphNode, OutputId};
pub use traits::Node;
