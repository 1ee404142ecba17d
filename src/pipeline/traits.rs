//! Core pipeline trait.
//!
//! - [`Node`] - A processing unit that transforms input data to output data
//!
//! For push operations, see [`Pushable`](super::Pushable) in the `dyn_traits` module.

/// A processing node that transforms input to output.
///
/// Nodes are the building blocks of the capture chain. They receive input
/// data, process it, and optionally produce output data.
///
/// Use [`GraphNode`](super::GraphNode) to wrap a `Node` and gain
/// [`Pushable`](super::Pushable) capabilities.
pub trait Node: Send + Sync {
    type Input;
    type Output;

    /// Process input data and optionally produce output.
    ///
    /// Returns `None` if the node is buffering data or dropping it.
    fn process(&self, input: Self::Input) -> Option<Self::Output>;
}
