//! Object-safe push trait and the [`push_chain!`] macro.
//!
//! Capture runs on the device thread and pushes each block forward:
//!
//! ```ignore
//! let head = push_chain![
//!     AudioBatcher::new(4096),
//!     LevelMeter::new(level.clone()),
//!     Gate::new(transmitting.clone()),
//!     => encoder.clone()
//! ];
//! head.push(mic_block);
//! ```

use std::sync::Arc;

/// Passive receiver - can receive pushed data.
///
/// When data is pushed, the implementation decides what to do with it:
/// - Process and forward to outputs (default for [`GraphNode`](super::GraphNode))
/// - Store it (e.g. the playback queue)
/// - Hand it to the network (the transport sink)
pub trait Pushable<T>: Send + Sync {
    fn push(&self, input: T);
}

impl<T: Send + Sync> Pushable<T> for Arc<dyn Pushable<T>> {
    fn push(&self, input: T) {
        (**self).push(input)
    }
}

/// Creates a push chain from nodes, connecting them via GraphNode wrappers.
/// Returns an `Arc<dyn Pushable<FirstNode::Input>>` pointing to the first node.
///
/// # Syntax
///
/// ```ignore
/// push_chain![node1, node2, ..., => sink]
/// ```
///
/// - Nodes are automatically wrapped in `GraphNode`
/// - The `=>` marks the final destination (must implement `Pushable`)
/// - Data flows: input -> node1 -> node2 -> ... -> sink
#[macro_export]
macro_rules! push_chain {
    (=> $sink:expr) => {{
        let sink: std::sync::Arc<dyn $crate::pipeline::Pushable<_>> = $sink;
        sink
    }};

    ($node:expr, $($rest:tt)+) => {{
        let node = std::sync::Arc::new($crate::pipeline::GraphNode::new($node));
        let rest = $crate::push_chain!($($rest)+);
        node.add_output(rest);
        node as std::sync::Arc<dyn $crate::pipeline::Pushable<_>>
    }};
}
