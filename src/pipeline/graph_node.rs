//! GraphNode wrapper for dynamic graph construction.
//!
//! [`GraphNode`] wraps any [`Node`] to implement [`Pushable`], with outputs
//! that can be attached and detached while audio is flowing.
//!
//! # Usage
//!
//! ```ignore
//! let encoder = Arc::new(GraphNode::new(PcmEncoder));
//!
//! // Attach the network once the session is up
//! let id = encoder.add_output(transport_sink.clone());
//!
//! encoder.push(frame); // -> encode -> transport_sink.push()
//!
//! // Detach on teardown
//! encoder.remove_output(id);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::dyn_traits::Pushable;
use super::traits::Node;

pub type OutputId = u64;

/// Wraps a [`Node`] to implement [`Pushable`].
///
/// # Push Behavior
/// 1. Process input through the wrapped node
/// 2. Forward output to all connected output destinations
///
/// Outputs live in a `DashMap`, so attaching or detaching one from the async
/// side never blocks the device thread for long.
pub struct GraphNode<N: Node> {
    node: N,
    outputs: DashMap<OutputId, Arc<dyn Pushable<N::Output>>>,
    next_output_id: AtomicU64,
}

impl<N: Node> GraphNode<N> {
    pub fn new(node: N) -> Self {
        Self {
            node,
            outputs: DashMap::new(),
            next_output_id: AtomicU64::new(0),
        }
    }

    pub fn add_output(&self, dest: Arc<dyn Pushable<N::Output>>) -> OutputId {
        let id = self.next_output_id.fetch_add(1, Ordering::Relaxed);
        self.outputs.insert(id, dest);
        id
    }

    pub fn remove_output(&self, id: OutputId) -> Option<Arc<dyn Pushable<N::Output>>> {
        self.outputs.remove(&id).map(|(_, v)| v)
    }
}

impl<N: Node> Pushable<N::Input> for GraphNode<N>
where
    N::Output: Clone,
{
    fn push(&self, input: N::Input) {
        if let Some(output) = self.node.process(input) {
            for entry in self.outputs.iter() {
                entry.value().push(output.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Identity;

    impl Node for Identity {
        type Input = u8;
        type Output = u8;

        fn process(&self, input: u8) -> Option<u8> {
            Some(input)
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<u8>>);

    impl Pushable<u8> for Collect {
        fn push(&self, input: u8) {
            self.0.lock().unwrap().push(input);
        }
    }

    #[test]
    fn test_outputs_attach_and_detach() {
        let node = GraphNode::new(Identity);
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());

        node.push(1);
        let id_a = node.add_output(a.clone());
        node.add_output(b.clone());
        node.push(2);

        assert!(node.remove_output(id_a).is_some());
        assert!(node.remove_output(id_a).is_none());
        node.push(3);

        assert_eq!(*a.0.lock().unwrap(), vec![2]);
        assert_eq!(*b.0.lock().unwrap(), vec![2, 3]);
    }
}
