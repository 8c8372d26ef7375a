use crate::error::NeuraGraphError;
use crate::graph::config::ExecutorConfig;
use crate::graph::executor::Graph;
use crate::graph::node::{NodeId, OperationNode};
use crate::operation::Operation;
use log::debug;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Declarative description of an operation node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub specific_id: String,
    pub time_step_index: usize,
    pub layer_index: usize,
    /// Names of the producers, in the operation's input order.
    pub inputs: Vec<String>,
}

impl NodeSpec {
    pub fn new(specific_id: impl Into<String>, inputs: &[&str]) -> Self {
        NodeSpec {
            specific_id: specific_id.into(),
            time_step_index: 0,
            layer_index: 0,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Position in the architecture.
    pub fn at(mut self, time_step_index: usize, layer_index: usize) -> Self {
        self.time_step_index = time_step_index;
        self.layer_index = layer_index;
        self
    }
}

enum Entry {
    Leaf(String),
    Operation(NodeSpec, Box<dyn Operation>),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Entry::Leaf(name) => name,
            Entry::Operation(spec, _) => &spec.specific_id,
        }
    }
}

/// Turns leaf and node declarations into a wired [`Graph`].
///
/// Names may reference nodes declared later; the forward chain follows a
/// topological order that keeps declaration order wherever dependencies allow.
#[derive(Default)]
pub struct GraphBuilder {
    config: ExecutorConfig,
    entries: Vec<Entry>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        GraphBuilder {
            config,
            entries: Vec::new(),
        }
    }

    /// Declares a graph input or parameter.
    pub fn leaf(&mut self, name: impl Into<String>) -> &mut Self {
        self.entries.push(Entry::Leaf(name.into()));
        self
    }

    pub fn operation<O: Operation + 'static>(&mut self, spec: NodeSpec, operation: O) -> &mut Self {
        self.add_operation(spec, Box::new(operation))
    }

    pub fn add_operation(&mut self, spec: NodeSpec, operation: Box<dyn Operation>) -> &mut Self {
        self.entries.push(Entry::Operation(spec, operation));
        self
    }

    /// Resolves names and precomputes adjacency, fan-out and the forward chain.
    ///
    /// # Errors
    /// * `DuplicateName` if two declarations share a name.
    /// * `UnknownName` if an input references an undeclared name.
    /// * `ArityMismatch` if a node lists a different number of inputs than its operation takes.
    /// * `CycleDetected` if the inputs form a cycle.
    /// * `ThreadPoolError` if the worker pool cannot be built.
    pub fn build(self) -> Result<Graph, NeuraGraphError> {
        let mut names: HashMap<String, NodeId> = HashMap::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            if names.insert(entry.name().to_string(), NodeId(index)).is_some() {
                return Err(NeuraGraphError::DuplicateName(entry.name().to_string()));
            }
        }

        let mut nodes: Vec<OperationNode> = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.into_iter().enumerate() {
            let id = NodeId(index);
            let node = match entry {
                Entry::Leaf(name) => OperationNode::leaf(id, name),
                Entry::Operation(spec, operation) => {
                    let expected = operation.input_roles().len();
                    if spec.inputs.len() != expected {
                        return Err(NeuraGraphError::ArityMismatch {
                            expected,
                            actual: spec.inputs.len(),
                            operation: operation.operation_type().to_string(),
                        });
                    }
                    let mut node = OperationNode::with_operation(
                        id,
                        spec.specific_id,
                        spec.time_step_index,
                        spec.layer_index,
                        spec.inputs,
                        operation,
                    );
                    node.input_ids = node
                        .inputs
                        .iter()
                        .map(|name| {
                            names
                                .get(name)
                                .copied()
                                .ok_or_else(|| NeuraGraphError::UnknownName(name.clone()))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    node
                }
            };
            nodes.push(node);
        }

        // Backward adjacency: each producer lists its distinct consumers once.
        for consumer in 0..nodes.len() {
            let producers = nodes[consumer].input_ids.clone();
            for producer in producers {
                let consumer_id = NodeId(consumer);
                if !nodes[producer.0].backward_adjacent.contains(&consumer_id) {
                    let consumer_name = nodes[consumer].specific_id.clone();
                    let p = &mut nodes[producer.0];
                    p.backward_adjacent.push(consumer_id);
                    p.outputs.push(consumer_name);
                }
            }
        }
        for node in nodes.iter_mut() {
            node.output_dependency_count = node.backward_adjacent.len();
        }

        let order = topological_order(&nodes)?;
        let chain: Vec<NodeId> = order.into_iter().filter(|id| !nodes[id.0].is_leaf()).collect();
        for pair in chain.windows(2) {
            nodes[pair[0].0].next = Some(pair[1]);
        }
        let head = chain.first().copied();

        debug!(
            "GraphBuilder: built graph with {} nodes ({} operations)",
            nodes.len(),
            chain.len()
        );
        Graph::from_parts(nodes, names, head, self.config)
    }
}

/// Kahn's algorithm; ties go to the earliest declared node.
fn topological_order(nodes: &[OperationNode]) -> Result<Vec<NodeId>, NeuraGraphError> {
    let mut pending: Vec<usize> = nodes
        .iter()
        .map(|n| {
            let mut distinct = n.input_ids.clone();
            distinct.sort();
            distinct.dedup();
            distinct.len()
        })
        .collect();
    let mut ready: BinaryHeap<Reverse<NodeId>> = nodes
        .iter()
        .filter(|n| pending[n.id.0] == 0)
        .map(|n| Reverse(n.id))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for consumer in &nodes[id.0].backward_adjacent {
            pending[consumer.0] -= 1;
            if pending[consumer.0] == 0 {
                ready.push(Reverse(*consumer));
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck = nodes
            .iter()
            .find(|n| pending[n.id.0] > 0)
            .map(|n| n.specific_id.clone())
            .unwrap_or_default();
        return Err(NeuraGraphError::CycleDetected(stuck));
    }
    Ok(order)
}
