use crate::graph::gate::ContributionGate;
use crate::operation::{GradientRole, Operation};
use crate::tensor::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

/// Stable index of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Per-pass gradient bookkeeping of one node, guarded by the node's lock.
#[derive(Debug, Default)]
pub(crate) struct GradientState {
    /// Sum of the contributions received so far (plus the seed, if any).
    pub(crate) accumulated: Option<Value>,
    /// Final gradient, set once every consumer has contributed.
    pub(crate) calculated: Option<Value>,
    /// Consumers that already contributed this pass.
    pub(crate) visited_from: HashSet<NodeId>,
    pub(crate) visited_count: usize,
}

/// One vertex of the operation graph.
///
/// Leaves (graph inputs and parameters) carry no operation; they only receive
/// a value during the forward pass and a gradient during the backward pass.
#[derive(Debug)]
pub struct OperationNode {
    pub(crate) id: NodeId,
    pub(crate) specific_id: String,
    pub(crate) operation_type: &'static str,
    pub(crate) time_step_index: usize,
    pub(crate) layer_index: usize,
    pub(crate) inputs: Vec<String>,
    pub(crate) outputs: Vec<String>,
    pub(crate) input_ids: Vec<NodeId>,
    pub(crate) input_roles: Vec<GradientRole>,
    /// Distinct consumers whose backward output feeds this node.
    pub(crate) backward_adjacent: Vec<NodeId>,
    pub(crate) output_dependency_count: usize,
    pub(crate) next: Option<NodeId>,
    pub(crate) operation: Option<Mutex<Box<dyn Operation>>>,
    pub(crate) output: RwLock<Option<Value>>,
    pub(crate) gradient: RwLock<GradientState>,
    pub(crate) gate: ContributionGate,
    pub(crate) completed: AtomicBool,
    pub(crate) backward_invocations: AtomicUsize,
}

impl OperationNode {
    pub(crate) fn leaf(id: NodeId, name: String) -> Self {
        Self::build(id, name, "Leaf", 0, 0, Vec::new(), None)
    }

    pub(crate) fn with_operation(
        id: NodeId,
        name: String,
        time_step_index: usize,
        layer_index: usize,
        inputs: Vec<String>,
        operation: Box<dyn Operation>,
    ) -> Self {
        let operation_type = operation.operation_type();
        let input_roles = operation.input_roles();
        let mut node = Self::build(
            id,
            name,
            operation_type,
            time_step_index,
            layer_index,
            inputs,
            Some(Mutex::new(operation)),
        );
        node.input_roles = input_roles;
        node
    }

    fn build(
        id: NodeId,
        specific_id: String,
        operation_type: &'static str,
        time_step_index: usize,
        layer_index: usize,
        inputs: Vec<String>,
        operation: Option<Mutex<Box<dyn Operation>>>,
    ) -> Self {
        OperationNode {
            id,
            specific_id,
            operation_type,
            time_step_index,
            layer_index,
            inputs,
            outputs: Vec::new(),
            input_ids: Vec::new(),
            input_roles: Vec::new(),
            backward_adjacent: Vec::new(),
            output_dependency_count: 0,
            next: None,
            operation,
            output: RwLock::new(None),
            gradient: RwLock::new(GradientState::default()),
            gate: ContributionGate::new(0),
            completed: AtomicBool::new(false),
            backward_invocations: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn specific_id(&self) -> &str {
        &self.specific_id
    }

    /// `"Leaf"` for graph inputs, the kernel's `operation_type()` otherwise.
    pub fn operation_type(&self) -> &'static str {
        self.operation_type
    }

    pub fn time_step_index(&self) -> usize {
        self.time_step_index
    }

    pub fn layer_index(&self) -> usize {
        self.layer_index
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Names of the nodes consuming this node's output.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn input_ids(&self) -> &[NodeId] {
        &self.input_ids
    }

    pub fn input_roles(&self) -> &[GradientRole] {
        &self.input_roles
    }

    pub fn backward_adjacent(&self) -> &[NodeId] {
        &self.backward_adjacent
    }

    /// Fan-out: number of distinct consumers in the whole graph.
    pub fn output_dependency_count(&self) -> usize {
        self.output_dependency_count
    }

    /// Next operation node in forward execution order.
    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn is_leaf(&self) -> bool {
        self.operation.is_none()
    }

    /// Whether the node finished its part of the latest backward pass.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// How many times `backward` ran on this node's operation in the latest pass.
    pub fn backward_invocations(&self) -> usize {
        self.backward_invocations.load(Ordering::Acquire)
    }

    /// Number of gradient contributions received in the latest pass.
    pub fn visited_count(&self) -> usize {
        self.gradient.read().map(|g| g.visited_count).unwrap_or(0)
    }

    pub(crate) fn reset_pass(&self, required: usize) {
        match self.gradient.write() {
            Ok(mut state) => *state = GradientState::default(),
            Err(poisoned) => *poisoned.into_inner() = GradientState::default(),
        }
        self.gate.reset(required);
        self.completed.store(false, Ordering::Release);
        self.backward_invocations.store(0, Ordering::Release);
    }
}
