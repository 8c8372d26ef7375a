use crate::error::NeuraGraphError;
use crate::graph::config::ExecutorConfig;
use crate::graph::node::{NodeId, OperationNode};
use crate::operation::{BackwardResult, CheckpointGuard, ReleaseCheckpoint, RunId};
use crate::tensor::Value;
use log::{debug, trace, warn};
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Summary of a completed backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackwardReport {
    /// Nodes reachable from the seeds.
    pub active_nodes: usize,
    /// Nodes that finished (leaves included).
    pub executed_nodes: usize,
    pub elapsed: Duration,
}

/// A built operation graph: an arena of nodes addressed by [`NodeId`].
///
/// Topology is fixed at build time and reused for every pass. `forward` walks
/// the `next` chain sequentially; `backward` schedules nodes on the graph's
/// worker pool as soon as all their active consumers have contributed.
/// Passes and checkpoint operations are serialized by an internal lock, so a
/// `Graph` may be shared between threads.
pub struct Graph {
    nodes: Vec<OperationNode>,
    names: HashMap<String, NodeId>,
    head: Option<NodeId>,
    config: ExecutorConfig,
    pool: ThreadPool,
    pass_lock: Mutex<()>,
}

/// State shared by all workers of one backward pass.
struct PassContext<'a> {
    nodes: &'a [OperationNode],
    deadline: Option<Instant>,
    aborted: AtomicBool,
    timed_out: AtomicBool,
    first_error: Mutex<Option<NeuraGraphError>>,
    executed: AtomicUsize,
}

impl PassContext<'_> {
    /// Keeps the first error and stops further dispatch.
    fn fail(&self, err: NeuraGraphError) {
        self.aborted.store(true, Ordering::Release);
        let mut slot = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

fn lock_error<T>(lock_type: &str, err: PoisonError<T>) -> NeuraGraphError {
    NeuraGraphError::LockError {
        lock_type: lock_type.to_string(),
        reason: err.to_string(),
    }
}

impl Graph {
    pub(crate) fn from_parts(
        nodes: Vec<OperationNode>,
        names: HashMap<String, NodeId>,
        head: Option<NodeId>,
        config: ExecutorConfig,
    ) -> Result<Self, NeuraGraphError> {
        let mut builder =
            ThreadPoolBuilder::new().thread_name(|i| format!("neuragraph-worker-{}", i));
        if let Some(num_threads) = config.num_threads {
            builder = builder.num_threads(num_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| NeuraGraphError::ThreadPoolError(e.to_string()))?;
        Ok(Graph {
            nodes,
            names,
            head,
            config,
            pool,
            pass_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Worker count of the backward pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node(&self, name: &str) -> Result<&OperationNode, NeuraGraphError> {
        self.node_id(name)
            .map(|id| &self.nodes[id.0])
            .ok_or_else(|| NeuraGraphError::UnknownName(name.to_string()))
    }

    pub fn node_by_id(&self, id: NodeId) -> Option<&OperationNode> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &OperationNode> {
        self.nodes.iter()
    }

    /// Names of the operation nodes in forward execution order.
    pub fn forward_order(&self) -> Vec<&str> {
        let mut order = Vec::new();
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = &self.nodes[id.0];
            order.push(node.specific_id());
            cursor = node.next;
        }
        order
    }

    fn lock_pass(&self) -> Result<MutexGuard<'_, ()>, NeuraGraphError> {
        self.pass_lock.lock().map_err(|e| lock_error("pass", e))
    }

    fn read_output(&self, id: NodeId) -> Result<Option<Value>, NeuraGraphError> {
        let guard = self.nodes[id.0]
            .output
            .read()
            .map_err(|e| lock_error("output read", e))?;
        Ok(guard.clone())
    }

    // --- Forward pass ---

    /// Feeds every leaf and runs each operation node along the forward chain.
    ///
    /// # Errors
    /// * `UnknownName` if a feed does not name a node.
    /// * `UnsupportedOperation` if a feed names an operation node.
    /// * `MissingFeed` if a leaf was not fed.
    /// * Any error raised by a kernel's `forward`.
    pub fn forward(&self, feeds: HashMap<String, Value>) -> Result<(), NeuraGraphError> {
        let _pass = self.lock_pass()?;
        for name in feeds.keys() {
            let id = self
                .node_id(name)
                .ok_or_else(|| NeuraGraphError::UnknownName(name.clone()))?;
            if !self.nodes[id.0].is_leaf() {
                return Err(NeuraGraphError::UnsupportedOperation(format!(
                    "'{}' is computed by the graph and cannot be fed",
                    name
                )));
            }
        }

        let mut feeds = feeds;
        for node in self.nodes.iter().filter(|n| n.is_leaf()) {
            let value = feeds
                .remove(&node.specific_id)
                .ok_or_else(|| NeuraGraphError::MissingFeed(node.specific_id.clone()))?;
            *node.output.write().map_err(|e| lock_error("output write", e))? = Some(value);
        }

        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = &self.nodes[id.0];
            let inputs = node
                .input_ids
                .iter()
                .map(|p| {
                    self.read_output(*p)?.ok_or_else(|| NeuraGraphError::MissingForwardState {
                        operation: self.nodes[p.0].specific_id.clone(),
                    })
                })
                .collect::<Result<Vec<Value>, NeuraGraphError>>()?;
            let operation = node.operation.as_ref().ok_or_else(|| {
                NeuraGraphError::InternalError(format!(
                    "leaf '{}' found in the forward chain",
                    node.specific_id
                ))
            })?;
            let output = operation
                .lock()
                .map_err(|e| lock_error("operation", e))?
                .forward(&inputs)?;
            trace!(
                "Graph: forward {} ({}) -> {:?}",
                node.specific_id,
                node.operation_type,
                output.shape()
            );
            *node.output.write().map_err(|e| lock_error("output write", e))? = Some(output);
            cursor = node.next;
        }
        debug!("Graph: forward pass finished over {} operations", self.forward_order().len());
        Ok(())
    }

    /// The value a node produced in the latest forward pass.
    pub fn output(&self, name: &str) -> Result<Option<Value>, NeuraGraphError> {
        let id = self
            .node_id(name)
            .ok_or_else(|| NeuraGraphError::UnknownName(name.to_string()))?;
        self.read_output(id)
    }

    // --- Backward pass ---

    /// Propagates `seeds` (node name -> gradient of that node's output) back to every
    /// node reachable from them.
    ///
    /// Each reachable node runs once, after all of its reachable consumers have
    /// added their contribution. Independent branches run concurrently on the
    /// graph's pool. The pass fails fast: the first error stops all further
    /// dispatch and is returned once in-flight nodes have drained.
    ///
    /// # Errors
    /// * `UnknownSeed` / `ShapeMismatch` for an invalid seed.
    /// * Any kernel or accumulation error.
    /// * `BackwardTimeout` if the configured deadline elapsed.
    /// * `GraphStalled` if a reachable node never received all its contributions.
    pub fn backward(
        &self,
        seeds: HashMap<String, Value>,
    ) -> Result<BackwardReport, NeuraGraphError> {
        let _pass = self.lock_pass()?;
        let start = Instant::now();

        let mut seeded = Vec::with_capacity(seeds.len());
        for (name, gradient) in seeds {
            let id = self
                .node_id(&name)
                .ok_or_else(|| NeuraGraphError::UnknownSeed(name.clone()))?;
            if let Some(output) = self.read_output(id)? {
                if output.shape() != gradient.shape() {
                    return Err(NeuraGraphError::ShapeMismatch {
                        expected: output.shape(),
                        actual: gradient.shape(),
                        operation: format!("seed for '{}'", name),
                    });
                }
            }
            seeded.push((id, gradient));
        }

        let active = self.active_set(seeded.iter().map(|(id, _)| *id));
        let required = self.active_dependency_counts(&active);
        self.run_pass(seeded, &active, &required, start)
    }

    /// Marks every node reachable from `seeds` by walking input edges.
    fn active_set(&self, seeds: impl Iterator<Item = NodeId>) -> Vec<bool> {
        let mut active = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = seeds.collect();
        while let Some(id) = stack.pop() {
            if active[id.0] {
                continue;
            }
            active[id.0] = true;
            stack.extend(self.nodes[id.0].input_ids.iter().copied());
        }
        active
    }

    /// Number of active distinct consumers per node.
    fn active_dependency_counts(&self, active: &[bool]) -> Vec<usize> {
        self.nodes
            .iter()
            .map(|node| {
                if !active[node.id.0] {
                    return 0;
                }
                node.backward_adjacent.iter().filter(|c| active[c.0]).count()
            })
            .collect()
    }

    fn run_pass(
        &self,
        seeded: Vec<(NodeId, Value)>,
        active: &[bool],
        required: &[usize],
        start: Instant,
    ) -> Result<BackwardReport, NeuraGraphError> {
        for (node, &count) in self.nodes.iter().zip(required) {
            node.reset_pass(count);
        }
        for (id, gradient) in seeded {
            let mut state = self.nodes[id.0]
                .gradient
                .write()
                .map_err(|e| lock_error("gradient write", e))?;
            merge_contribution(&mut state.accumulated, Some(gradient))?;
        }

        let ready: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| active[n.id.0] && required[n.id.0] == 0)
            .map(|n| n.id)
            .collect();
        let active_nodes = active.iter().filter(|a| **a).count();
        debug!(
            "Graph: backward pass over {} active nodes, {} initially ready, {} workers",
            active_nodes,
            ready.len(),
            self.pool.current_num_threads()
        );

        let ctx = PassContext {
            nodes: &self.nodes,
            deadline: self.config.deadline.and_then(|d| start.checked_add(d)),
            aborted: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            first_error: Mutex::new(None),
            executed: AtomicUsize::new(0),
        };
        {
            let ctx = &ctx;
            self.pool.scope(|scope| {
                for id in ready {
                    scope.spawn(move |s| run_node(s, ctx, id));
                }
            });
        }

        let executed_nodes = ctx.executed.load(Ordering::Acquire);
        let first_error = ctx
            .first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(err) = first_error {
            warn!("Graph: backward pass aborted: {}", err);
            return Err(err);
        }

        let pending: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| active[n.id.0] && !n.is_completed())
            .map(|n| n.specific_id.clone())
            .collect();
        if ctx.timed_out.load(Ordering::Acquire) {
            let deadline_ms = self.config.deadline.map(|d| d.as_millis()).unwrap_or(0);
            warn!(
                "Graph: backward pass exceeded {} ms with {} nodes pending",
                deadline_ms,
                pending.len()
            );
            return Err(NeuraGraphError::BackwardTimeout { deadline_ms, pending });
        }
        if !pending.is_empty() {
            warn!("Graph: backward pass stalled, pending {:?}", pending);
            return Err(NeuraGraphError::GraphStalled { pending });
        }

        let report = BackwardReport {
            active_nodes,
            executed_nodes,
            elapsed: start.elapsed(),
        };
        debug!("Graph: backward pass finished: {:?}", report);
        Ok(report)
    }

    /// The gradient a node ended the latest backward pass with.
    ///
    /// `None` if the node was not reachable from the seeds (or no gradient reached it).
    pub fn gradient(&self, name: &str) -> Result<Option<Value>, NeuraGraphError> {
        let node = self.node(name)?;
        let state = node
            .gradient
            .read()
            .map_err(|e| lock_error("gradient read", e))?;
        Ok(state.calculated.clone())
    }

    /// Clears all per-pass gradient bookkeeping. `backward` does this on entry.
    pub fn reset(&self) -> Result<(), NeuraGraphError> {
        let _pass = self.lock_pass()?;
        for node in &self.nodes {
            node.reset_pass(0);
        }
        Ok(())
    }

    // --- Checkpoints ---

    /// Checkpoints every operation's forward state under `run_id`.
    ///
    /// Waits for any in-flight pass. On failure, only the operations this call
    /// already wrote are released; checkpoints the remaining nodes hold under
    /// `run_id` stay untouched.
    pub fn store(&self, run_id: RunId) -> Result<(), NeuraGraphError> {
        let _pass = self.lock_pass()?;
        let mut written = Vec::new();
        for node in &self.nodes {
            if let Some(operation) = &node.operation {
                let stored = operation
                    .lock()
                    .map_err(|e| lock_error("operation", e))
                    .and_then(|mut op| op.store(run_id));
                if let Err(err) = stored {
                    warn!(
                        "Graph: store of {} failed at '{}', rolling back {} node(s)",
                        run_id,
                        node.specific_id,
                        written.len()
                    );
                    release_nodes(written.into_iter(), run_id);
                    return Err(err);
                }
                written.push(node);
            }
        }
        debug!("Graph: stored checkpoint {}", run_id);
        Ok(())
    }

    /// Reinstates every operation's state saved under `run_id`. Waits for any in-flight pass.
    pub fn restore(&self, run_id: RunId) -> Result<(), NeuraGraphError> {
        let _pass = self.lock_pass()?;
        for node in &self.nodes {
            if let Some(operation) = &node.operation {
                operation
                    .lock()
                    .map_err(|e| lock_error("operation", e))?
                    .restore(run_id)?;
            }
        }
        debug!("Graph: restored checkpoint {}", run_id);
        Ok(())
    }

    pub fn release(&self, run_id: RunId) {
        let _pass = self.pass_lock.lock().unwrap_or_else(|poisoned| {
            warn!("Graph: pass lock poisoned during release of {}. Recovering.", run_id);
            poisoned.into_inner()
        });
        release_nodes(self.nodes.iter(), run_id);
    }

    /// Stores a checkpoint and returns a guard that releases it on drop.
    pub fn checkpoint(&self, run_id: RunId) -> Result<CheckpointGuard<'_, Graph>, NeuraGraphError> {
        self.store(run_id)?;
        Ok(CheckpointGuard::new(self, run_id))
    }
}

impl ReleaseCheckpoint for Graph {
    fn release_checkpoint(&self, run_id: RunId) {
        self.release(run_id);
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("forward_order", &self.forward_order())
            .field("config", &self.config)
            .finish()
    }
}

// --- Worker side ---

fn release_nodes<'a>(nodes: impl Iterator<Item = &'a OperationNode>, run_id: RunId) {
    for node in nodes {
        if let Some(operation) = &node.operation {
            match operation.lock() {
                Ok(mut op) => op.release(run_id),
                Err(poisoned) => {
                    warn!(
                        "Graph: operation lock of '{}' poisoned during release of {}. Recovering.",
                        node.specific_id, run_id
                    );
                    poisoned.into_inner().release(run_id);
                }
            }
        }
    }
}

fn run_node<'s>(scope: &Scope<'s>, ctx: &'s PassContext<'s>, id: NodeId) {
    if ctx.aborted.load(Ordering::Acquire) {
        return;
    }
    if let Some(deadline) = ctx.deadline {
        if Instant::now() > deadline {
            ctx.timed_out.store(true, Ordering::Release);
            ctx.aborted.store(true, Ordering::Release);
            return;
        }
    }
    match execute_node(ctx, id) {
        Ok(ready) => {
            for producer in ready {
                scope.spawn(move |s| run_node(s, ctx, producer));
            }
        }
        Err(err) => ctx.fail(err),
    }
}

/// Runs one ready node and returns the producers it made ready.
fn execute_node(ctx: &PassContext<'_>, id: NodeId) -> Result<Vec<NodeId>, NeuraGraphError> {
    let node = &ctx.nodes[id.0];
    let gradient = {
        let mut state = node
            .gradient
            .write()
            .map_err(|e| lock_error("gradient write", e))?;
        state.calculated = state.accumulated.clone();
        state.calculated.clone()
    };

    let operation = match &node.operation {
        Some(operation) => operation,
        None => {
            trace!("Graph: leaf {} finalized", node.specific_id);
            finish(ctx, node);
            return Ok(Vec::new());
        }
    };

    let result = match gradient {
        Some(d_output) => {
            if node.backward_invocations.fetch_add(1, Ordering::AcqRel) > 0 {
                return Err(NeuraGraphError::BackwardReentered(node.specific_id.clone()));
            }
            trace!("Graph: backward {} ({})", node.specific_id, node.operation_type);
            let mut op = operation.lock().map_err(|e| lock_error("operation", e))?;
            Some(op.backward(&d_output)?)
        }
        None => {
            debug!(
                "Graph: no gradient reached {}, forwarding empty contributions",
                node.specific_id
            );
            None
        }
    };

    let mut ready = Vec::new();
    for (producer, contribution) in group_by_producer(node, result.as_ref())? {
        if contribute(ctx.nodes, producer, id, contribution)? {
            ready.push(producer);
        }
    }
    finish(ctx, node);
    Ok(ready)
}

fn finish(ctx: &PassContext<'_>, node: &OperationNode) {
    node.completed.store(true, Ordering::Release);
    ctx.executed.fetch_add(1, Ordering::AcqRel);
}

/// One entry per distinct producer; a producer feeding several inputs gets their sum.
fn group_by_producer(
    node: &OperationNode,
    result: Option<&BackwardResult>,
) -> Result<Vec<(NodeId, Option<Value>)>, NeuraGraphError> {
    let mut grouped: Vec<(NodeId, Option<Value>)> = Vec::with_capacity(node.input_ids.len());
    for (producer, role) in node.input_ids.iter().zip(&node.input_roles) {
        let gradient = result.and_then(|r| r.get(*role)).cloned();
        match grouped.iter_mut().find(|(p, _)| *p == *producer) {
            Some((_, slot)) => merge_contribution(slot, gradient)?,
            None => grouped.push((*producer, gradient)),
        }
    }
    Ok(grouped)
}

/// Adds `gradient` into the producer under its lock and reports whether this was the final
/// contribution.
fn contribute(
    nodes: &[OperationNode],
    producer: NodeId,
    consumer: NodeId,
    gradient: Option<Value>,
) -> Result<bool, NeuraGraphError> {
    let target = &nodes[producer.0];
    {
        let mut state = target
            .gradient
            .write()
            .map_err(|e| lock_error("gradient write", e))?;
        if !state.visited_from.insert(consumer) {
            return Err(NeuraGraphError::DuplicateContribution {
                consumer: nodes[consumer.0].specific_id.clone(),
                producer: target.specific_id.clone(),
            });
        }
        state.visited_count += 1;
        merge_contribution(&mut state.accumulated, gradient)?;
    }
    Ok(target.gate.arrive())
}

fn merge_contribution(
    slot: &mut Option<Value>,
    gradient: Option<Value>,
) -> Result<(), NeuraGraphError> {
    if let Some(gradient) = gradient {
        match slot {
            Some(accumulated) => accumulated.add_assign(&gradient)?,
            None => *slot = Some(gradient),
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
