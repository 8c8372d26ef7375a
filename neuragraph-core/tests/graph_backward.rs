use approx::assert_relative_eq;
use neuragraph_core::graph::{ExecutorConfig, Graph, GraphBuilder, NodeSpec};
use neuragraph_core::ops::activation::{StretchedSigmoidOperation, TanhOperation};
use neuragraph_core::ops::arithmetic::{
    BiasAddOperation, HadamardProductOperation, MatrixAddOperation, MatrixMultiplyOperation,
};
use neuragraph_core::ops::normalization::LayerNormOperation;
use neuragraph_core::utils::testing::{check_value_near, ProbeOperation};
use neuragraph_core::{NeuraGraphError, RunId, Value};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

mod common;
use common::{init_logger, matrix, named, row};

/// x feeds a (x2) and b (x3), both summed into `sum`.
fn diamond(config: ExecutorConfig) -> (Graph, ProbeOperation, ProbeOperation) {
    let a = ProbeOperation::scale(2.0);
    let b = ProbeOperation::scale(3.0);
    let mut builder = GraphBuilder::with_config(config);
    builder
        .leaf("x")
        .operation(NodeSpec::new("a", &["x"]), a.clone())
        .operation(NodeSpec::new("b", &["x"]), b.clone())
        .operation(NodeSpec::new("sum", &["a", "b"]), MatrixAddOperation::new());
    (builder.build().expect("valid graph"), a, b)
}

#[test]
fn test_builder_records_fan_out_and_chain() -> Result<(), NeuraGraphError> {
    let (graph, _, _) = diamond(ExecutorConfig::default());
    let x = graph.node("x")?;
    assert!(x.is_leaf());
    assert_eq!(x.output_dependency_count(), 2);
    assert_eq!(x.outputs(), &["a".to_string(), "b".to_string()]);
    assert_eq!(graph.node("sum")?.output_dependency_count(), 0);
    assert_eq!(graph.forward_order(), vec!["a", "b", "sum"]);
    Ok(())
}

#[test]
fn test_fan_out_gradient_is_sum_of_contributions() -> Result<(), NeuraGraphError> {
    init_logger();
    for threads in [1, 4] {
        let (graph, _, _) = diamond(ExecutorConfig::new().with_num_threads(threads));
        graph.forward(named(&[("x", row(&[1.0, 2.0]))]))?;
        check_value_near(
            &graph.output("sum")?.expect("sum computed"),
            &[1, 2],
            &[5.0, 10.0],
            1e-12,
        );

        let report = graph.backward(named(&[("sum", row(&[1.0, 1.0]))]))?;
        assert_eq!(report.active_nodes, 4);
        assert_eq!(report.executed_nodes, 4);
        assert_eq!(graph.gradient("x")?, Some(row(&[5.0, 5.0])));
        assert_eq!(graph.node("x")?.visited_count(), 2);
    }
    Ok(())
}

#[test]
fn test_two_terminals_accumulate_into_shared_input() -> Result<(), NeuraGraphError> {
    let (graph, _, _) = diamond(ExecutorConfig::new().with_num_threads(2));
    graph.forward(named(&[("x", row(&[1.0, 2.0]))]))?;
    graph.backward(named(&[("a", row(&[1.0, 1.0])), ("b", row(&[10.0, 100.0]))]))?;
    assert_eq!(graph.gradient("x")?, Some(row(&[32.0, 302.0])));
    assert_eq!(graph.gradient("sum")?, None, "sum is not reachable from the seeds");
    Ok(())
}

#[test]
fn test_accumulation_is_independent_of_arrival_order() -> Result<(), NeuraGraphError> {
    let mut builder = GraphBuilder::with_config(ExecutorConfig::new().with_num_threads(4));
    builder.leaf("x");
    let mut seeds = Vec::new();
    for i in 0..8 {
        let name = format!("p{}", i);
        let probe = ProbeOperation::scale((i + 1) as f64)
            .with_delay(Duration::from_millis((i % 3) as u64));
        builder.operation(NodeSpec::new(name.clone(), &["x"]), probe);
        seeds.push((name, row(&[1.0])));
    }
    let graph = builder.build()?;
    graph.forward(named(&[("x", row(&[0.5]))]))?;

    let seed_refs: Vec<(&str, Value)> =
        seeds.iter().map(|(n, v)| (n.as_str(), v.clone())).collect();
    for _ in 0..5 {
        graph.backward(named(&seed_refs))?;
        assert_eq!(graph.gradient("x")?, Some(row(&[36.0])));
    }
    Ok(())
}

#[test]
fn test_backward_runs_once_per_node_per_pass() -> Result<(), NeuraGraphError> {
    let (graph, a, b) = diamond(ExecutorConfig::new().with_num_threads(4));
    graph.forward(named(&[("x", row(&[1.0]))]))?;
    graph.backward(named(&[("sum", row(&[1.0]))]))?;
    assert_eq!(a.counters().backward_calls(), 1);
    assert_eq!(b.counters().backward_calls(), 1);
    for name in ["a", "b", "sum"] {
        assert_eq!(graph.node(name)?.backward_invocations(), 1, "node {}", name);
    }

    graph.backward(named(&[("sum", row(&[1.0]))]))?;
    assert_eq!(a.counters().backward_calls(), 2);
    assert_eq!(graph.node("a")?.backward_invocations(), 1);
    Ok(())
}

#[test]
fn test_only_seeded_subgraph_participates() -> Result<(), NeuraGraphError> {
    let (graph, _, b) = diamond(ExecutorConfig::default());
    graph.forward(named(&[("x", row(&[1.0, 1.0]))]))?;
    let report = graph.backward(named(&[("a", row(&[1.0, 1.0]))]))?;
    assert_eq!(report.active_nodes, 2);
    assert_eq!(graph.gradient("x")?, Some(row(&[2.0, 2.0])));
    assert_eq!(graph.gradient("b")?, None);
    assert_eq!(b.counters().backward_calls(), 0);
    Ok(())
}

#[test]
fn test_seed_on_intermediate_node_adds_to_downstream_gradient() -> Result<(), NeuraGraphError> {
    let mut builder = GraphBuilder::new();
    builder
        .leaf("x")
        .operation(NodeSpec::new("a", &["x"]), ProbeOperation::scale(2.0))
        .operation(NodeSpec::new("b", &["a"]), ProbeOperation::scale(3.0));
    let graph = builder.build()?;
    graph.forward(named(&[("x", row(&[1.0]))]))?;
    graph.backward(named(&[("a", row(&[1.0])), ("b", row(&[1.0]))]))?;
    assert_eq!(graph.gradient("a")?, Some(row(&[4.0])));
    assert_eq!(graph.gradient("x")?, Some(row(&[8.0])));
    Ok(())
}

#[test]
fn test_node_using_same_input_twice() -> Result<(), NeuraGraphError> {
    let mut builder = GraphBuilder::new();
    builder
        .leaf("x")
        .operation(NodeSpec::new("square", &["x", "x"]), HadamardProductOperation::new());
    let graph = builder.build()?;
    assert_eq!(graph.node("x")?.output_dependency_count(), 1);

    graph.forward(named(&[("x", row(&[3.0, -1.0]))]))?;
    graph.backward(named(&[("square", row(&[1.0, 2.0]))]))?;
    assert_eq!(graph.gradient("x")?, Some(row(&[6.0, -4.0])));
    Ok(())
}

#[test]
fn test_stretched_sigmoid_through_graph() -> Result<(), NeuraGraphError> {
    let mut builder = GraphBuilder::new();
    builder
        .leaf("x")
        .operation(NodeSpec::new("act", &["x"]).at(0, 1), StretchedSigmoidOperation::new());
    let graph = builder.build()?;
    assert_eq!(graph.node("act")?.layer_index(), 1);

    graph.forward(named(&[("x", row(&[0.0]))]))?;
    assert_eq!(graph.output("act")?, Some(row(&[0.5])));
    graph.backward(named(&[("act", row(&[1.0]))]))?;
    let grad = graph.gradient("x")?.expect("gradient reached x").flatten();
    assert_relative_eq!(grad[0], (PI - 2.0).ln() * 0.25, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_kernel_error_fails_the_pass() -> Result<(), NeuraGraphError> {
    let mut builder = GraphBuilder::with_config(ExecutorConfig::new().with_num_threads(2));
    builder
        .leaf("x")
        .operation(NodeSpec::new("ok", &["x"]), ProbeOperation::scale(1.0))
        .operation(NodeSpec::new("bad", &["x"]), ProbeOperation::scale(1.0).failing());
    let graph = builder.build()?;
    graph.forward(named(&[("x", row(&[1.0]))]))?;

    let result = graph.backward(named(&[("ok", row(&[1.0])), ("bad", row(&[1.0]))]));
    assert!(matches!(result, Err(NeuraGraphError::InternalError(_))));
    assert_eq!(graph.gradient("x")?, None);
    Ok(())
}

#[test]
fn test_deadline_reports_pending_nodes() -> Result<(), NeuraGraphError> {
    let config = ExecutorConfig::new()
        .with_num_threads(1)
        .with_deadline(Duration::from_millis(20));
    let mut builder = GraphBuilder::with_config(config);
    builder
        .leaf("x")
        .operation(
            NodeSpec::new("s1", &["x"]),
            ProbeOperation::scale(1.0).with_delay(Duration::from_millis(60)),
        )
        .operation(
            NodeSpec::new("s2", &["s1"]),
            ProbeOperation::scale(1.0).with_delay(Duration::from_millis(60)),
        );
    let graph = builder.build()?;
    graph.forward(named(&[("x", row(&[1.0]))]))?;

    match graph.backward(named(&[("s2", row(&[1.0]))])) {
        Err(NeuraGraphError::BackwardTimeout { deadline_ms, pending }) => {
            assert_eq!(deadline_ms, 20);
            assert_eq!(pending, vec!["x".to_string(), "s1".to_string()]);
        }
        other => panic!("expected BackwardTimeout, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_invalid_seeds_are_rejected() -> Result<(), NeuraGraphError> {
    let (graph, _, _) = diamond(ExecutorConfig::default());
    graph.forward(named(&[("x", row(&[1.0, 2.0]))]))?;
    assert!(matches!(
        graph.backward(named(&[("missing", row(&[1.0]))])),
        Err(NeuraGraphError::UnknownSeed(name)) if name == "missing"
    ));
    assert!(matches!(
        graph.backward(named(&[("sum", row(&[1.0]))])),
        Err(NeuraGraphError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_builder_rejects_malformed_graphs() {
    let mut duplicate = GraphBuilder::new();
    duplicate.leaf("x").leaf("x");
    assert!(matches!(duplicate.build(), Err(NeuraGraphError::DuplicateName(n)) if n == "x"));

    let mut unknown = GraphBuilder::new();
    unknown.operation(NodeSpec::new("a", &["nope"]), ProbeOperation::scale(1.0));
    assert!(matches!(unknown.build(), Err(NeuraGraphError::UnknownName(n)) if n == "nope"));

    let mut cyclic = GraphBuilder::new();
    cyclic
        .operation(NodeSpec::new("a", &["b"]), ProbeOperation::scale(1.0))
        .operation(NodeSpec::new("b", &["a"]), ProbeOperation::scale(1.0));
    assert!(matches!(cyclic.build(), Err(NeuraGraphError::CycleDetected(_))));

    let mut arity = GraphBuilder::new();
    arity
        .leaf("x")
        .operation(NodeSpec::new("add", &["x"]), MatrixAddOperation::new());
    assert!(matches!(
        arity.build(),
        Err(NeuraGraphError::ArityMismatch { expected: 2, actual: 1, .. })
    ));
}

#[test]
fn test_forward_chain_respects_forward_references() -> Result<(), NeuraGraphError> {
    let mut builder = GraphBuilder::new();
    builder
        .operation(NodeSpec::new("late", &["early"]), ProbeOperation::scale(2.0))
        .leaf("x")
        .operation(NodeSpec::new("early", &["x"]), ProbeOperation::scale(3.0));
    let graph = builder.build()?;
    assert_eq!(graph.forward_order(), vec!["early", "late"]);
    graph.forward(named(&[("x", row(&[1.0]))]))?;
    assert_eq!(graph.output("late")?, Some(row(&[6.0])));
    Ok(())
}

#[test]
fn test_graph_checkpoint_restores_earlier_forward_state() -> Result<(), NeuraGraphError> {
    let mut builder = GraphBuilder::new();
    builder
        .leaf("x")
        .leaf("w")
        .operation(NodeSpec::new("prod", &["x", "w"]), HadamardProductOperation::new());
    let graph = builder.build()?;

    graph.forward(named(&[("x", row(&[1.0, 2.0])), ("w", row(&[3.0, 4.0]))]))?;
    let run = RunId::next();
    let guard = graph.checkpoint(run)?;
    graph.forward(named(&[("x", row(&[5.0, 6.0])), ("w", row(&[7.0, 8.0]))]))?;

    graph.restore(guard.run_id())?;
    graph.backward(named(&[("prod", row(&[1.0, 1.0]))]))?;
    assert_eq!(graph.gradient("w")?, Some(row(&[1.0, 2.0])));
    assert_eq!(graph.gradient("x")?, Some(row(&[3.0, 4.0])));

    drop(guard);
    assert!(matches!(
        graph.restore(run),
        Err(NeuraGraphError::MissingCheckpoint { .. })
    ));
    Ok(())
}

#[test]
fn test_restore_waits_for_in_flight_backward() -> Result<(), NeuraGraphError> {
    init_logger();
    let slow = ProbeOperation::scale(1.0).with_delay(Duration::from_millis(200));
    let counters = slow.counters();
    let mut builder = GraphBuilder::new();
    builder
        .leaf("x")
        .leaf("w")
        .operation(NodeSpec::new("prod", &["x", "w"]), HadamardProductOperation::new())
        .operation(NodeSpec::new("slow", &["prod"]), slow);
    let graph = builder.build()?;

    graph.forward(named(&[("x", row(&[1.0])), ("w", row(&[1.0]))]))?;
    let old = RunId::next();
    graph.store(old)?;
    graph.forward(named(&[("x", row(&[5.0])), ("w", row(&[7.0]))]))?;

    let (pass, restored) = thread::scope(|s| {
        let pass = s.spawn(|| graph.backward(named(&[("slow", row(&[1.0]))])));
        while counters.backward_calls() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        // `slow` is sleeping inside its backward; `prod` has not run yet.
        let restored = graph.restore(old);
        (pass.join().expect("backward thread panicked"), restored)
    });
    pass?;
    restored?;

    assert_eq!(graph.gradient("w")?, Some(row(&[5.0])));
    assert_eq!(graph.gradient("x")?, Some(row(&[7.0])));
    Ok(())
}

#[test]
fn test_failed_store_keeps_checkpoints_it_did_not_write() -> Result<(), NeuraGraphError> {
    let switch = Arc::new(AtomicBool::new(false));
    let mut builder = GraphBuilder::new();
    builder
        .leaf("x")
        .leaf("w")
        .operation(
            NodeSpec::new("guarded", &["x"]),
            ProbeOperation::scale(1.0).with_store_failure(Arc::clone(&switch)),
        )
        .operation(NodeSpec::new("prod", &["guarded", "w"]), HadamardProductOperation::new());
    let graph = builder.build()?;

    graph.forward(named(&[("x", row(&[2.0])), ("w", row(&[3.0]))]))?;
    let run = RunId::next();
    graph.store(run)?;

    graph.forward(named(&[("x", row(&[5.0])), ("w", row(&[7.0]))]))?;
    switch.store(true, Ordering::SeqCst);
    assert!(matches!(graph.store(run), Err(NeuraGraphError::InternalError(_))));

    // `prod` comes after the failing node, so its earlier checkpoint survives.
    graph.restore(run)?;
    graph.backward(named(&[("prod", row(&[1.0]))]))?;
    assert_eq!(graph.gradient("w")?, Some(row(&[2.0])));
    assert_eq!(graph.gradient("x")?, Some(row(&[3.0])));
    Ok(())
}

/// y = tanh(layer_norm(x * W + b)); compares dW with finite differences over the whole graph.
#[test]
fn test_small_network_weight_gradient_matches_finite_differences() -> Result<(), NeuraGraphError> {
    let x = matrix(&[&[0.5, -1.0, 2.0], &[1.5, 0.25, -0.75]]);
    let w_data = vec![0.2, -0.4, 0.1, 0.7, 0.3, -0.5, -0.6, 0.9, 0.05];
    let b = row(&[0.1, -0.2, 0.3]);
    let gamma = row(&[1.2, 0.8, 1.0]);
    let beta = row(&[0.0, 0.1, -0.1]);
    let upstream = matrix(&[&[1.0, -0.5, 0.25], &[0.3, 0.8, -1.0]]);

    for threads in [1, 4] {
        let mut builder =
            GraphBuilder::with_config(ExecutorConfig::new().with_num_threads(threads));
        builder
            .leaf("x")
            .leaf("w")
            .leaf("b")
            .leaf("gamma")
            .leaf("beta")
            .operation(NodeSpec::new("h", &["x", "w"]).at(0, 0), MatrixMultiplyOperation::new())
            .operation(NodeSpec::new("hb", &["h", "b"]).at(0, 0), BiasAddOperation::new())
            .operation(
                NodeSpec::new("n", &["hb", "gamma", "beta"]).at(0, 1),
                LayerNormOperation::new(),
            )
            .operation(NodeSpec::new("y", &["n"]).at(0, 2), TanhOperation::new());
        let graph = builder.build()?;

        let loss = |w: &[f64]| -> Result<f64, NeuraGraphError> {
            let w_value: Value = neuragraph_core::Matrix::from_vec(3, 3, w.to_vec())?.into();
            graph.forward(named(&[
                ("x", x.clone()),
                ("w", w_value),
                ("b", b.clone()),
                ("gamma", gamma.clone()),
                ("beta", beta.clone()),
            ]))?;
            let y = graph.output("y")?.expect("y computed");
            Ok(y.zip_map(&upstream, "loss", |a, g| a * g)?.sum())
        };

        loss(&w_data)?;
        graph.backward(named(&[("y", upstream.clone())]))?;
        let analytical = graph.gradient("w")?.expect("gradient reached w").flatten();
        assert!(graph.gradient("gamma")?.is_some());
        assert!(graph.gradient("beta")?.is_some());

        let eps = 1e-6;
        for k in 0..w_data.len() {
            let mut plus = w_data.clone();
            plus[k] += eps;
            let mut minus = w_data.clone();
            minus[k] -= eps;
            let numerical = (loss(&plus)? - loss(&minus)?) / (2.0 * eps);
            assert_relative_eq!(analytical[k], numerical, epsilon = 1e-5, max_relative = 1e-4);
        }
    }
    Ok(())
}
