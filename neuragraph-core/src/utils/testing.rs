use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId};
use crate::tensor::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Checks if a value has the expected shape and its flattened data is within `tolerance`.
/// Panics on the first mismatch.
pub fn check_value_near(
    actual: &Value,
    expected_shape: &[usize],
    expected_data: &[f64],
    tolerance: f64,
) {
    assert_eq!(actual.shape(), expected_shape, "Shape mismatch");

    let actual_data = actual.flatten();
    assert_eq!(actual_data.len(), expected_data.len(), "Data length mismatch");

    for (i, (a, e)) in actual_data.iter().zip(expected_data.iter()).enumerate() {
        let diff = (a - e).abs();
        if diff > tolerance {
            panic!(
                "Data mismatch at index {}: actual={:?}, expected={:?}, diff={:?}, tolerance={:?}",
                i, a, e, diff, tolerance
            );
        }
    }
}

/// Shared call counters of a [`ProbeOperation`] (clones observe the same counts).
#[derive(Debug, Clone, Default)]
pub struct ProbeCounters {
    forward: Arc<AtomicUsize>,
    backward: Arc<AtomicUsize>,
}

impl ProbeCounters {
    pub fn forward_calls(&self) -> usize {
        self.forward.load(Ordering::SeqCst)
    }

    /// Backward calls entered so far, including one still sleeping on its delay.
    pub fn backward_calls(&self) -> usize {
        self.backward.load(Ordering::SeqCst)
    }
}

/// Unary `y = factor * x` kernel that counts its calls and can be slowed down or made to fail.
#[derive(Debug, Clone)]
pub struct ProbeOperation {
    factor: f64,
    delay: Option<Duration>,
    fail_backward: bool,
    fail_store: Option<Arc<AtomicBool>>,
    counters: ProbeCounters,
}

impl ProbeOperation {
    pub fn scale(factor: f64) -> Self {
        ProbeOperation {
            factor,
            delay: None,
            fail_backward: false,
            fail_store: None,
            counters: ProbeCounters::default(),
        }
    }

    /// Sleeps for `delay` at the start of every backward call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every backward call fail with `InternalError`.
    pub fn failing(mut self) -> Self {
        self.fail_backward = true;
        self
    }

    /// Makes `store` fail with `InternalError` while `switch` is set.
    pub fn with_store_failure(mut self, switch: Arc<AtomicBool>) -> Self {
        self.fail_store = Some(switch);
        self
    }

    pub fn counters(&self) -> ProbeCounters {
        self.counters.clone()
    }
}

impl Operation for ProbeOperation {
    fn operation_type(&self) -> &'static str {
        "Probe"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::Input]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 1, self.operation_type())?;
        self.counters.forward.fetch_add(1, Ordering::SeqCst);
        let factor = self.factor;
        Ok(inputs[0].map(|x| x * factor))
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        self.counters.backward.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_backward {
            return Err(NeuraGraphError::InternalError("probe failure".to_string()));
        }
        let factor = self.factor;
        Ok(BackwardResult::new().with_input_gradient(d_output.map(|g| g * factor)))
    }

    fn store(&mut self, _run_id: RunId) -> Result<(), NeuraGraphError> {
        match &self.fail_store {
            Some(switch) if switch.load(Ordering::SeqCst) => {
                Err(NeuraGraphError::InternalError("store failure".to_string()))
            }
            _ => Ok(()),
        }
    }
}
