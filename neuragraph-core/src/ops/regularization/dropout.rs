use crate::error::NeuraGraphError;
use crate::operation::{check_arity, BackwardResult, GradientRole, Operation, RunId, SavedState};
use crate::tensor::Value;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Bernoulli, Distribution};

/// Inverted dropout.
///
/// In training mode each element is kept with probability `1 - rate` and
/// scaled by `1 / (1 - rate)`; in evaluation mode the input passes through.
/// The mask is drawn from the operation's own seeded generator, so two
/// instances built with the same seed produce the same masks in the same order.
#[derive(Debug, Clone)]
pub struct DropoutOperation {
    rate: f64,
    training: bool,
    rng: StdRng,
    mask: SavedState<Value>,
}

impl DropoutOperation {
    /// # Errors
    /// `InvalidParameter` unless `0 <= rate < 1`.
    pub fn with_seed(rate: f64, seed: u64) -> Result<Self, NeuraGraphError> {
        if !(0.0..1.0).contains(&rate) {
            return Err(NeuraGraphError::InvalidParameter {
                name: "rate".to_string(),
                reason: format!("dropout rate must lie in [0, 1), got {}", rate),
            });
        }
        Ok(DropoutOperation {
            rate,
            training: true,
            rng: StdRng::seed_from_u64(seed),
            mask: SavedState::new(),
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn draw_mask(&mut self, like: &Value) -> Result<Value, NeuraGraphError> {
        if !self.training || self.rate == 0.0 {
            return Ok(like.map(|_| 1.0));
        }
        let keep = 1.0 - self.rate;
        let bernoulli = Bernoulli::new(keep).map_err(|e| NeuraGraphError::InvalidParameter {
            name: "rate".to_string(),
            reason: e.to_string(),
        })?;
        let scale = 1.0 / keep;
        let len = like.flatten().len();
        let data: Vec<f64> = (0..len)
            .map(|_| if bernoulli.sample(&mut self.rng) { scale } else { 0.0 })
            .collect();
        like.from_flat_like(&data)
    }
}

impl Operation for DropoutOperation {
    fn operation_type(&self) -> &'static str {
        "Dropout"
    }

    fn input_roles(&self) -> Vec<GradientRole> {
        vec![GradientRole::Input]
    }

    fn forward(&mut self, inputs: &[Value]) -> Result<Value, NeuraGraphError> {
        check_arity(inputs, 1, self.operation_type())?;
        let mask = self.draw_mask(&inputs[0])?;
        let output = inputs[0].zip_map(&mask, self.operation_type(), |x, m| x * m)?;
        self.mask.record(mask);
        Ok(output)
    }

    fn backward(&mut self, d_output: &Value) -> Result<BackwardResult, NeuraGraphError> {
        let mask = self.mask.current(self.operation_type())?;
        let d_input = d_output.zip_map(mask, self.operation_type(), |g, m| g * m)?;
        Ok(BackwardResult::new().with_input_gradient(d_input))
    }

    fn store(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.mask.store(run_id, self.operation_type())
    }

    fn restore(&mut self, run_id: RunId) -> Result<(), NeuraGraphError> {
        self.mask.restore(run_id, self.operation_type())
    }

    fn release(&mut self, run_id: RunId) {
        self.mask.release(run_id);
    }
}
