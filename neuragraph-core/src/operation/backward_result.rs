use crate::tensor::Value;

/// The named slots a backward call can populate.
///
/// An operation declares, per input position, which role carries the gradient
/// for that input (see [`Operation::input_roles`](crate::operation::Operation::input_roles)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GradientRole {
    Input,
    LeftInput,
    RightInput,
    DeepInput,
    Beta,
    Gamma,
    Bias,
    Filters,
}

impl GradientRole {
    pub const ALL: [GradientRole; 8] = [
        GradientRole::Input,
        GradientRole::LeftInput,
        GradientRole::RightInput,
        GradientRole::DeepInput,
        GradientRole::Beta,
        GradientRole::Gamma,
        GradientRole::Bias,
        GradientRole::Filters,
    ];
}

/// Sparse bundle of gradients returned by one backward call.
///
/// Only the fields relevant to the producing operation are populated; an empty
/// field is an expected state, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackwardResult {
    pub input_gradient: Option<Value>,
    pub left_input_gradient: Option<Value>,
    pub right_input_gradient: Option<Value>,
    pub deep_input_gradient: Option<Value>,
    pub beta_gradient: Option<Value>,
    pub gamma_gradient: Option<Value>,
    pub bias_gradient: Option<Value>,
    pub filters_gradient: Option<Value>,
}

impl BackwardResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_gradient(self, gradient: impl Into<Value>) -> Self {
        self.with(GradientRole::Input, gradient)
    }

    pub fn with_left_input_gradient(self, gradient: impl Into<Value>) -> Self {
        self.with(GradientRole::LeftInput, gradient)
    }

    pub fn with_right_input_gradient(self, gradient: impl Into<Value>) -> Self {
        self.with(GradientRole::RightInput, gradient)
    }

    pub fn with_deep_input_gradient(self, gradient: impl Into<Value>) -> Self {
        self.with(GradientRole::DeepInput, gradient)
    }

    pub fn with_beta_gradient(self, gradient: impl Into<Value>) -> Self {
        self.with(GradientRole::Beta, gradient)
    }

    pub fn with_gamma_gradient(self, gradient: impl Into<Value>) -> Self {
        self.with(GradientRole::Gamma, gradient)
    }

    pub fn with_bias_gradient(self, gradient: impl Into<Value>) -> Self {
        self.with(GradientRole::Bias, gradient)
    }

    pub fn with_filters_gradient(self, gradient: impl Into<Value>) -> Self {
        self.with(GradientRole::Filters, gradient)
    }

    /// Populates `role`, replacing any previous value.
    pub fn with(mut self, role: GradientRole, gradient: impl Into<Value>) -> Self {
        *self.slot_mut(role) = Some(gradient.into());
        self
    }

    pub fn get(&self, role: GradientRole) -> Option<&Value> {
        match role {
            GradientRole::Input => self.input_gradient.as_ref(),
            GradientRole::LeftInput => self.left_input_gradient.as_ref(),
            GradientRole::RightInput => self.right_input_gradient.as_ref(),
            GradientRole::DeepInput => self.deep_input_gradient.as_ref(),
            GradientRole::Beta => self.beta_gradient.as_ref(),
            GradientRole::Gamma => self.gamma_gradient.as_ref(),
            GradientRole::Bias => self.bias_gradient.as_ref(),
            GradientRole::Filters => self.filters_gradient.as_ref(),
        }
    }

    /// Moves the gradient for `role` out of the bundle.
    pub fn take(&mut self, role: GradientRole) -> Option<Value> {
        self.slot_mut(role).take()
    }

    /// Roles that carry a gradient, in declaration order.
    pub fn populated_roles(&self) -> Vec<GradientRole> {
        GradientRole::ALL
            .iter()
            .copied()
            .filter(|r| self.get(*r).is_some())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.populated_roles().is_empty()
    }

    fn slot_mut(&mut self, role: GradientRole) -> &mut Option<Value> {
        match role {
            GradientRole::Input => &mut self.input_gradient,
            GradientRole::LeftInput => &mut self.left_input_gradient,
            GradientRole::RightInput => &mut self.right_input_gradient,
            GradientRole::DeepInput => &mut self.deep_input_gradient,
            GradientRole::Beta => &mut self.beta_gradient,
            GradientRole::Gamma => &mut self.gamma_gradient,
            GradientRole::Bias => &mut self.bias_gradient,
            GradientRole::Filters => &mut self.filters_gradient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Matrix;

    #[test]
    fn test_only_populated_roles_are_reported() {
        let result = BackwardResult::new()
            .with_input_gradient(Matrix::filled(1, 1, 2.0))
            .with_gamma_gradient(Matrix::filled(1, 1, 3.0));
        assert_eq!(
            result.populated_roles(),
            vec![GradientRole::Input, GradientRole::Gamma]
        );
        assert!(result.get(GradientRole::Beta).is_none());
        assert!(!result.is_empty());
        assert!(BackwardResult::new().is_empty());
    }

    #[test]
    fn test_take_moves_gradient_out() {
        let mut result = BackwardResult::new().with_filters_gradient(Matrix::zeros(2, 2));
        assert!(result.take(GradientRole::Filters).is_some());
        assert!(result.take(GradientRole::Filters).is_none());
        assert!(result.is_empty());
    }
}
