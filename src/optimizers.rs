use ndarray::Array2;
use std::collections::HashMap;

use crate::config::Updater;

/// Optimizer trait for parameter updates during training
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.learning_rate, gradient);
    }

    fn reset(&mut self) {
        // SGD has no state to reset
    }
}

/// First and second moment estimates for one parameter matrix
#[derive(Clone, Debug)]
struct MomentState {
    m: Array2<f64>,
    v: Array2<f64>,
    t: i32,
}

impl MomentState {
    fn new(param: &Array2<f64>) -> Self {
        MomentState {
            m: Array2::zeros(param.raw_dim()),
            v: Array2::zeros(param.raw_dim()),
            t: 0,
        }
    }

    /// Advance the moving averages by one gradient
    fn observe(&mut self, gradient: &Array2<f64>, beta1: f64, beta2: f64) {
        self.t += 1;
        self.m = beta1 * &self.m + (1.0 - beta1) * gradient;
        self.v = beta2 * &self.v + (1.0 - beta2) * &(gradient * gradient);
    }
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected estimates. The step count is
/// tracked per parameter so every matrix gets its own bias correction.
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    state: HashMap<String, MomentState>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            state: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let state = self
            .state
            .entry(param_id.to_string())
            .or_insert_with(|| MomentState::new(param));
        state.observe(gradient, self.beta1, self.beta2);

        let m_hat = &state.m / (1.0 - self.beta1.powi(state.t));
        let v_hat = &state.v / (1.0 - self.beta2.powi(state.t));

        let update = self.learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }

    fn reset(&mut self) {
        self.state.clear();
    }
}

/// Adam with Nesterov momentum
///
/// The first moment is looked ahead one step before the update:
///   m̂_t = β₁ m_t / (1-β₁ᵗ) + (1-β₁) g_t / (1-β₁ᵗ)
///   θ_t = θ_{t-1} - η * m̂_t / (√(v_t / (1-β₂ᵗ)) + ε)
pub struct Nadam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    state: HashMap<String, MomentState>,
}

impl Nadam {
    pub fn new(learning_rate: f64) -> Self {
        Nadam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Nadam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            state: HashMap::new(),
        }
    }
}

impl Optimizer for Nadam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let state = self
            .state
            .entry(param_id.to_string())
            .or_insert_with(|| MomentState::new(param));
        state.observe(gradient, self.beta1, self.beta2);

        let bias1 = 1.0 - self.beta1.powi(state.t);
        let bias2 = 1.0 - self.beta2.powi(state.t);
        let m_hat = self.beta1 * &state.m / bias1 + (1.0 - self.beta1) * gradient / bias1;
        let v_hat = &state.v / bias2;

        let update = self.learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }

    fn reset(&mut self) {
        self.state.clear();
    }
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        (**self).update(param_id, param, gradient)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Build the optimizer selected by a configured [`Updater`]
pub fn create_optimizer(updater: Updater, learning_rate: f64) -> Box<dyn Optimizer> {
    match updater {
        Updater::Sgd => Box::new(SGD::new(learning_rate)),
        Updater::Adam => Box::new(Adam::new(learning_rate)),
        Updater::Nadam => Box::new(Nadam::new(learning_rate)),
    }
}
