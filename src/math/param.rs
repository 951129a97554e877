use rand::prelude::*;
use std::f64::consts::PI;

/// One learnable tensor, stored flat, paired with its gradient accumulator.
///
/// Layers add into `grad` during the backward pass; the optimizer consumes
/// the gradient in `step()` and zeroes it for the next batch.
#[derive(Debug, Clone)]
pub struct Param {
    pub data: Vec<f64>,
    pub grad: Vec<f64>,
}

impl Param {
    pub fn zeros(len: usize) -> Param {
        Param { data: vec![0.0; len], grad: vec![0.0; len] }
    }

    pub fn from_values(data: Vec<f64>) -> Param {
        let grad = vec![0.0; data.len()];
        Param { data, grad }
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    ///
    /// Recommended before ReLU layers. The variance 2/fan_in accounts for
    /// the fact that ReLU zeroes half of its inputs on average.
    pub fn he(len: usize, fan_in: usize) -> Param {
        let mut rng = rand::thread_rng();
        let std_dev = (2.0 / fan_in as f64).sqrt();
        let data = (0..len)
            .map(|_| sample_standard_normal(&mut rng) * std_dev)
            .collect();
        Param::from_values(data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn zero_grad(&mut self) {
        for g in self.grad.iter_mut() {
            *g = 0.0;
        }
    }
}

/// Samples a single value from N(0, 1) using the Box-Muller transform.
/// Both u1 and u2 must be uniform on (0, 1].
fn sample_standard_normal(rng: &mut ThreadRng) -> f64 {
    // Draw two independent uniform samples in (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
