use crate::math::param::Param;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPS: f64 = 1e-8;

/// Adaptive moment estimation with bias correction.
///
/// Per-parameter first/second moment buffers are allocated lazily on the
/// first `step()` and matched positionally thereafter, so the caller must
/// always pass the model's parameters in the same order.  The learning rate
/// is mutable mid-run for the plateau policy.
pub struct Adam {
    learning_rate: f64,
    t: u64,
    moments: Vec<(Vec<f64>, Vec<f64>)>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam { learning_rate, t: 0, moments: Vec::new() }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// Applies one update to every parameter and zeroes the gradients.
    pub fn step(&mut self, params: &mut [&mut Param]) {
        if self.moments.is_empty() {
            self.moments = params
                .iter()
                .map(|p| (vec![0.0; p.len()], vec![0.0; p.len()]))
                .collect();
        }
        assert_eq!(
            self.moments.len(),
            params.len(),
            "parameter count changed between optimizer steps"
        );

        self.t += 1;
        let correction1 = 1.0 - BETA1.powi(self.t as i32);
        let correction2 = 1.0 - BETA2.powi(self.t as i32);

        for (param, (m, v)) in params.iter_mut().zip(self.moments.iter_mut()) {
            assert_eq!(param.len(), m.len(), "parameter shape changed between steps");
            for i in 0..param.data.len() {
                let g = param.grad[i];
                m[i] = BETA1 * m[i] + (1.0 - BETA1) * g;
                v[i] = BETA2 * v[i] + (1.0 - BETA2) * g * g;
                let m_hat = m[i] / correction1;
                let v_hat = v[i] / correction2;
                param.data[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + EPS);
            }
            param.zero_grad();
        }
    }
}
