use crate::math::param::Param;
use crate::math::tensor::Tensor3;

const EPS: f64 = 1e-5;
const MOMENTUM: f64 = 0.9;

/// Per-channel batch normalization over batch and spatial positions.
///
/// Training mode normalizes with batch statistics and updates the running
/// mean/variance; inference mode uses the running estimates.  Gamma and
/// beta are the learnable parameters; the running statistics carry no
/// gradient but are part of the model state a checkpoint must capture,
/// since inference depends on them.
pub struct BatchNorm {
    pub c: usize,
    pub gamma: Param,
    pub beta: Param,
    pub running_mean: Vec<f64>,
    pub running_var: Vec<f64>,
    // Caches from the last train-mode forward.
    x_hat: Vec<Tensor3>,
    inv_std: Vec<f64>,
    m: f64,
}

impl BatchNorm {
    pub fn new(c: usize) -> BatchNorm {
        BatchNorm {
            c,
            gamma: Param::from_values(vec![1.0; c]),
            beta: Param::zeros(c),
            running_mean: vec![0.0; c],
            running_var: vec![1.0; c],
            x_hat: Vec::new(),
            inv_std: Vec::new(),
            m: 0.0,
        }
    }

    pub fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        assert!(!input.is_empty(), "BatchNorm forward on empty batch");
        let c = self.c;
        for x in input {
            assert_eq!(x.c, c, "channel count mismatch in BatchNorm");
        }

        if !train {
            self.x_hat.clear();
            self.inv_std.clear();
            return input
                .iter()
                .map(|x| {
                    let mut y = x.clone();
                    for (i, v) in y.data.iter_mut().enumerate() {
                        let ch = i % c;
                        let norm = (*v - self.running_mean[ch])
                            / (self.running_var[ch] + EPS).sqrt();
                        *v = self.gamma.data[ch] * norm + self.beta.data[ch];
                    }
                    y
                })
                .collect();
        }

        // Batch statistics over every sample and spatial position.
        let m = (input.len() * input[0].h * input[0].w) as f64;
        let mut mean = vec![0.0; c];
        for x in input {
            for (i, &v) in x.data.iter().enumerate() {
                mean[i % c] += v;
            }
        }
        for mu in mean.iter_mut() {
            *mu /= m;
        }

        let mut var = vec![0.0; c];
        for x in input {
            for (i, &v) in x.data.iter().enumerate() {
                let d = v - mean[i % c];
                var[i % c] += d * d;
            }
        }
        for v in var.iter_mut() {
            *v /= m;
        }

        let inv_std: Vec<f64> = var.iter().map(|&v| 1.0 / (v + EPS).sqrt()).collect();

        let mut x_hat = Vec::with_capacity(input.len());
        let mut out = Vec::with_capacity(input.len());
        for x in input {
            let mut h = x.clone();
            for (i, v) in h.data.iter_mut().enumerate() {
                let ch = i % c;
                *v = (*v - mean[ch]) * inv_std[ch];
            }
            let mut y = h.clone();
            for (i, v) in y.data.iter_mut().enumerate() {
                let ch = i % c;
                *v = self.gamma.data[ch] * *v + self.beta.data[ch];
            }
            x_hat.push(h);
            out.push(y);
        }

        for ch in 0..c {
            self.running_mean[ch] = MOMENTUM * self.running_mean[ch] + (1.0 - MOMENTUM) * mean[ch];
            self.running_var[ch] = MOMENTUM * self.running_var[ch] + (1.0 - MOMENTUM) * var[ch];
        }

        self.x_hat = x_hat;
        self.inv_std = inv_std;
        self.m = m;
        out
    }

    pub fn backward(&mut self, grad_out: &[Tensor3]) -> Vec<Tensor3> {
        assert_eq!(
            grad_out.len(),
            self.x_hat.len(),
            "backward called without a matching train-mode forward"
        );
        let c = self.c;
        let m = self.m;

        // Channel-wise reductions of dy and dy * x_hat.
        let mut sum_dy = vec![0.0; c];
        let mut sum_dy_xhat = vec![0.0; c];
        for (gy, h) in grad_out.iter().zip(self.x_hat.iter()) {
            for (i, &g) in gy.data.iter().enumerate() {
                let ch = i % c;
                sum_dy[ch] += g;
                sum_dy_xhat[ch] += g * h.data[i];
            }
        }

        for ch in 0..c {
            self.gamma.grad[ch] += sum_dy_xhat[ch];
            self.beta.grad[ch] += sum_dy[ch];
        }

        grad_out
            .iter()
            .zip(self.x_hat.iter())
            .map(|(gy, h)| {
                let mut gx = Tensor3::zeros(gy.h, gy.w, c);
                for (i, g) in gx.data.iter_mut().enumerate() {
                    let ch = i % c;
                    let dy = gy.data[i];
                    *g = self.gamma.data[ch] * self.inv_std[ch] / m
                        * (m * dy - sum_dy[ch] - h.data[i] * sum_dy_xhat[ch]);
                }
                gx
            })
            .collect()
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.gamma, &mut self.beta]
    }

    pub fn params(&self) -> Vec<&Param> {
        vec![&self.gamma, &self.beta]
    }
}
