use rand::prelude::*;

use crate::math::tensor::Tensor3;

/// Inverted dropout: each activation is zeroed with probability `rate`
/// during training and the survivors are scaled by 1/(1-rate) so inference
/// needs no correction.  A rate of 0.0 is the identity.
pub struct Dropout {
    pub rate: f64,
    mask: Vec<Tensor3>,
}

impl Dropout {
    pub fn new(rate: f64) -> Dropout {
        assert!((0.0..1.0).contains(&rate), "dropout rate must be in [0, 1)");
        Dropout { rate, mask: Vec::new() }
    }

    pub fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        if !train || self.rate == 0.0 {
            self.mask.clear();
            return input.to_vec();
        }

        let mut rng = rand::thread_rng();
        let scale = 1.0 / (1.0 - self.rate);
        let mut masks = Vec::with_capacity(input.len());
        let out = input
            .iter()
            .map(|x| {
                let mut mask = Tensor3::zeros(x.h, x.w, x.c);
                let mut y = x.clone();
                for (i, v) in y.data.iter_mut().enumerate() {
                    if rng.gen::<f64>() < self.rate {
                        *v = 0.0;
                    } else {
                        *v *= scale;
                        mask.data[i] = scale;
                    }
                }
                masks.push(mask);
                y
            })
            .collect();
        self.mask = masks;
        out
    }

    pub fn backward(&mut self, grad_out: &[Tensor3]) -> Vec<Tensor3> {
        if self.mask.is_empty() {
            // Identity forward (rate 0.0); gradient passes through.
            return grad_out.to_vec();
        }
        grad_out
            .iter()
            .zip(self.mask.iter())
            .map(|(gy, mask)| {
                let mut gx = gy.clone();
                for (g, &m) in gx.data.iter_mut().zip(mask.data.iter()) {
                    *g *= m;
                }
                gx
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_is_identity_in_both_directions() {
        let mut dropout = Dropout::new(0.0);
        let x = Tensor3::from_vec(vec![1.0, -2.0, 3.0]);
        let y = dropout.forward(std::slice::from_ref(&x), true);
        assert_eq!(y[0], x);
        let gx = dropout.backward(&[x.clone()]);
        assert_eq!(gx[0], x);
    }

    #[test]
    fn inference_mode_never_drops() {
        let mut dropout = Dropout::new(0.5);
        let x = Tensor3::from_vec(vec![1.0; 64]);
        let y = dropout.forward(std::slice::from_ref(&x), false);
        assert_eq!(y[0], x);
    }

    #[test]
    fn surviving_activations_are_rescaled() {
        let mut dropout = Dropout::new(0.5);
        let x = Tensor3::from_vec(vec![1.0; 1024]);
        let y = dropout.forward(std::slice::from_ref(&x), true);
        for &v in &y[0].data {
            assert!(v == 0.0 || (v - 2.0).abs() < 1e-12);
        }
    }
}
