use crate::math::param::Param;
use crate::math::tensor::Tensor3;

/// Fully connected layer over 1 x 1 x n feature vectors.  Weight layout is
/// flat `[in][out]`; the bias has one entry per output.
pub struct Dense {
    pub in_features: usize,
    pub out_features: usize,
    pub weights: Param,
    pub biases: Param,
    cache_input: Vec<Tensor3>,
}

impl Dense {
    pub fn new(in_features: usize, out_features: usize) -> Dense {
        Dense {
            in_features,
            out_features,
            weights: Param::he(in_features * out_features, in_features),
            biases: Param::zeros(out_features),
            cache_input: Vec::new(),
        }
    }

    pub fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        let out: Vec<Tensor3> = input
            .iter()
            .map(|x| {
                assert_eq!(x.shape(), (1, 1, self.in_features), "Dense expects a flat feature vector");
                let mut z = self.biases.data.clone();
                for (i, &v) in x.data.iter().enumerate() {
                    let base = i * self.out_features;
                    for o in 0..self.out_features {
                        z[o] += v * self.weights.data[base + o];
                    }
                }
                Tensor3::from_vec(z)
            })
            .collect();

        if train {
            self.cache_input = input.to_vec();
        } else {
            self.cache_input.clear();
        }
        out
    }

    pub fn backward(&mut self, grad_out: &[Tensor3]) -> Vec<Tensor3> {
        assert_eq!(
            grad_out.len(),
            self.cache_input.len(),
            "backward called without a matching train-mode forward"
        );
        grad_out
            .iter()
            .zip(self.cache_input.iter())
            .map(|(gy, x)| {
                let mut gx = vec![0.0; self.in_features];
                for (i, &v) in x.data.iter().enumerate() {
                    let base = i * self.out_features;
                    let mut acc = 0.0;
                    for o in 0..self.out_features {
                        let g = gy.data[o];
                        self.weights.grad[base + o] += v * g;
                        acc += self.weights.data[base + o] * g;
                    }
                    gx[i] = acc;
                }
                for o in 0..self.out_features {
                    self.biases.grad[o] += gy.data[o];
                }
                Tensor3::from_vec(gx)
            })
            .collect()
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weights, &mut self.biases]
    }

    pub fn params(&self) -> Vec<&Param> {
        vec![&self.weights, &self.biases]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_computes_affine_map() {
        let mut dense = Dense::new(2, 2);
        dense.weights.data = vec![1.0, 2.0, 3.0, 4.0]; // [in][out]
        dense.biases.data = vec![0.5, -0.5];
        let x = Tensor3::from_vec(vec![1.0, 1.0]);
        let y = dense.forward(&[x], false);
        assert_eq!(y[0].data, vec![1.0 + 3.0 + 0.5, 2.0 + 4.0 - 0.5]);
    }

    #[test]
    fn backward_accumulates_weight_bias_and_input_gradients() {
        let mut dense = Dense::new(2, 1);
        dense.weights.data = vec![2.0, -3.0];
        dense.biases.data = vec![0.0];
        let x = Tensor3::from_vec(vec![5.0, 7.0]);
        dense.forward(&[x], true);

        let gx = dense.backward(&[Tensor3::from_vec(vec![1.0])]);
        assert_eq!(dense.weights.grad, vec![5.0, 7.0]);
        assert_eq!(dense.biases.grad, vec![1.0]);
        assert_eq!(gx[0].data, vec![2.0, -3.0]);
    }
}
