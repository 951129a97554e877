use crate::math::tensor::Tensor3;

/// Element-wise rectifier with a cached activation mask for backward.
#[derive(Default)]
pub struct Relu {
    cache_input: Vec<Tensor3>,
}

impl Relu {
    pub fn new() -> Relu {
        Relu { cache_input: Vec::new() }
    }

    pub fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        let out = input.iter().map(|x| x.map(|v| v.max(0.0))).collect();
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
                let mut gx = gy.clone();
                for (g, &v) in gx.data.iter_mut().zip(x.data.iter()) {
                    if v <= 0.0 {
                        *g = 0.0;
                    }
                }
                gx
            })
            .collect()
    }
}
