use crate::math::param::Param;
use crate::math::tensor::Tensor3;

/// 2-D convolution, stride 1, "same" zero padding, no bias (the dense-block
/// convention: batch normalization directly follows every convolution, so a
/// bias term would be redundant).
///
/// Weight layout is flat `[ky][kx][in_c][out_c]`.
pub struct Conv2d {
    pub k: usize,
    pub in_c: usize,
    pub out_c: usize,
    pub weights: Param,
    cache_input: Vec<Tensor3>,
}

impl Conv2d {
    pub fn new(k: usize, in_c: usize, out_c: usize) -> Conv2d {
        let fan_in = k * k * in_c;
        Conv2d {
            k,
            in_c,
            out_c,
            weights: Param::he(k * k * in_c * out_c, fan_in),
            cache_input: Vec::new(),
        }
    }

    #[inline]
    fn w_index(&self, ky: usize, kx: usize, ic: usize, oc: usize) -> usize {
        ((ky * self.k + kx) * self.in_c + ic) * self.out_c + oc
    }

    /// Forward pass over a batch; caches the input for backward.
    pub fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        let pad = self.k / 2;
        let out: Vec<Tensor3> = input
            .iter()
            .map(|x| {
                assert_eq!(x.c, self.in_c, "channel count mismatch in Conv2d");
                let mut y = Tensor3::zeros(x.h, x.w, self.out_c);
                let mut acc = vec![0.0; self.out_c];
                for oy in 0..x.h {
                    for ox in 0..x.w {
                        acc.iter_mut().for_each(|a| *a = 0.0);
                        for ky in 0..self.k {
                            let sy = oy + ky;
                            if sy < pad || sy >= x.h + pad {
                                continue;
                            }
                            let sy = sy - pad;
                            for kx in 0..self.k {
                                let sx = ox + kx;
                                if sx < pad || sx >= x.w + pad {
                                    continue;
                                }
                                let sx = sx - pad;
                                for ic in 0..self.in_c {
                                    let v = x.at(sy, sx, ic);
                                    if v == 0.0 {
                                        continue;
                                    }
                                    let base = self.w_index(ky, kx, ic, 0);
                                    for oc in 0..self.out_c {
                                        acc[oc] += v * self.weights.data[base + oc];
                                    }
                                }
                            }
                        }
                        for oc in 0..self.out_c {
                            *y.at_mut(oy, ox, oc) = acc[oc];
                        }
                    }
                }
                y
            })
            .collect();

        if train {
            self.cache_input = input.to_vec();
        } else {
            self.cache_input.clear();
        }
        out
    }

    /// Accumulates the weight gradient over the batch and returns the
    /// gradient with respect to the cached input.
    pub fn backward(&mut self, grad_out: &[Tensor3]) -> Vec<Tensor3> {
        assert_eq!(
            grad_out.len(),
            self.cache_input.len(),
            "backward called without a matching train-mode forward"
        );
        let pad = self.k / 2;

        let mut grad_in = Vec::with_capacity(grad_out.len());
        for (x, gy) in self.cache_input.iter().zip(grad_out.iter()) {
            let mut gx = Tensor3::zeros(x.h, x.w, self.in_c);
            for oy in 0..x.h {
                for ox in 0..x.w {
                    for ky in 0..self.k {
                        let sy = oy + ky;
                        if sy < pad || sy >= x.h + pad {
                            continue;
                        }
                        let sy = sy - pad;
                        for kx in 0..self.k {
                            let sx = ox + kx;
                            if sx < pad || sx >= x.w + pad {
                                continue;
                            }
                            let sx = sx - pad;
                            for ic in 0..self.in_c {
                                let xv = x.at(sy, sx, ic);
                                let base = self.w_index(ky, kx, ic, 0);
                                let mut acc = 0.0;
                                for oc in 0..self.out_c {
                                    let g = gy.at(oy, ox, oc);
                                    self.weights.grad[base + oc] += xv * g;
                                    acc += self.weights.data[base + oc] * g;
                                }
                                *gx.at_mut(sy, sx, ic) += acc;
                            }
                        }
                    }
                }
            }
            grad_in.push(gx);
        }
        grad_in
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weights]
    }

    pub fn params(&self) -> Vec<&Param> {
        vec![&self.weights]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1x1 convolution is a per-pixel linear map; verify against a
    /// hand-computed case.
    #[test]
    fn one_by_one_conv_mixes_channels() {
        let mut conv = Conv2d::new(1, 2, 1);
        conv.weights.data = vec![2.0, -1.0]; // [in=0 -> 2.0, in=1 -> -1.0]
        let x = Tensor3::from_data(1, 2, 2, vec![1.0, 3.0, 5.0, 7.0]);
        let y = conv.forward(&[x], false);
        assert_eq!(y[0].shape(), (1, 2, 1));
        assert_eq!(y[0].at(0, 0, 0), 2.0 * 1.0 - 1.0 * 3.0);
        assert_eq!(y[0].at(0, 1, 0), 2.0 * 5.0 - 1.0 * 7.0);
    }

    /// Same padding keeps the spatial shape.
    #[test]
    fn same_padding_preserves_spatial_shape() {
        let mut conv = Conv2d::new(3, 3, 5);
        let x = Tensor3::zeros(8, 8, 3);
        let y = conv.forward(&[x], false);
        assert_eq!(y[0].shape(), (8, 8, 5));
    }

    /// Finite-difference check of both the weight gradient and the input
    /// gradient on a tiny tensor.
    #[test]
    fn gradients_match_finite_differences() {
        let mut conv = Conv2d::new(3, 2, 2);
        let x = Tensor3::from_data(
            3,
            3,
            2,
            (0..18).map(|v| (v as f64) * 0.1 - 0.9).collect(),
        );
        // Scalar objective: sum of outputs.
        let loss = |conv: &mut Conv2d, x: &Tensor3| -> f64 {
            conv.forward(std::slice::from_ref(x), false)[0].data.iter().sum()
        };

        let y = conv.forward(std::slice::from_ref(&x), true);
        let ones = vec![y[0].map(|_| 1.0)];
        let gx = conv.backward(&ones);

        let eps = 1e-5;
        for i in [0usize, 7, 20, 35] {
            let saved = conv.weights.data[i];
            conv.weights.data[i] = saved + eps;
            let up = loss(&mut conv, &x);
            conv.weights.data[i] = saved - eps;
            let down = loss(&mut conv, &x);
            conv.weights.data[i] = saved;
            let numeric = (up - down) / (2.0 * eps);
            assert!(
                (conv.weights.grad[i] - numeric).abs() < 1e-6,
                "weight grad {} mismatch: {} vs {}",
                i,
                conv.weights.grad[i],
                numeric
            );
        }

        for i in [0usize, 5, 11, 17] {
            let mut xp = x.clone();
            xp.data[i] += eps;
            let up = loss(&mut conv, &xp);
            xp.data[i] -= 2.0 * eps;
            let down = loss(&mut conv, &xp);
            let numeric = (up - down) / (2.0 * eps);
            assert!(
                (gx[0].data[i] - numeric).abs() < 1e-6,
                "input grad {} mismatch: {} vs {}",
                i,
                gx[0].data[i],
                numeric
            );
        }
    }
}
