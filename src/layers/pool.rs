use crate::math::tensor::Tensor3;

/// Non-overlapping average pooling (size x size window, stride = size).
/// Halves each spatial dimension of the transition layers.
pub struct AvgPool2d {
    pub size: usize,
    cache_shape: Vec<(usize, usize, usize)>,
}

impl AvgPool2d {
    pub fn new(size: usize) -> AvgPool2d {
        assert!(size > 0, "pool size must be at least 1");
        AvgPool2d { size, cache_shape: Vec::new() }
    }

    pub fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        let s = self.size;
        let out: Vec<Tensor3> = input
            .iter()
            .map(|x| {
                let (oh, ow) = (x.h / s, x.w / s);
                let mut y = Tensor3::zeros(oh, ow, x.c);
                let norm = 1.0 / (s * s) as f64;
                for oy in 0..oh {
                    for ox in 0..ow {
                        for ch in 0..x.c {
                            let mut acc = 0.0;
                            for dy in 0..s {
                                for dx in 0..s {
                                    acc += x.at(oy * s + dy, ox * s + dx, ch);
                                }
                            }
                            *y.at_mut(oy, ox, ch) = acc * norm;
                        }
                    }
                }
                y
            })
            .collect();

        if train {
            self.cache_shape = input.iter().map(|x| x.shape()).collect();
        } else {
            self.cache_shape.clear();
        }
        out
    }

    pub fn backward(&mut self, grad_out: &[Tensor3]) -> Vec<Tensor3> {
        assert_eq!(
            grad_out.len(),
            self.cache_shape.len(),
            "backward called without a matching train-mode forward"
        );
        let s = self.size;
        let norm = 1.0 / (s * s) as f64;
        grad_out
            .iter()
            .zip(self.cache_shape.iter())
            .map(|(gy, &(h, w, c))| {
                let mut gx = Tensor3::zeros(h, w, c);
                for oy in 0..gy.h {
                    for ox in 0..gy.w {
                        for ch in 0..c {
                            let g = gy.at(oy, ox, ch) * norm;
                            for dy in 0..s {
                                for dx in 0..s {
                                    *gx.at_mut(oy * s + dy, ox * s + dx, ch) += g;
                                }
                            }
                        }
                    }
                }
                gx
            })
            .collect()
    }
}

/// Collapses each channel to its spatial mean, producing a 1 x 1 x c
/// feature vector for the classifier head.
pub struct GlobalAvgPool {
    cache_shape: Vec<(usize, usize, usize)>,
}

impl GlobalAvgPool {
    pub fn new() -> GlobalAvgPool {
        GlobalAvgPool { cache_shape: Vec::new() }
    }

    pub fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        let out: Vec<Tensor3> = input
            .iter()
            .map(|x| {
                let norm = 1.0 / (x.h * x.w) as f64;
                let mut pooled = vec![0.0; x.c];
                for (i, &v) in x.data.iter().enumerate() {
                    pooled[i % x.c] += v;
                }
                for p in pooled.iter_mut() {
                    *p *= norm;
                }
                Tensor3::from_vec(pooled)
            })
            .collect();

        if train {
            self.cache_shape = input.iter().map(|x| x.shape()).collect();
        } else {
            self.cache_shape.clear();
        }
        out
    }

    pub fn backward(&mut self, grad_out: &[Tensor3]) -> Vec<Tensor3> {
        assert_eq!(
            grad_out.len(),
            self.cache_shape.len(),
            "backward called without a matching train-mode forward"
        );
        grad_out
            .iter()
            .zip(self.cache_shape.iter())
            .map(|(gy, &(h, w, c))| {
                let norm = 1.0 / (h * w) as f64;
                let mut gx = Tensor3::zeros(h, w, c);
                for (i, g) in gx.data.iter_mut().enumerate() {
                    *g = gy.data[i % c] * norm;
                }
                gx
            })
            .collect()
    }
}

impl Default for GlobalAvgPool {
    fn default() -> Self {
        GlobalAvgPool::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_pool_halves_spatial_dims_and_averages_windows() {
        let mut pool = AvgPool2d::new(2);
        let x = Tensor3::from_data(2, 2, 1, vec![1.0, 3.0, 5.0, 7.0]);
        let y = pool.forward(&[x], true);
        assert_eq!(y[0].shape(), (1, 1, 1));
        assert_eq!(y[0].data[0], 4.0);

        let gy = Tensor3::from_data(1, 1, 1, vec![8.0]);
        let gx = pool.backward(&[gy]);
        assert_eq!(gx[0].data, vec![2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn global_pool_reduces_to_channel_means() {
        let mut pool = GlobalAvgPool::new();
        let x = Tensor3::from_data(2, 2, 2, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0]);
        let y = pool.forward(&[x], true);
        assert_eq!(y[0].shape(), (1, 1, 2));
        assert!((y[0].data[0] - 2.5).abs() < 1e-12);
        assert!((y[0].data[1] - 25.0).abs() < 1e-12);

        let gy = Tensor3::from_vec(vec![4.0, 8.0]);
        let gx = pool.backward(&[gy]);
        assert_eq!(gx[0].at(1, 1, 0), 1.0);
        assert_eq!(gx[0].at(0, 0, 1), 2.0);
    }
}
