/// A 3-dimensional image tensor in height x width x channel layout.
///
/// The flat `data` vector is channel-last: the value at (y, x, ch) lives at
/// `(y * w + x) * c + ch`.  All layer code in this crate operates on batches
/// of `Tensor3`s; vectors (dense-layer activations, pooled features) are
/// represented as a 1 x 1 x n tensor so one type flows through the whole
/// network.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    pub h: usize,
    pub w: usize,
    pub c: usize,
    pub data: Vec<f64>,
}

impl Tensor3 {
    pub fn zeros(h: usize, w: usize, c: usize) -> Tensor3 {
        Tensor3 { h, w, c, data: vec![0.0; h * w * c] }
    }

    pub fn from_data(h: usize, w: usize, c: usize, data: Vec<f64>) -> Tensor3 {
        assert_eq!(data.len(), h * w * c, "data length does not match h*w*c");
        Tensor3 { h, w, c, data }
    }

    /// Wraps a flat feature vector as a 1 x 1 x n tensor.
    pub fn from_vec(data: Vec<f64>) -> Tensor3 {
        let c = data.len();
        Tensor3 { h: 1, w: 1, c, data }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.h, self.w, self.c)
    }

    #[inline]
    pub fn at(&self, y: usize, x: usize, ch: usize) -> f64 {
        self.data[(y * self.w + x) * self.c + ch]
    }

    #[inline]
    pub fn at_mut(&mut self, y: usize, x: usize, ch: usize) -> &mut f64 {
        &mut self.data[(y * self.w + x) * self.c + ch]
    }

    pub fn map<F>(&self, functor: F) -> Tensor3
    where
        F: Fn(f64) -> f64,
    {
        Tensor3 {
            h: self.h,
            w: self.w,
            c: self.c,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }
}

/// Concatenates two same-spatial-shape tensors along the channel axis.
pub fn concat_channels(a: &Tensor3, b: &Tensor3) -> Tensor3 {
    assert_eq!((a.h, a.w), (b.h, b.w), "spatial shapes differ in channel concat");
    let mut out = Tensor3::zeros(a.h, a.w, a.c + b.c);
    for y in 0..a.h {
        for x in 0..a.w {
            for ch in 0..a.c {
                *out.at_mut(y, x, ch) = a.at(y, x, ch);
            }
            for ch in 0..b.c {
                *out.at_mut(y, x, a.c + ch) = b.at(y, x, ch);
            }
        }
    }
    out
}

/// Splits a tensor into its first `c_prefix` channels and the remainder.
/// Inverse of `concat_channels`; used to route gradients back through a
/// dense-block concatenation.
pub fn split_channels(t: &Tensor3, c_prefix: usize) -> (Tensor3, Tensor3) {
    assert!(c_prefix <= t.c, "split point exceeds channel count");
    let mut head = Tensor3::zeros(t.h, t.w, c_prefix);
    let mut tail = Tensor3::zeros(t.h, t.w, t.c - c_prefix);
    for y in 0..t.h {
        for x in 0..t.w {
            for ch in 0..c_prefix {
                *head.at_mut(y, x, ch) = t.at(y, x, ch);
            }
            for ch in c_prefix..t.c {
                *tail.at_mut(y, x, ch - c_prefix) = t.at(y, x, ch);
            }
        }
    }
    (head, tail)
}
