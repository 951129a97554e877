use rand::prelude::*;
use rand::rngs::StdRng;

use crate::math::tensor::Tensor3;

/// Recognized augmentation options.  The defaults are the CIFAR-10 run's
/// settings: +/-15 degree rotation, +/-5px shifts on a 32px image, and a
/// fair-coin horizontal flip.  Feature-wise normalization knobs exist but
/// stay off for this experiment.
#[derive(Debug, Clone)]
pub struct AugmentOptions {
    /// Maximum rotation in degrees, drawn uniformly from +/- this value.
    pub rotation_range: f64,
    /// Horizontal shift as a fraction of image width.
    pub width_shift: f64,
    /// Vertical shift as a fraction of image height.
    pub height_shift: f64,
    pub horizontal_flip: bool,
    pub featurewise_center: bool,
    pub featurewise_std: bool,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        AugmentOptions {
            rotation_range: 15.0,
            width_shift: 5.0 / 32.0,
            height_shift: 5.0 / 32.0,
            horizontal_flip: true,
            featurewise_center: false,
            featurewise_std: false,
        }
    }
}

/// Training-split augmentation pipeline.
///
/// `fit` derives per-channel corpus statistics and seeds the generator;
/// `flow` then yields an infinite stream of randomly perturbed batches.
pub struct ImageAugmenter {
    options: AugmentOptions,
    channel_mean: Vec<f64>,
    channel_std: Vec<f64>,
    rng: StdRng,
    fitted: bool,
}

impl ImageAugmenter {
    pub fn new(options: AugmentOptions) -> ImageAugmenter {
        ImageAugmenter {
            options,
            channel_mean: Vec::new(),
            channel_std: Vec::new(),
            rng: StdRng::seed_from_u64(0),
            fitted: false,
        }
    }

    /// Computes per-channel mean/std over the training corpus and reseeds
    /// the generator.  Deterministic given the same images and seed.
    pub fn fit(&mut self, images: &[Tensor3], seed: u64) {
        assert!(!images.is_empty(), "cannot fit an augmenter to an empty corpus");
        let c = images[0].c;

        let mut mean = vec![0.0; c];
        let mut count = 0usize;
        for image in images {
            assert_eq!(image.c, c, "mixed channel counts in corpus");
            for (i, &v) in image.data.iter().enumerate() {
                mean[i % c] += v;
            }
            count += image.h * image.w;
        }
        for m in mean.iter_mut() {
            *m /= count as f64;
        }

        let mut var = vec![0.0; c];
        for image in images {
            for (i, &v) in image.data.iter().enumerate() {
                let d = v - mean[i % c];
                var[i % c] += d * d;
            }
        }
        let std = var.iter().map(|&v| (v / count as f64).sqrt()).collect();

        self.channel_mean = mean;
        self.channel_std = std;
        self.rng = StdRng::seed_from_u64(seed);
        self.fitted = true;
    }

    /// Returns an infinite lazy stream of `(batch_images, batch_labels)`
    /// pairs.  Batch composition is a with-replacement random sample; every
    /// image is independently transformed per the configured options.
    pub fn flow<'a>(
        &'a mut self,
        images: &'a [Tensor3],
        labels: &'a [Vec<f64>],
        batch_size: usize,
    ) -> BatchStream<'a> {
        assert_eq!(images.len(), labels.len(), "images and labels must align");
        assert!(!images.is_empty(), "cannot flow from an empty dataset");
        assert!(batch_size > 0, "batch_size must be at least 1");
        if self.options.featurewise_center || self.options.featurewise_std {
            assert!(self.fitted, "fit() must run before flow() with feature-wise options");
        }
        BatchStream { augmenter: self, images, labels, batch_size }
    }

    /// Applies one random affine perturbation (rotation about the center
    /// plus translation, nearest-edge fill) and an optional horizontal flip.
    fn transform(&mut self, image: &Tensor3) -> Tensor3 {
        let opts = &self.options;

        let angle = if opts.rotation_range > 0.0 {
            self.rng.gen_range(-opts.rotation_range..=opts.rotation_range).to_radians()
        } else {
            0.0
        };
        let tx = if opts.width_shift > 0.0 {
            self.rng.gen_range(-opts.width_shift..=opts.width_shift) * image.w as f64
        } else {
            0.0
        };
        let ty = if opts.height_shift > 0.0 {
            self.rng.gen_range(-opts.height_shift..=opts.height_shift) * image.h as f64
        } else {
            0.0
        };
        let flip = opts.horizontal_flip && self.rng.gen::<bool>();

        let (cos_t, sin_t) = (angle.cos(), angle.sin());
        let cy = (image.h as f64 - 1.0) / 2.0;
        let cx = (image.w as f64 - 1.0) / 2.0;

        let mut out = Tensor3::zeros(image.h, image.w, image.c);
        for y in 0..image.h {
            for x in 0..image.w {
                // Inverse-map each destination pixel through the affine.
                let ux = x as f64 - cx - tx;
                let uy = y as f64 - cy - ty;
                let mut sx = cos_t * ux + sin_t * uy + cx;
                let sy = -sin_t * ux + cos_t * uy + cy;
                if flip {
                    sx = image.w as f64 - 1.0 - sx;
                }
                for ch in 0..image.c {
                    *out.at_mut(y, x, ch) = sample_bilinear(image, sy, sx, ch);
                }
            }
        }

        self.standardize(out)
    }

    /// Feature-wise centering/scaling from the fitted statistics; identity
    /// when both options are off.
    fn standardize(&self, mut image: Tensor3) -> Tensor3 {
        if !self.options.featurewise_center && !self.options.featurewise_std {
            return image;
        }
        let c = image.c;
        for (i, v) in image.data.iter_mut().enumerate() {
            let ch = i % c;
            if self.options.featurewise_center {
                *v -= self.channel_mean[ch];
            }
            if self.options.featurewise_std {
                let std = self.channel_std[ch];
                if std > 0.0 {
                    *v /= std;
                }
            }
        }
        image
    }
}

/// Bilinear sample at a fractional position, clamping out-of-range
/// coordinates to the nearest edge pixel.
fn sample_bilinear(image: &Tensor3, sy: f64, sx: f64, ch: usize) -> f64 {
    let y0 = sy.floor();
    let x0 = sx.floor();
    let dy = sy - y0;
    let dx = sx - x0;

    let clamp_y = |v: f64| (v.max(0.0) as usize).min(image.h - 1);
    let clamp_x = |v: f64| (v.max(0.0) as usize).min(image.w - 1);

    let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));
    let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));

    let top = image.at(ya, xa, ch) * (1.0 - dx) + image.at(ya, xb, ch) * dx;
    let bottom = image.at(yb, xa, ch) * (1.0 - dx) + image.at(yb, xb, ch) * dx;
    top * (1.0 - dy) + bottom * dy
}

/// Infinite, restartable batch stream over a training split.  Never
/// exhausts: each `next()` draws a fresh random sample.
pub struct BatchStream<'a> {
    augmenter: &'a mut ImageAugmenter,
    images: &'a [Tensor3],
    labels: &'a [Vec<f64>],
    batch_size: usize,
}

impl Iterator for BatchStream<'_> {
    type Item = (Vec<Tensor3>, Vec<Vec<f64>>);

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch_images = Vec::with_capacity(self.batch_size);
        let mut batch_labels = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            let idx = self.augmenter.rng.gen_range(0..self.images.len());
            batch_images.push(self.augmenter.transform(&self.images[idx]));
            batch_labels.push(self.labels[idx].clone());
        }
        Some((batch_images, batch_labels))
    }
}
