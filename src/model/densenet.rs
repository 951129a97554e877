use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::layers::{AvgPool2d, BatchNorm, Conv2d, Dense, Dropout, GlobalAvgPool, Relu};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::param::Param;
use crate::math::tensor::{concat_channels, split_channels, Tensor3};

/// The BN -> ReLU -> Conv -> [Dropout] composite every dense-block layer
/// and transition is made of.
struct ConvBlock {
    bn: BatchNorm,
    relu: Relu,
    conv: Conv2d,
    dropout: Option<Dropout>,
}

impl ConvBlock {
    fn new(in_c: usize, out_c: usize, k: usize, dropout_rate: f64) -> ConvBlock {
        let dropout = if dropout_rate > 0.0 {
            Some(Dropout::new(dropout_rate))
        } else {
            None
        };
        ConvBlock {
            bn: BatchNorm::new(in_c),
            relu: Relu::new(),
            conv: Conv2d::new(k, in_c, out_c),
            dropout,
        }
    }

    fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        let x = self.bn.forward(input, train);
        let x = self.relu.forward(&x, train);
        let x = self.conv.forward(&x, train);
        match self.dropout.as_mut() {
            Some(dropout) => dropout.forward(&x, train),
            None => x,
        }
    }

    fn backward(&mut self, grad: &[Tensor3]) -> Vec<Tensor3> {
        let g = match self.dropout.as_mut() {
            Some(dropout) => dropout.backward(grad),
            None => grad.to_vec(),
        };
        let g = self.conv.backward(&g);
        let g = self.relu.backward(&g);
        self.bn.backward(&g)
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.bn.params_mut();
        params.extend(self.conv.params_mut());
        params
    }

    fn params(&self) -> Vec<&Param> {
        let mut params = self.bn.params();
        params.extend(self.conv.params());
        params
    }

    fn batch_norms(&self) -> Vec<&BatchNorm> {
        vec![&self.bn]
    }

    fn batch_norms_mut(&mut self) -> Vec<&mut BatchNorm> {
        vec![&mut self.bn]
    }
}

/// A stack of densely connected convolution layers: each layer sees the
/// concatenation of the block input and every earlier layer's output, and
/// contributes `growth_rate` new channels.
struct DenseBlock {
    layers: Vec<ConvBlock>,
    in_c: usize,
    growth_rate: usize,
}

impl DenseBlock {
    fn new(in_c: usize, n_layers: usize, growth_rate: usize, dropout_rate: f64) -> DenseBlock {
        let layers = (0..n_layers)
            .map(|i| ConvBlock::new(in_c + i * growth_rate, growth_rate, 3, dropout_rate))
            .collect();
        DenseBlock { layers, in_c, growth_rate }
    }

    fn out_channels(&self) -> usize {
        self.in_c + self.layers.len() * self.growth_rate
    }

    fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        let mut x = input.to_vec();
        for layer in self.layers.iter_mut() {
            let y = layer.forward(&x, train);
            x = x
                .iter()
                .zip(y.iter())
                .map(|(a, b)| concat_channels(a, b))
                .collect();
        }
        x
    }

    fn backward(&mut self, grad: &[Tensor3]) -> Vec<Tensor3> {
        let mut g = grad.to_vec();
        for (i, layer) in self.layers.iter_mut().enumerate().rev() {
            let prefix = self.in_c + i * self.growth_rate;
            // The concat output splits into the passthrough channels and the
            // channels this layer produced; the layer's own input gradient
            // folds back into the passthrough.
            let mut g_prefix = Vec::with_capacity(g.len());
            let mut g_new = Vec::with_capacity(g.len());
            for t in &g {
                let (head, tail) = split_channels(t, prefix);
                g_prefix.push(head);
                g_new.push(tail);
            }
            let g_layer = layer.backward(&g_new);
            for (acc, extra) in g_prefix.iter_mut().zip(g_layer.iter()) {
                add_into(acc, extra);
            }
            g = g_prefix;
        }
        g
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(|l| l.params_mut()).collect()
    }

    fn params(&self) -> Vec<&Param> {
        self.layers.iter().flat_map(|l| l.params()).collect()
    }

    fn batch_norms(&self) -> Vec<&BatchNorm> {
        self.layers.iter().flat_map(|l| l.batch_norms()).collect()
    }

    fn batch_norms_mut(&mut self) -> Vec<&mut BatchNorm> {
        self.layers.iter_mut().flat_map(|l| l.batch_norms_mut()).collect()
    }
}

/// Between-block downsampling: 1x1 conv (no compression) followed by 2x2
/// average pooling.
struct Transition {
    block: ConvBlock,
    pool: AvgPool2d,
}

impl Transition {
    fn new(channels: usize, dropout_rate: f64) -> Transition {
        Transition {
            block: ConvBlock::new(channels, channels, 1, dropout_rate),
            pool: AvgPool2d::new(2),
        }
    }

    fn forward(&mut self, input: &[Tensor3], train: bool) -> Vec<Tensor3> {
        let x = self.block.forward(input, train);
        self.pool.forward(&x, train)
    }

    fn backward(&mut self, grad: &[Tensor3]) -> Vec<Tensor3> {
        let g = self.pool.backward(grad);
        self.block.backward(&g)
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        self.block.params_mut()
    }

    fn params(&self) -> Vec<&Param> {
        self.block.params()
    }

    fn batch_norms(&self) -> Vec<&BatchNorm> {
        self.block.batch_norms()
    }

    fn batch_norms_mut(&mut self) -> Vec<&mut BatchNorm> {
        self.block.batch_norms_mut()
    }
}

/// A densely connected convolutional classifier.
///
/// Forward returns per-class probability rows; `backward` seeds the chain
/// with the combined softmax + cross-entropy gradient, so the two must be
/// called with the same batch.  Parameters are exposed in a stable order
/// for the optimizer and the weight checkpoints.
pub struct DenseNet {
    input_shape: (usize, usize, usize),
    num_classes: usize,
    depth: usize,
    growth_rate: usize,

    initial_conv: Conv2d,
    blocks: Vec<DenseBlock>,
    transitions: Vec<Transition>,
    final_bn: BatchNorm,
    final_relu: Relu,
    global_pool: GlobalAvgPool,
    classifier: Dense,
}

impl DenseNet {
    /// Assembles the architecture from hyperparameters.
    ///
    /// `bottleneck_filters <= 0` selects the auto width, 2 * growth_rate.
    ///
    /// # Panics
    /// Panics unless `(depth - 4)` divides evenly into `dense_blocks`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input_shape: (usize, usize, usize),
        num_classes: usize,
        depth: usize,
        dense_blocks: usize,
        growth_rate: usize,
        bottleneck_filters: i64,
        dropout_rate: f64,
    ) -> DenseNet {
        assert!(dense_blocks > 0, "need at least one dense block");
        assert!(
            depth > 4 && (depth - 4) % dense_blocks == 0,
            "depth must satisfy (depth - 4) % dense_blocks == 0, got depth {} with {} blocks",
            depth,
            dense_blocks
        );
        let layers_per_block = (depth - 4) / dense_blocks;
        let initial_filters = if bottleneck_filters <= 0 {
            2 * growth_rate
        } else {
            bottleneck_filters as usize
        };

        let initial_conv = Conv2d::new(3, input_shape.2, initial_filters);
        let mut blocks = Vec::with_capacity(dense_blocks);
        let mut transitions = Vec::with_capacity(dense_blocks - 1);
        let mut channels = initial_filters;
        for b in 0..dense_blocks {
            let block = DenseBlock::new(channels, layers_per_block, growth_rate, dropout_rate);
            channels = block.out_channels();
            blocks.push(block);
            if b + 1 < dense_blocks {
                transitions.push(Transition::new(channels, dropout_rate));
            }
        }

        DenseNet {
            input_shape,
            num_classes,
            depth,
            growth_rate,
            initial_conv,
            blocks,
            transitions,
            final_bn: BatchNorm::new(channels),
            final_relu: Relu::new(),
            global_pool: GlobalAvgPool::new(),
            classifier: Dense::new(channels, num_classes),
        }
    }

    /// Builds the configured architecture (DenseNet-40-12 by default).
    pub fn build(config: &RunConfig) -> DenseNet {
        DenseNet::new(
            config.input_shape(),
            config.num_classes,
            config.depth,
            config.dense_blocks,
            config.growth_rate,
            config.bottleneck_filters,
            config.dropout_rate,
        )
    }

    /// Forward pass over a batch, returning one probability row per image.
    pub fn forward(&mut self, batch: &[Tensor3], train: bool) -> Vec<Vec<f64>> {
        let mut x = self.initial_conv.forward(batch, train);
        for i in 0..self.blocks.len() {
            x = self.blocks[i].forward(&x, train);
            if i < self.transitions.len() {
                x = self.transitions[i].forward(&x, train);
            }
        }
        let x = self.final_bn.forward(&x, train);
        let x = self.final_relu.forward(&x, train);
        let x = self.global_pool.forward(&x, train);
        let logits = self.classifier.forward(&x, train);
        logits.iter().map(|z| softmax(&z.data)).collect()
    }

    /// Backward pass for the batch of the preceding train-mode forward.
    /// Gradients accumulate into every parameter's `grad`; the optimizer
    /// applies and clears them.
    pub fn backward(&mut self, probs: &[Vec<f64>], targets: &[Vec<f64>]) {
        assert_eq!(probs.len(), targets.len(), "probs and targets must align");
        let inv_n = 1.0 / probs.len() as f64;
        let grad_logits: Vec<Tensor3> = probs
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| {
                let mut d = CrossEntropyLoss::derivative(p, t);
                for v in d.iter_mut() {
                    *v *= inv_n;
                }
                Tensor3::from_vec(d)
            })
            .collect();

        let g = self.classifier.backward(&grad_logits);
        let g = self.global_pool.backward(&g);
        let g = self.final_relu.backward(&g);
        let mut g = self.final_bn.backward(&g);
        for i in (0..self.blocks.len()).rev() {
            if i < self.transitions.len() {
                g = self.transitions[i].backward(&g);
            }
            g = self.blocks[i].backward(&g);
        }
        let _ = self.initial_conv.backward(&g);
    }

    /// Inference over an arbitrary number of images in fixed-size batches.
    pub fn predict(&mut self, images: &[Tensor3], batch_size: usize) -> Vec<Vec<f64>> {
        assert!(batch_size > 0, "batch_size must be at least 1");
        let mut probs = Vec::with_capacity(images.len());
        for chunk in images.chunks(batch_size) {
            probs.extend(self.forward(chunk, false));
        }
        probs
    }

    /// Every learnable parameter in a stable order: initial conv, dense
    /// blocks, transitions, final batch norm, classifier.
    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.initial_conv.params_mut();
        for block in self.blocks.iter_mut() {
            params.extend(block.params_mut());
        }
        for transition in self.transitions.iter_mut() {
            params.extend(transition.params_mut());
        }
        params.extend(self.final_bn.params_mut());
        params.extend(self.classifier.params_mut());
        params
    }

    /// Immutable view of the same parameters in the same order.
    pub fn params(&self) -> Vec<&Param> {
        let mut params = self.initial_conv.params();
        for block in self.blocks.iter() {
            params.extend(block.params());
        }
        for transition in self.transitions.iter() {
            params.extend(transition.params());
        }
        params.extend(self.final_bn.params());
        params.extend(self.classifier.params());
        params
    }

    pub fn param_count(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }

    /// Every batch-norm layer, in the same stable order convention as
    /// `params`: dense blocks, transitions, final batch norm.
    fn batch_norms(&self) -> Vec<&BatchNorm> {
        let mut norms = Vec::new();
        for block in self.blocks.iter() {
            norms.extend(block.batch_norms());
        }
        for transition in self.transitions.iter() {
            norms.extend(transition.batch_norms());
        }
        norms.push(&self.final_bn);
        norms
    }

    fn batch_norms_mut(&mut self) -> Vec<&mut BatchNorm> {
        let mut norms = Vec::new();
        for block in self.blocks.iter_mut() {
            norms.extend(block.batch_norms_mut());
        }
        for transition in self.transitions.iter_mut() {
            norms.extend(transition.batch_norms_mut());
        }
        norms.push(&mut self.final_bn);
        norms
    }

    /// Prints an architecture table to stdout.
    pub fn summary(&self) {
        let (mut h, mut w, _) = self.input_shape;
        println!("DenseNet-{}-{}", self.depth, self.growth_rate);
        println!("{}", "-".repeat(64));
        println!("{:<32} {:>18} {:>12}", "Layer", "Output shape", "Param #");
        println!("{}", "-".repeat(64));
        println!(
            "{:<32} {:>18} {:>12}",
            "conv2d 3x3",
            format!("({}, {}, {})", h, w, self.initial_conv.out_c),
            self.initial_conv.weights.len()
        );
        for (i, block) in self.blocks.iter().enumerate() {
            let block_params: usize = block.params().iter().map(|p| p.len()).sum();
            println!(
                "{:<32} {:>18} {:>12}",
                format!("dense_block_{} ({} layers)", i + 1, block.layers.len()),
                format!("({}, {}, {})", h, w, block.out_channels()),
                block_params
            );
            if i < self.transitions.len() {
                h /= 2;
                w /= 2;
                let t_params: usize = self.transitions[i].params().iter().map(|p| p.len()).sum();
                println!(
                    "{:<32} {:>18} {:>12}",
                    format!("transition_{}", i + 1),
                    format!("({}, {}, {})", h, w, block.out_channels()),
                    t_params
                );
            }
        }
        let feature_channels = self.classifier.in_features;
        let bn_params: usize = self.final_bn.params().iter().map(|p| p.len()).sum();
        println!(
            "{:<32} {:>18} {:>12}",
            "batch_norm + relu",
            format!("({}, {}, {})", h, w, feature_channels),
            bn_params
        );
        println!(
            "{:<32} {:>18} {:>12}",
            "global_avg_pool",
            format!("({},)", feature_channels),
            0
        );
        println!(
            "{:<32} {:>18} {:>12}",
            "dense + softmax",
            format!("({},)", self.num_classes),
            self.classifier.weights.len() + self.classifier.biases.len()
        );
        println!("{}", "-".repeat(64));
        println!("Total params: {}", self.param_count());
    }

    /// Persists the model state as JSON: learnable parameters plus the
    /// batch-norm running statistics, without which a restored model would
    /// normalize against fresh estimates and predict differently than the
    /// model that was saved.  Written to a sibling temp file and atomically
    /// renamed so a crash mid-write never corrupts an existing checkpoint.
    /// Optimizer state is not included.
    pub fn save_weights(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let norms = self.batch_norms();
        let checkpoint = Checkpoint {
            params: self.params().iter().map(|p| p.data.clone()).collect(),
            running_means: norms.iter().map(|bn| bn.running_mean.clone()).collect(),
            running_vars: norms.iter().map(|bn| bn.running_var.clone()).collect(),
        };
        let tmp = path.with_extension("tmp");
        {
            let file = fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &checkpoint)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)
    }

    /// Restores the state previously written by `save_weights`.
    ///
    /// # Panics
    /// Panics if the checkpoint's parameter or batch-norm count or shapes
    /// do not match this architecture.
    pub fn load_weights(&mut self, path: &Path) -> io::Result<()> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        let checkpoint: Checkpoint =
            serde_json::from_reader(reader).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let mut params = self.params_mut();
        assert_eq!(
            checkpoint.params.len(),
            params.len(),
            "checkpoint parameter count mismatch"
        );
        for (param, values) in params.iter_mut().zip(checkpoint.params) {
            assert_eq!(param.len(), values.len(), "checkpoint parameter shape mismatch");
            param.data = values;
        }

        let mut norms = self.batch_norms_mut();
        assert_eq!(
            checkpoint.running_means.len(),
            norms.len(),
            "checkpoint batch-norm count mismatch"
        );
        assert_eq!(
            checkpoint.running_vars.len(),
            norms.len(),
            "checkpoint batch-norm count mismatch"
        );
        for (bn, (mean, var)) in norms.iter_mut().zip(
            checkpoint
                .running_means
                .into_iter()
                .zip(checkpoint.running_vars),
        ) {
            assert_eq!(bn.c, mean.len(), "checkpoint batch-norm shape mismatch");
            assert_eq!(bn.c, var.len(), "checkpoint batch-norm shape mismatch");
            bn.running_mean = mean;
            bn.running_var = var;
        }
        Ok(())
    }
}

/// On-disk checkpoint payload.  `params` follows the `params()` ordering;
/// the running statistics follow the `batch_norms()` ordering.
#[derive(Serialize, Deserialize)]
struct Checkpoint {
    params: Vec<Vec<f64>>,
    running_means: Vec<Vec<f64>>,
    running_vars: Vec<Vec<f64>>,
}

fn add_into(acc: &mut Tensor3, extra: &Tensor3) {
    assert_eq!(acc.shape(), extra.shape(), "gradient shapes differ");
    for (a, &b) in acc.data.iter_mut().zip(extra.data.iter()) {
        *a += b;
    }
}

fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = z.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::adam::Adam;

    /// Small architecture used across the model tests: 8x8 RGB inputs,
    /// 2 classes, one dense block of 3 layers with growth rate 2.
    fn tiny_net() -> DenseNet {
        DenseNet::new((8, 8, 3), 2, 7, 1, 2, -1, 0.0)
    }

    fn tiny_batch() -> Vec<Tensor3> {
        (0..2)
            .map(|i| {
                Tensor3::from_data(
                    8,
                    8,
                    3,
                    (0..192).map(|v| ((v + i * 7) % 13) as f64 / 13.0 - 0.5).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn forward_yields_probability_rows() {
        let mut net = tiny_net();
        let probs = net.forward(&tiny_batch(), false);
        assert_eq!(probs.len(), 2);
        for row in &probs {
            assert_eq!(row.len(), 2);
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn params_and_params_mut_agree_on_ordering() {
        let mut net = tiny_net();
        let immutable: Vec<usize> = net.params().iter().map(|p| p.len()).collect();
        let mutable: Vec<usize> = net.params_mut().iter().map(|p| p.len()).collect();
        assert_eq!(immutable, mutable);
        assert!(net.param_count() > 0);
    }

    #[test]
    #[should_panic(expected = "depth must satisfy")]
    fn rejects_depth_not_divisible_into_blocks() {
        DenseNet::new((8, 8, 3), 2, 9, 2, 2, -1, 0.0);
    }

    #[test]
    fn save_then_load_roundtrips_weights_and_running_stats() {
        let dir = std::env::temp_dir().join("densenet-cifar10-ckpt-test");
        let path = dir.join("tiny.json");
        let mut net = tiny_net();
        // A train-mode forward moves the running statistics off their
        // initial values so the roundtrip exercises them too.
        net.forward(&tiny_batch(), true);
        net.save_weights(&path).unwrap();

        let saved: Vec<Vec<f64>> = net.params().iter().map(|p| p.data.clone()).collect();
        let saved_means: Vec<Vec<f64>> =
            net.batch_norms().iter().map(|bn| bn.running_mean.clone()).collect();
        for p in net.params_mut() {
            for v in p.data.iter_mut() {
                *v = 0.0;
            }
        }
        for bn in net.batch_norms_mut() {
            bn.running_mean = vec![9.0; bn.c];
            bn.running_var = vec![9.0; bn.c];
        }
        net.load_weights(&path).unwrap();
        let restored: Vec<Vec<f64>> = net.params().iter().map(|p| p.data.clone()).collect();
        let restored_means: Vec<Vec<f64>> =
            net.batch_norms().iter().map(|bn| bn.running_mean.clone()).collect();
        assert_eq!(saved, restored);
        assert_eq!(saved_means, restored_means);

        std::fs::remove_file(&path).unwrap();
    }

    /// A checkpoint taken after training must reproduce the saved model's
    /// inference exactly when restored into a freshly built net.
    #[test]
    fn restored_model_matches_trained_inference() {
        let dir = std::env::temp_dir().join("densenet-cifar10-ckpt-trained-test");
        let path = dir.join("trained.json");
        let mut net = tiny_net();
        let batch = tiny_batch();
        let targets = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let mut adam = Adam::new(0.01);
        for _ in 0..10 {
            let probs = net.forward(&batch, true);
            net.backward(&probs, &targets);
            let mut params = net.params_mut();
            adam.step(&mut params);
        }
        net.save_weights(&path).unwrap();

        let mut restored = tiny_net();
        restored.load_weights(&path).unwrap();

        let expected = net.forward(&batch, false);
        let actual = restored.forward(&batch, false);
        for (row_e, row_a) in expected.iter().zip(actual.iter()) {
            for (e, a) in row_e.iter().zip(row_a.iter()) {
                assert!(
                    (e - a).abs() < 1e-12,
                    "inference diverges after checkpoint roundtrip: {} vs {}",
                    e,
                    a
                );
            }
        }

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn repeated_steps_overfit_a_tiny_batch() {
        let mut net = tiny_net();
        let batch = tiny_batch();
        let targets = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let mut adam = Adam::new(0.01);

        let initial = {
            let probs = net.forward(&batch, true);
            CrossEntropyLoss::batch_loss(&probs, &targets)
        };
        let mut last = initial;
        for _ in 0..40 {
            let probs = net.forward(&batch, true);
            last = CrossEntropyLoss::batch_loss(&probs, &targets);
            net.backward(&probs, &targets);
            let mut params = net.params_mut();
            adam.step(&mut params);
        }
        assert!(last < initial, "loss did not decrease: {} -> {}", initial, last);
    }
}
