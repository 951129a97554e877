use std::path::PathBuf;

/// Immutable run configuration: every hyperparameter and path of the
/// CIFAR-10 DenseNet experiment in one place, passed by reference to the
/// components that need it.  `Default` carries the canonical
/// DenseNet-40-12 values.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub batch_size: usize,
    pub num_classes: usize,
    pub epochs: usize,
    pub learning_rate: f64,

    pub image_rows: usize,
    pub image_cols: usize,
    pub image_channels: usize,

    pub depth: usize,
    pub dense_blocks: usize,
    pub growth_rate: usize,
    /// Initial convolution filter count; any value <= 0 means "auto",
    /// which resolves to 2 * growth_rate.
    pub bottleneck_filters: i64,
    pub dropout_rate: f64,

    /// Seed handed to `ImageAugmenter::fit`.
    pub augment_seed: u64,

    pub weights_path: PathBuf,
    pub metrics_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            batch_size: 100,
            num_classes: 10,
            epochs: 200,
            learning_rate: 1e-3,
            image_rows: 32,
            image_cols: 32,
            image_channels: 3,
            depth: 40,
            dense_blocks: 3,
            growth_rate: 12,
            bottleneck_filters: -1,
            dropout_rate: 0.0,
            augment_seed: 0,
            weights_path: PathBuf::from("weights/DenseNet-40-12-CIFAR10.json"),
            metrics_dir: PathBuf::from("Dense_data"),
            data_dir: PathBuf::from("data/cifar-10-batches-bin"),
        }
    }
}

impl RunConfig {
    /// Resolves the "auto" sentinel for the initial convolution width.
    pub fn initial_filters(&self) -> usize {
        if self.bottleneck_filters <= 0 {
            2 * self.growth_rate
        } else {
            self.bottleneck_filters as usize
        }
    }

    pub fn input_shape(&self) -> (usize, usize, usize) {
        (self.image_rows, self.image_cols, self.image_channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_densenet_40_12_run() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.epochs, 200);
        assert_eq!(cfg.depth, 40);
        assert_eq!(cfg.input_shape(), (32, 32, 3));
        assert_eq!(cfg.initial_filters(), 24);
    }

    #[test]
    fn explicit_filter_count_overrides_auto() {
        let cfg = RunConfig { bottleneck_filters: 16, ..RunConfig::default() };
        assert_eq!(cfg.initial_filters(), 16);
    }
}
