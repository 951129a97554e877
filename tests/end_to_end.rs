use std::fs;
use std::path::PathBuf;

use densenet_cifar10::data::preprocess;
use densenet_cifar10::report;
use densenet_cifar10::{
    Adam, AugmentOptions, Callback, DenseNet, ImageAugmenter, ModelCheckpoint, ReduceLrOnPlateau,
    RunConfig, Tensor3, train_loop,
};

fn toy_split() -> (Vec<Tensor3>, Vec<usize>) {
    // Four 8x8 RGB images in two classes: dark vs bright.
    let images = (0..4)
        .map(|i| {
            let v = if i % 2 == 0 { 40.0 } else { 210.0 };
            Tensor3::from_data(8, 8, 3, vec![v; 192])
        })
        .collect();
    let labels = vec![0, 1, 0, 1];
    (images, labels)
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(name);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn one_epoch_run_produces_metrics_and_checkpoint() {
    let dir = temp_dir("densenet-cifar10-e2e");
    let weights_path = dir.join("weights.json");
    let metrics_dir = dir.join("metrics");

    let config = RunConfig {
        batch_size: 2,
        num_classes: 2,
        epochs: 1,
        image_rows: 8,
        image_cols: 8,
        depth: 7,
        dense_blocks: 1,
        growth_rate: 2,
        weights_path: weights_path.clone(),
        metrics_dir: metrics_dir.clone(),
        ..RunConfig::default()
    };

    let (mut images, raw_labels) = toy_split();
    preprocess::normalize(&mut images);
    let labels = preprocess::to_categorical(&raw_labels, config.num_classes);

    let mut model = DenseNet::build(&config);
    let mut optimizer = Adam::new(config.learning_rate);
    let mut augmenter = ImageAugmenter::new(AugmentOptions::default());
    augmenter.fit(&images, config.augment_seed);

    let mut callbacks = [
        Callback::ReduceLrOnPlateau(ReduceLrOnPlateau::new((0.1f64).sqrt(), 5, 0, 1e-5)),
        Callback::ModelCheckpoint(ModelCheckpoint::new(weights_path.clone())),
    ];

    let history = train_loop(
        &mut model,
        &mut augmenter,
        &images,
        &labels,
        &images,
        &labels,
        &mut optimizer,
        &mut callbacks,
        &config,
    )
    .unwrap();

    assert_eq!(history.len(), 1);
    // The first epoch always improves on an unset best, so it checkpoints.
    assert!(weights_path.exists());

    report::write_history(&history, &metrics_dir).unwrap();
    let losses = fs::read_to_string(metrics_dir.join("loss.txt")).unwrap();
    let accs = fs::read_to_string(metrics_dir.join("acc.txt")).unwrap();
    assert_eq!(losses.lines().count(), 1);
    assert_eq!(accs.lines().count(), 1);
    assert!(losses.lines().next().unwrap().parse::<f64>().unwrap().is_finite());

    let (accuracy, error) =
        report::evaluate_test_accuracy(&mut model, &images, &raw_labels, config.batch_size);
    assert!((0.0..=100.0).contains(&accuracy));
    assert!((accuracy + error - 100.0).abs() < 1e-12);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn checkpoint_roundtrips_into_a_fresh_model() {
    let dir = temp_dir("densenet-cifar10-e2e-roundtrip");
    let weights_path = dir.join("weights.json");

    let config = RunConfig {
        batch_size: 2,
        num_classes: 2,
        epochs: 1,
        image_rows: 8,
        image_cols: 8,
        depth: 7,
        dense_blocks: 1,
        growth_rate: 2,
        weights_path: weights_path.clone(),
        ..RunConfig::default()
    };

    let (mut images, raw_labels) = toy_split();
    preprocess::normalize(&mut images);
    let labels = preprocess::to_categorical(&raw_labels, config.num_classes);

    // Train a few steps so the saved state includes moved batch-norm
    // running statistics, not just the initial parameters.
    let mut original = DenseNet::build(&config);
    let mut optimizer = Adam::new(config.learning_rate);
    for _ in 0..5 {
        let probs = original.forward(&images, true);
        original.backward(&probs, &labels);
        let mut params = original.params_mut();
        optimizer.step(&mut params);
    }
    original.save_weights(&weights_path).unwrap();

    let mut restored = DenseNet::build(&config);
    restored.load_weights(&weights_path).unwrap();

    let a = original.forward(&images, false);
    let b = restored.forward(&images, false);
    for (row_a, row_b) in a.iter().zip(b.iter()) {
        for (x, y) in row_a.iter().zip(row_b.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    fs::remove_dir_all(&dir).unwrap();
}
