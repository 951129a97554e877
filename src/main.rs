use std::io;
use std::process;

use densenet_cifar10::data::cifar10;
use densenet_cifar10::data::preprocess;
use densenet_cifar10::report;
use densenet_cifar10::{
    Adam, AugmentOptions, Callback, DenseNet, ImageAugmenter, ModelCheckpoint, ReduceLrOnPlateau,
    RunConfig, train_loop,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        process::exit(1);
    }
}

fn run() -> io::Result<()> {
    let config = RunConfig::default();

    let mut model = DenseNet::build(&config);
    println!("Model created");
    model.summary();

    let mut optimizer = Adam::new(config.learning_rate);
    println!("Finished compiling");
    println!("Building model...");

    let dataset = cifar10::load_data(&config.data_dir)?;
    let mut train_images = dataset.train_images;
    let mut test_images = dataset.test_images;
    preprocess::normalize(&mut train_images);
    preprocess::normalize(&mut test_images);

    let train_labels = preprocess::to_categorical(&dataset.train_labels, config.num_classes);
    let test_labels = preprocess::to_categorical(&dataset.test_labels, config.num_classes);

    let mut augmenter = ImageAugmenter::new(AugmentOptions::default());
    augmenter.fit(&train_images, config.augment_seed);

    // Restart-from-checkpoint is not wired up; see DESIGN.md.
    if config.weights_path.exists() {
        println!("Model loaded.");
    }

    let mut callbacks = [
        Callback::ReduceLrOnPlateau(ReduceLrOnPlateau::new((0.1f64).sqrt(), 5, 0, 1e-5)),
        Callback::ModelCheckpoint(ModelCheckpoint::new(config.weights_path.clone())),
    ];

    let history = train_loop(
        &mut model,
        &mut augmenter,
        &train_images,
        &train_labels,
        &test_images,
        &test_labels,
        &mut optimizer,
        &mut callbacks,
        &config,
    )?;

    report::write_history(&history, &config.metrics_dir)?;

    let (accuracy, error) = report::evaluate_test_accuracy(
        &mut model,
        &test_images,
        &dataset.test_labels,
        config.batch_size,
    );
    println!("Accuracy : {:.4}", accuracy);
    println!("Error : {:.4}", error);

    Ok(())
}
