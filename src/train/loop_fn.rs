use std::io;
use std::time::Instant;

use crate::config::RunConfig;
use crate::data::augment::ImageAugmenter;
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::argmax;
use crate::math::tensor::Tensor3;
use crate::model::densenet::DenseNet;
use crate::optim::adam::Adam;
use crate::train::callbacks::Callback;
use crate::train::epoch_stats::EpochStats;
use crate::train::history::History;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `model` for `config.epochs` epochs over the augmented stream and
/// returns the full per-epoch history.
///
/// Per epoch: `train_images.len() / batch_size` optimizer steps, each on a
/// freshly drawn augmented batch, followed by one evaluation pass over the
/// entire held-out split.  The callbacks then observe the epoch's stats in
/// declaration order.  The loop always runs to the fixed epoch count; there
/// is no early stopping and no cancellation.
///
/// # Panics
/// Panics if the training split is empty, images and labels disagree in
/// length, or `batch_size` is zero or larger than the training split.
#[allow(clippy::too_many_arguments)]
pub fn train_loop(
    model: &mut DenseNet,
    augmenter: &mut ImageAugmenter,
    train_images: &[Tensor3],
    train_labels: &[Vec<f64>],
    val_images: &[Tensor3],
    val_labels: &[Vec<f64>],
    optimizer: &mut Adam,
    callbacks: &mut [Callback],
    config: &RunConfig,
) -> io::Result<History> {
    assert!(!train_images.is_empty(), "train_images must not be empty");
    assert_eq!(
        train_images.len(),
        train_labels.len(),
        "train_images and train_labels must have equal length"
    );
    assert_eq!(
        val_images.len(),
        val_labels.len(),
        "val_images and val_labels must have equal length"
    );
    assert!(config.batch_size > 0, "batch_size must be at least 1");
    assert!(
        config.batch_size <= train_images.len(),
        "batch_size exceeds the training split"
    );

    let steps_per_epoch = train_images.len() / config.batch_size;
    let mut history = History::default();
    let mut stream = augmenter.flow(train_images, train_labels, config.batch_size);

    for epoch in 1..=config.epochs {
        let t_start = Instant::now();

        // ── One epoch of optimizer steps over the augmented stream ────────
        let mut total_loss = 0.0;
        for _ in 0..steps_per_epoch {
            let (batch_images, batch_labels) =
                stream.next().expect("augmented stream is infinite");
            let probs = model.forward(&batch_images, true);
            total_loss += CrossEntropyLoss::batch_loss(&probs, &batch_labels);
            model.backward(&probs, &batch_labels);
            let mut params = model.params_mut();
            optimizer.step(&mut params);
        }
        let train_loss = total_loss / steps_per_epoch as f64;

        // ── Validation over the entire held-out split ─────────────────────
        let (val_loss, val_accuracy) =
            evaluate(model, val_images, val_labels, config.batch_size);

        let elapsed_ms = t_start.elapsed().as_millis() as u64;
        println!(
            "Epoch {}/{} - {}ms - loss: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
            epoch, config.epochs, elapsed_ms, train_loss, val_loss, val_accuracy
        );

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            val_loss,
            val_accuracy,
            elapsed_ms,
        };

        // ── Callback policies, in declaration order ───────────────────────
        for callback in callbacks.iter_mut() {
            callback.on_epoch_end(&stats, model, optimizer)?;
        }

        history.push(stats);
    }

    Ok(history)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Mean loss and argmax accuracy over a full dataset in inference mode.
fn evaluate(
    model: &mut DenseNet,
    images: &[Tensor3],
    labels: &[Vec<f64>],
    batch_size: usize,
) -> (f64, f64) {
    if images.is_empty() {
        return (0.0, 0.0);
    }
    let mut total_loss = 0.0;
    let mut correct = 0usize;
    for (image_chunk, label_chunk) in images.chunks(batch_size).zip(labels.chunks(batch_size)) {
        let probs = model.forward(image_chunk, false);
        // Weight each chunk's mean by its size so a partial trailing
        // chunk does not skew the overall mean.
        total_loss += CrossEntropyLoss::batch_loss(&probs, label_chunk) * image_chunk.len() as f64;
        correct += probs
            .iter()
            .zip(label_chunk.iter())
            .filter(|(p, t)| argmax(p) == argmax(t))
            .count();
    }
    (
        total_loss / images.len() as f64,
        correct as f64 / images.len() as f64,
    )
}
