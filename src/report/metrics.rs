use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::math::argmax;
use crate::math::tensor::Tensor3;
use crate::model::densenet::DenseNet;
use crate::train::history::History;

/// Writes the per-epoch training losses to `loss.txt` and the per-epoch
/// held-out accuracies to `acc.txt` under `dir`, one full-precision value
/// per line.  Both files are written atomically through a temp file so a
/// crash mid-write never leaves a truncated series behind.
pub fn write_history(history: &History, dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    write_series(&history.losses(), &dir.join("loss.txt"))?;
    write_series(&history.val_accuracies(), &dir.join("acc.txt"))?;
    Ok(())
}

fn write_series(values: &[f64], path: &Path) -> io::Result<()> {
    let tmp = path.with_extension("txt.tmp");
    {
        let file = fs::File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        for value in values {
            writeln!(writer, "{:.18e}", value)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)
}

/// Scores the trained model on the test split and returns
/// `(accuracy, error)` where accuracy is the percentage of correctly
/// classified images and error is its complement.
pub fn evaluate_test_accuracy(
    model: &mut DenseNet,
    images: &[Tensor3],
    labels: &[usize],
    batch_size: usize,
) -> (f64, f64) {
    assert_eq!(
        images.len(),
        labels.len(),
        "images and labels must have equal length"
    );
    assert!(!images.is_empty(), "test split must not be empty");

    let probs = model.predict(images, batch_size);
    let correct = probs
        .iter()
        .zip(labels.iter())
        .filter(|(p, &label)| argmax(p) == label)
        .count();
    let accuracy = correct as f64 / images.len() as f64 * 100.0;
    (accuracy, 100.0 - accuracy)
}
