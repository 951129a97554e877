use std::fs;
use std::io;
use std::path::Path;

use crate::math::tensor::Tensor3;

pub const IMAGE_ROWS: usize = 32;
pub const IMAGE_COLS: usize = 32;
pub const IMAGE_CHANNELS: usize = 3;
pub const NUM_CLASSES: usize = 10;

/// One CIFAR-10 binary record: a label byte followed by three
/// channel-planar 32x32 pixel planes.
const PLANE_BYTES: usize = IMAGE_ROWS * IMAGE_COLS;
const RECORD_BYTES: usize = 1 + IMAGE_CHANNELS * PLANE_BYTES;

const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_FILE: &str = "test_batch.bin";

/// The immutable train/test partition of the dataset.  Pixel values are raw
/// intensities in [0, 255] as f64; normalization is a separate step.
pub struct DatasetSplit {
    pub train_images: Vec<Tensor3>,
    pub train_labels: Vec<usize>,
    pub test_images: Vec<Tensor3>,
    pub test_labels: Vec<usize>,
}

/// Loads the CIFAR-10 binary batches from an on-disk cache directory
/// (the extracted `cifar-10-binary.tar.gz` layout).  Downloading and
/// caching the archive is outside this crate.
pub fn load_data(dir: &Path) -> io::Result<DatasetSplit> {
    let mut train_images = Vec::with_capacity(50_000);
    let mut train_labels = Vec::with_capacity(50_000);
    for name in TRAIN_FILES {
        load_batch(&dir.join(name), &mut train_images, &mut train_labels)?;
    }

    let mut test_images = Vec::with_capacity(10_000);
    let mut test_labels = Vec::with_capacity(10_000);
    load_batch(&dir.join(TEST_FILE), &mut test_images, &mut test_labels)?;

    Ok(DatasetSplit { train_images, train_labels, test_images, test_labels })
}

/// Appends every record of one batch file to `images`/`labels`.
fn load_batch(
    path: &Path,
    images: &mut Vec<Tensor3>,
    labels: &mut Vec<usize>,
) -> io::Result<()> {
    let bytes = fs::read(path)?;
    assert_eq!(
        bytes.len() % RECORD_BYTES,
        0,
        "batch file {} is not a whole number of {}-byte records",
        path.display(),
        RECORD_BYTES
    );

    for record in bytes.chunks_exact(RECORD_BYTES) {
        let label = record[0] as usize;
        assert!(label < NUM_CLASSES, "label {} out of range in {}", label, path.display());

        let mut image = Tensor3::zeros(IMAGE_ROWS, IMAGE_COLS, IMAGE_CHANNELS);
        let pixels = &record[1..];
        for ch in 0..IMAGE_CHANNELS {
            let plane = &pixels[ch * PLANE_BYTES..(ch + 1) * PLANE_BYTES];
            for y in 0..IMAGE_ROWS {
                for x in 0..IMAGE_COLS {
                    *image.at_mut(y, x, ch) = plane[y * IMAGE_COLS + x] as f64;
                }
            }
        }

        images.push(image);
        labels.push(label);
    }

    Ok(())
}
