use crate::math::tensor::Tensor3;

/// Per-channel pixel statistics of the reference corpus the original
/// DenseNet weights were trained against.  Applied after scaling pixels
/// from [0, 255] down to [0, 1].
pub const CHANNEL_MEAN: [f64; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f64; 3] = [0.229, 0.224, 0.225];

/// Converts raw [0, 255] pixel intensities to normalized floats in place:
/// x/255, minus the fixed per-channel mean, divided by the per-channel std.
/// Deterministic: the same input always produces the same output.
pub fn normalize(images: &mut [Tensor3]) {
    for image in images.iter_mut() {
        let c = image.c;
        assert_eq!(c, 3, "per-channel normalization expects 3-channel images");
        for (i, v) in image.data.iter_mut().enumerate() {
            let ch = i % c;
            *v = (*v / 255.0 - CHANNEL_MEAN[ch]) / CHANNEL_STD[ch];
        }
    }
}

/// Maps integer class ids to one-hot rows of length `num_classes`.
///
/// # Panics
/// Panics if any label is >= `num_classes`.
pub fn to_categorical(labels: &[usize], num_classes: usize) -> Vec<Vec<f64>> {
    labels
        .iter()
        .map(|&label| {
            assert!(
                label < num_classes,
                "label {} out of range for {} classes",
                label,
                num_classes
            );
            let mut row = vec![0.0; num_classes];
            row[label] = 1.0;
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_categorical_is_one_hot_for_every_class() {
        for label in 0..10 {
            let rows = to_categorical(&[label], 10);
            assert_eq!(rows[0].len(), 10);
            assert_eq!(rows[0][label], 1.0);
            assert_eq!(rows[0].iter().sum::<f64>(), 1.0);
            assert_eq!(rows[0].iter().filter(|&&v| v == 1.0).count(), 1);
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn to_categorical_rejects_label_at_num_classes() {
        to_categorical(&[10], 10);
    }

    #[test]
    fn normalize_is_deterministic() {
        let image = Tensor3::from_data(2, 2, 3, (0..12).map(|v| v as f64 * 20.0).collect());
        let mut a = vec![image.clone()];
        let mut b = vec![image];
        normalize(&mut a);
        normalize(&mut b);
        assert_eq!(a[0], b[0]);
    }

    #[test]
    fn normalize_applies_channel_statistics() {
        let mut images = vec![Tensor3::from_data(1, 1, 3, vec![255.0, 0.0, 127.5])];
        normalize(&mut images);
        let img = &images[0];
        assert!((img.at(0, 0, 0) - (1.0 - CHANNEL_MEAN[0]) / CHANNEL_STD[0]).abs() < 1e-12);
        assert!((img.at(0, 0, 1) - (0.0 - CHANNEL_MEAN[1]) / CHANNEL_STD[1]).abs() < 1e-12);
        assert!((img.at(0, 0, 2) - (0.5 - CHANNEL_MEAN[2]) / CHANNEL_STD[2]).abs() < 1e-12);
    }
}
