/// Categorical cross-entropy loss for use with a Softmax output.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// Computes the scalar cross-entropy loss:
    ///   L = -sum(expected[i] * log(predicted[i] + eps))
    ///
    /// `predicted` — softmax probabilities, shape [n_classes]
    /// `expected`  — one-hot (or soft) target distribution, shape [n_classes]
    pub fn loss(predicted: &[f64], expected: &[f64]) -> f64 {
        predicted.iter().zip(expected.iter())
            .map(|(p, e)| -e * (p + EPS).ln())
            .sum()
    }

    /// Gradient of the combined Softmax + cross-entropy w.r.t. the
    /// pre-softmax logits:
    ///   dL/dz_i = predicted[i] - expected[i]   (element-wise)
    ///
    /// This is the delta that seeds the network's backward pass; the softmax
    /// itself must then pass it through unchanged so the Jacobian is not
    /// double-applied.
    pub fn derivative(predicted: &[f64], expected: &[f64]) -> Vec<f64> {
        predicted.iter().zip(expected.iter())
            .map(|(p, e)| p - e)
            .collect()
    }

    /// Mean cross-entropy over a batch of probability rows.
    pub fn batch_loss(predicted: &[Vec<f64>], expected: &[Vec<f64>]) -> f64 {
        assert_eq!(predicted.len(), expected.len(), "batch sizes must match");
        assert!(!predicted.is_empty(), "batch_loss on empty batch");
        let total: f64 = predicted.iter().zip(expected.iter())
            .map(|(p, e)| Self::loss(p, e))
            .sum();
        total / predicted.len() as f64
    }
}
