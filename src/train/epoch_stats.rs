use serde::{Serialize, Deserialize};

/// Per-epoch training statistics produced by `train_loop`.
///
/// One value is appended to the `History` at the end of every completed
/// epoch; the callback policies observe the same record before it lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Mean training loss over all optimizer steps in this epoch.
    pub train_loss: f64,
    /// Mean loss over the held-out split.
    pub val_loss: f64,
    /// Held-out accuracy as a fraction in [0, 1]; the monitored metric for
    /// both callback policies.
    pub val_accuracy: f64,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
