use crate::train::epoch_stats::EpochStats;

/// Append-only record of every completed epoch, owned by the training loop
/// and handed to the metrics reporter once the run terminates.
#[derive(Debug, Default)]
pub struct History {
    pub epochs: Vec<EpochStats>,
}

impl History {
    pub fn push(&mut self, stats: EpochStats) {
        self.epochs.push(stats);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Per-epoch training losses, in order.
    pub fn losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.train_loss).collect()
    }

    /// Per-epoch held-out accuracies, in order.
    pub fn val_accuracies(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.val_accuracy).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(epoch: usize, loss: f64, acc: f64) -> EpochStats {
        EpochStats {
            epoch,
            total_epochs: 3,
            train_loss: loss,
            val_loss: loss,
            val_accuracy: acc,
            elapsed_ms: 1,
        }
    }

    #[test]
    fn series_preserve_epoch_order() {
        let mut history = History::default();
        history.push(stats(1, 2.0, 0.3));
        history.push(stats(2, 1.5, 0.4));
        history.push(stats(3, 1.2, 0.5));
        assert_eq!(history.losses(), vec![2.0, 1.5, 1.2]);
        assert_eq!(history.val_accuracies(), vec![0.3, 0.4, 0.5]);
        assert_eq!(history.len(), 3);
    }
}
