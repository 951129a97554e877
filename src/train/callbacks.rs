use std::io;
use std::path::PathBuf;

use crate::model::densenet::DenseNet;
use crate::optim::adam::Adam;
use crate::train::epoch_stats::EpochStats;

/// The closed set of epoch-observer policies the training loop invokes, in
/// declaration order, after every epoch.
pub enum Callback {
    ReduceLrOnPlateau(ReduceLrOnPlateau),
    ModelCheckpoint(ModelCheckpoint),
}

impl Callback {
    pub fn on_epoch_end(
        &mut self,
        stats: &EpochStats,
        model: &DenseNet,
        optimizer: &mut Adam,
    ) -> io::Result<()> {
        match self {
            Callback::ReduceLrOnPlateau(policy) => {
                policy.observe(stats.val_accuracy, optimizer);
                Ok(())
            }
            Callback::ModelCheckpoint(policy) => {
                policy.observe(stats.epoch, stats.val_accuracy, model)
            }
        }
    }
}

/// Cuts the learning rate by `factor` once the monitored metric has gone
/// `patience` consecutive epochs without improving, floored at `min_lr`.
/// After a reduction the policy sleeps for `cooldown` epochs.
pub struct ReduceLrOnPlateau {
    pub factor: f64,
    pub patience: usize,
    pub cooldown: usize,
    pub min_lr: f64,
    best: f64,
    wait: usize,
    cooldown_counter: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, cooldown: usize, min_lr: f64) -> ReduceLrOnPlateau {
        assert!(factor > 0.0 && factor < 1.0, "factor must shrink the learning rate");
        ReduceLrOnPlateau {
            factor,
            patience,
            cooldown,
            min_lr,
            best: f64::NEG_INFINITY,
            wait: 0,
            cooldown_counter: 0,
        }
    }

    pub fn observe(&mut self, val_accuracy: f64, optimizer: &mut Adam) {
        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.wait = 0;
        }

        if val_accuracy > self.best {
            self.best = val_accuracy;
            self.wait = 0;
            return;
        }

        if self.cooldown_counter > 0 {
            return;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            let current = optimizer.learning_rate();
            if current > self.min_lr {
                let reduced = (current * self.factor).max(self.min_lr);
                optimizer.set_learning_rate(reduced);
                println!("Reducing learning rate to {:e}.", reduced);
            }
            self.cooldown_counter = self.cooldown;
            self.wait = 0;
        }
    }
}

/// Persists the model state whenever the monitored metric strictly exceeds
/// the best value seen so far in this run.  The best value starts unset, so
/// the first observed epoch always checkpoints.
pub struct ModelCheckpoint {
    path: PathBuf,
    best: Option<f64>,
}

impl ModelCheckpoint {
    pub fn new(path: PathBuf) -> ModelCheckpoint {
        ModelCheckpoint { path, best: None }
    }

    pub fn observe(&mut self, epoch: usize, val_accuracy: f64, model: &DenseNet) -> io::Result<()> {
        let improved = match self.best {
            None => true,
            Some(best) => val_accuracy > best,
        };
        if !improved {
            return Ok(());
        }

        match self.best {
            Some(best) => println!(
                "Epoch {}: val_accuracy improved from {:.5} to {:.5}, saving model to {}",
                epoch,
                best,
                val_accuracy,
                self.path.display()
            ),
            None => println!(
                "Epoch {}: saving model with val_accuracy {:.5} to {}",
                epoch,
                val_accuracy,
                self.path.display()
            ),
        }
        model.save_weights(&self.path)?;
        self.best = Some(val_accuracy);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn plateau_reduces_once_after_patience_non_improving_epochs() {
        let mut adam = Adam::new(1e-3);
        let mut policy = ReduceLrOnPlateau::new((0.1f64).sqrt(), 5, 0, 1e-5);

        // First epoch establishes the best value.
        policy.observe(0.5, &mut adam);
        assert_eq!(adam.learning_rate(), 1e-3);

        // Four more flat epochs: still no reduction.
        for _ in 0..4 {
            policy.observe(0.5, &mut adam);
        }
        assert_eq!(adam.learning_rate(), 1e-3);

        // Fifth consecutive non-improving epoch triggers exactly one cut.
        policy.observe(0.5, &mut adam);
        assert!((adam.learning_rate() - 1e-3 * (0.1f64).sqrt()).abs() < 1e-12);
        assert!((adam.learning_rate() - 3.162e-4).abs() < 1e-6);
    }

    #[test]
    fn plateau_never_reduces_below_min_lr() {
        let mut adam = Adam::new(1e-3);
        let mut policy = ReduceLrOnPlateau::new((0.1f64).sqrt(), 5, 0, 1e-5);
        for _ in 0..200 {
            policy.observe(0.5, &mut adam);
        }
        assert!(adam.learning_rate() >= 1e-5);
    }

    #[test]
    fn improvement_resets_the_plateau_counter() {
        let mut adam = Adam::new(1e-3);
        let mut policy = ReduceLrOnPlateau::new((0.1f64).sqrt(), 5, 0, 1e-5);
        policy.observe(0.5, &mut adam);
        for _ in 0..4 {
            policy.observe(0.5, &mut adam);
        }
        // Improvement just before the patience threshold.
        policy.observe(0.6, &mut adam);
        for _ in 0..4 {
            policy.observe(0.6, &mut adam);
        }
        assert_eq!(adam.learning_rate(), 1e-3);
    }

    #[test]
    fn checkpoint_saves_only_on_strict_improvement() {
        let dir = std::env::temp_dir().join("densenet-cifar10-checkpoint-policy-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("best.json");
        let _ = fs::remove_file(&path);

        let model = DenseNet::new((8, 8, 3), 2, 7, 1, 2, -1, 0.0);
        let mut policy = ModelCheckpoint::new(path.clone());

        let sequence = [0.50, 0.48, 0.60, 0.55, 0.65];
        let expected_saves = [true, false, true, false, true];
        for (epoch, (&acc, &saves)) in sequence.iter().zip(expected_saves.iter()).enumerate() {
            policy.observe(epoch + 1, acc, &model).unwrap();
            assert_eq!(path.exists(), saves, "epoch {}", epoch + 1);
            let _ = fs::remove_file(&path);
        }
    }
}
