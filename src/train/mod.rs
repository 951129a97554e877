pub mod epoch_stats;
pub mod history;
pub mod callbacks;
pub mod loop_fn;

pub use epoch_stats::EpochStats;
pub use history::History;
pub use callbacks::{Callback, ModelCheckpoint, ReduceLrOnPlateau};
pub use loop_fn::train_loop;
