pub mod metrics;

pub use metrics::{evaluate_test_accuracy, write_history};
