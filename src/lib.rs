pub mod math;
pub mod config;
pub mod data;
pub mod layers;
pub mod model;
pub mod loss;
pub mod optim;
pub mod train;
pub mod report;

// Convenience re-exports
pub use config::RunConfig;
pub use data::augment::{AugmentOptions, ImageAugmenter};
pub use data::cifar10::DatasetSplit;
pub use math::tensor::Tensor3;
pub use model::densenet::DenseNet;
pub use optim::adam::Adam;
pub use train::callbacks::{Callback, ModelCheckpoint, ReduceLrOnPlateau};
pub use train::history::History;
pub use train::loop_fn::train_loop;
