pub mod cifar10;
pub mod preprocess;
pub mod augment;

pub use cifar10::DatasetSplit;
pub use augment::{AugmentOptions, ImageAugmenter};
