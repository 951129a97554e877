pub mod densenet;

pub use densenet::DenseNet;
