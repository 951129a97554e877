pub mod conv;
pub mod batch_norm;
pub mod relu;
pub mod pool;
pub mod dense;
pub mod dropout;

pub use conv::Conv2d;
pub use batch_norm::BatchNorm;
pub use relu::Relu;
pub use pool::{AvgPool2d, GlobalAvgPool};
pub use dense::Dense;
pub use dropout::Dropout;
