// Tensor descriptor model
//
// Formats, element types, descriptors and the pure shape math every
// conversion kind is built on.

pub mod dtype;
pub mod format;
pub mod shape;
pub mod tensor;

pub use dtype::DataType;
pub use format::{Format, FormatFamily};
pub use tensor::TensorDesc;
