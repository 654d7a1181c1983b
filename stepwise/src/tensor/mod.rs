mod shape;
mod value;

pub use shape::numel;
pub use value::{DType, SharedTensor, TensorData, TensorElement, TensorValue};
