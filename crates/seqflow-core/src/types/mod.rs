pub mod example;
pub mod mode;
pub mod shape;

pub use example::{length_sum, length_values, scalar_length, Example, LENGTH_FIELD};
pub use mode::Mode;
pub use shape::{PaddedShape, PaddedShapes};
