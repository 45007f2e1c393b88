mod dimmask;
mod error;
mod set;


pub use dimmask::DimMask;
pub use error::{capacity_err, err, Error, ErrorKind, Result};
pub use set::{Set, WeightedRange, WeightedSet};

/// A dimension-element identifier.
pub type Id = u32;

/// Reserved "absent" identifier; never a valid element.
pub const NO_ID: Id = Id::MAX;

/// Upper bound on the number of dimensions of a cube.
pub const DIM_MAX: usize = 256;
