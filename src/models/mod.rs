pub mod face;

pub use face::*;
