#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod handle;
mod registry;
mod table;
mod transaction;

pub use handle::*;
pub use registry::*;
pub use table::*;
pub use transaction::*;
