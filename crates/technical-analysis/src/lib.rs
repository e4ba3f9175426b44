pub mod indicators;
pub mod signals;
pub mod table;

#[cfg(test)]
mod indicators_tests;

pub use indicators::*;
pub use signals::*;
pub use table::*;
