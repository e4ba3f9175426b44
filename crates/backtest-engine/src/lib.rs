pub mod models;
pub mod engine;


pub use models::*;
pub use engine::SignalBacktester;
