pub mod types;

pub use types::{CoroError, Result};
