//! Card generation: tolerant parsing, style validation, budgeted batching.

mod generator;
mod parser;
mod validator;

pub use generator::*;
pub use parser::*;
pub use validator::*;
