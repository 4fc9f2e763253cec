//! Backend clients for card generation.

mod llm;

pub use llm::*;
