//! Pool module - buffered supply of ready cards.

mod card_pool;

pub use card_pool::*;
