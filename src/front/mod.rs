//! Front ends - the surfaces players interact with.

pub mod tty;
pub mod web;
