//! Request handlers.

pub mod objects;
