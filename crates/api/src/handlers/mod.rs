//! Request handlers, one module per route group.

pub mod generation;
