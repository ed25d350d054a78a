//! Runtime module
//!
//! This module holds the values exchanged with coroutines and the bounded
//! formatter used to render them in diagnostics.

pub mod dump;
pub mod value;

pub use dump::dump;
pub use value::Value;
