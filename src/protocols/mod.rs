//! Protocol implementations.
//!
//! - `echo`: newline-delimited echo service with a fixed response prefix

pub mod echo;
