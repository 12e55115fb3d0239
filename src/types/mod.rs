//! Core content types.

pub mod content;

pub use content::*;
