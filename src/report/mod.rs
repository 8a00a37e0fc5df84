//! Run export and display.
//!
//! This module turns finished run records into CSV, JSON, Markdown and
//! plain-text output.

pub mod generator;

pub use generator::*;
