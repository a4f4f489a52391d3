#![deny(missing_docs)]
//! This lib provide several utilities for use in the `sipwire` project.

pub mod arcstr;
pub mod scanner;

pub use arcstr::*;
pub use scanner::*;
