//! Command implementations for the Bhasha CLI.

pub mod check;
pub mod shell;
pub mod translate;
