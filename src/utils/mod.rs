//! Process-level helpers shared by the server binary.

pub mod bootstrap;
