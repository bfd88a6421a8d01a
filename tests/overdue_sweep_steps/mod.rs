//! Step definitions for overdue sweep scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
