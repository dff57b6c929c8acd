//! HTTP handlers shared by every grocery binary.

pub mod health;

pub use health::{health_check, readiness};
