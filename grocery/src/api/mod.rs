//! HTTP API handlers.
//!
//! Thin adapters: extract identity and input, call one repository method,
//! log and count the outcome. Business rules live in `grocery-core` and the
//! storage implementations.

pub mod cart;
pub mod catalog;
pub mod deliveries;
pub mod favorites;
pub mod orders;
pub mod returns;
pub mod stock;
pub mod users;
pub mod warehouses;
