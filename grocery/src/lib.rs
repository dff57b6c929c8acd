//! Grocery commerce service.
//!
//! An HTTP API over a PostgreSQL-backed stock ledger: catalog browsing,
//! carts, favorites, checkout, returns with wallet credits, warehouse
//! transfers and delivery tracking.
//!
//! # Architecture
//!
//! ```text
//!   HTTP (axum)          grocery::api handlers
//!        │                       │
//!        ▼                       ▼
//!  ┌────────────┐     ┌──────────────────────┐
//!  │ grocery-web│     │ AppState             │
//!  │ extractors │     │ Arc<dyn Repository>  │
//!  │ AppError   │     └──────────┬───────────┘
//!  └────────────┘                │
//!                     ┌──────────┴───────────┐
//!                     ▼                      ▼
//!             PostgresStore            InMemoryStore
//!             (production)               (tests)
//! ```
//!
//! # Stock reservations
//!
//! Every product carries `total_available_stock` and `buying_in_progress`.
//! Checkout increments `buying_in_progress` with one guarded statement per
//! line, all lines in one transaction:
//!
//! ```text
//! UPDATE products SET buying_in_progress = buying_in_progress + q
//!  WHERE id = p AND total_available_stock - buying_in_progress >= q
//! ```
//!
//! If any line affects zero rows the whole batch rolls back and every
//! failing line is reported. Payment confirmation commits the reservation
//! (both counters drop by `q`); cancellation releases it. An optional
//! sweeper reclaims reservations older than a configured TTL.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod metrics;
pub mod server;
pub mod sweeper;

pub use config::Config;
pub use server::{build_router, AppState};
