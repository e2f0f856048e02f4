//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain types and owns the shared state:
//! - Channel registry (per-key push channels and their lifecycle)
//! - Action rate limiter (cooldown and daily quota admission)
//! - Compactor (periodic limiter housekeeping)
//! - Action guard (check, perform, record)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod compactor;
pub mod guard;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod registry;
