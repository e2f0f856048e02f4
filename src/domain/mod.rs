//! Domain layer - pure types with no clocks, maps or I/O.
//!
//! This layer contains the core concepts of the notification and
//! abuse-control subsystem:
//! - Channel identity and lifecycle states
//! - Named events, their typed payloads and SSE framing
//! - Cooldown and daily-quota records and admission decisions
//!
//! All types in this layer are plain data and easily testable.

pub mod admission;
pub mod channel;
pub mod event;
