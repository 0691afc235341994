//! Core Kernel - Foundational types shared by the sales records service
//!
//! This crate provides the building blocks used across the workspace:
//! - Record identifiers
//! - Canonical timestamp handling and time windows
//! - Port/adapter health-check contracts

pub mod temporal;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use temporal::{TemporalError, TimeWindow};
pub use identifiers::RecordId;
pub use error::CoreError;
pub use ports::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable};
