//! Core engines.
//!
//! # Responsibility
//! - Reconcile the durable store with upstream (`sync_service`).
//! - Apply due commands through the actuator port (`execution_service`).
//!
//! # Invariants
//! - Engines report failures in their cycle reports; they never panic or
//!   return errors to the control loop.
//! - Engines touch persisted state only through `DurableStore`.

pub mod execution_service;
pub mod sync_service;
