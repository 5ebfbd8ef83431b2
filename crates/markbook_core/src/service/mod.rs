//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep callers decoupled from storage details.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence
//!   contracts.
//! - Capability concerns are split per caller: directory lifecycle,
//!   grading operations and external synchronization are separate
//!   services composed as needed.

pub mod authorization;
pub mod external_service;
pub mod gradebook_service;
pub mod grading_service;
