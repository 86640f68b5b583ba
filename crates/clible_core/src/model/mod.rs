//! Domain records shared by repositories and services.
//!
//! # Responsibility
//! - Define explicit per-entity record types for persisted rows.
//! - Parse and render passage references.
//!
//! # Invariants
//! - Repositories translate SQLite rows into these records at the boundary;
//!   no dynamically-typed row maps escape the persistence layer.

pub mod book;
pub mod reference;
pub mod session;
pub mod translation;
pub mod verse;
