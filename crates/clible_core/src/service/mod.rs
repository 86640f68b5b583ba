//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep callers decoupled from storage details.
//!
//! # Invariants
//! - Services hold no ambient state; caller identity arrives per call in
//!   `RequestContext`.

mod context;
pub mod session_service;
pub mod verse_service;

pub use context::RequestContext;
