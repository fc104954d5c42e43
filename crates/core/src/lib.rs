//! `lotkeeper-core`: identifiers, aggregate plumbing and the shared error taxonomy.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorCategory};
pub use id::{AggregateId, LocationId, ProductId, TenantId, UserId};
