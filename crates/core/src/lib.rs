//! `stocktake-core`: domain foundation building blocks.
//!
//! Pure domain primitives only: typed identifiers, the domain error
//! taxonomy, and the aggregate contract. No infrastructure concerns.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
