//! Cascading field resolution.
//!
//! A logical key from the field mapping is turned into a concrete control by
//! trying its strategies in order:
//! - direct selectors (CSS, `text=`, `button=`)
//! - `<label for>` indirection
//! - label-text proximity ([`heuristics`])
//! - positional fallback inside a container
//!
//! A miss is reported as [`Resolution::NotFound`], never as an error.

pub mod chain;
pub mod errors;
pub mod heuristics;
pub mod mapping;
pub mod resolver;
pub mod types;

pub use chain::{first_success, Attempt, ChainError, Won};
pub use errors::LocatorError;
pub use mapping::FieldMapping;
pub use resolver::Resolver;
pub use types::{Control, ControlKind, Resolution, SelectorStrategy, WaitBudgets};
