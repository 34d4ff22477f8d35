//! Form actions for the declaration engine
//!
//! Each primitive performs one idempotent UI action on a control resolved
//! through `action-locator`, with its own bounded waits and layered fallback:
//! click, dropdown-set, text-set, file-set and read-displayed-value.

pub mod currency;
pub mod errors;
mod primitives;
pub mod waiting;

pub use currency::parse_currency;
pub use errors::ActionError;
pub use primitives::{ActionTimings, Actions, DropdownOutcome, FileOutcome};
pub use waiting::{pause, UrlWait, WaitSpec, Waiter};
