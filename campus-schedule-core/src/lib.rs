//! Campus Schedule Core Library
//!
//! Course-schedule engine: maps class periods to wall-clock times, term weeks
//! to dates, expands weekly courses into concrete occurrences, lays out
//! overlapping classes side by side and converts schedules to and from ICS.

pub mod clock;
pub mod demo;
pub mod error;
pub mod ics;
pub mod layout;
pub mod notify;
pub mod recurrence;
pub mod slots;
pub mod store;
pub mod types;
pub mod week;

// Re-export core types and error handling
pub use error::{Error, Result};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{
        clock::*, ics::*, layout::*, notify::*, recurrence::*, slots::*, store::*, types::*,
        week::*,
    };
}
