//! Repository layer: table-scoped database operations.
//!
//! All public functions are re-exported here.

mod assessment;
mod conversation;

pub use assessment::*;
pub use conversation::*;
