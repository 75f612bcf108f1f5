pub mod enums;
pub mod conversation;
pub mod assessment;

pub use assessment::*;
pub use conversation::*;
pub use enums::*;
