pub mod role;
pub mod schedule;

pub use role::Role;
pub use schedule::*;
