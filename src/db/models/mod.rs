//! Database models split into domain-specific modules.

pub mod department;
pub mod identity;
pub mod task;

pub use department::*;
pub use identity::*;
pub use task::*;
