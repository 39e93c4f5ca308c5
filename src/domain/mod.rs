//! Domain identifiers shared across layers.

pub mod id;

pub use id::{AccountId, TeamId};
