//! # Error Handling
//!
//! Crate-wide error type. Services return [`HackathonError`]; the HTTP layer
//! maps it onto the response envelope in `api::error`.

pub mod types;

pub use types::{
    unique_violation, AccountStateRejection, AuthErrorType, HackathonError, Result,
};
