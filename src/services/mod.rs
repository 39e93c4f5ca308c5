//! Business logic services
//!
//! Service layer components that encapsulate team and notification logic,
//! separated from HTTP concerns.

pub mod notification_service;
pub mod team_service;

pub use notification_service::Notifier;
pub use team_service::{LeaveResult, TeamService};
