//! HTTP request handlers organized by resource type

pub mod admin;
pub mod auth;
pub mod health;
pub mod teams;
pub mod users;

pub use admin::{ban_handler, ban_team_handler, unban_handler, unban_team_handler};
pub use auth::{
    complete_profile_handler, login_handler, logout_handler, refresh_handler,
    resend_passcode_handler, signup_handler, update_password_handler, verify_passcode_handler,
};
pub use health::ping_handler;
pub use teams::{
    create_team_handler, delete_team_handler, join_team_handler, kick_member_handler,
    leave_team_handler, list_members_handler, rename_team_handler,
};
pub use users::me_handler;
