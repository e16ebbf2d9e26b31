//! API request and response data models.
//!
//! API models are distinct from database models: tokens and credentials never appear in a
//! response body except for the freshly issued token in [`auth::LoginResponse`].
//!
//! - [`auth`]: login, logout and dashboard info payloads
//! - [`users`]: the caller's identity bundle
//! - [`memberships`]: group and permission replacement requests

pub mod auth;
pub mod memberships;
pub mod users;
